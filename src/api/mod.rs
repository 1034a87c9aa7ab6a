//! Language-model completion with streaming accumulation and retry.
//!
//! The module is layered the same way as the rest of the pipeline:
//! - [`CompletionClient`]: sends one prompt, yields the response as a lazy,
//!   forward-only stream of text fragments ([`FragmentStream`])
//! - [`accumulate`]: folds a fragment stream into the full response text
//! - [`AskAsync`]: "prompt in, full text out", the unit that gets retried
//! - [`CompletionAsk`]: adapts a [`CompletionClient`] to [`AskAsync`] with a timeout
//! - [`RetryAsk`]: decorator adding exponential backoff to any [`AskAsync`]
//!
//! # Retry Strategy
//!
//! Only transport failures are retried. Timeouts and everything downstream of
//! the network (decode, shape, persistence) fail the URL immediately.
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```

pub mod openai;
pub mod sse;

use crate::error::TrackerError;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{error, info, instrument, warn};

/// A lazy, finite, non-restartable sequence of response text fragments.
///
/// Fragments are only meaningful once concatenated; none of them should be
/// parsed on its own.
pub type FragmentStream = BoxStream<'static, Result<String, TrackerError>>;

/// Sampling and transport options for one completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    /// Target model identifier.
    pub model: String,
    pub temperature: f32,
    /// Nucleus-sampling threshold.
    pub top_p: f32,
    pub max_tokens: u32,
    /// Request an incremental (SSE) response instead of a single body.
    pub stream: bool,
}

/// A language-model completion endpoint.
pub trait CompletionClient {
    /// Send `prompt` and return the response as a fragment stream.
    ///
    /// An empty stream is a valid (empty) response, not an error.
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<FragmentStream, TrackerError>;
}

/// Concatenate fragments in arrival order.
pub async fn accumulate(fragments: FragmentStream) -> Result<String, TrackerError> {
    fragments
        .try_fold(String::new(), |mut acc, fragment| async move {
            acc.push_str(&fragment);
            Ok(acc)
        })
        .await
}

/// Trait for async "prompt in, full text out" interaction.
pub trait AskAsync {
    async fn ask(&self, text: &str) -> Result<String, TrackerError>;
}

/// Adapts a [`CompletionClient`] to [`AskAsync`].
///
/// The whole exchange (request, streaming, accumulation) must finish within
/// `timeout`, otherwise the call fails with [`TrackerError::Timeout`].
pub struct CompletionAsk<'a, C> {
    pub client: &'a C,
    pub options: &'a CompletionOptions,
    pub timeout: Duration,
}

impl<C> fmt::Debug for CompletionAsk<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionAsk")
            .field("model", &self.options.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<C: CompletionClient> AskAsync for CompletionAsk<'_, C> {
    #[instrument(level = "info", skip_all, fields(model = %self.options.model))]
    async fn ask(&self, text: &str) -> Result<String, TrackerError> {
        let t0 = Instant::now();
        let exchange = async {
            let fragments = self.client.complete(text, self.options).await?;
            accumulate(fragments).await
        };
        let res = match timeout(self.timeout, exchange).await {
            Ok(res) => res,
            Err(_) => Err(TrackerError::Timeout(self.timeout)),
        };
        let dt = t0.elapsed();

        match &res {
            Ok(body) => info!(
                elapsed_ms = dt.as_millis(),
                bytes = body.len(),
                "Completion received"
            ),
            Err(e) => warn!(elapsed_ms = dt.as_millis(), error = %e, "Completion failed"),
        }
        res
    }
}

/// Backoff parameters for [`RetryAsk`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retrying.
    pub max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to every delay.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Policy with the default 30 s cap and 250 ms jitter.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retries after the first attempt; zero disables retrying
    /// * `base_delay` - Delay before the first retry, doubled for each later one
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(31) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=self.jitter.as_millis() as u64);
        delay + Duration::from_millis(jitter_ms)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
pub struct RetryAsk<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: AskAsync> RetryAsk<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T: AskAsync> AskAsync for RetryAsk<T> {
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<String, TrackerError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt > self.policy.max_retries {
                        error!(
                            attempt,
                            max = self.policy.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.policy.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Send `prompt` through `client`, accumulating the streamed response,
/// with a per-attempt timeout and exponential backoff on transport failures.
#[instrument(level = "info", skip_all)]
pub async fn ask_with_backoff<C: CompletionClient>(
    client: &C,
    prompt: &str,
    options: &CompletionOptions,
    request_timeout: Duration,
    policy: &RetryPolicy,
) -> Result<String, TrackerError> {
    let ask = CompletionAsk {
        client,
        options,
        timeout: request_timeout,
    };
    RetryAsk::new(ask, policy.clone()).ask(prompt).await
}
