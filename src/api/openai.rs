//! OpenAI-compatible chat completion client.
//!
//! Works against any endpoint that speaks the `/chat/completions` protocol
//! (NVIDIA NIM, OpenAI, vLLM, llama.cpp server, ...). With `stream` enabled
//! the response body is decoded incrementally by [`SseFragments`]; otherwise
//! the single JSON body is turned into a one-fragment stream.

use super::sse::SseFragments;
use super::{CompletionClient, CompletionOptions, FragmentStream};
use crate::error::TrackerError;
use crate::utils::truncate_for_log;
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible completion endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Create a client for `api_base` (e.g. `https://integrate.api.nvidia.com/v1`).
    ///
    /// `connect_timeout` bounds connection setup only; the overall request
    /// deadline is enforced by the caller around the whole streamed exchange.
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

impl CompletionClient for OpenAiClient {
    #[instrument(level = "info", skip_all, fields(model = %options.model, stream = options.stream))]
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<FragmentStream, TrackerError> {
        let body = ChatRequest {
            model: &options.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
            stream: options.stream,
        };

        debug!(endpoint = %self.endpoint(), prompt_bytes = prompt.len(), "Sending completion request");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(%status, body = %truncate_for_log(&text, 300), "Completion endpoint returned an error");
            return Err(TrackerError::Transport(format!(
                "HTTP {status}: {}",
                truncate_for_log(&text, 300)
            )));
        }

        if options.stream {
            return Ok(SseFragments::new(response.bytes_stream()).boxed());
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(stream::once(async move { Ok(content) }).boxed())
    }
}
