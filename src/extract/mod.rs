//! Single-article extraction pipeline.
//!
//! ```text
//! URL ─▶ ArticleTextProvider ─▶ PromptBuilder ─▶ CompletionClient (streamed)
//!     ─▶ sanitize ─▶ parse_events ─▶ post-processing ─▶ Vec<EventRecord>
//! ```
//!
//! Transport failures of the fetch and of the completion call are retried
//! with the configured backoff; timeouts are not.
//!
//! Post-processing pins every record to the fetched URL, fills a missing
//! event date from the article's publish date, normalizes dates, flags bad
//! coordinates, and drops exact duplicates.

pub mod parser;
pub mod sanitize;

use crate::api::{AskAsync, CompletionClient, CompletionOptions, RetryAsk, RetryPolicy, ask_with_backoff};
use crate::error::{ParseError, TrackerError};
use crate::models::{EventRecord, LinkEntry, convert_date};
use crate::prompt::PromptBuilder;
use crate::scrapers::ArticleTextProvider;
use crate::utils::truncate_for_log;
use itertools::Itertools;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use parser::parse_events;
pub use sanitize::sanitize;

/// Knobs for one [`Extractor`].
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    /// Deadline for fetching one article's text.
    pub fetch_timeout: Duration,
    /// Deadline for one completion exchange, streaming included.
    pub request_timeout: Duration,
    /// Backoff for transport failures on the completion call.
    pub retry: RetryPolicy,
    /// Rewrite `date_of_event` to `YYYY-MM-DD` when possible.
    pub normalize_dates: bool,
    /// Ask the model again, once, when its output ends mid-JSON.
    pub reask_on_truncation: bool,
}

/// Runs the full pipeline for one URL.
pub struct Extractor<P, C> {
    provider: P,
    client: C,
    prompt: PromptBuilder,
    options: CompletionOptions,
    settings: ExtractSettings,
}

impl<P, C> Extractor<P, C>
where
    P: ArticleTextProvider,
    C: CompletionClient,
{
    pub fn new(
        provider: P,
        client: C,
        prompt: PromptBuilder,
        options: CompletionOptions,
        settings: ExtractSettings,
    ) -> Self {
        Self {
            provider,
            client,
            prompt,
            options,
            settings,
        }
    }

    /// Extract zero or more event records from the article at `link.url`.
    ///
    /// An article the model judges unrelated yields `Ok(vec![])`.
    #[instrument(level = "info", skip_all, fields(url = %link.url))]
    pub async fn extract(&self, link: &LinkEntry) -> Result<Vec<EventRecord>, TrackerError> {
        check_url(&link.url)?;

        let fetch = FetchAsk {
            provider: &self.provider,
            timeout: self.settings.fetch_timeout,
        };
        let text = RetryAsk::new(fetch, self.settings.retry.clone())
            .ask(&link.url)
            .await?;
        if text.trim().is_empty() {
            warn!("Article text is empty; nothing to extract");
            return Ok(Vec::new());
        }
        debug!(bytes = text.len(), "Fetched article text");

        let prompt = self.prompt.build(&text);
        let mut parsed = self.ask_and_parse(&prompt).await?;

        if self.settings.reask_on_truncation
            && matches!(parsed, Err(ParseError::DecodeFailure { truncated: true, .. }))
        {
            warn!("Model output ended mid-JSON; re-asking once");
            parsed = self.ask_and_parse(&prompt).await?;
        }

        let records = match parsed {
            Ok(records) => records,
            Err(e) => {
                if let ParseError::DecodeFailure { raw, .. } = &e {
                    warn!(
                        error = %e,
                        response_preview = %truncate_for_log(raw, 300),
                        "Model returned non-conforming JSON"
                    );
                } else {
                    warn!(error = %e, "Model output rejected");
                }
                return Err(e.into());
            }
        };

        let records = self.finish(records, link);
        info!(count = records.len(), "Extracted events");
        Ok(records)
    }

    /// Transport errors propagate through the outer `Result`; parse errors
    /// come back in the inner one so the caller can decide on a re-ask.
    async fn ask_and_parse(
        &self,
        prompt: &str,
    ) -> Result<Result<Vec<EventRecord>, ParseError>, TrackerError> {
        let raw = ask_with_backoff(
            &self.client,
            prompt,
            &self.options,
            self.settings.request_timeout,
            &self.settings.retry,
        )
        .await?;
        Ok(parse_events(&sanitize(&raw)))
    }

    fn finish(&self, records: Vec<EventRecord>, link: &LinkEntry) -> Vec<EventRecord> {
        let total = records.len();
        let records: Vec<EventRecord> = records
            .into_iter()
            .map(|mut record| {
                if record.article_url != link.url {
                    debug!(reported = %record.article_url, "Replacing model-reported article_url");
                    record.article_url = link.url.clone();
                }

                if record.date_of_event.trim().is_empty() {
                    if let Some(published) = &link.published {
                        record.date_of_event = published.clone();
                    }
                }

                if self.settings.normalize_dates && !record.date_of_event.is_empty() {
                    match convert_date(&record.date_of_event) {
                        Ok(date) => record.date_of_event = date,
                        Err(e) => warn!(
                            date = %record.date_of_event,
                            error = %e,
                            "Could not normalize date-of-event; keeping as reported"
                        ),
                    }
                }

                if record.coordinates().is_none() {
                    warn!(
                        city = %record.city,
                        lat = %record.lat,
                        lon = %record.lon,
                        "Event has unusable coordinates"
                    );
                }
                record
            })
            .unique()
            .collect();

        if records.len() < total {
            info!(dropped = total - records.len(), "Dropped duplicate events");
        }
        records
    }
}

/// Adapts an [`ArticleTextProvider`] to [`AskAsync`] (URL in, article text
/// out) so fetches share the completion call's backoff.
struct FetchAsk<'a, P> {
    provider: &'a P,
    timeout: Duration,
}

impl<P: ArticleTextProvider> AskAsync for FetchAsk<'_, P> {
    async fn ask(&self, url: &str) -> Result<String, TrackerError> {
        match timeout(self.timeout, self.provider.fetch_text(url)).await {
            Ok(res) => res,
            Err(_) => Err(TrackerError::Timeout(self.timeout)),
        }
    }
}

fn check_url(url: &str) -> Result<(), TrackerError> {
    let parsed = Url::parse(url).map_err(|e| TrackerError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(TrackerError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}
