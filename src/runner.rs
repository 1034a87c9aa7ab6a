//! Batch driver: runs the extraction pipeline over a list of article links.
//!
//! Every URL is handled in isolation. Whatever goes wrong for one URL
//! (fetch, completion, decode, persistence) becomes an entry in the
//! [`BatchSummary`] and the batch moves on to the next URL.
//!
//! URLs are taken in the order supplied. With `concurrency > 1` up to that
//! many URLs are in flight at once; appends to the shared dataset are
//! serialized behind a mutex, and results are reported in input order.
//!
//! Cancellation is checked before each URL is started. URLs already in
//! flight run to completion or to their own timeout.

use crate::api::CompletionClient;
use crate::error::{FailureKind, TrackerError};
use crate::extract::Extractor;
use crate::models::LinkEntry;
use crate::outputs::EventStore;
use crate::scrapers::ArticleTextProvider;
use futures::StreamExt;
use futures::future;
use futures::stream;
use std::fmt;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Why one URL contributed nothing to the dataset.
#[derive(Debug, Clone)]
pub struct UrlFailure {
    pub url: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of one [`BatchRunner::run`].
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// URLs started before the batch finished or was cancelled.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub records_written: usize,
    /// Records dropped by the store because they could not be serialized.
    pub records_skipped: usize,
    pub failures: Vec<UrlFailure>,
    pub cancelled: bool,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "attempted: {}, succeeded: {}, failed: {}, records written: {}, records skipped: {}{}",
            self.attempted,
            self.succeeded,
            self.failed,
            self.records_written,
            self.records_skipped,
            if self.cancelled { " (cancelled)" } else { "" }
        )?;
        for failure in &self.failures {
            writeln!(f, "  [{}] {}: {}", failure.kind, failure.url, failure.message)?;
        }
        Ok(())
    }
}

enum UrlOutcome {
    Stored { written: usize, skipped: usize },
    Failed(UrlFailure),
}

/// Runs an [`Extractor`] over many URLs, appending results to one [`EventStore`].
pub struct BatchRunner<P, C> {
    extractor: Extractor<P, C>,
    store: Mutex<EventStore>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl<P, C> BatchRunner<P, C>
where
    P: ArticleTextProvider,
    C: CompletionClient,
{
    pub fn new(
        extractor: Extractor<P, C>,
        store: EventStore,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            extractor,
            store: Mutex::new(store),
            concurrency: concurrency.max(1),
            cancel,
        }
    }

    /// Process every link and report what happened.
    ///
    /// Never fails: per-URL errors are folded into the summary.
    #[instrument(level = "info", skip_all, fields(urls = links.len(), concurrency = self.concurrency))]
    pub async fn run(&self, links: Vec<LinkEntry>) -> BatchSummary {
        let t0 = Instant::now();
        let total = links.len();
        info!("Batch starting");

        let outcomes: Vec<UrlOutcome> = stream::iter(links.into_iter().enumerate())
            .take_while(|_| future::ready(!self.cancel.is_cancelled()))
            .map(|(index, link)| self.process(index, link))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary {
            attempted: outcomes.len(),
            cancelled: outcomes.len() < total,
            ..BatchSummary::default()
        };
        for outcome in outcomes {
            match outcome {
                UrlOutcome::Stored { written, skipped } => {
                    summary.succeeded += 1;
                    summary.records_written += written;
                    summary.records_skipped += skipped;
                }
                UrlOutcome::Failed(failure) => {
                    summary.failed += 1;
                    summary.failures.push(failure);
                }
            }
        }

        if summary.cancelled {
            warn!(remaining = total - summary.attempted, "Batch cancelled; remaining URLs skipped");
        }
        let elapsed = t0.elapsed();
        info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            records_written = summary.records_written,
            secs = elapsed.as_secs(),
            millis = elapsed.subsec_millis(),
            "Batch complete"
        );
        summary
    }

    async fn process(&self, index: usize, link: LinkEntry) -> UrlOutcome {
        info!(index, url = %link.url, "Processing article");
        match self.extract_and_store(&link).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(index, url = %link.url, kind = %e.kind(), error = %e, "Article failed; continuing");
                UrlOutcome::Failed(UrlFailure {
                    url: link.url,
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        }
    }

    async fn extract_and_store(&self, link: &LinkEntry) -> Result<UrlOutcome, TrackerError> {
        let records = self.extractor.extract(link).await?;
        if records.is_empty() {
            info!(url = %link.url, "No tracked events in article");
            return Ok(UrlOutcome::Stored {
                written: 0,
                skipped: 0,
            });
        }
        let store = self.store.lock().await;
        let report = store.append(&records).await?;
        for skipped in &report.skipped {
            warn!(url = %link.url, index = skipped.index, reason = %skipped.reason, "Event not stored");
        }
        Ok(UrlOutcome::Stored {
            written: report.written,
            skipped: report.skipped.len(),
        })
    }
}
