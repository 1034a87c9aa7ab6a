//! # Awful Event Tracker
//!
//! Turns news articles about a tracked class of event (hurricanes by default)
//! into a structured, geolocated CSV dataset. Each article is fetched,
//! reduced to text, and sent to an OpenAI-compatible LLM that answers with a
//! JSON array of events; the events are validated and appended to the dataset.
//!
//! ## Usage
//!
//! ```sh
//! COMPLETION_API_KEY=nvapi-... awful_event_tracker run --links links.csv --skip 10 --limit 10
//! ```
//!
//! ## Architecture
//!
//! 1. **Input**: article links from a CSV export and/or the command line
//! 2. **Fetching**: download each article and reduce its HTML to text
//! 3. **Extraction**: prompt the model, accumulate the streamed answer, sanitize and parse it
//! 4. **Output**: append the events to the CSV dataset

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod extract;
mod models;
mod outputs;
mod prompt;
mod runner;
mod scrapers;
#[cfg(test)]
mod testing;
mod utils;

use api::openai::OpenAiClient;
use cli::{Cli, Command};
use config::Config;
use error::TrackerError;
use extract::Extractor;
use models::LinkEntry;
use outputs::{EventStore, StoredEvent};
use prompt::PromptBuilder;
use runner::BatchRunner;
use scrapers::html::HttpArticleProvider;
use scrapers::links::read_links;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("event_tracker starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.destination, command = ?args.command, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref())?;
    config.apply_overrides(args.api_key, args.api_base, args.destination);
    let store = EventStore::new(&config.destination, config.field_policy);

    match args.command {
        Command::Events { before } => {
            let mut events = store.load().await?;
            if let Some(before) = before {
                events.retain(|e| e.date.is_some_and(|d| d <= before));
            }
            events.sort_by(|a, b| b.date.cmp(&a.date));
            info!(count = events.len(), "Listing stored events");
            for event in &events {
                println!("{}", event_line(event));
            }
        }
        Command::Extract { url, no_store } => {
            if let Err(e) = config.validate().await {
                error!(error = %e, "Invalid configuration");
                return Err(e.into());
            }
            let extractor = build_extractor(&config)?;
            let records = extractor.extract(&LinkEntry::new(url)).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            if no_store {
                info!(count = records.len(), "Not storing events (--no-store)");
            } else if !records.is_empty() {
                let report = store.append(&records).await?;
                info!(written = report.written, path = %store.path().display(), "Stored events");
            }
        }
        Command::Run {
            links,
            skip,
            limit,
            urls,
        } => {
            if let Err(e) = config.validate().await {
                error!(error = %e, "Invalid configuration");
                return Err(e.into());
            }
            let entries = collect_links(links.as_deref(), skip, limit, urls)?;

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; finishing in-flight articles");
                    ctrl_c.cancel();
                }
            });

            let runner = BatchRunner::new(build_extractor(&config)?, store, config.concurrency, cancel);
            let summary = runner.run(entries).await;
            print!("{summary}");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

fn build_extractor(config: &Config) -> Result<Extractor<HttpArticleProvider, OpenAiClient>, TrackerError> {
    let provider = HttpArticleProvider::new(config.fetch_timeout())?;
    let client = OpenAiClient::new(&config.api_base, config.require_api_key()?, config.fetch_timeout())?;
    Ok(Extractor::new(
        provider,
        client,
        PromptBuilder::new(&config.tracked_event, config.max_article_chars),
        config.completion_options(),
        config.extract_settings(),
    ))
}

fn collect_links(
    links: Option<&Path>,
    skip: usize,
    limit: Option<usize>,
    urls: Vec<String>,
) -> Result<Vec<LinkEntry>, TrackerError> {
    let mut entries = match links {
        Some(path) => read_links(path, skip, limit)?,
        None => Vec::new(),
    };
    entries.extend(urls.into_iter().map(LinkEntry::new));
    if entries.is_empty() {
        return Err(TrackerError::Config(
            "nothing to process: pass --links FILE and/or --url URL".to_string(),
        ));
    }
    Ok(entries)
}

fn event_line(event: &StoredEvent) -> String {
    let r = &event.record;
    let date = event
        .date
        .map(|d| d.to_string())
        .unwrap_or_else(|| r.date_of_event.clone());
    let place = match (event.lat, event.lon) {
        (Some(lat), Some(lon)) => format!("({lat:.4}, {lon:.4})"),
        _ => "(no coordinates)".to_string(),
    };
    format!("{date}\t{}, {}\t{}\t{place}\t{}", r.city, r.state, r.event, r.article_url)
}
