//! Command-line interface definitions for Awful Event Tracker.
//!
//! Global options override the config file and can also be provided through
//! environment variables.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Awful Event Tracker application.
///
/// # Examples
///
/// ```sh
/// # Extract events from rows 10..20 of a link export
/// awful_event_tracker run --links helene_links.csv --skip 10 --limit 10
///
/// # Try a single article without touching the dataset
/// awful_event_tracker extract --url https://apnews.com/article/... --no-store
///
/// # List stored events up to a date, newest first
/// awful_event_tracker --destination data/events.csv events --before 2024-10-01
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.yaml (defaults to ./config.yaml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// API key for the completion endpoint
    #[arg(long, env = "COMPLETION_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible completion API
    #[arg(long, env = "COMPLETION_API_BASE", global = true)]
    pub api_base: Option<String>,

    /// CSV file events are appended to
    #[arg(short, long, env = "EVENTS_CSV", global = true)]
    pub destination: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract events from a batch of article links
    Run {
        /// CSV file with a link column (and optionally a publish-date column)
        #[arg(short, long)]
        links: Option<PathBuf>,

        /// Skip this many link rows
        #[arg(long, default_value_t = 0)]
        skip: usize,

        /// Process at most this many link rows
        #[arg(long)]
        limit: Option<usize>,

        /// Additional article URLs, processed after the link file
        #[arg(short, long = "url")]
        urls: Vec<String>,
    },

    /// Extract events from one article and print them as JSON
    Extract {
        #[arg(short, long)]
        url: String,

        /// Do not append the events to the dataset
        #[arg(long)]
        no_store: bool,
    },

    /// List stored events, newest first
    Events {
        /// Only events on or before this date (YYYY-MM-DD)
        #[arg(long)]
        before: Option<NaiveDate>,
    },
}
