//! Error types for the extraction and persistence pipeline.
//!
//! Every per-URL failure is one of these variants. The batch runner
//! converts them into [`FailureKind`] entries on the batch summary, so none
//! of them ever ends a batch early. Only [`TrackerError::Config`] is fatal,
//! and it is raised before the first URL is touched.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures turning sanitized model output into event records.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The text is not syntactically valid JSON.
    #[error("failed to decode model output: {message}")]
    DecodeFailure {
        message: String,
        /// The sanitized text that failed to decode, kept for diagnosis.
        raw: String,
        /// The decoder hit end-of-input, which usually means the model was cut off.
        truncated: bool,
    },

    /// Valid JSON, wrong shape: the top level (or an element) is not what we expect.
    #[error("unexpected JSON shape: expected {expected}, found {found}")]
    ShapeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Element `index` lacks the required field `field`.
    #[error("event {index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },
}

/// Failures creating, checking or appending to the dataset file.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but was created with a different column layout.
    #[error("{path} has header '{found}', refusing to append")]
    HeaderMismatch { path: PathBuf, found: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Top-level error for one pass of the pipeline.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Network or endpoint failure reaching the article source or the completion endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Whether re-issuing the same request might succeed.
    ///
    /// Timeouts are deliberately excluded: a URL that timed out is counted as
    /// failed for the batch instead of being retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::Transport(_))
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            TrackerError::Transport(_) => FailureKind::Transport,
            TrackerError::Timeout(_) => FailureKind::Timeout,
            TrackerError::InvalidUrl { .. } => FailureKind::InvalidUrl,
            TrackerError::Parse(ParseError::DecodeFailure { .. }) => FailureKind::DecodeFailure,
            TrackerError::Parse(ParseError::ShapeMismatch { .. }) => FailureKind::ShapeMismatch,
            TrackerError::Parse(ParseError::MissingField { .. }) => FailureKind::MissingField,
            TrackerError::Persistence(_) => FailureKind::Persistence,
            TrackerError::Config(_) => FailureKind::Config,
        }
    }
}

impl TrackerError {
    /// Classify a reqwest failure from a client built with `timeout`.
    ///
    /// The client's own deadline firing is a [`TrackerError::Timeout`] (not
    /// retried); everything else is a transport failure.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            TrackerError::Timeout(timeout)
        } else {
            TrackerError::Transport(e.to_string())
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        TrackerError::Transport(e.to_string())
    }
}

/// Coarse classification recorded in the batch summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    Transport,
    Timeout,
    InvalidUrl,
    DecodeFailure,
    ShapeMismatch,
    MissingField,
    Persistence,
    Config,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Transport => "transport",
            FailureKind::Timeout => "timeout",
            FailureKind::InvalidUrl => "invalid_url",
            FailureKind::DecodeFailure => "decode_failure",
            FailureKind::ShapeMismatch => "shape_mismatch",
            FailureKind::MissingField => "missing_field",
            FailureKind::Persistence => "persistence",
            FailureKind::Config => "config",
        };
        f.write_str(s)
    }
}
