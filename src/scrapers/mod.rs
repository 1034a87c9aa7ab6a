//! Article text and batch-input sources.
//!
//! - [`ArticleTextProvider`]: given a URL, return the article's plain text
//! - [`html::HttpArticleProvider`]: fetches a page and reduces its HTML to text
//! - [`links`]: reads the CSV of article links a batch runs over
//!
//! Providers may return empty or garbled text; the extraction pipeline
//! tolerates both.

pub mod html;
pub mod links;

use crate::error::TrackerError;

/// Source of raw article text.
pub trait ArticleTextProvider {
    async fn fetch_text(&self, url: &str) -> Result<String, TrackerError>;
}
