//! HTTP article provider.
//!
//! Downloads a page and reduces it to readable text: the headline, the
//! article paragraphs, and the article's figure images (so the model can
//! report a picture caption and link). Paragraph selection falls back from
//! `article p` to `main p` to any `p`, and finally to the whole body text.

use super::ArticleTextProvider;
use crate::error::TrackerError;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

static HEADLINE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("static selector"));
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));
static FIGURE_IMAGES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("figure img[src]").expect("static selector"));
static PARAGRAPHS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["article p", "main p", "p"]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});

/// Maximum number of figure images listed after the article text.
const MAX_IMAGES: usize = 5;

/// Fetches article pages over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpArticleProvider {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpArticleProvider {
    pub fn new(timeout: Duration) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrackerError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }
}

impl ArticleTextProvider for HttpArticleProvider {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch_text(&self, url: &str) -> Result<String, TrackerError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TrackerError::from_reqwest(e, self.timeout))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Transport(format!("HTTP {status} fetching {url}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| TrackerError::from_reqwest(e, self.timeout))?;
        let base = Url::parse(url).ok();
        let text = html_to_text(&body, base.as_ref());
        info!(bytes = text.len(), "Parsed article");
        Ok(text)
    }
}

/// Reduce an HTML document to article text.
pub fn html_to_text(html: &str, base: Option<&Url>) -> String {
    let document = Html::parse_document(html);
    let mut content = String::new();

    for element in document.select(&HEADLINE).take(1) {
        content.push_str(&element_text(element));
        content.push('\n');
    }

    let paragraphs = PARAGRAPHS
        .iter()
        .map(|selector| {
            document
                .select(selector)
                .map(element_text)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
        .find(|found| !found.is_empty());

    match paragraphs {
        Some(paragraphs) => {
            debug!(count = paragraphs.len(), "Selected article paragraphs");
            for p in paragraphs {
                content.push_str(&p);
                content.push('\n');
            }
        }
        None => {
            if let Some(body) = document.select(&BODY).next() {
                content.push_str(&element_text(body));
                content.push('\n');
            }
        }
    }

    for img in document.select(&FIGURE_IMAGES).take(MAX_IMAGES) {
        let Some(src) = img.value().attr("src") else {
            continue;
        };
        let link = match base {
            Some(base) => base.join(src).map(|u| u.to_string()).unwrap_or_else(|_| src.to_string()),
            None => src.to_string(),
        };
        let alt = img.value().attr("alt").unwrap_or("").trim();
        content.push_str(&format!("Image: {alt} ({link})\n"));
    }

    content
}

/// Element text with whitespace runs collapsed to single spaces.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
