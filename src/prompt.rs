//! Prompt construction for event extraction.
//!
//! The prompt is a fixed instruction block (task, output schema example, and
//! the "unrelated article" escape hatch) followed by the article text. The
//! article is cut to a configurable number of characters so the request fits
//! the model's context window.

use tracing::{debug, warn};

/// The example array embedded in the instructions.
///
/// Kept as its own constant so tests can feed exactly this array back as a
/// model response.
pub const EXAMPLE_RESPONSE: &str = r#"[
  {
    "city": "Fort Lauderdale",
    "state": "Florida",
    "event": "Flooding",
    "summary": "There was extensive flooding along the river bank.  Multiple cars were washed away.  2 houses were damaged.",
    "lat": "26.1201",
    "lon": "-80.1372",
    "article_url": "https://apnews.com/article/hurricane-helene-north-carolina-national-guard-7dd82ee953d8da9098996231f619cbce",
    "source": "AP News",
    "date-of-event": "2024-09-23",
    "event-picture-caption": "Flooding in Fort Lauderdale",
    "event-picture-link": "https://www.apnews.com/images/124.jpg"
  }
]"#;

/// Builds the completion prompt for one article.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    /// The class of event being tracked, e.g. "hurricane" or "wildfire".
    tracked_event: String,
    /// Upper bound on article characters included in the prompt.
    max_article_chars: usize,
}

impl PromptBuilder {
    pub fn new(tracked_event: impl Into<String>, max_article_chars: usize) -> Self {
        Self {
            tracked_event: tracked_event.into(),
            max_article_chars,
        }
    }

    /// The instruction block, without any article text.
    pub fn instructions(&self) -> String {
        let topic = &self.tracked_event;
        format!(
            "Read this article about a {topic}. Output only a JSON array that summarizes each news item, using the structure provided below.\n\
For each news item, include the location, event, date-of-event, picture caption, picture link, and latitude/longitude in decimal format.\n\
No additional text should be included in the output; return only a JSON array.\n\
For the date, use the format 2024-09-23.  If the date is not known, use the date from the publication of the article.\n\
For the summary write two to four sentences that summarize the specific event in the article.\n\
For the source, use the name of the website that published the article.\n\
\n\
Error handling.  If you receive a website with information that is not related to a {topic}, return an empty JSON array which can still be parsed as a valid JSON array.\n\
\n\
Example format:\n\
{EXAMPLE_RESPONSE}\n\
\n\
Format the response as valid JSON. Do not include any text before or after the JSON array.\n\
\n"
        )
    }

    /// Compose the full prompt for `article_text`.
    pub fn build(&self, article_text: &str) -> String {
        let article = truncate_chars(article_text, self.max_article_chars);
        if article.len() < article_text.len() {
            warn!(
                original_bytes = article_text.len(),
                kept_bytes = article.len(),
                max_chars = self.max_article_chars,
                "Article text truncated to fit prompt"
            );
        }
        let mut prompt = self.instructions();
        prompt.push_str(article);
        debug!(prompt_bytes = prompt.len(), "Built extraction prompt");
        prompt
    }
}

/// Cut `s` to at most `max` characters without splitting a code point.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
