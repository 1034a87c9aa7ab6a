//! Data models for extracted events and the batch input they come from.
//!
//! - [`EventRecord`]: one real-world event pulled out of one article
//! - [`LinkEntry`]: one row of batch input (article URL plus optional publish date)
//! - [`convert_date`]: normalization of human-readable dates to `YYYY-MM-DD`
//!
//! Field names on the wire use the hyphenated keys the model is prompted
//! with (`date-of-event`, `event-picture-link`, ...), hence the serde renames.

use chrono::{DateTime, NaiveDate};
use serde::Serialize;

/// Column header of the persisted dataset, in storage order.
pub const COLUMNS: [&str; 11] = [
    "city",
    "state",
    "event",
    "summary",
    "article_url",
    "source",
    "date-of-event",
    "event-picture-caption",
    "event-picture-link",
    "lat",
    "lon",
];

/// One reported real-world event extracted from one article.
///
/// Coordinates stay textual because that is how the model emits them and how
/// the dataset stores them; [`EventRecord::coordinates`] gives the numeric view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EventRecord {
    pub city: String,
    pub state: String,
    /// Short event-type label, e.g. "Flooding".
    pub event: String,
    /// Two to four sentences describing the event.
    pub summary: String,
    pub article_url: String,
    /// Human-readable publisher name.
    pub source: String,
    #[serde(rename = "date-of-event")]
    pub date_of_event: String,
    #[serde(rename = "event-picture-caption")]
    pub event_picture_caption: Option<String>,
    #[serde(rename = "event-picture-link")]
    pub event_picture_link: Option<String>,
    pub lat: String,
    pub lon: String,
}

impl EventRecord {
    /// Field values in [`COLUMNS`] order. Absent media fields become empty strings.
    pub fn to_row(&self) -> [&str; 11] {
        [
            self.city.as_str(),
            self.state.as_str(),
            self.event.as_str(),
            self.summary.as_str(),
            self.article_url.as_str(),
            self.source.as_str(),
            self.date_of_event.as_str(),
            self.event_picture_caption.as_deref().unwrap_or(""),
            self.event_picture_link.as_deref().unwrap_or(""),
            self.lat.as_str(),
            self.lon.as_str(),
        ]
    }

    /// Parse `lat`/`lon` as decimal degrees.
    ///
    /// Returns `None` when either value is non-numeric or out of range. That is
    /// a data-quality defect, not a reason to drop the record.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = self.lat.trim().parse::<f64>().ok()?;
        let lon = self.lon.trim().parse::<f64>().ok()?;
        if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
            Some((lat, lon))
        } else {
            None
        }
    }
}

/// One article to process, as read from the batch input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub url: String,
    /// Publish date of the article in `YYYY-MM-DD`, when the URL source knows it.
    pub published: Option<String>,
}

impl LinkEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            published: None,
        }
    }
}

/// Normalize a date to `YYYY-MM-DD`.
///
/// Input that already looks canonical (contains `-` and is ten characters
/// long) is returned untouched. Otherwise the input must read like
/// `September 23, 2024` (abbreviated month names are accepted too).
///
/// # Examples
///
/// ```ignore
/// assert_eq!(convert_date("September 23, 2024").unwrap(), "2024-09-23");
/// assert_eq!(convert_date("2024-09-23").unwrap(), "2024-09-23");
/// ```
pub fn convert_date(date: &str) -> Result<String, chrono::ParseError> {
    let date = date.trim();
    if date.contains('-') && date.len() == 10 {
        return Ok(date.to_string());
    }
    let parsed = NaiveDate::parse_from_str(date, "%B %d, %Y")?;
    Ok(parsed.format("%Y-%m-%d").to_string())
}

/// Reduce a publish timestamp from a URL source to its calendar date.
///
/// Accepts RFC 3339 timestamps (`2024-10-10T14:05:00Z`), bare ISO dates, and
/// anything [`convert_date`] understands.
pub fn publish_date(timestamp: &str) -> Option<String> {
    let timestamp = timestamp.trim();
    if timestamp.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    if let Some(prefix) = timestamp.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    convert_date(timestamp).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fort_lauderdale() -> EventRecord {
        EventRecord {
            city: "Fort Lauderdale".to_string(),
            state: "Florida".to_string(),
            event: "Flooding".to_string(),
            summary: "There was extensive flooding along the river bank.".to_string(),
            article_url: "https://example.com/flood".to_string(),
            source: "AP News".to_string(),
            date_of_event: "2024-09-23".to_string(),
            event_picture_caption: Some("Flooding in Fort Lauderdale".to_string()),
            event_picture_link: None,
            lat: "26.1201".to_string(),
            lon: "-80.1372".to_string(),
        }
    }

    #[test]
    fn test_convert_date_long_form() {
        assert_eq!(convert_date("September 23, 2024").unwrap(), "2024-09-23");
        assert_eq!(convert_date("October 1, 2024").unwrap(), "2024-10-01");
        assert_eq!(convert_date("Sep 23, 2024").unwrap(), "2024-09-23");
    }

    #[test]
    fn test_convert_date_canonical_is_noop() {
        assert_eq!(convert_date("2024-09-23").unwrap(), "2024-09-23");
        let once = convert_date("September 23, 2024").unwrap();
        assert_eq!(convert_date(&once).unwrap(), once);
    }

    #[test]
    fn test_convert_date_rejects_garbage() {
        assert!(convert_date("sometime last week").is_err());
        assert!(convert_date("").is_err());
    }

    #[test]
    fn test_publish_date_forms() {
        assert_eq!(publish_date("2024-10-10T14:05:00Z").as_deref(), Some("2024-10-10"));
        assert_eq!(publish_date("2024-10-10").as_deref(), Some("2024-10-10"));
        assert_eq!(publish_date("October 10, 2024").as_deref(), Some("2024-10-10"));
        assert_eq!(publish_date("  "), None);
        assert_eq!(publish_date("yesterday"), None);
    }

    #[test]
    fn test_to_row_follows_column_order() {
        let record = fort_lauderdale();
        let row = record.to_row();
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[0], "Fort Lauderdale");
        assert_eq!(row[6], "2024-09-23");
        assert_eq!(row[7], "Flooding in Fort Lauderdale");
        assert_eq!(row[8], "");
        assert_eq!(row[10], "-80.1372");
    }

    #[test]
    fn test_coordinates() {
        let mut record = fort_lauderdale();
        assert_eq!(record.coordinates(), Some((26.1201, -80.1372)));

        record.lat = "north-ish".to_string();
        assert_eq!(record.coordinates(), None);

        record.lat = "95.0".to_string();
        assert_eq!(record.coordinates(), None);
    }

    #[test]
    fn test_serde_uses_hyphenated_keys() {
        let json = serde_json::to_string(&fort_lauderdale()).unwrap();
        assert!(json.contains("\"date-of-event\":\"2024-09-23\""));
        assert!(json.contains("\"event-picture-caption\""));
    }
}
