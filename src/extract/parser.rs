//! Parse sanitized model output into event records.
//!
//! The text must decode to a JSON array of objects. An empty array is the
//! model's "this article is not about the tracked event" answer and is a
//! success with zero records.
//!
//! # Missing fields
//!
//! A required field missing (or `null`) on any element rejects the whole
//! array with [`ParseError::MissingField`]. The two media fields are optional
//! and default to absent. Scalars that arrive as numbers or booleans (models
//! like to emit `"lat": 26.12`) are accepted and stringified.

use crate::error::ParseError;
use crate::models::EventRecord;
use crate::utils::looks_truncated;
use serde_json::{Map, Value};

/// Parse `sanitized` as an array of [`EventRecord`]s.
pub fn parse_events(sanitized: &str) -> Result<Vec<EventRecord>, ParseError> {
    let json: Value = serde_json::from_str(sanitized).map_err(|e| ParseError::DecodeFailure {
        message: e.to_string(),
        raw: sanitized.to_string(),
        truncated: looks_truncated(&e),
    })?;

    let items = match json {
        Value::Array(items) => items,
        other => {
            return Err(ParseError::ShapeMismatch {
                expected: "array",
                found: type_name(&other),
            });
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_event(index, item))
        .collect()
}

fn parse_event(index: usize, item: &Value) -> Result<EventRecord, ParseError> {
    let obj = item.as_object().ok_or(ParseError::ShapeMismatch {
        expected: "object",
        found: type_name(item),
    })?;

    let required = |field: &'static str| -> Result<String, ParseError> {
        scalar(obj, field).ok_or(ParseError::MissingField { index, field })
    };

    Ok(EventRecord {
        city: required("city")?,
        state: required("state")?,
        event: required("event")?,
        summary: required("summary")?,
        article_url: required("article_url")?,
        source: required("source")?,
        date_of_event: required("date-of-event")?,
        event_picture_caption: scalar(obj, "event-picture-caption"),
        event_picture_link: scalar(obj, "event-picture-link"),
        lat: required("lat")?,
        lon: required("lon")?,
    })
}

/// Read `field` as text. `None` for absent, `null`, arrays and objects.
fn scalar(obj: &Map<String, Value>, field: &str) -> Option<String> {
    match obj.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
