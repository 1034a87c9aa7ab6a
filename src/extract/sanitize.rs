//! Removal of code-fence wrappers from model output.
//!
//! Models frequently wrap the requested JSON in a fenced block
//! (```` ```json ... ``` ````), and now and then stack a stray extra fence on
//! either end. Fences (an opening one with its optional language tag, a
//! closing one without) are peeled off both ends until none remain, so the
//! result never starts or ends with a fence. Any other stray text around the
//! JSON is left alone and will fail to decode downstream.

use once_cell::sync::Lazy;
use regex::Regex;

static OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z0-9_+.\-]*").expect("static regex"));

const CLOSING_FENCE: &str = "```";

/// Trim and peel code fences off both ends until the text is fence-free.
///
/// Idempotent: the loop only stops once neither end carries a fence.
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.trim();
    loop {
        let before = text.len();
        if let Some(m) = OPENING_FENCE.find(text) {
            text = text[m.end()..].trim_start();
        }
        if let Some(stripped) = text.strip_suffix(CLOSING_FENCE) {
            text = stripped.trim_end();
        }
        if text.len() == before {
            return text.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_json_fence() {
        let raw = "```json\n[{\"city\": \"Tampa\"}]\n```";
        assert_eq!(sanitize(raw), "[{\"city\": \"Tampa\"}]");
    }

    #[test]
    fn test_strips_bare_fence() {
        assert_eq!(sanitize("```\n[]\n```"), "[]");
    }

    #[test]
    fn test_no_fence_only_trims() {
        assert_eq!(sanitize("  \n[1, 2]\n\t"), "[1, 2]");
    }

    #[test]
    fn test_inner_backticks_are_kept() {
        // Inner backticks belong to the payload, not the wrapper.
        let raw = "```json\n[\"a ``` b\"]\n```";
        assert_eq!(sanitize(raw), "[\"a ``` b\"]");
    }

    #[test]
    fn test_unbalanced_fences() {
        assert_eq!(sanitize("```json\n[]"), "[]");
        assert_eq!(sanitize("[]\n```"), "[]");
    }

    #[test]
    fn test_stacked_fences_are_all_removed() {
        assert_eq!(sanitize("```json\n[]\n```\n```"), "[]");
        assert_eq!(sanitize("```json\n```json\n[]\n```"), "[]");
    }

    #[test]
    fn test_leading_prose_is_not_stripped() {
        let raw = "Here is the JSON:\n```json\n[]\n```";
        assert_eq!(sanitize(raw), "Here is the JSON:\n```json\n[]");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "```json\n[{\"city\": \"Tampa\"}]\n```",
            "```\n[]\n```",
            "  []  ",
            "",
            "```json",
            "not json at all",
            "[\"trailing\"]\n```",
            "```json\n[]\n```\n```",
            "```json\n```\n[]\n```\n```",
            "``````",
        ];
        for raw in inputs {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once, "sanitize not idempotent for {raw:?}");
        }
    }
}
