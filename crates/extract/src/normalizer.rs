use regex::Regex;
use std::sync::LazyLock;

use crate::prompt::NOT_FOUND_MARKER;

/// Labels models like to echo back before the answer.
static ANSWER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(answer|extracted information)\s*:\s*").expect("label pattern is valid")
});

/// Turns raw model output into the final answer string.
#[derive(Debug, Clone)]
pub struct AnswerNormalizer {
    marker: String,
}

impl AnswerNormalizer {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Trim the output and map the "not found" marker to an empty answer.
    pub fn normalize(&self, raw: &str) -> String {
        let text = ANSWER_LABEL.replace(raw.trim(), "");
        let text = unquote(text.trim());

        if self.is_not_found(text) {
            return String::new();
        }

        text.to_string()
    }

    /// The whole text must be the marker, case-insensitive, optionally
    /// spelled `NOT FOUND` and followed by a period.
    pub fn is_not_found(&self, text: &str) -> bool {
        let text = text.trim();
        let text = text.strip_suffix('.').unwrap_or(text).trim_end();
        let spaced = self.marker.replace('_', " ");

        text.eq_ignore_ascii_case(&self.marker) || text.eq_ignore_ascii_case(&spaced)
    }
}

/// Drop one pair of matching quotes or backticks around the whole text.
fn unquote(text: &str) -> &str {
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    text
}

impl Default for AnswerNormalizer {
    fn default() -> Self {
        Self::new(NOT_FOUND_MARKER)
    }
}
