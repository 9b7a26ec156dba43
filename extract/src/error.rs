//! Errors raised while turning raw model text into a typed report.

use crate::validate::ValidationFailure;
use thiserror::Error;

/// Characters of raw output kept in error previews.
pub const PREVIEW_CHARS: usize = 200;

/// Failure to produce a typed report from a response.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Repair could not produce parseable JSON.
    #[error("Response is not valid JSON after repair: {message}")]
    Parse {
        /// Parser message for the repaired text.
        message: String,
        /// Leading slice of the raw response.
        preview: String,
    },

    /// The document parsed but does not satisfy the category schema.
    #[error("Response failed schema validation: {0}")]
    Validation(ValidationFailure),

    /// Schema generation or compilation failed.
    #[error("Schema error: {0}")]
    Schema(String),
}

impl ExtractError {
    /// Builds a parse error with a bounded preview of `raw`.
    #[must_use]
    pub fn parse(message: impl Into<String>, raw: &str) -> Self {
        Self::Parse {
            message: message.into(),
            preview: preview(raw),
        }
    }
}

/// First [`PREVIEW_CHARS`] characters of `raw`, with an ellipsis if cut.
#[must_use]
pub fn preview(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let raw = "é".repeat(500);
        let p = preview(&raw);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
