//! Message-based classification of provider failures.
//!
//! Providers rarely expose structured error codes through every transport, so
//! classification is a case-insensitive scan of the error's display text
//! against a fixed pattern table. The first matching row wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

/// Safety margin added to every provider-suggested delay.
pub const SUGGESTED_DELAY_BUFFER: Duration = Duration::from_secs(1);

/// Closed taxonomy of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Too many requests in a window (HTTP 429).
    RateLimited,
    /// Quota or resource budget exhausted.
    QuotaExceeded,
    /// Provider overloaded or temporarily unavailable (HTTP 503).
    Unavailable,
    /// Call exceeded its deadline.
    Timeout,
    /// Provider-side internal error (HTTP 500).
    ServerError,
    /// Missing, invalid, or unauthorized credentials.
    Auth,
    /// The addressed model does not exist or is no longer served.
    ModelNotFound,
    /// The request itself was rejected as malformed.
    InvalidInput,
    /// Anything not matched by the table.
    Unknown,
}

impl ErrorKind {
    /// Whether an operation failing with this kind is worth repeating.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::QuotaExceeded
                | Self::Unavailable
                | Self::Timeout
                | Self::ServerError
        )
    }

    /// Whether this kind points at the model identity rather than the request.
    #[must_use]
    pub const fn is_model_fault(self) -> bool {
        matches!(self, Self::ModelNotFound | Self::Unavailable)
    }

    /// Human-readable label used in progress messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RateLimited => "Rate limited",
            Self::QuotaExceeded => "Quota exceeded",
            Self::Unavailable => "Service unavailable",
            Self::Timeout => "Request timed out",
            Self::ServerError => "Provider error",
            Self::Auth => "Authentication failed",
            Self::ModelNotFound => "Model unavailable",
            Self::InvalidInput => "Invalid request",
            Self::Unknown => "Unexpected error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct KindPattern {
    kind: ErrorKind,
    pattern: Regex,
}

// Status codes are matched on word boundaries so PIDs and byte counts in
// messages do not trigger them.
static KIND_PATTERNS: LazyLock<Vec<KindPattern>> = LazyLock::new(|| {
    [
        (
            ErrorKind::RateLimited,
            r"(?i)\b429\b|rate[ _-]?limit|too many requests",
        ),
        (
            ErrorKind::QuotaExceeded,
            r"(?i)quota|resource[ _-]?exhausted",
        ),
        (
            ErrorKind::Unavailable,
            r"(?i)\b503\b|unavailable|overloaded",
        ),
        (
            ErrorKind::Timeout,
            r"(?i)timeout|timed out|deadline",
        ),
        (
            ErrorKind::ServerError,
            r"(?i)\b500\b|internal",
        ),
        (
            ErrorKind::Auth,
            r"(?i)\b40[13]\b|api[ _-]?key|unauthori[sz]ed|unauthenticated|permission[ _-]?denied",
        ),
        (
            ErrorKind::ModelNotFound,
            // Anchored to model wording: a missing executable or file is not a model fault.
            r#"(?i)\b404\b|\bmodels?/\S+\s+(?:is\s+|was\s+)?not found|(?:^|[\s:"'])model\s+(?:\S+\s+)?(?:is\s+|was\s+)?not found|\bnot_found\b|is not supported|deprecated|no longer available"#,
        ),
        (
            ErrorKind::InvalidInput,
            r"(?i)\b400\b|invalid[ _-]?argument|invalid request|malformed",
        ),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| {
        Regex::new(pattern)
            .ok()
            .map(|pattern| KindPattern { kind, pattern })
    })
    .collect()
});

static RETRY_IN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)retry (?:in|after)\s+(\d+(?:\.\d+)?)\s*(ms|milliseconds?|s|secs?|seconds?)?\b").ok()
});

static RETRY_DELAY_FIELD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)retry_?delay\\?"?\s*:\s*\\?"?(\d+(?:\.\d+)?)s"#).ok()
});

/// Classifies an error message into an [`ErrorKind`].
#[must_use]
pub fn classify_message(message: &str) -> ErrorKind {
    KIND_PATTERNS
        .iter()
        .find(|p| p.pattern.is_match(message))
        .map_or(ErrorKind::Unknown, |p| p.kind)
}

/// Classifies any displayable error.
#[must_use]
pub fn classify<E: fmt::Display + ?Sized>(error: &E) -> ErrorKind {
    classify_message(&error.to_string())
}

/// Whether `error` is worth retrying.
#[must_use]
pub fn is_retryable<E: fmt::Display + ?Sized>(error: &E) -> bool {
    classify(error).is_retryable()
}

/// Extracts a provider-suggested retry delay from an error message.
///
/// Recognises `retry in 59.8s`, `retry after 500ms` and the JSON field form
/// `retryDelay":"59s"`. The returned delay includes
/// [`SUGGESTED_DELAY_BUFFER`] and is rounded up to a whole millisecond.
#[must_use]
pub fn suggested_delay(message: &str) -> Option<Duration> {
    let (value, millis) = RETRY_IN
        .as_ref()
        .and_then(|re| re.captures(message))
        .and_then(|caps| {
            let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
            let unit = caps
                .get(2)
                .map_or_else(String::new, |m| m.as_str().to_ascii_lowercase());
            Some((value, unit == "ms" || unit.starts_with("milli")))
        })
        .or_else(|| {
            RETRY_DELAY_FIELD
                .as_ref()
                .and_then(|re| re.captures(message))
                .and_then(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
                .map(|value| (value, false))
        })?;

    let hinted_ms = if millis { value } else { value * 1000.0 };
    // Round away float noise (59.8 * 1000 is not exact) before taking the ceiling.
    let buffered = (((hinted_ms + buffer_ms()) * 1000.0).round() / 1000.0).ceil();
    if !buffered.is_finite() || buffered < 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(Duration::from_millis(buffered as u64))
}

/// [`suggested_delay`] in whole milliseconds.
#[must_use]
pub fn suggested_delay_ms(message: &str) -> Option<u64> {
    suggested_delay(message).map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[allow(clippy::cast_precision_loss)]
fn buffer_ms() -> f64 {
    SUGGESTED_DELAY_BUFFER.as_millis() as f64
}
