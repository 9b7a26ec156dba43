//! Public error types for editlens.

use editlens_extract::{ExtractError, ValidationFailure};
use editlens_resilience::{ErrorKind, RetryError};
use std::path::PathBuf;
use thiserror::Error;

/// Why a single category task produced no result.
///
/// None of these escape a batch: [`crate::CategoryOrchestrator::run_batch`]
/// records them against the category and moves on.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The response could not be repaired into JSON.
    #[error("Unparseable model response: {message}")]
    Parse {
        /// Parser diagnostic.
        message: String,
        /// First characters of the raw response.
        preview: String,
    },

    /// The response parsed but did not match the category schema.
    #[error("Schema violation: {0}")]
    SchemaViolation(ValidationFailure),

    /// A transient failure that outlasted the retry budget.
    #[error("{kind} after {attempts} attempts: {message}")]
    Retryable {
        /// Classification of the last failure.
        kind: ErrorKind,
        /// Total invocations made.
        attempts: u32,
        /// Last failure message.
        message: String,
    },

    /// A failure that retrying cannot fix (credentials, malformed request).
    #[error("{kind}: {message}")]
    NonRetryable {
        /// Classification of the failure.
        kind: ErrorKind,
        /// Provider message.
        message: String,
    },

    /// The batch was cancelled while this task was pending or running.
    #[error("Analysis cancelled")]
    Cancelled,

    /// Every candidate model failed its probe.
    #[error("No working model among {tried:?}: {}", last_error.as_deref().unwrap_or("no candidates configured"))]
    NoWorkingModel {
        /// Candidates probed, in order.
        tried: Vec<String>,
        /// Failure of the last probe.
        last_error: Option<String>,
    },

    /// The schema registry could not serve the category.
    #[error("Schema error: {0}")]
    Schema(String),
}

impl AnalysisError {
    /// Failure classification, when the failure came from the provider.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Retryable { kind, .. } | Self::NonRetryable { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the failure points at the pinned model rather than the request,
    /// so re-probing might help.
    #[must_use]
    pub fn is_model_fault(&self) -> bool {
        self.kind().is_some_and(ErrorKind::is_model_fault)
    }

    /// Short machine label used in logs and batch output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::SchemaViolation(_) => "schema_violation",
            Self::Retryable { .. } => "retryable",
            Self::NonRetryable { .. } => "non_retryable",
            Self::Cancelled => "cancelled",
            Self::NoWorkingModel { .. } => "no_working_model",
            Self::Schema(_) => "schema",
        }
    }
}

impl From<ExtractError> for AnalysisError {
    fn from(error: ExtractError) -> Self {
        match error {
            ExtractError::Parse { message, preview } => Self::Parse { message, preview },
            ExtractError::Validation(failure) => Self::SchemaViolation(failure),
            ExtractError::Schema(message) => Self::Schema(message),
        }
    }
}

impl From<RetryError> for AnalysisError {
    fn from(error: RetryError) -> Self {
        match error {
            RetryError::Cancelled { .. } => Self::Cancelled,
            RetryError::Exhausted {
                kind,
                attempts,
                message,
            } => Self::Retryable {
                kind,
                attempts,
                message,
            },
            RetryError::NonRetryable { kind, message, .. } => Self::NonRetryable { kind, message },
        }
    }
}

/// Errors raised while loading [`crate::EditlensConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file named by `--config` or `EDITLENS_CONFIG` could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the config schema.
    #[error("Parse TOML failed for {path}: {message}")]
    Parse {
        /// File that was parsed.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A value parsed but is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_fault_follows_kind() {
        let unavailable = AnalysisError::Retryable {
            kind: ErrorKind::Unavailable,
            attempts: 4,
            message: "503".into(),
        };
        assert!(unavailable.is_model_fault());

        let limited = AnalysisError::Retryable {
            kind: ErrorKind::RateLimited,
            attempts: 4,
            message: "429".into(),
        };
        assert!(!limited.is_model_fault());
        assert!(!AnalysisError::Cancelled.is_model_fault());
    }

    #[test]
    fn test_retry_error_mapping() {
        let err: AnalysisError = RetryError::NonRetryable {
            kind: ErrorKind::Auth,
            attempts: 1,
            message: "invalid api key".into(),
        }
        .into();
        assert_eq!(err.label(), "non_retryable");
        assert_eq!(err.to_string(), "Authentication failed: invalid api key");

        let err: AnalysisError = RetryError::Cancelled { attempts: 2 }.into();
        assert!(matches!(err, AnalysisError::Cancelled));
    }

    #[test]
    fn test_no_working_model_display() {
        let err = AnalysisError::NoWorkingModel {
            tried: vec!["a".into()],
            last_error: None,
        };
        assert!(err.to_string().contains("no candidates configured"));
    }
}
