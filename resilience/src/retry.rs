//! Bounded retry with exponential backoff, jitter and provider hints.

use crate::classify::{classify_message, suggested_delay, ErrorKind};
use crate::clock::{sleep_or_cancel, Clock, TokioClock};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Retry bounds and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total invocations never exceed `max_retries + 1`.
    pub max_retries: u32,
    /// Backoff for the first retry before jitter.
    #[serde(with = "millis")]
    pub base_delay: Duration,
    /// Upper bound for any single wait.
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Relative jitter amplitude, 0.25 means ±25%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Sets the retry bound.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base backoff.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Sets the per-wait ceiling.
    #[must_use]
    pub const fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the jitter amplitude. Values are clamped to `[0, 1]`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = if jitter.is_finite() {
            jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Exponential backoff for retry number `attempt` (0-based).
    ///
    /// `unit` is a jitter sample in `[-1, 1]`; the result is
    /// `base * 2^attempt * (1 + jitter * unit)` clamped to `[0, max_delay]`.
    #[must_use]
    pub fn compute_backoff(&self, attempt: u32, unit: f64) -> Duration {
        let max_ms = duration_ms(self.max_delay);
        let exponent = i32::try_from(attempt.min(62)).unwrap_or(62);
        let raw = duration_ms(self.base_delay) * 2f64.powi(exponent);
        let unit = if unit.is_finite() {
            unit.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let jittered = raw * self.jitter.mul_add(unit, 1.0);
        let clamped = if jittered.is_finite() {
            jittered.clamp(0.0, max_ms)
        } else {
            max_ms
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(clamped.round() as u64)
    }

    /// Delay before the next attempt: a provider hint when the message has
    /// one, otherwise jittered backoff. Hints are never jittered.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, message: &str) -> Duration {
        suggested_delay(message).map_or_else(
            || {
                let unit = rand::thread_rng().gen_range(-1.0..=1.0);
                self.compute_backoff(attempt, unit)
            },
            |hint| hint.min(self.max_delay),
        )
    }
}

#[allow(clippy::cast_precision_loss)]
fn duration_ms(duration: Duration) -> f64 {
    duration.as_millis() as f64
}

/// Snapshot handed to the retry callback before each backoff sleep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    /// Classified kind of the failure being retried.
    pub kind: ErrorKind,
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    /// Retries left after this one.
    pub remaining: u32,
    /// Wait before the next attempt.
    pub delay: Duration,
    /// The failure's message.
    pub error: String,
}

impl RetryNotice {
    /// Progress line suitable for a UI sink.
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "{}. Retrying in {}s (attempt {}, {} remaining)",
            self.kind,
            self.delay.as_millis().div_ceil(1000),
            self.attempt,
            self.remaining
        )
    }
}

impl fmt::Display for RetryNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Terminal outcome of [`Retrier::run`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// Cancellation fired before or during an attempt or a backoff sleep.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// Every allowed attempt failed with a retryable error.
    #[error("{kind} after {attempts} attempt(s): {message}")]
    Exhausted {
        kind: ErrorKind,
        attempts: u32,
        message: String,
    },

    /// An attempt failed with an error that retrying cannot fix.
    #[error("{kind}: {message}")]
    NonRetryable {
        kind: ErrorKind,
        attempts: u32,
        message: String,
    },
}

impl RetryError {
    /// Attempts made before giving up.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Cancelled { attempts }
            | Self::Exhausted { attempts, .. }
            | Self::NonRetryable { attempts, .. } => *attempts,
        }
    }

    /// Classified kind, `None` for cancellation.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Cancelled { .. } => None,
            Self::Exhausted { kind, .. } | Self::NonRetryable { kind, .. } => Some(*kind),
        }
    }

    /// Message of the last underlying failure.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Cancelled { .. } => None,
            Self::Exhausted { message, .. } | Self::NonRetryable { message, .. } => Some(message),
        }
    }

    /// Whether this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// A successful value plus how many invocations it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    /// The successful result.
    pub value: T,
    /// Invocations made, including the successful one.
    pub attempts: u32,
}

/// Callback invoked before each backoff sleep.
pub type RetryCallback<'a> = &'a (dyn Fn(&RetryNotice) + Send + Sync);

/// Runs fallible async operations under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Retrier {
    /// Retrier on the real clock.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_clock(policy, Arc::new(TokioClock))
    }

    /// Retrier on an injected clock.
    #[must_use]
    pub fn with_clock(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invokes `op` until it succeeds, fails non-retryably, runs out of
    /// retries, or `cancel` fires.
    ///
    /// `op` receives the 0-based attempt number. An in-flight attempt is
    /// dropped when cancellation fires.
    ///
    /// # Errors
    /// See [`RetryError`].
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        on_retry: Option<RetryCallback<'_>>,
        mut op: F,
    ) -> Result<Attempted<T>, RetryError>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        E: fmt::Display + Send,
        T: Send,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt + 1 });
                }
                outcome = op(attempt) => outcome,
            };

            let error = match outcome {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempts: attempt + 1,
                    })
                }
                Err(error) => error,
            };

            let message = error.to_string();
            let kind = classify_message(&message);
            let attempts = attempt + 1;

            if !kind.is_retryable() {
                return Err(RetryError::NonRetryable {
                    kind,
                    attempts,
                    message,
                });
            }
            if attempt >= self.policy.max_retries {
                return Err(RetryError::Exhausted {
                    kind,
                    attempts,
                    message,
                });
            }

            let delay = self.policy.delay_for(attempt, &message);
            let notice = RetryNotice {
                kind,
                attempt: attempts,
                remaining: self.policy.max_retries - attempt,
                delay,
                error: message,
            };
            tracing::warn!(
                event = "retry_scheduled",
                kind = ?kind,
                attempt = attempts,
                remaining = notice.remaining,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retry_scheduled"
            );
            if let Some(callback) = on_retry {
                callback(&notice);
            }

            if sleep_or_cancel(self.clock.as_ref(), delay, cancel)
                .await
                .is_err()
            {
                return Err(RetryError::Cancelled { attempts });
            }
            attempt += 1;
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
