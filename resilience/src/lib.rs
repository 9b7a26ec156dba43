//! Resilience primitives for calling an unreliable model provider.
//!
//! - [`classify`] maps failure text onto [`ErrorKind`] and extracts
//!   provider-suggested retry delays.
//! - [`Retrier`] runs an operation under a [`RetryPolicy`] with exponential
//!   backoff, jitter, hint override and cancellation.
//! - [`RateLimiter`] spaces successive calls by a minimum delay.
//!
//! All waiting goes through a [`Clock`], so tests can inject [`ManualClock`]
//! and observe every sleep without real time passing.

/// Failure classification and retry-hint extraction.
pub mod classify;
/// Time source abstraction and cancellable sleep.
pub mod clock;
/// Minimum spacing between outbound calls.
pub mod rate_limit;
/// Retry loop and backoff policy.
pub mod retry;

pub use classify::{
    classify, classify_message, is_retryable, suggested_delay, suggested_delay_ms, ErrorKind,
    SUGGESTED_DELAY_BUFFER,
};
pub use clock::{sleep_or_cancel, Cancelled, Clock, ManualClock, TokioClock};
pub use rate_limit::{RateLimiter, DEFAULT_MIN_DELAY};
pub use retry::{Attempted, Retrier, RetryCallback, RetryError, RetryNotice, RetryPolicy};
pub use tokio_util::sync::CancellationToken;
