//! Minimum spacing between outbound provider calls.

use crate::clock::{sleep_or_cancel, Cancelled, Clock, TokioClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default spacing between calls.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(4);

/// Enforces a minimum delay between successive [`RateLimiter::acquire`] calls.
///
/// One instance is shared by everything that talks to a given provider; the
/// internal lock is held across the wait, so concurrent callers queue up and
/// leave one at a time.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    last: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Creates a limiter on the real clock.
    #[must_use]
    pub fn new(min_delay: Duration) -> Self {
        Self::with_clock(min_delay, Arc::new(TokioClock))
    }

    /// Creates a limiter on an injected clock.
    #[must_use]
    pub fn with_clock(min_delay: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_delay,
            last: Mutex::new(None),
            clock,
        }
    }

    /// Configured minimum spacing.
    #[must_use]
    pub const fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Waits until at least `min_delay` has passed since the previous
    /// acquisition resolved.
    ///
    /// # Errors
    /// Returns [`Cancelled`] if `cancel` fires before the wait completes. A
    /// cancelled acquisition does not update the internal clock.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let mut last = self.last.lock().await;

        if let Some(previous) = *last {
            let elapsed = self.clock.now().saturating_duration_since(previous);
            if elapsed < self.min_delay {
                let wait = self.min_delay - elapsed;
                tracing::debug!(
                    event = "rate_limit_wait",
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "rate_limit_wait"
                );
                sleep_or_cancel(self.clock.as_ref(), wait, cancel).await?;
            }
        } else if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        *last = Some(self.clock.now());
        Ok(())
    }

    /// Forgets the previous acquisition; the next call proceeds immediately.
    pub async fn reset(&self) {
        *self.last.lock().await = None;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(ms: u64) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new();
        let limiter = RateLimiter::with_clock(Duration::from_millis(ms), Arc::new(clock.clone()));
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_first_acquire_does_not_wait() {
        let (limiter, clock) = limiter(1000);
        limiter.acquire(&CancellationToken::new()).await.unwrap();
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_acquires_are_spaced_by_min_delay() {
        let (limiter, clock) = limiter(1000);
        let token = CancellationToken::new();

        let mut resolved_at = Vec::new();
        for _ in 0..4 {
            limiter.acquire(&token).await.unwrap();
            resolved_at.push(clock.now());
        }

        for pair in resolved_at.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
        assert_eq!(clock.sleeps().len(), 3);
    }

    #[tokio::test]
    async fn test_only_remaining_gap_is_waited() {
        let (limiter, clock) = limiter(1000);
        let token = CancellationToken::new();

        limiter.acquire(&token).await.unwrap();
        clock.advance(Duration::from_millis(600));
        limiter.acquire(&token).await.unwrap();

        assert_eq!(clock.sleeps(), vec![Duration::from_millis(400)]);
    }

    #[tokio::test]
    async fn test_no_wait_after_gap_already_elapsed() {
        let (limiter, clock) = limiter(1000);
        let token = CancellationToken::new();

        limiter.acquire(&token).await.unwrap();
        clock.advance(Duration::from_secs(5));
        limiter.acquire(&token).await.unwrap();

        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_clock() {
        let (limiter, clock) = limiter(1000);
        let token = CancellationToken::new();

        limiter.acquire(&token).await.unwrap();
        limiter.reset().await;
        limiter.acquire(&token).await.unwrap();

        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_error() {
        let (limiter, _clock) = limiter(1000);
        let token = CancellationToken::new();

        limiter.acquire(&token).await.unwrap();
        token.cancel();
        assert_eq!(limiter.acquire(&token).await, Err(Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_clock_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let token = CancellationToken::new();

        let start = Instant::now();
        limiter.acquire(&token).await.unwrap();
        limiter.acquire(&token).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
