//! Behavioural checks for the retry loop and rate limiter under a manual clock.

use editlens_resilience::{
    CancellationToken, Clock, ErrorKind, ManualClock, RateLimiter, Retrier, RetryError, RetryPolicy,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn manual_retrier(policy: RetryPolicy) -> (Retrier, ManualClock) {
    let clock = ManualClock::new();
    (Retrier::with_clock(policy, Arc::new(clock.clone())), clock)
}

#[tokio::test]
async fn test_invocations_never_exceed_max_retries_plus_one() {
    for max_retries in 0..6 {
        let (retrier, clock) = manual_retrier(RetryPolicy::default().with_max_retries(max_retries));
        let calls = AtomicU32::new(0);

        let err = retrier
            .run(&CancellationToken::new(), None, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("500 INTERNAL") }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
        assert!(matches!(err, RetryError::Exhausted { .. }));
        assert_eq!(clock.sleeps().len(), max_retries as usize);
    }
}

#[tokio::test]
async fn test_no_single_sleep_exceeds_max_delay() {
    let policy = RetryPolicy::default()
        .with_max_retries(12)
        .with_base_delay(Duration::from_secs(5))
        .with_max_delay(Duration::from_secs(20))
        .with_jitter(1.0);
    let (retrier, clock) = manual_retrier(policy);

    let _ = retrier
        .run(&CancellationToken::new(), None, |attempt| async move {
            if attempt % 2 == 0 {
                Err::<(), _>("quota exceeded, retry in 90s".to_string())
            } else {
                Err("deadline exceeded".to_string())
            }
        })
        .await;

    let sleeps = clock.sleeps();
    assert_eq!(sleeps.len(), 12);
    assert!(sleeps.iter().all(|d| *d <= Duration::from_secs(20)));
}

#[tokio::test]
async fn test_provider_hint_beats_backoff() {
    let (retrier, clock) = manual_retrier(RetryPolicy::default().with_max_retries(1));

    let err = retrier
        .run(&CancellationToken::new(), None, |_| async {
            Err::<(), _>("429 RESOURCE_EXHAUSTED. Please retry in 12.5s")
        })
        .await
        .unwrap_err();

    assert_eq!(clock.sleeps(), vec![Duration::from_millis(13_500)]);
    assert_eq!(err.kind(), Some(ErrorKind::RateLimited));
}

#[tokio::test]
async fn test_jittered_backoff_stays_within_band() {
    let (retrier, clock) = manual_retrier(RetryPolicy::default().with_max_retries(3));

    let _ = retrier
        .run(&CancellationToken::new(), None, |_| async {
            Err::<(), _>("503 unavailable")
        })
        .await;

    let sleeps = clock.sleeps();
    let expected = [2_000u64, 4_000, 8_000];
    assert_eq!(sleeps.len(), expected.len());
    for (slept, nominal) in sleeps.iter().zip(expected) {
        let ms = u64::try_from(slept.as_millis()).unwrap();
        assert!(ms >= nominal * 3 / 4 && ms <= nominal * 5 / 4, "{ms} vs {nominal}");
    }
}

#[tokio::test]
async fn test_rate_limiter_spacing_with_manual_clock() {
    let clock = ManualClock::new();
    let limiter = RateLimiter::with_clock(Duration::from_secs(4), Arc::new(clock.clone()));
    let token = CancellationToken::new();

    let mut marks = Vec::new();
    for i in 0..5u64 {
        limiter.acquire(&token).await.unwrap();
        marks.push(clock.now());
        // Simulated work between calls of varying length.
        clock.advance(Duration::from_millis(i * 1500));
    }

    for pair in marks.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(4));
    }
}
