//! Bounded retry with exponential backoff.

use gemi_core::{Exhausted, RetryBudget, RetryPolicy};
use std::fmt::Display;
use std::future::Future;
use tokio::time::sleep;
use tracing::debug;

/// Run `operation` until it succeeds, the policy is spent, or it fails with
/// an error `is_retryable` rejects.
///
/// The first invocation runs immediately and the delays between invocations
/// follow [`RetryPolicy::delay_after`]. Each invocation receives its
/// [`RetryBudget`]. Cancellation is by dropping the returned future.
pub async fn retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: R,
) -> Result<T, Exhausted<E>>
where
    E: Display,
    F: FnMut(RetryBudget) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut budget = policy.budget();

    loop {
        match operation(budget).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !is_retryable(&error) || budget.is_last() {
                    return Err(Exhausted {
                        attempts: budget.attempt,
                        last: error,
                    });
                }

                debug!(
                    attempt = budget.attempt,
                    max_attempts = budget.max_attempts,
                    delay_ms = u64::try_from(budget.next_delay.as_millis()).unwrap_or(u64::MAX),
                    "Attempt failed, retrying: {}",
                    error
                );
                sleep(budget.next_delay).await;
                budget = budget.advance(policy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(300),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result: Result<(), _> = retry(
            &policy(4),
            |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("refused")
                }
            },
            |_| true,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(err.last, "refused");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 300 (capped)
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(600), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(650), "{elapsed:?}");
    }

    /// Retries are numbered from the first retry: retry n waits
    /// base * mult^(n-1), so the wait before the second invocation is the
    /// base delay itself.
    #[tokio::test(start_paused = true)]
    async fn first_retry_waits_the_base_delay() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));

        let _ = retry(
            &policy(4),
            |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.lock().unwrap().push(Instant::now());
                    Err::<(), _>("refused")
                }
            },
            |_| true,
        )
        .await;

        let calls = calls.lock().unwrap();
        let waits: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        let expected = [100, 200, 300].map(Duration::from_millis);
        assert_eq!(waits.len(), expected.len());
        for (wait, expected) in waits.iter().zip(expected) {
            assert!(
                *wait >= expected && *wait < expected + Duration::from_millis(5),
                "{waits:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_operation_recovers() {
        let result = retry(
            &policy(5),
            |budget| async move {
                if budget.attempt < 3 {
                    Err("not yet")
                } else {
                    Ok(budget.attempt)
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_returns_immediately() {
        let started = Instant::now();
        let result: Result<(), _> = retry(
            &policy(5),
            |_| async { Err::<(), _>("fatal") },
            |e: &&str| *e != "fatal",
        )
        .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
