//! Exponential... actually linear backoff wrapper (spec.md §4.4), grounded
//! in `scrapers/polymarket_api.rs::execute_with_retry` from the teacher
//! crate, generalized into a reusable primitive over any async closure.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::AppError;

/// Runs `task` up to `attempts` times. Between attempts, sleeps
/// `delay * attempt_index` (linear backoff, per spec.md §4.4).
/// Non-retryable errors propagate immediately without sleeping.
pub async fn with_retries<T, F, Fut>(mut task: F, attempts: u32, delay: Duration) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let attempts = attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match task().await {
            Ok(value) => return Ok(value),
            Err(AppError::UpstreamRetryable(msg)) => {
                warn!(attempt, attempts, "retryable upstream failure: {msg}");
                last_err = Some(AppError::UpstreamRetryable(msg));
                if attempt < attempts {
                    sleep(delay * attempt).await;
                }
            }
            Err(other) => return Err(other),
        }
    }

    Err(last_err.unwrap_or_else(|| AppError::UpstreamFatal("retries exhausted".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_after_retryable_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let result = with_retries(
            move || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(AppError::UpstreamRetryable("temporarily unavailable".into()))
                    } else {
                        Ok(42)
                    }
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_propagates_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let result: Result<i32, AppError> = with_retries(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::Validation("bad ticker".into()))
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let result: Result<i32, AppError> = with_retries(
            || async { Err(AppError::UpstreamRetryable("timeout".into())) },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert!(matches!(result, Err(AppError::UpstreamRetryable(_))));
    }
}
