// src/utils/retry.rs

use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    /// One retry after a short pause.
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(25),
        }
    }
}

/// Runs `f` until it succeeds, fails with a non-retryable error,
/// or `max_attempts` is used up.
pub async fn retry_on_conflict<F, Fut, T>(config: RetryConfig, mut f: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AppError>>,
{
    let mut attempts_left = config.max_attempts.max(1);

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left -= 1;
                if attempts_left == 0 || !e.is_retryable() {
                    return Err(e);
                }
                tracing::warn!("Retrying after transaction conflict: {}", e);
                tokio::time::sleep(config.backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn conflict_is_retried_once() {
        let counter = AtomicUsize::new(0);
        let res = retry_on_conflict(fast(), || async {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Concurrency("serialization failure".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(res.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn conflict_surfaces_after_second_failure() {
        let counter = AtomicUsize::new(0);
        let res: Result<(), _> = retry_on_conflict(fast(), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Concurrency("deadlock".into()))
        })
        .await;

        assert!(matches!(res, Err(AppError::Concurrency(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let res: Result<(), _> = retry_on_conflict(fast(), || async {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::NotFound("Question not found".into()))
        })
        .await;

        assert!(matches!(res, Err(AppError::NotFound(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
