//! Bounded retry of a single async operation
//!
//! This module provides [`RetryExecutor`], which wraps one asynchronous
//! operation with a fixed attempt budget and a plain exponential wait
//! between attempts. Which failures are worth retrying is decided by the
//! [`RetryableError`] decision table, not by the caller.
//!
//! The wait curve here is deliberately simpler than
//! [`BackoffCalculator`](crate::sync::BackoffCalculator): base times two to
//! the attempt, no jitter, a fixed five-minute ceiling. It is meant for the
//! handful of retries inside one sync attempt, not for long-horizon
//! reconnect pacing.

use crate::config::RetryConfig;
use crate::error::RetryableError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Ceiling for the wait between attempts; keeps the doubling curve finite
/// for arbitrarily large configured budgets
const MAX_RETRY_WAIT: Duration = Duration::from_secs(300);

/// Executor wrapping an async operation with bounded retries
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryExecutor {
    /// Create an executor with an explicit attempt budget and base delay
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Create an executor from a [`RetryConfig`]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }

    /// Execute an async operation, retrying transient failures
    ///
    /// The operation is invoked up to `max_attempts` times. Success returns
    /// immediately. An error classified as non-retryable propagates without
    /// further attempts, and the final attempt propagates unconditionally,
    /// so the caller always receives the *last* encountered error. Between
    /// attempts the executor waits `base_delay * 2^(attempt - 1)`, capped at
    /// five minutes.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    // The final attempt propagates any error, retryable or not
                    if attempt >= self.max_attempts || !err.is_retryable() {
                        return Err(err);
                    }

                    // Saturating on both steps: the budget is an unbounded
                    // config field, and 2^32 attempts must not panic
                    let wait = self
                        .base_delay
                        .saturating_mul(2u32.saturating_pow(attempt - 1))
                        .min(MAX_RETRY_WAIT);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        wait_ms = wait.as_millis(),
                        error = %err,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// The configured attempt budget
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The configured base delay
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    // Test 1: Success on first attempt invokes the operation exactly once
    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = RetryExecutor::new(3, Duration::ZERO);

        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result: Result<&str, SyncError> = executor
            .execute(|| {
                let count = call_count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok("success")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    // Test 2: k retriable failures then success invokes k+1 times
    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(5, Duration::ZERO);

        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<&str, SyncError> = executor
            .execute(|| {
                let count = attempt_count_clone.clone();
                async move {
                    let current = count.fetch_add(1, Ordering::SeqCst);
                    if current < 2 {
                        Err(SyncError::NetworkTimeout)
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    // Test 3: Non-retryable error propagates on the very first failure
    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let executor = RetryExecutor::new(5, Duration::ZERO);

        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<(), SyncError> = executor
            .execute(|| {
                let count = attempt_count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::Unauthorized)
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), SyncError::Unauthorized);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    // Test 4: Exhausted budget propagates the last encountered error
    #[tokio::test]
    async fn test_last_error_propagates_when_exhausted() {
        let executor = RetryExecutor::new(3, Duration::ZERO);

        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<(), SyncError> = executor
            .execute(|| {
                let count = attempt_count_clone.clone();
                async move {
                    let current = count.fetch_add(1, Ordering::SeqCst);
                    // A different retriable error each attempt
                    Err(SyncError::RateLimited(u64::from(current)))
                }
            })
            .await;

        // Three attempts, errors 0, 1, 2; the last one wins
        assert_eq!(result.unwrap_err(), SyncError::RateLimited(2));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    // Test 5: A budget of one means no retries even for retriable errors
    #[tokio::test]
    async fn test_single_attempt_budget() {
        let executor = RetryExecutor::new(1, Duration::ZERO);

        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<(), SyncError> = executor
            .execute(|| {
                let count = attempt_count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::NetworkTimeout)
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    // Test 6: Waits double between attempts (1s, then 2s)
    #[tokio::test(start_paused = true)]
    async fn test_exponentially_increasing_waits() {
        let executor = RetryExecutor::new(3, Duration::from_secs(1));

        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let start = tokio::time::Instant::now();
        let result: Result<&str, SyncError> = executor
            .execute(|| {
                let count = attempt_count_clone.clone();
                async move {
                    let current = count.fetch_add(1, Ordering::SeqCst);
                    if current < 2 {
                        Err(SyncError::ConnectionRefused)
                    } else {
                        Ok("connected")
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        // 1s after attempt 1, 2s after attempt 2
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    // Test 7: Default budget and base delay
    #[test]
    fn test_defaults() {
        let executor = RetryExecutor::default();

        assert_eq!(executor.max_attempts(), 3);
        assert_eq!(executor.base_delay(), Duration::from_secs(2));
    }

    // Test 8: from_config picks up the connector's retry settings
    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            max_attempts: 7,
            base_delay_ms: 500,
        };
        let executor = RetryExecutor::from_config(&config);

        assert_eq!(executor.max_attempts(), 7);
        assert_eq!(executor.base_delay(), Duration::from_millis(500));
    }

    // Test 9: A huge attempt budget caps the wait instead of overflowing
    #[tokio::test(start_paused = true)]
    async fn test_wait_capped_for_large_budgets() {
        let executor = RetryExecutor::new(40, Duration::from_secs(2));

        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let start = tokio::time::Instant::now();
        let result: Result<(), SyncError> = executor
            .execute(|| {
                let count = attempt_count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(SyncError::NetworkTimeout)
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), SyncError::NetworkTimeout);
        assert_eq!(attempt_count.load(Ordering::SeqCst), 40);
        // Waits of 2s..256s for attempts 1-8, then 31 waits pinned at 300s
        assert_eq!(start.elapsed(), Duration::from_secs(510 + 31 * 300));
    }
}
