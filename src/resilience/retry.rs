//! Retry with a fixed delay
//!
//! Checks poll for eventually-consistent state (a rate limit config rolling
//! out, pods becoming ready), so the delay between attempts is constant and
//! the number of attempts is bounded. Only the last failure is surfaced.
//!
//! # Example
//!
//! ```rust,ignore
//! use valet::resilience::RetryPolicy;
//!
//! let policy = RetryPolicy::fixed(10, Duration::from_secs(1));
//! let body = policy.execute("curl", |_attempt| async {
//!     fetch_and_check().await
//! }).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, ValetError};

/// Default number of attempts for checks
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Default delay between attempts
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first (0 is treated as 1)
    pub attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

/// Retry policy that re-runs an operation with a fixed delay
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
    cancel: Option<CancellationToken>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self::new(RetryConfig { attempts, delay })
    }

    /// Stop retrying once the token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation until it succeeds or attempts run out.
    ///
    /// The closure receives the 1-based attempt number. Every error is
    /// retried except [`ValetError::Cancelled`]; when attempts are exhausted
    /// the error from the final attempt is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match operation(attempt).await {
                Ok(result) => return Ok(result),
                Err(ValetError::Cancelled) => return Err(ValetError::Cancelled),
                Err(e) => e,
            };

            if attempt >= attempts {
                warn!(
                    operation = %operation_name,
                    attempts = attempt,
                    error = %err,
                    "Operation failed after max attempts"
                );
                return Err(err);
            }

            debug!(
                operation = %operation_name,
                attempt = attempt,
                error = %err,
                delay_ms = self.config.delay.as_millis() as u64,
                "Attempt failed, retrying"
            );

            match &self.cancel {
                Some(cancel) => tokio::select! {
                    _ = tokio::time::sleep(self.config.delay) => {}
                    _ = cancel.cancelled() => return Err(ValetError::Cancelled),
                },
                None => tokio::time::sleep(self.config.delay).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.attempts, 10);
        assert_eq!(config.delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_execute_succeeds_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = fast(3)
            .execute("op", |_| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("success")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_succeeds_on_third_attempt() {
        let result = fast(10)
            .execute("op", |attempt| async move {
                if attempt < 3 {
                    Err(ValetError::UnexpectedStatusCode { status: 503 })
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_execute_returns_last_error_only() {
        let result: Result<()> = fast(4)
            .execute("op", |attempt| async move {
                Err(ValetError::UnexpectedStatusCode {
                    status: 500 + attempt as u16,
                })
            })
            .await;

        match result.unwrap_err() {
            ValetError::UnexpectedStatusCode { status } => assert_eq!(status, 504),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let _: Result<()> = fast(0)
            .execute("op", |_| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ValetError::InvalidTarget)
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<()> = fast(5)
            .execute("op", |_| {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ValetError::Cancelled)
                }
            })
            .await;

        assert!(matches!(result, Err(ValetError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_delay() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::fixed(5, Duration::from_secs(60)).with_cancellation(cancel);

        let result: Result<()> = policy
            .execute("op", |_| async { Err(ValetError::UnexpectedStatusCode { status: 500 }) })
            .await;

        assert!(matches!(result, Err(ValetError::Cancelled)));
    }
}
