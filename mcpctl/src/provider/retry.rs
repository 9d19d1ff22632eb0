//! Exponential backoff retry wrapper for provider calls.

use super::ProviderError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry behavior for designated idempotent-safe provider operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first (default: 3)
    pub max_attempts: u32,
    /// Base backoff duration in milliseconds (will be exponentially increased) (default: 1000)
    pub backoff_ms: u64,
    /// Factor by which the backoff_ms is increased with each retry (default: 2)
    pub backoff_factor: u64,
    /// Maximum backoff time in milliseconds (default: 10000)
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
            backoff_factor: 2,
            max_backoff_ms: 10000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based attempt:
    /// `backoff_ms * backoff_factor^attempt`, capped at `max_backoff_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.backoff_ms.saturating_mul(self.backoff_factor.saturating_pow(attempt));
        Duration::from_millis(exponential.min(self.max_backoff_ms))
    }

    /// Run `operation`, retrying transient failures with exponential backoff.
    ///
    /// Non-retryable errors (see [`ProviderError::is_retryable`]) propagate
    /// after exactly one attempt. Spending every attempt yields
    /// [`ProviderError::RetryExhausted`] wrapping the last underlying cause.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => {
                    debug!(operation = operation_name, error = %err, "Non-retryable provider error");
                    return Err(err);
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %err,
                            "Provider retries exhausted"
                        );
                        return Err(ProviderError::RetryExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }

                    let delay = self.delay_for(attempt - 1);
                    debug!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying provider call after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_ms: 10,
            backoff_factor: 2,
            max_backoff_ms: 40,
        }
    }

    fn server_error() -> ProviderError {
        ProviderError::Api {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "boom".to_string(),
            body: None,
        }
    }

    #[test]
    fn delays_follow_exponential_schedule_with_cap() {
        let policy = RetryPolicy {
            max_attempts: 6,
            backoff_ms: 1000,
            backoff_factor: 2,
            max_backoff_ms: 10000,
        };

        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(8000));
        // Capped at max_backoff_ms from here on
        assert_eq!(policy.delay_for(4), Duration::from_millis(10000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(10000));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = fast_policy()
            .run("test", move || {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(server_error())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_the_last_cause() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<(), _> = fast_policy()
            .run("test", move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(server_error())
                }
            })
            .await;

        match result.unwrap_err() {
            ProviderError::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, ProviderError::Api { .. }));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_get_exactly_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<(), _> = fast_policy()
            .run("test", move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Api {
                        status: StatusCode::NOT_FOUND,
                        message: "no such project".to_string(),
                        body: None,
                    })
                }
            })
            .await;

        assert!(matches!(result.unwrap_err(), ProviderError::Api { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
