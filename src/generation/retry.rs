//! Bounded retry with exponential backoff
//!
//! Wraps the generation call in a tagged-result retry loop. The budget
//! is deliberately small: one extra attempt by default, because a user
//! waiting on a support answer is better served by the canned fallback
//! than by a long retry ladder.

use crate::errors::Result;
use std::time::Duration;
use tokio::time::sleep;

/// Base delay for exponential backoff
const BASE_DELAY_MS: u64 = 500;

/// Maximum delay cap
const MAX_DELAY_MS: u64 = 4000;

/// Retry policy for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    max_retries: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Enable jitter
    enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RetryPolicy {
    /// Create a policy with the given retry budget
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: BASE_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Execute an operation, retrying transient failures
    ///
    /// Non-transient errors (validation, rate limiting, configuration)
    /// are returned immediately; retrying them cannot succeed.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !e.is_transient() || attempt >= self.max_retries {
                        return Err(e);
                    }

                    attempt += 1;
                    sleep(self.calculate_delay(attempt)).await;
                }
            }
        }
    }

    /// Calculate delay for given attempt number
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self.base_delay_ms * 2u64.pow(attempt.saturating_sub(1));
        let delay_ms = exponential_delay.min(MAX_DELAY_MS);

        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Get retry budget
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_success_first_attempt() {
        let policy = RetryPolicy::new(1);

        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();

        let result = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Ok::<i32, PipelineError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transient_error_retried_once() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay_ms: 1,
            enable_jitter: false,
        };

        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();

        let result = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    let mut n = counter.lock().unwrap();
                    *n += 1;
                    let current = *n;
                    drop(n);

                    if current == 1 {
                        Err(PipelineError::GenerationFailed("transient".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(*attempts.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay_ms: 1,
            enable_jitter: false,
        };

        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();

        let result: Result<i32> = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(PipelineError::GenerationTimeout { seconds: 15 })
                }
            })
            .await;

        assert!(result.is_err());
        // First attempt + one retry, then give up
        assert_eq!(*attempts.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let policy = RetryPolicy::new(3);

        let attempts = Arc::new(Mutex::new(0));
        let counter = attempts.clone();

        let result: Result<i32> = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(PipelineError::EmptyInput)
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay_ms: 500,
            enable_jitter: false,
        };

        assert_eq!(policy.calculate_delay(1), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(1000));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(2000));
        assert_eq!(policy.calculate_delay(10), Duration::from_millis(4000));
    }
}
