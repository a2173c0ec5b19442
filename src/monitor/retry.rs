//! Bounded retry with exponential backoff around single-attempt provider calls.
//!
//! All attempt and backoff bookkeeping lives here; callers hand in a
//! single-attempt operation and get back either a value or the last error.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use crate::provider::ProviderError;

#[derive(Error, Debug, Clone)]
#[error("gave up after {attempts} attempt(s): {last}")]
pub struct RetryError {
    pub last: ProviderError,
    pub attempts: u32,
}

impl RetryError {
    pub fn is_transient(&self) -> bool {
        self.last.is_transient()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each attempt after that.
    pub base_delay: Duration,
    /// Random extra delay of up to `jitter_ratio * backoff`, spreading out
    /// retries when many jobs fail at once.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            jitter_ratio: 0.2,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Backoff for the attempt that just failed (1-based), before jitter.
    fn backoff(&self, failed_attempt: u32) -> Duration {
        self.policy.base_delay * 2u32.saturating_pow(failed_attempt.saturating_sub(1))
    }

    fn with_jitter(&self, backoff: Duration) -> Duration {
        if self.policy.jitter_ratio <= 0.0 {
            return backoff;
        }
        let jitter = backoff.mul_f64(rand::rng().random_range(0.0..self.policy.jitter_ratio));
        backoff + jitter
    }

    /// Runs `op` up to `max_attempts` times. Only `Transient` failures are
    /// retried; a `Terminal` failure returns immediately without consuming
    /// the remaining attempts.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.with_jitter(self.backoff(attempt));
                    debug!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient provider failure, backing off before retry."
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(attempts = attempt, error = %err, "Retry budget exhausted.");
                    }
                    return Err(RetryError {
                        last: err,
                        attempts: attempt,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(5),
            jitter_ratio: 0.2,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_is_attempted_exactly_max_times() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<(), _> = executor
            .execute(|| {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::transient("timeout"))
                }
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn terminal_failure_returns_after_one_attempt() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<(), _> = executor
            .execute(|| {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::terminal("gone"))
                }
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
        assert!(!err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let executor = RetryExecutor::new(fast_policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result = executor
            .execute(|| {
                let calls = calls_in.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ProviderError::transient("reset"))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(5),
            jitter_ratio: 0.0,
        });
        assert_eq!(executor.backoff(1), Duration::from_secs(5));
        assert_eq!(executor.backoff(2), Duration::from_secs(10));
        assert_eq!(executor.backoff(3), Duration::from_secs(20));
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let executor = RetryExecutor::new(fast_policy(3));
        let base = Duration::from_secs(10);
        for _ in 0..100 {
            let d = executor.with_jitter(base);
            assert!(d >= base);
            assert!(d <= base + base.mul_f64(0.2));
        }
    }
}
