use rand::Rng;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{ErrorClass, ProviderError};

/// The last error of an operation, after the retry budget was spent or a
/// permanent failure cut it short.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryError {
    pub operation: String,
    pub attempts: usize,
    #[source]
    pub source: ProviderError,
}

impl RetryError {
    pub fn class(&self) -> ErrorClass {
        self.source.class()
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            jitter: true,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Exponential backoff before retry number `retry` (1-based), capped at
    /// the maximum, never shorter than what the provider asked for.
    pub fn backoff_for(&self, retry: usize, requested: Option<Duration>) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as u32;
        let mut backoff = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff);

        if self.jitter && !backoff.is_zero() {
            let spread = (backoff.as_millis() as u64 / 4).max(1);
            backoff += Duration::from_millis(rand::thread_rng().gen_range(0..=spread));
        }

        match requested {
            Some(requested) => backoff.max(requested),
            None => backoff,
        }
    }

    /// Run `f` until it succeeds, fails permanently, or the retry budget is
    /// spent. Only transient errors are retried.
    pub async fn retry<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match f().await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempts = attempt,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_transient() => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Operation failed permanently"
                    );
                    return Err(RetryError {
                        operation: operation_name.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(RetryError {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }

                    let backoff = self.backoff_for(attempt, e.retry_after());

                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 500, 8_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transient() -> ProviderError {
        ProviderError::Unavailable {
            provider: "stub",
            status: 503,
            message: "busy".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_budget_on_transient_errors() {
        let policy = RetryPolicy::new(2, 100, 1_000);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result: Result<(), _> = policy
            .retry("search", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.source, transient());
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let policy = RetryPolicy::new(5, 100, 1_000);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let result: Result<(), _> = policy
            .retry("extract", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Unauthorized {
                    provider: "stub",
                    status: 401,
                    message: "bad key".to_string(),
                })
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let policy = RetryPolicy::default();
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        let value = policy
            .retry("search", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new(10, 100, 1_000).without_jitter();

        assert_eq!(policy.backoff_for(1, None), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2, None), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3, None), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(8, None), Duration::from_millis(1_000));
    }

    #[test]
    fn test_backoff_respects_retry_after() {
        let policy = RetryPolicy::new(2, 100, 1_000).without_jitter();
        let requested = Some(Duration::from_secs(5));

        assert_eq!(policy.backoff_for(1, requested), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::new(2, 400, 400);
        for _ in 0..50 {
            let backoff = policy.backoff_for(1, None);
            assert!(backoff >= Duration::from_millis(400));
            assert!(backoff <= Duration::from_millis(500));
        }
    }
}
