use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, warn};

use crate::error::ProviderError;

#[derive(Debug, Default)]
struct LimiterState {
    cooldown_until: Option<Instant>,
    calls: u64,
    throttled: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimiterStats {
    pub calls: u64,
    pub throttled: u64,
}

/// Rate-limit bookkeeping for one external provider, shared by every
/// concurrent caller of that provider.
///
/// A throttled response pushes a shared cooldown deadline forward so that all
/// callers pause, not only the one that was throttled. An optional steady
/// quota caps the request rate.
pub struct ProviderLimiter {
    name: &'static str,
    quota: Option<DefaultDirectRateLimiter>,
    default_cooldown: Duration,
    state: Mutex<LimiterState>,
}

impl ProviderLimiter {
    pub fn unlimited(name: &'static str) -> Self {
        Self {
            name,
            quota: None,
            default_cooldown: Duration::from_secs(1),
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Zero means no steady quota.
    pub fn per_second(name: &'static str, requests_per_second: u32) -> Self {
        let mut limiter = Self::unlimited(name);
        limiter.quota =
            NonZeroU32::new(requests_per_second).map(|rps| RateLimiter::direct(Quota::per_second(rps)));
        limiter
    }

    /// Cooldown applied when the provider throttles without a `Retry-After`.
    pub fn with_default_cooldown(mut self, cooldown: Duration) -> Self {
        self.default_cooldown = cooldown;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait out any shared cooldown and the steady quota.
    pub async fn until_ready(&self) {
        loop {
            let deadline = self.state.lock().await.cooldown_until;
            match deadline {
                // Re-check after waking, another caller may have extended it
                Some(deadline) if deadline > Instant::now() => sleep_until(deadline).await,
                _ => break,
            }
        }

        if let Some(quota) = &self.quota {
            quota.until_ready().await;
        }

        self.state.lock().await.calls += 1;
    }

    /// Pause every caller of this provider for `requested`, or the default
    /// cooldown. Never shortens a cooldown already in place.
    pub async fn back_off(&self, requested: Option<Duration>) {
        let wait = requested.unwrap_or(self.default_cooldown);
        let until = Instant::now() + wait;

        let mut state = self.state.lock().await;
        state.cooldown_until = Some(match state.cooldown_until {
            Some(current) => current.max(until),
            None => until,
        });
        state.throttled += 1;

        warn!(
            provider = self.name,
            cooldown_ms = wait.as_millis() as u64,
            throttled = state.throttled,
            "Provider throttled, pausing calls"
        );
    }

    /// One provider call: waits for a slot, applies the per-call timeout, and
    /// records throttling in the shared state.
    pub async fn call<T, Fut>(&self, limit: Duration, call: Fut) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.until_ready().await;

        let result = match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                debug!(provider = self.name, timeout_ms = limit.as_millis() as u64, "Call timed out");
                Err(ProviderError::timeout(self.name, limit))
            }
        };

        if let Err(e) = &result {
            if e.is_rate_limited() {
                self.back_off(e.retry_after()).await;
            }
        }

        result
    }

    pub async fn stats(&self) -> LimiterStats {
        let state = self.state.lock().await;
        LimiterStats {
            calls: state.calls,
            throttled: state.throttled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_is_shared() {
        let limiter = Arc::new(ProviderLimiter::unlimited("serpapi"));
        limiter.back_off(Some(Duration::from_secs(2))).await;

        let start = Instant::now();
        let other = Arc::clone(&limiter);
        let waiter = tokio::spawn(async move { other.until_ready().await });

        limiter.until_ready().await;
        waiter.await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(
            limiter.stats().await,
            LimiterStats {
                calls: 2,
                throttled: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_is_never_shortened() {
        let limiter = ProviderLimiter::unlimited("groq");
        limiter.back_off(Some(Duration::from_secs(5))).await;
        limiter.back_off(Some(Duration::from_secs(1))).await;

        let start = Instant::now();
        limiter.until_ready().await;
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let limiter = ProviderLimiter::unlimited("serpapi");

        let result: Result<(), _> = limiter
            .call(Duration::from_millis(100), async {
                sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_call_starts_cooldown() {
        let limiter = ProviderLimiter::unlimited("groq").with_default_cooldown(Duration::from_secs(3));

        let result: Result<(), _> = limiter
            .call(Duration::from_secs(1), async {
                Err(ProviderError::RateLimited {
                    provider: "groq",
                    retry_after: None,
                })
            })
            .await;
        assert!(result.is_err());

        let start = Instant::now();
        limiter.until_ready().await;
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(limiter.stats().await.throttled, 1);
    }
}
