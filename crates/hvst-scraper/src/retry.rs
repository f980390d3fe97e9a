//! Bounded retry with exponential backoff for transient harvest errors.
//!
//! Only [`HarvestError::is_transient`] errors (navigation timeouts and
//! missing elements) are retried. Everything else propagates on the first
//! occurrence without sleeping.

use std::future::Future;
use std::time::Duration;

use hvst_core::AppConfig;

use crate::error::HarvestError;

/// Upper bound on any single backoff sleep.
const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Treated as at least 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), 2.0)
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            max_delay: MAX_DELAY,
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_initial_delay_ms),
            config.retry_backoff_multiplier,
        )
    }

    /// Sleep before the attempt following failed attempt number `attempt`
    /// (1-based): `initial_delay * backoff_multiplier^(attempt-1)`, capped at
    /// `max_delay`.
    ///
    /// | Failed attempt | Delay (initial 2 s, multiplier 2) |
    /// |----------------|-----------------------------------|
    /// | 1 | 2 s |
    /// | 2 | 4 s |
    /// | 3 | 8 s |
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error,
    /// or `max_attempts` transient failures have occurred.
    ///
    /// # Errors
    ///
    /// Non-transient errors are returned unchanged. When the budget runs out
    /// the last transient error is returned wrapped in
    /// [`HarvestError::Exhausted`].
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, HarvestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HarvestError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1u32;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(HarvestError::Exhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                operation = label,
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient error, retrying after backoff"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(100), 2.0)
    }

    #[test]
    fn delays_grow_geometrically() {
        let p = policy(5);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert!(p.delay_for(2) > p.delay_for(1));
        assert!(p.delay_for(3) > p.delay_for(2));
    }

    #[test]
    fn delay_is_capped() {
        let p = RetryPolicy::new(50, Duration::from_secs(10), 10.0);
        assert_eq!(p.delay_for(40), MAX_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_immediately_without_sleeping() {
        let start = tokio::time::Instant::now();
        let result = policy(3).run("op", || async { Ok::<u32, HarvestError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn k_failures_then_success_sleeps_k_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let start = tokio::time::Instant::now();

        let result = policy(3)
            .run("op", || {
                let c = Arc::clone(&c);
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(HarvestError::not_found("card"))
                    } else {
                        Ok::<&str, HarvestError>("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two sleeps: 100 ms then 200 ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(310), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_wraps_last_transient_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result = policy(3)
            .run("op", || {
                let c = Arc::clone(&c);
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HarvestError::not_found(format!("attempt {n}")))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(HarvestError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source.to_string(), "element not found: attempt 2");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let start = tokio::time::Instant::now();

        let result = policy(5)
            .run("op", || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HarvestError::browser("target closed"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(HarvestError::Browser(_))));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_attempts_still_tries_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = policy(0)
            .run("op", || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(HarvestError::not_found("x"))
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(HarvestError::Exhausted { attempts: 1, .. })));
    }
}
