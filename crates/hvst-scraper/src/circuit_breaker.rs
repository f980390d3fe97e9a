//! Fail-fast guard for repeatedly failing operations such as browser launches.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPhase {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum BreakerState {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

/// Closed until `failure_threshold` consecutive failures, then open for
/// `reset_timeout`, then half-open until `success_threshold` successes close
/// it again. Any failure while half-open reopens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        success_threshold: u32,
        reset_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            reset_timeout,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    /// 5 failures to open, 60 s cool-down, 2 successes to close.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, 5, 2, Duration::from_secs(60))
    }

    #[must_use]
    pub fn phase(&self) -> BreakerPhase {
        match *self.lock() {
            BreakerState::Closed { .. } => BreakerPhase::Closed,
            BreakerState::Open { .. } => BreakerPhase::Open,
            BreakerState::HalfOpen { .. } => BreakerPhase::HalfOpen,
        }
    }

    /// Admits a call, moving an expired open breaker to half-open.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::CircuitOpen`] while the breaker is open.
    pub fn check(&self) -> Result<(), HarvestError> {
        let mut state = self.lock();
        if let BreakerState::Open { since } = *state {
            let elapsed = since.elapsed();
            if elapsed < self.reset_timeout {
                return Err(HarvestError::CircuitOpen {
                    name: self.name.clone(),
                    retry_in_secs: (self.reset_timeout - elapsed).as_secs(),
                });
            }
            tracing::info!(breaker = %self.name, "circuit half-open, probing");
            *state = BreakerState::HalfOpen { successes: 0 };
        }
        Ok(())
    }

    /// A success reported while open comes from a call admitted before the
    /// breaker tripped and does not close it.
    pub fn record_success(&self) {
        let mut state = self.lock();
        match *state {
            BreakerState::HalfOpen { successes } => {
                let successes = successes + 1;
                if successes >= self.success_threshold {
                    tracing::info!(breaker = %self.name, "circuit closed");
                    *state = BreakerState::Closed { failures: 0 };
                } else {
                    *state = BreakerState::HalfOpen { successes };
                }
            }
            BreakerState::Closed { .. } => *state = BreakerState::Closed { failures: 0 },
            BreakerState::Open { .. } => {}
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        let open = match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures < self.failure_threshold {
                    *state = BreakerState::Closed { failures };
                    false
                } else {
                    true
                }
            }
            BreakerState::HalfOpen { .. } => true,
            BreakerState::Open { .. } => false,
        };
        if open {
            tracing::warn!(breaker = %self.name, "circuit opened");
            *state = BreakerState::Open {
                since: Instant::now(),
            };
        }
    }

    /// Runs `operation` through the breaker.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::CircuitOpen`] without running `operation` while
    /// open; otherwise returns whatever `operation` returns.
    pub async fn call<T, Fut>(&self, operation: Fut) -> Result<T, HarvestError>
    where
        Fut: Future<Output = Result<T, HarvestError>>,
    {
        self.check()?;
        let result = operation.await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        result
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing() -> impl Future<Output = Result<(), HarvestError>> {
        async { Err(HarvestError::browser("launch failed")) }
    }

    fn succeeding() -> impl Future<Output = Result<(), HarvestError>> {
        async { Ok(()) }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_and_fails_fast() {
        let breaker = CircuitBreaker::new("browser", 2, 1, Duration::from_secs(30));
        let _ = breaker.call(failing()).await;
        assert_eq!(breaker.phase(), BreakerPhase::Closed);
        let _ = breaker.call(failing()).await;
        assert_eq!(breaker.phase(), BreakerPhase::Open);

        let result = breaker.call(succeeding()).await;
        assert!(matches!(result, Err(HarvestError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_closes_after_successes() {
        let breaker = CircuitBreaker::new("browser", 1, 2, Duration::from_secs(30));
        let _ = breaker.call(failing()).await;
        assert_eq!(breaker.phase(), BreakerPhase::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        breaker.call(succeeding()).await.unwrap();
        assert_eq!(breaker.phase(), BreakerPhase::HalfOpen);
        breaker.call(succeeding()).await.unwrap();
        assert_eq!(breaker.phase(), BreakerPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_while_half_open_reopens() {
        let breaker = CircuitBreaker::new("browser", 1, 2, Duration::from_secs(30));
        let _ = breaker.call(failing()).await;
        tokio::time::advance(Duration::from_secs(31)).await;
        let _ = breaker.call(failing()).await;
        assert_eq!(breaker.phase(), BreakerPhase::Open);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("browser", 2, 1, Duration::from_secs(30));
        let _ = breaker.call(failing()).await;
        breaker.call(succeeding()).await.unwrap();
        let _ = breaker.call(failing()).await;
        assert_eq!(breaker.phase(), BreakerPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn late_success_does_not_close_an_open_breaker() {
        let breaker = CircuitBreaker::new("browser", 1, 1, Duration::from_secs(30));
        breaker.check().unwrap();
        let _ = breaker.call(failing()).await;
        assert_eq!(breaker.phase(), BreakerPhase::Open);

        // The call admitted first finishes only now.
        breaker.record_success();
        assert_eq!(breaker.phase(), BreakerPhase::Open);
        assert!(matches!(
            breaker.call(succeeding()).await,
            Err(HarvestError::CircuitOpen { .. })
        ));
    }
}
