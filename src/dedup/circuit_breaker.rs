//! Circuit breaker guarding the dedup cache
//!
//! Closed → Open after `failure_threshold` consecutive failures. While open,
//! calls fail immediately with [`DedupError::CircuitOpen`]. After
//! `reset_timeout` one probe call is let through (half-open); its outcome
//! closes or reopens the breaker.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::DedupError;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Failing, reject calls
    Open,
    /// Testing whether the cache recovered
    HalfOpen,
}

/// Grouped state behind a single lock
#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_progress: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            probe_in_progress: false,
        }
    }
}

/// Circuit breaker for dedup cache failures
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: Arc<Mutex<BreakerState>>,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    /// Create a breaker; a threshold of 0 is treated as 1
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BreakerState::new())),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    /// Create a breaker from configuration
    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(
            config.failure_threshold,
            Duration::from_secs(config.reset_timeout_secs),
        )
    }

    /// Current state, without side effects
    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Run `f` through the breaker.
    ///
    /// The lock is not held while `f` runs.
    pub async fn call<F, R>(&self, f: F) -> Result<R, DedupError>
    where
        F: Future<Output = Result<R, DedupError>>,
    {
        let mut guard = self.state.lock().await;
        match guard.state {
            CircuitState::Open => {
                let elapsed = guard
                    .opened_at
                    .map(|t| t.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if !elapsed {
                    return Err(DedupError::CircuitOpen);
                }
                guard.state = CircuitState::HalfOpen;
                guard.probe_in_progress = true;
                guard.opened_at = Some(Instant::now());
                info!("Dedup circuit breaker transitioning to half-open state");
            }
            CircuitState::HalfOpen => {
                // A probe whose caller was cancelled never reports back
                let stale = guard
                    .opened_at
                    .map(|t| t.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if guard.probe_in_progress && !stale {
                    return Err(DedupError::CircuitOpen);
                }
                guard.probe_in_progress = true;
                guard.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {}
        }
        drop(guard);

        let result = f.await;

        let mut guard = self.state.lock().await;
        match (guard.state, &result) {
            (CircuitState::HalfOpen, Ok(_)) => {
                *guard = BreakerState::new();
                info!("Dedup circuit breaker recovered - transitioning to closed state");
            }
            (CircuitState::HalfOpen, Err(_)) => {
                guard.state = CircuitState::Open;
                guard.opened_at = Some(Instant::now());
                guard.probe_in_progress = false;
                warn!("Dedup circuit breaker probe failed - transitioning back to open state");
            }
            (CircuitState::Closed, Ok(_)) => {
                guard.failure_count = 0;
            }
            (CircuitState::Closed, Err(_)) => {
                guard.failure_count += 1;
                if guard.failure_count >= self.failure_threshold {
                    guard.state = CircuitState::Open;
                    guard.opened_at = Some(Instant::now());
                    warn!(
                        failure_count = guard.failure_count,
                        threshold = self.failure_threshold,
                        "Dedup circuit breaker opened due to repeated failures"
                    );
                }
            }
            (CircuitState::Open, _) => {}
        }

        result
    }
}
