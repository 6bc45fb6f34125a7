//! Deduplication engine
//!
//! Trace, observation and score events submitted through the batch endpoint
//! are claimed in a keyed cache under `dedup:{project_id}:{event_id}` with a
//! server-controlled TTL. The first claim wins; later claims within the TTL
//! are duplicates. Log and metric events never touch the cache.
//!
//! When the cache cannot be reached the configured [`UnavailablePolicy`]
//! decides: `fail_closed` surfaces an error, `fail_open` admits the event.
//! Both are logged with `dedup_degraded = true`.

pub mod cache;
pub mod circuit_breaker;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::auth::ProjectId;
use crate::config::{DedupConfig, UnavailablePolicy};
use crate::error::DedupError;
use crate::event::TelemetryEvent;

pub use cache::MemoryDedupCache;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use redis::RedisDedupCache;

/// Keyed cache with atomic claim semantics
#[async_trait]
pub trait DedupCache: Send + Sync {
    /// Record `key` for `ttl` if absent. Returns `true` when this call
    /// created the entry, `false` when it already existed.
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, DedupError>;

    /// Forget `key`
    async fn release(&self, key: &str) -> Result<(), DedupError>;
}

/// Outcome of checking one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// Event kind is not deduplicated
    NotApplicable,
    /// First sighting; the id is now recorded
    Claimed,
    /// Already accepted within the TTL
    Duplicate,
    /// Cache unavailable and policy is `fail_open`
    AdmittedDegraded,
}

impl DedupDecision {
    /// Whether the event continues to the publisher
    pub fn is_admitted(&self) -> bool {
        !matches!(self, DedupDecision::Duplicate)
    }
}

/// Applies the dedup policy to events
#[derive(Clone)]
pub struct DedupEngine {
    cache: Arc<dyn DedupCache>,
    breaker: CircuitBreaker,
    ttl: Duration,
    cache_timeout: Duration,
    policy: UnavailablePolicy,
}

impl DedupEngine {
    /// Create an engine over `cache` with the configured TTL, timeout,
    /// breaker and unavailability policy
    pub fn new(cache: Arc<dyn DedupCache>, config: &DedupConfig) -> Self {
        Self {
            cache,
            breaker: CircuitBreaker::from_config(&config.circuit_breaker),
            ttl: config.ttl(),
            cache_timeout: config.cache_timeout(),
            policy: config.unavailable_policy,
        }
    }

    /// Engine over a fresh in-memory cache
    pub fn in_memory(config: &DedupConfig) -> Self {
        Self::new(Arc::new(MemoryDedupCache::new()), config)
    }

    /// Configured unavailability policy
    pub fn policy(&self) -> UnavailablePolicy {
        self.policy
    }

    /// Cache key for an event id
    pub fn key(project_id: &ProjectId, event_id: &str) -> String {
        format!("dedup:{project_id}:{event_id}")
    }

    /// Decide whether `event` is new.
    ///
    /// Returns `Err` only when the cache is unavailable under `fail_closed`.
    pub async fn check(
        &self,
        project_id: &ProjectId,
        event: &TelemetryEvent,
    ) -> Result<DedupDecision, DedupError> {
        if !event.event_type.is_deduplicated() {
            return Ok(DedupDecision::NotApplicable);
        }

        let event_id = event.event_id.to_string();
        let key = Self::key(project_id, &event_id);
        let timeout = self.cache_timeout;
        let claimed = self
            .breaker
            .call(async {
                tokio::time::timeout(timeout, self.cache.claim(&key, self.ttl))
                    .await
                    .map_err(|_| {
                        DedupError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
                    })?
            })
            .await;

        match claimed {
            Ok(true) => Ok(DedupDecision::Claimed),
            Ok(false) => {
                debug!(
                    project_id = %project_id,
                    event_id = %event_id,
                    event_type = %event.event_type,
                    "Duplicate event dropped"
                );
                Ok(DedupDecision::Duplicate)
            }
            Err(error) => {
                warn!(
                    dedup_degraded = true,
                    policy = self.policy.as_str(),
                    project_id = %project_id,
                    event_id = %event_id,
                    error = %error,
                    "Dedup cache unavailable"
                );
                match self.policy {
                    UnavailablePolicy::FailOpen => Ok(DedupDecision::AdmittedDegraded),
                    UnavailablePolicy::FailClosed => Err(error),
                }
            }
        }
    }

    /// Release claims taken for events that were not published.
    ///
    /// Best effort: failures are logged and otherwise ignored.
    pub async fn release(&self, project_id: &ProjectId, event_ids: &[String]) {
        for event_id in event_ids {
            let key = Self::key(project_id, event_id);
            let result = tokio::time::timeout(self.cache_timeout, self.cache.release(&key)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    warn!(event_id = %event_id, error = %error, "Failed to release dedup claim");
                }
                Err(_) => {
                    warn!(event_id = %event_id, "Timed out releasing dedup claim");
                }
            }
        }
    }
}
