//! Redis-backed dedup cache
//!
//! `SET key 1 NX PX ttl` is the atomic claim: only the first caller for a key
//! gets `OK` back. Uses [`ConnectionManager`] for automatic reconnection.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::RedisConfig;
use crate::dedup::DedupCache;
use crate::error::{DedupError, ServerError};

/// Dedup cache stored in Redis
#[derive(Clone)]
pub struct RedisDedupCache {
    connection: ConnectionManager,
}

impl RedisDedupCache {
    /// Connect using the configured URL
    pub async fn connect(config: &RedisConfig) -> Result<Self, ServerError> {
        let client = redis::Client::open(config.url.expose_secret().as_str())
            .map_err(|e| ServerError::BackendError(format!("Invalid Redis URL: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| ServerError::BackendError(format!("Failed to connect to Redis: {e}")))?;
        info!("Connected dedup cache to Redis");
        Ok(Self::from_connection(connection))
    }

    /// Wrap an existing connection
    pub fn from_connection(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl DedupCache for RedisDedupCache {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool, DedupError> {
        let mut conn = self.connection.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await
            .map_err(|e| DedupError::Unavailable(format!("Redis SET NX failed: {e}")))?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str) -> Result<(), DedupError> {
        let mut conn = self.connection.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| DedupError::Unavailable(format!("Redis DEL failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    async fn test_cache() -> RedisDedupCache {
        let url = std::env::var("OTLP_INGEST_REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let config = RedisConfig {
            url: SecretString::new(url),
        };
        RedisDedupCache::connect(&config).await.unwrap()
    }

    #[tokio::test]
    #[ignore = "requires a running Redis instance"]
    async fn test_set_nx_claim() {
        let cache = test_cache().await;
        let key = format!("dedup:test:{}", ulid::Ulid::new());
        let ttl = Duration::from_secs(60);

        assert!(cache.claim(&key, ttl).await.unwrap());
        assert!(!cache.claim(&key, ttl).await.unwrap());
        cache.release(&key).await.unwrap();
        assert!(cache.claim(&key, ttl).await.unwrap());
        cache.release(&key).await.unwrap();
    }
}
