//! Redis Streams event stream
//!
//! `XADD {key_prefix}:{project_id} [MAXLEN ~ n] * field value ...`, one entry
//! per batch. The entry id returned by Redis is the stream offset.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use secrecy::ExposeSecret;
use tracing::info;

use crate::config::{RedisConfig, StreamConfig};
use crate::error::{PublishError, ServerError};
use crate::event::Batch;
use crate::stream::{EventStream, StreamOffset, entry_fields, stream_key};

/// Event stream backed by Redis Streams
#[derive(Clone)]
pub struct RedisEventStream {
    connection: ConnectionManager,
    key_prefix: String,
    max_len: Option<usize>,
}

impl RedisEventStream {
    /// Connect using the configured URL
    pub async fn connect(redis: &RedisConfig, stream: &StreamConfig) -> Result<Self, ServerError> {
        let client = redis::Client::open(redis.url.expose_secret().as_str())
            .map_err(|e| ServerError::BackendError(format!("Invalid Redis URL: {e}")))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| ServerError::BackendError(format!("Failed to connect to Redis: {e}")))?;
        info!(key_prefix = %stream.key_prefix, "Connected event stream to Redis");
        Ok(Self::from_connection(connection, stream))
    }

    /// Wrap an existing connection
    pub fn from_connection(connection: ConnectionManager, stream: &StreamConfig) -> Self {
        Self {
            connection,
            key_prefix: stream.key_prefix.clone(),
            max_len: stream.max_len,
        }
    }
}

#[async_trait]
impl EventStream for RedisEventStream {
    async fn append(&self, batch: &Batch) -> Result<StreamOffset, PublishError> {
        let key = stream_key(&self.key_prefix, &batch.project_id);
        let fields = entry_fields(batch)?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&key);
        if let Some(max_len) = self.max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*");
        for (field, value) in &fields {
            cmd.arg(*field).arg(value);
        }

        let mut conn = self.connection.clone();
        let id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| PublishError::Unavailable(format!("Redis XADD failed: {e}")))?;
        Ok(StreamOffset(id))
    }
}
