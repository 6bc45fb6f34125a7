//! Batch publishing
//!
//! One stream per tenant, keyed `{key_prefix}:{project_id}`, carrying every
//! event type. A batch is appended as a single entry, so the write is
//! all-or-nothing and events keep their batch order.

pub mod redis;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use tracing::{debug, error};

use crate::auth::{Environment, ProjectId};
use crate::error::PublishError;
use crate::event::{Batch, TelemetryEvent};

pub use redis::RedisEventStream;

/// Opaque position assigned by the stream to an appended batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct StreamOffset(pub String);

impl fmt::Display for StreamOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered per-tenant append-only stream
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Append the whole batch as one entry
    async fn append(&self, batch: &Batch) -> Result<StreamOffset, PublishError>;
}

/// Stream key for a tenant
pub fn stream_key(prefix: &str, project_id: &ProjectId) -> String {
    format!("{prefix}:{project_id}")
}

/// Field/value pairs of one stream entry
pub fn entry_fields(batch: &Batch) -> Result<Vec<(&'static str, String)>, PublishError> {
    let events = serde_json::to_string(&batch.events)
        .map_err(|e| PublishError::Serialization(e.to_string()))?;
    let mut fields = vec![
        ("batch_id", batch.batch_id.to_string()),
        ("project_id", batch.project_id.to_string()),
        (
            "timestamp",
            batch.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
        ("event_count", batch.events.len().to_string()),
    ];
    if let Some(environment) = &batch.environment {
        fields.push(("environment", environment.to_string()));
    }
    fields.push(("events", events));
    Ok(fields)
}

/// Result of a publish call
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReceipt {
    /// Batch identity
    pub batch_id: ulid::Ulid,
    /// Stream position; `None` when there was nothing to write
    pub offset: Option<StreamOffset>,
    /// Events written
    pub event_count: usize,
}

/// Assembles batches and appends them to the event stream
#[derive(Clone)]
pub struct StreamPublisher {
    stream: Arc<dyn EventStream>,
}

impl StreamPublisher {
    /// Create a publisher over `stream`
    pub fn new(stream: Arc<dyn EventStream>) -> Self {
        Self { stream }
    }

    /// Assemble a batch under a fresh id and publish it
    pub async fn publish(
        &self,
        project_id: ProjectId,
        environment: Option<Environment>,
        events: Vec<TelemetryEvent>,
    ) -> Result<PublishReceipt, PublishError> {
        let batch = Batch::assemble(project_id, environment, events);
        self.publish_batch(&batch).await
    }

    /// Publish an assembled batch; an empty batch is not written
    pub async fn publish_batch(&self, batch: &Batch) -> Result<PublishReceipt, PublishError> {
        if batch.is_empty() {
            debug!(batch_id = %batch.batch_id, "Skipping publish of empty batch");
            return Ok(PublishReceipt {
                batch_id: batch.batch_id,
                offset: None,
                event_count: 0,
            });
        }

        match self.stream.append(batch).await {
            Ok(offset) => {
                debug!(
                    batch_id = %batch.batch_id,
                    project_id = %batch.project_id,
                    events = batch.len(),
                    offset = %offset,
                    "Published batch"
                );
                Ok(PublishReceipt {
                    batch_id: batch.batch_id,
                    offset: Some(offset),
                    event_count: batch.len(),
                })
            }
            Err(e) => {
                error!(
                    batch_id = %batch.batch_id,
                    project_id = %batch.project_id,
                    events = batch.len(),
                    error = %e,
                    "Failed to publish batch"
                );
                Err(e)
            }
        }
    }
}
