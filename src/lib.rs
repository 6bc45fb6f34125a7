//! Telemetry Ingestion Library
//!
//! Receives OpenTelemetry Protocol (OTLP) traces, logs and metrics over HTTP,
//! converts them into canonical telemetry events, deduplicates them per
//! project and publishes them in batches to per-project event streams.
//!
//! # Features
//!
//! - OTLP/HTTP reception (protobuf and JSON, optionally gzip-compressed)
//! - Direct batch submission of canonical events
//! - Per-project deduplication backed by Redis or memory
//! - Redis stream publishing, one entry per batch
//! - Configurable via YAML, environment variables, or programmatic API
//! - Mock event stream for testing
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use telemetry_ingest::{ApiKeyResolver, AppState, Config, IngestPipeline, OtlpHttpServer};
//!
//! # async fn example() -> Result<(), telemetry_ingest::IngestError> {
//! let config = Config::default();
//! let pipeline = IngestPipeline::from_config(&config, Default::default()).await?;
//! let auth = Arc::new(ApiKeyResolver::from_config(&config.auth));
//!
//! let server = OtlpHttpServer::new(config.server.clone(), AppState::new(pipeline, auth));
//! server.serve(async {}).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod config;
pub mod dedup;
pub mod error;
pub mod event;
pub mod metrics;
pub mod mock;
pub mod otlp;
pub mod stream;

// Re-export public API
pub use api::{BatchOutcome, IngestPipeline, OtlpIngestOutcome, ValidationReport};
pub use auth::{ApiKeyResolver, AuthResolver, Environment, ProjectId, TenantContext};
pub use config::{Config, ConfigBuilder, ConfigLoader};
pub use dedup::{DedupCache, DedupDecision, DedupEngine};
pub use error::{
    ConfigError, ConversionError, DecodeError, DedupError, IngestError, PublishError, ServerError,
    ValidationError,
};
pub use event::{Batch, BatchResult, EventType, TelemetryEvent};
pub use metrics::IngestMetrics;
pub use mock::MockEventStream;
pub use otlp::{AppState, OtlpHttpServer, ProtocolDecoder, router};
pub use stream::{EventStream, StreamPublisher};

use tracing_subscriber::EnvFilter;

/// Initialize structured logging
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}
