//! Configuration module
//!
//! Provides configuration management for the ingestion service including
//! loading from YAML files, environment variables, and programmatic API.

pub mod loader;
pub mod types;

pub use loader::{ConfigLoader, ENV_PREFIX};
pub use types::{
    ApiKeyConfig, AuthConfig, BackendKind, CircuitBreakerConfig, Config, ConfigBuilder,
    DedupConfig, MAX_BODY_BYTES, RedisConfig, ServerConfig, StreamConfig, TelemetryConfig,
    UnavailablePolicy,
};
