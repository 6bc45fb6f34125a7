//! Configuration type definitions
//!
//! Defines all configuration structures for the ingestion service.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::ConfigError;

/// Hard ceiling for the wire body size of a single ingestion request (10 MiB)
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Backend used for the dedup cache or the event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process backend, for development and tests
    #[default]
    Memory,
    /// Redis backend
    Redis,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            other => Err(ConfigError::ValidationFailed(format!(
                "Unknown backend '{}', expected 'memory' or 'redis'",
                other
            ))),
        }
    }
}

/// What to do with a dedup-eligible event when the dedup cache cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailablePolicy {
    /// Fail the request with `dedup_unavailable` (503)
    #[default]
    FailClosed,
    /// Admit the event without a dedup check
    FailOpen,
}

impl UnavailablePolicy {
    /// Label used in logs and metric attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            UnavailablePolicy::FailClosed => "fail_closed",
            UnavailablePolicy::FailOpen => "fail_open",
        }
    }
}

impl FromStr for UnavailablePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail_closed" | "fail-closed" => Ok(Self::FailClosed),
            "fail_open" | "fail-open" => Ok(Self::FailOpen),
            other => Err(ConfigError::ValidationFailed(format!(
                "Unknown dedup unavailable policy '{}', expected 'fail_closed' or 'fail_open'",
                other
            ))),
        }
    }
}

/// HTTP server and request limits
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to listen on (default: 4318, standard OTLP/HTTP port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum wire body size in bytes (default and maximum: 10 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Maximum size of a gzip body after decompression (default: 64 MiB)
    #[serde(default = "default_max_decompressed_bytes")]
    pub max_decompressed_bytes: usize,

    /// Maximum events accepted by one batch submission (default: 1000)
    #[serde(default = "default_max_events_per_batch")]
    pub max_events_per_batch: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            max_decompressed_bytes: default_max_decompressed_bytes(),
            max_events_per_batch: default_max_events_per_batch(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.is_empty() {
            return Err(ConfigError::MissingRequiredField(
                "server.bind_address cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(ConfigError::ValidationFailed(
                "Server port must be between 1 and 65535".to_string(),
            ));
        }

        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES {
            return Err(ConfigError::InvalidLimit(format!(
                "max_body_bytes must be between 1 and {} bytes",
                MAX_BODY_BYTES
            )));
        }

        if self.max_decompressed_bytes < self.max_body_bytes {
            return Err(ConfigError::InvalidLimit(
                "max_decompressed_bytes must be at least max_body_bytes".to_string(),
            ));
        }

        if self.max_events_per_batch == 0 || self.max_events_per_batch > 10_000 {
            return Err(ConfigError::InvalidLimit(
                "max_events_per_batch must be between 1 and 10000".to_string(),
            ));
        }

        Ok(())
    }
}

/// Circuit breaker guarding the dedup cache
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens (default: 5)
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the breaker stays open before probing again (default: 30)
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

/// Deduplication settings
///
/// The TTL is server-controlled only; clients cannot shorten it.
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Cache backend (default: memory)
    #[serde(default)]
    pub backend: BackendKind,

    /// How long an accepted event id is remembered (default: 86400)
    #[serde(default = "default_dedup_ttl_secs")]
    pub ttl_secs: u64,

    /// Behaviour when the cache cannot be reached (default: fail_closed)
    #[serde(default)]
    pub unavailable_policy: UnavailablePolicy,

    /// Per-call cache timeout in milliseconds (default: 250)
    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,

    /// Circuit breaker settings
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            ttl_secs: default_dedup_ttl_secs(),
            unavailable_policy: UnavailablePolicy::default(),
            cache_timeout_ms: default_cache_timeout_ms(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl DedupConfig {
    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Cache timeout as a duration
    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    /// Validate dedup configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs < 60 {
            return Err(ConfigError::InvalidLimit(
                "Dedup TTL must be at least 60 seconds".to_string(),
            ));
        }

        if self.ttl_secs > 7 * 86400 {
            return Err(ConfigError::InvalidLimit(
                "Dedup TTL must be at most 604800 seconds (7 days)".to_string(),
            ));
        }

        if self.cache_timeout_ms == 0 {
            return Err(ConfigError::InvalidLimit(
                "Dedup cache timeout must be greater than 0".to_string(),
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidLimit(
                "Circuit breaker failure threshold must be greater than 0".to_string(),
            ));
        }

        if self.circuit_breaker.reset_timeout_secs == 0 {
            return Err(ConfigError::InvalidLimit(
                "Circuit breaker reset timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Event stream settings
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Stream backend (default: memory)
    #[serde(default)]
    pub backend: BackendKind,

    /// Stream key prefix; the tenant stream is `{key_prefix}:{project_id}`
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Approximate per-tenant stream length cap (default: none)
    #[serde(default)]
    pub max_len: Option<usize>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            key_prefix: default_key_prefix(),
            max_len: None,
        }
    }
}

impl StreamConfig {
    /// Validate stream configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty() || self.key_prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationFailed(
                "Stream key prefix must be non-empty and contain no whitespace".to_string(),
            ));
        }

        if self.max_len == Some(0) {
            return Err(ConfigError::InvalidLimit(
                "Stream max_len must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Redis connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://127.0.0.1:6379/0`
    pub url: SecretString,
}

impl RedisConfig {
    /// Validate the connection URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        let raw = self.url.expose_secret();
        if raw.is_empty() {
            return Err(ConfigError::InvalidUrl(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        let parsed = url::Url::parse(raw)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid Redis URL: {}", e)))?;

        match parsed.scheme() {
            "redis" | "rediss" | "unix" | "redis+unix" => Ok(()),
            scheme => Err(ConfigError::InvalidUrl(format!(
                "Redis URL must use redis://, rediss:// or unix:// scheme, got {}://",
                scheme
            ))),
        }
    }
}

/// One API key mapped to the project it authenticates
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    /// The key presented by clients
    pub key: SecretString,

    /// Project the key belongs to
    pub project_id: Uuid,
}

/// Static API-key authentication
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Known API keys
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

impl AuthConfig {
    /// Validate authentication configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (i, entry) in self.api_keys.iter().enumerate() {
            let key = entry.key.expose_secret();
            if key.is_empty() {
                return Err(ConfigError::MissingRequiredField(format!(
                    "auth.api_keys[{}].key cannot be empty",
                    i
                )));
            }
            if entry.project_id.is_nil() {
                return Err(ConfigError::ValidationFailed(format!(
                    "auth.api_keys[{}].project_id cannot be the nil UUID",
                    i
                )));
            }
            if !seen.insert(key.as_str()) {
                return Err(ConfigError::ValidationFailed(format!(
                    "auth.api_keys[{}] duplicates an earlier key",
                    i
                )));
            }
        }
        Ok(())
    }
}

/// Export of the service's own metrics
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for self-metrics; metrics stay in-process when unset
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Export interval in seconds (default: 60)
    #[serde(default = "default_export_interval_secs")]
    pub export_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            export_interval_secs: default_export_interval_secs(),
        }
    }
}

impl TelemetryConfig {
    /// Validate telemetry configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref endpoint) = self.otlp_endpoint {
            if endpoint.is_empty() {
                return Err(ConfigError::InvalidUrl(
                    "Telemetry endpoint cannot be empty when set".to_string(),
                ));
            }
            let parsed = url::Url::parse(endpoint).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid telemetry endpoint: {}", e))
            })?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(ConfigError::InvalidUrl(
                    "Telemetry endpoint must use http:// or https:// scheme".to_string(),
                ));
            }
        }

        if self.export_interval_secs == 0 {
            return Err(ConfigError::InvalidLimit(
                "Telemetry export interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Main configuration structure for the ingestion service
///
/// # Configuration Sources
///
/// Configuration can be loaded from:
/// - YAML files
/// - Environment variables (with `OTLP_INGEST_*` prefix)
/// - Programmatic API (using `ConfigBuilder`)
///
/// # Default Values
///
/// - `server`: `0.0.0.0:4318`, 10 MiB body limit, 1000 events per batch
/// - `dedup`: in-memory cache, 24 hour TTL, fail-closed
/// - `stream`: in-memory stream, `telemetry:events` key prefix
/// - `redis`: unset (required when any backend is `redis`)
///
/// # Example
///
/// ```no_run
/// use telemetry_ingest::ConfigBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConfigBuilder::new()
///     .port(14318)
///     .max_events_per_batch(500)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Deduplication settings
    #[serde(default)]
    pub dedup: DedupConfig,

    /// Event stream settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Redis connection, shared by the redis backends
    #[serde(default)]
    pub redis: Option<RedisConfig>,

    /// API-key authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Self-metrics export
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.dedup.validate()?;
        self.stream.validate()?;
        self.auth.validate()?;
        self.telemetry.validate()?;

        let needs_redis =
            self.dedup.backend == BackendKind::Redis || self.stream.backend == BackendKind::Redis;
        match (&self.redis, needs_redis) {
            (Some(redis), _) => redis.validate()?,
            (None, true) => {
                return Err(ConfigError::MissingRequiredField(
                    "redis.url is required when a redis backend is selected".to_string(),
                ));
            }
            (None, false) => {}
        }

        Ok(())
    }
}

/// Builder for creating configurations programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set bind address
    pub fn bind_address(mut self, address: impl Into<String>) -> Self {
        self.config.server.bind_address = address.into();
        self
    }

    /// Set listen port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set maximum wire body size
    pub fn max_body_bytes(mut self, bytes: usize) -> Self {
        self.config.server.max_body_bytes = bytes;
        self
    }

    /// Set maximum decompressed body size
    pub fn max_decompressed_bytes(mut self, bytes: usize) -> Self {
        self.config.server.max_decompressed_bytes = bytes;
        self
    }

    /// Set maximum events per batch submission
    pub fn max_events_per_batch(mut self, max: usize) -> Self {
        self.config.server.max_events_per_batch = max;
        self
    }

    /// Set dedup configuration
    pub fn dedup(mut self, dedup: DedupConfig) -> Self {
        self.config.dedup = dedup;
        self
    }

    /// Set dedup TTL in seconds
    pub fn dedup_ttl_secs(mut self, secs: u64) -> Self {
        self.config.dedup.ttl_secs = secs;
        self
    }

    /// Set dedup unavailable policy
    pub fn unavailable_policy(mut self, policy: UnavailablePolicy) -> Self {
        self.config.dedup.unavailable_policy = policy;
        self
    }

    /// Set stream configuration
    pub fn stream(mut self, stream: StreamConfig) -> Self {
        self.config.stream = stream;
        self
    }

    /// Set Redis connection URL
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.config.redis = Some(RedisConfig {
            url: SecretString::new(url.into()),
        });
        self
    }

    /// Register an API key for a project
    pub fn api_key(mut self, key: impl Into<String>, project_id: Uuid) -> Self {
        self.config.auth.api_keys.push(ApiKeyConfig {
            key: SecretString::new(key.into()),
            project_id,
        });
        self
    }

    /// Set self-metrics OTLP endpoint
    pub fn telemetry_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.telemetry.otlp_endpoint = Some(endpoint.into());
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4318
}

fn default_max_body_bytes() -> usize {
    MAX_BODY_BYTES
}

fn default_max_decompressed_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_max_events_per_batch() -> usize {
    1000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_secs() -> u64 {
    30
}

fn default_dedup_ttl_secs() -> u64 {
    86400
}

fn default_cache_timeout_ms() -> u64 {
    250
}

fn default_key_prefix() -> String {
    "telemetry:events".to_string()
}

fn default_export_interval_secs() -> u64 {
    60
}
