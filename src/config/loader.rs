//! Configuration loader
//!
//! Loads configuration from YAML files, environment variables, or programmatic API.
//! Priority: environment variables > provided config > defaults

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use secrecy::SecretString;
use uuid::Uuid;

use crate::config::types::{ApiKeyConfig, Config, RedisConfig};
use crate::error::ConfigError;
use tracing::{debug, info, warn};

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "OTLP_INGEST_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from YAML file
    pub fn from_yaml(path: impl AsRef<std::path::Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        info!(
            config_path = %path.display(),
            "Loading configuration from YAML file"
        );

        let content = std::fs::read_to_string(path).map_err(|e| {
            warn!(
                config_path = %path.display(),
                error = %e,
                "Failed to read configuration file"
            );
            ConfigError::ReadFailed(e.to_string())
        })?;

        debug!(
            config_path = %path.display(),
            file_size_bytes = content.len(),
            "Read configuration file"
        );

        let config = Self::from_yaml_str(&content).map_err(|e| {
            warn!(
                config_path = %path.display(),
                error = %e,
                "Failed to load YAML configuration"
            );
            e
        })?;

        info!(
            config_path = %path.display(),
            port = config.server.port,
            dedup_backend = ?config.dedup.backend,
            stream_backend = ?config.stream.backend,
            unavailable_policy = config.dedup.unavailable_policy.as_str(),
            "Configuration loaded and validated successfully"
        );

        Ok(config)
    }

    /// Parse, override and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Config, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ValidationFailed(format!("Failed to parse YAML: {}", e)))?;

        Self::apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Config, ConfigError> {
        info!("Loading configuration from environment variables");
        Self::load(None)
    }

    /// Load configuration with priority: environment variables > provided config > defaults
    pub fn load(provided: Option<Config>) -> Result<Config, ConfigError> {
        if provided.is_some() {
            info!("Loading configuration with provided config and environment variable overrides");
        } else {
            info!("Loading configuration with defaults and environment variable overrides");
        }

        let mut config = provided.unwrap_or_default();

        Self::apply_env_overrides(&mut config);

        debug!("Applied environment variable overrides");

        config.validate().map_err(|e| {
            warn!(
                error = %e,
                "Configuration validation failed"
            );
            e
        })?;

        info!(
            bind_address = %config.server.bind_address,
            port = config.server.port,
            dedup_backend = ?config.dedup.backend,
            stream_backend = ?config.stream.backend,
            "Configuration loaded and validated successfully"
        );

        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(config: &mut Config) {
        if let Some(address) = env_var("BIND_ADDRESS") {
            config.server.bind_address = address;
        }
        if let Some(port) = parse_env("PORT") {
            config.server.port = port;
        }
        if let Some(bytes) = parse_env("MAX_BODY_BYTES") {
            config.server.max_body_bytes = bytes;
        }
        if let Some(bytes) = parse_env("MAX_DECOMPRESSED_BYTES") {
            config.server.max_decompressed_bytes = bytes;
        }
        if let Some(max) = parse_env("MAX_EVENTS_PER_BATCH") {
            config.server.max_events_per_batch = max;
        }

        if let Some(backend) = parse_env("DEDUP_BACKEND") {
            config.dedup.backend = backend;
        }
        if let Some(secs) = parse_env("DEDUP_TTL_SECS") {
            config.dedup.ttl_secs = secs;
        }
        if let Some(policy) = parse_env("DEDUP_UNAVAILABLE_POLICY") {
            config.dedup.unavailable_policy = policy;
        }
        if let Some(ms) = parse_env("DEDUP_CACHE_TIMEOUT_MS") {
            config.dedup.cache_timeout_ms = ms;
        }

        if let Some(backend) = parse_env("STREAM_BACKEND") {
            config.stream.backend = backend;
        }
        if let Some(prefix) = env_var("STREAM_KEY_PREFIX") {
            config.stream.key_prefix = prefix;
        }
        if let Some(max_len) = parse_env("STREAM_MAX_LEN") {
            config.stream.max_len = Some(max_len);
        }

        // Secret: value is never logged
        if let Ok(url) = env::var(format!("{ENV_PREFIX}REDIS_URL")) {
            debug!(
                env_var = "OTLP_INGEST_REDIS_URL",
                "Applying environment variable override"
            );
            config.redis = Some(RedisConfig {
                url: SecretString::new(url),
            });
        }

        // OTLP_INGEST_API_KEYS=key1:project-uuid,key2:project-uuid
        if let Ok(raw) = env::var(format!("{ENV_PREFIX}API_KEYS")) {
            let mut keys = Vec::new();
            for (i, pair) in raw.split(',').filter(|p| !p.trim().is_empty()).enumerate() {
                match pair.trim().rsplit_once(':') {
                    Some((key, project)) => match Uuid::parse_str(project) {
                        Ok(project_id) => keys.push(ApiKeyConfig {
                            key: SecretString::new(key.to_string()),
                            project_id,
                        }),
                        Err(e) => warn!(
                            env_var = "OTLP_INGEST_API_KEYS",
                            entry = i,
                            error = %e,
                            "Ignoring API key entry with invalid project id"
                        ),
                    },
                    None => warn!(
                        env_var = "OTLP_INGEST_API_KEYS",
                        entry = i,
                        "Ignoring API key entry without ':' separator"
                    ),
                }
            }
            debug!(
                env_var = "OTLP_INGEST_API_KEYS",
                count = keys.len(),
                "Applying environment variable override"
            );
            config.auth.api_keys = keys;
        }

        if let Some(endpoint) = env_var("TELEMETRY_OTLP_ENDPOINT") {
            config.telemetry.otlp_endpoint = Some(endpoint);
        }
        if let Some(secs) = parse_env("TELEMETRY_EXPORT_INTERVAL_SECS") {
            config.telemetry.export_interval_secs = secs;
        }
    }
}

fn env_var(suffix: &str) -> Option<String> {
    let name = format!("{ENV_PREFIX}{suffix}");
    let value = env::var(&name).ok()?;
    debug!(
        env_var = %name,
        value = %value,
        "Applying environment variable override"
    );
    Some(value)
}

fn parse_env<T>(suffix: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let name = format!("{ENV_PREFIX}{suffix}");
    let raw = env::var(&name).ok()?;
    match raw.parse::<T>() {
        Ok(value) => {
            debug!(
                env_var = %name,
                value = %raw,
                "Applying environment variable override"
            );
            Some(value)
        }
        Err(e) => {
            warn!(
                env_var = %name,
                value = %raw,
                error = %e,
                "Failed to parse environment variable, using default"
            );
            None
        }
    }
}
