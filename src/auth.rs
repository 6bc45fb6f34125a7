//! Tenant resolution
//!
//! Every ingestion call runs on behalf of one project. The project is
//! resolved by an [`AuthResolver`] from the request headers; the optional
//! environment sub-scope comes from `X-Environment`.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use axum::http::HeaderMap;
use secrecy::ExposeSecret;
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, ValidationError};

/// Header carrying the optional environment tag
pub const ENVIRONMENT_HEADER: &str = "x-environment";

/// Header carrying an API key when `Authorization` is not used
pub const API_KEY_HEADER: &str = "x-api-key";

/// Longest accepted environment tag
pub const MAX_ENVIRONMENT_LEN: usize = 50;

/// Tenant identifier; never the nil UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(Uuid);

impl ProjectId {
    /// Wrap a UUID, rejecting the nil UUID
    pub fn new(id: Uuid) -> Option<Self> {
        if id.is_nil() { None } else { Some(Self(id)) }
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for ProjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Validated environment tag: `[A-Za-z0-9._-]{1,50}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Environment(String);

impl Environment {
    /// Validate a raw environment tag
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        if raw.len() > MAX_ENVIRONMENT_LEN {
            return Err(ValidationError::InvalidEnvironment(format!(
                "environment must be at most {} characters",
                MAX_ENVIRONMENT_LEN
            )));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(ValidationError::InvalidEnvironment(format!(
                "environment contains invalid character {:?}; allowed: [A-Za-z0-9._-]",
                bad
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Read `X-Environment`; an absent or empty header means no environment
    pub fn from_headers(headers: &HeaderMap) -> Result<Option<Self>, ValidationError> {
        let Some(value) = headers.get(ENVIRONMENT_HEADER) else {
            return Ok(None);
        };
        let raw = value.to_str().map_err(|_| {
            ValidationError::InvalidEnvironment("environment must be ASCII".to_string())
        })?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        Self::parse(raw).map(Some)
    }

    /// Tag as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated scope of one ingestion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    /// Owning project
    pub project_id: ProjectId,
    /// Optional environment sub-scope
    pub environment: Option<Environment>,
}

impl TenantContext {
    /// Create a context
    pub fn new(project_id: ProjectId, environment: Option<Environment>) -> Self {
        Self {
            project_id,
            environment,
        }
    }
}

/// Resolves the calling project from request headers
#[async_trait]
pub trait AuthResolver: Send + Sync {
    /// Resolve the project, or fail; absence is never defaulted
    async fn resolve(&self, headers: &HeaderMap) -> Result<ProjectId, AuthError>;
}

/// Static API-key table loaded from configuration
pub struct ApiKeyResolver {
    keys: HashMap<String, ProjectId>,
}

impl fmt::Debug for ApiKeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyResolver")
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl ApiKeyResolver {
    /// Build from configuration; entries with a nil project id are skipped
    pub fn from_config(config: &AuthConfig) -> Self {
        let keys = config
            .api_keys
            .iter()
            .filter_map(|entry| {
                ProjectId::new(entry.project_id)
                    .map(|project| (entry.key.expose_secret().clone(), project))
            })
            .collect();
        Self { keys }
    }

    /// Build from explicit pairs
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, ProjectId)>,
        K: Into<String>,
    {
        Self {
            keys: pairs.into_iter().map(|(k, p)| (k.into(), p)).collect(),
        }
    }
}

#[async_trait]
impl AuthResolver for ApiKeyResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<ProjectId, AuthError> {
        let key = extract_api_key(headers).ok_or(AuthError::MissingCredentials)?;
        self.keys
            .get(key)
            .copied()
            .ok_or(AuthError::InvalidCredentials)
    }
}

/// `Authorization: Bearer <key>` first, then `X-API-Key`
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}
