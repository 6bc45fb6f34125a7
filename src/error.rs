//! Error types for the telemetry ingestion pipeline
//!
//! Every client-visible error carries a stable machine-readable code (see
//! [`IngestError::code`]) and maps to a single HTTP status.

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Main error type for the ingestion pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport or decode failure; terminal for the whole request
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Request-level validation failure
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Authentication failure
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Dedup cache could not be consulted
    #[error("Dedup error: {0}")]
    Dedup(#[from] DedupError),

    /// Stream write failed; the whole batch is considered lost
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Duplicates found while the caller asked for strict exactly-once semantics
    #[error("{} duplicate event(s) rejected", .0.len())]
    DuplicateEvents(Vec<String>),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server-related errors
    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

impl IngestError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Config(_) => "configuration_error",
            IngestError::Decode(e) => e.code(),
            IngestError::Validation(e) => e.code(),
            IngestError::Auth(_) => "unauthenticated",
            IngestError::Dedup(_) => "dedup_unavailable",
            IngestError::Publish(_) => "publish_failed",
            IngestError::DuplicateEvents(_) => "duplicate_events",
            IngestError::Io(_) | IngestError::Server(_) => "internal_error",
        }
    }

    /// HTTP status this error is surfaced as
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::Decode(e) => e.status_code(),
            IngestError::Validation(e) => e.status_code(),
            IngestError::Auth(_) => StatusCode::UNAUTHORIZED,
            IngestError::Dedup(_) => StatusCode::SERVICE_UNAVAILABLE,
            IngestError::DuplicateEvents(_) => StatusCode::CONFLICT,
            IngestError::Config(_)
            | IngestError::Publish(_)
            | IngestError::Io(_)
            | IngestError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Field-level problems attached to the error, if any
    pub fn details(&self) -> &[FieldError] {
        match self {
            IngestError::Validation(ValidationError::Fields(errors)) => errors,
            _ => &[],
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid numeric limit or interval
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    /// Missing required configuration field
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// Invalid URL format
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    /// Config file could not be read
    #[error("Failed to read config file: {0}")]
    ReadFailed(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Transport and decode errors raised while turning a request body into an
/// OTLP export request
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Content-Type missing or not one of the accepted media types
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Content-Encoding other than gzip or identity
    #[error("Unsupported content encoding: {0}")]
    UnsupportedContentEncoding(String),

    /// Wire body exceeded the configured ceiling
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Limit that was exceeded
        limit: usize,
    },

    /// Decompressed body exceeded the configured ceiling
    #[error("Decompressed body exceeds {limit} bytes")]
    DecompressedTooLarge {
        /// Limit that was exceeded
        limit: usize,
    },

    /// Body claimed gzip but could not be inflated
    #[error("Failed to decompress request body: {0}")]
    DecompressionFailed(String),

    /// Body is not a valid protobuf export request
    #[error("Malformed protobuf payload: {0}")]
    InvalidProtobuf(String),

    /// Body is not a valid OTLP/JSON export request
    #[error("Malformed JSON payload: {0}")]
    InvalidJson(String),

    /// Export request contains no resource groups
    #[error("Export request contains no {0}")]
    EmptyRequest(&'static str),

    /// Reading the body from the connection failed
    #[error("Failed to read request body: {0}")]
    BodyRead(String),
}

impl DecodeError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::UnsupportedMediaType(_) => "unsupported_media_type",
            DecodeError::UnsupportedContentEncoding(_) => "unsupported_content_encoding",
            DecodeError::PayloadTooLarge { .. } | DecodeError::DecompressedTooLarge { .. } => {
                "payload_too_large"
            }
            DecodeError::DecompressionFailed(_) => "decompression_failed",
            DecodeError::InvalidProtobuf(_) => "invalid_protobuf",
            DecodeError::InvalidJson(_) => "invalid_json",
            DecodeError::EmptyRequest(_) => "empty_request",
            DecodeError::BodyRead(_) => "body_read_failed",
        }
    }

    /// HTTP status this error is surfaced as
    pub fn status_code(&self) -> StatusCode {
        match self {
            DecodeError::UnsupportedMediaType(_) | DecodeError::UnsupportedContentEncoding(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            DecodeError::PayloadTooLarge { .. } | DecodeError::DecompressedTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// One field-level validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `events[3].event_id`
    pub field: String,
    /// Stable machine-readable code
    pub code: &'static str,
    /// Human-readable message
    pub message: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Per-record conversion failure on the OTLP path; isolated to that record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Trace id has the wrong length
    #[error("trace_id must be 16 bytes, got {0}")]
    InvalidTraceId(usize),

    /// Trace id is all zeros
    #[error("trace_id must not be all zeros")]
    ZeroTraceId,

    /// Span id has the wrong length
    #[error("span_id must be 8 bytes, got {0}")]
    InvalidSpanId(usize),

    /// Span id is all zeros
    #[error("span_id must not be all zeros")]
    ZeroSpanId,

    /// Parent span id is neither empty nor 8 bytes
    #[error("parent_span_id must be empty or 8 bytes, got {0}")]
    InvalidParentSpanId(usize),

    /// Parent span id equals the span's own id
    #[error("span {0} lists itself as parent")]
    ParentIsSelf(String),

    /// Start time is after end time
    #[error("start_time_unix_nano {start} is after end_time_unix_nano {end}")]
    StartAfterEnd {
        /// Start, nanoseconds since epoch
        start: u64,
        /// End, nanoseconds since epoch
        end: u64,
    },

    /// Payload could not be encoded
    #[error("failed to encode payload: {0}")]
    Payload(String),
}

impl ConversionError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ConversionError::InvalidTraceId(_) | ConversionError::ZeroTraceId => {
                "invalid_trace_id"
            }
            ConversionError::InvalidSpanId(_) | ConversionError::ZeroSpanId => "invalid_span_id",
            ConversionError::InvalidParentSpanId(_) | ConversionError::ParentIsSelf(_) => {
                "invalid_parent_span_id"
            }
            ConversionError::StartAfterEnd { .. } => "invalid_time_range",
            ConversionError::Payload(_) => "payload_encoding_failed",
        }
    }
}

impl From<serde_json::Error> for ConversionError {
    fn from(err: serde_json::Error) -> Self {
        ConversionError::Payload(err.to_string())
    }
}

/// Request-level validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    /// `X-Environment` header failed the tag rules
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Body could not be parsed as the expected JSON document
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Batch submission carried no events
    #[error("Batch contains no events")]
    EmptyBatch,

    /// Batch submission exceeded the configured event count
    #[error("Batch contains {count} events, maximum is {max}")]
    BatchTooLarge {
        /// Number of events submitted
        count: usize,
        /// Configured maximum
        max: usize,
    },

    /// One or more fields failed validation; all problems are listed
    #[error("{} field(s) failed validation", .0.len())]
    Fields(Vec<FieldError>),
}

impl ValidationError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidEnvironment(_) => "invalid_environment",
            ValidationError::InvalidBody(_) => "invalid_json",
            ValidationError::EmptyBatch => "empty_batch",
            ValidationError::BatchTooLarge { .. } => "batch_too_large",
            ValidationError::Fields(_) => "validation_failed",
        }
    }

    /// HTTP status this error is surfaced as
    pub fn status_code(&self) -> StatusCode {
        match self {
            ValidationError::InvalidEnvironment(_) | ValidationError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ValidationError::EmptyBatch
            | ValidationError::BatchTooLarge { .. }
            | ValidationError::Fields(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

/// Authentication errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No credential was presented
    #[error("Missing API key")]
    MissingCredentials,

    /// Credential was presented but not recognised
    #[error("Invalid API key")]
    InvalidCredentials,
}

/// Dedup cache errors
#[derive(Error, Debug, Clone)]
pub enum DedupError {
    /// Cache backend returned an error
    #[error("Dedup cache unavailable: {0}")]
    Unavailable(String),

    /// Cache call did not complete in time
    #[error("Dedup cache timed out after {0} ms")]
    Timeout(u64),

    /// Circuit breaker is rejecting calls
    #[error("Dedup circuit breaker is open")]
    CircuitOpen,
}

/// Stream publish errors
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    /// Broker could not be reached or rejected the write
    #[error("Stream broker unavailable: {0}")]
    Unavailable(String),

    /// Batch could not be encoded for the stream
    #[error("Failed to encode batch: {0}")]
    Serialization(String),
}

/// Server-related errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind server address
    #[error("Failed to bind server address: {0}")]
    BindError(String),

    /// Failed to start server
    #[error("Failed to start server: {0}")]
    StartupError(String),

    /// Backend connection failed at startup
    #[error("Failed to connect backend: {0}")]
    BackendError(String),

    /// Ingestion task aborted or panicked
    #[error("Ingestion task failed: {0}")]
    TaskFailed(String),
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        IngestError::Io(std::io::Error::other(err.to_string()))
    }
}
