//! OpenTelemetry Protocol (OTLP) module
//!
//! Decodes OTLP/HTTP export requests and converts traces, logs and metrics
//! into canonical [`TelemetryEvent`](crate::event::TelemetryEvent)s.

use std::fmt;

use crate::error::ConversionError;
use crate::event::{EventError, TelemetryEvent};

pub mod attributes;
pub mod converter;
pub mod decoder;
pub mod log_converter;
pub mod metrics_converter;
pub mod metrics_data;
pub mod server;
pub mod span;

pub use attributes::{AttributeValue, Attributes, MergedAttributes, Resource, Scope};
pub use converter::convert_traces;
pub use decoder::{ContentEncoding, ContentType, DecodeLimits, ExportRequest, ProtocolDecoder};
pub use log_converter::convert_logs;
pub use metrics_converter::convert_metrics;
pub use server::{AppState, OtlpHttpServer, router};
pub use span::Span;

/// OTLP signal type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// OpenTelemetry trace data
    Traces,
    /// OpenTelemetry log data
    Logs,
    /// OpenTelemetry metric data
    Metrics,
}

impl Signal {
    /// Lower-case name, used as a metric and log label
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Logs => "logs",
            Signal::Metrics => "metrics",
        }
    }

    /// Name of the top-level repeated field, used in empty-request errors
    pub fn resource_group_name(&self) -> &'static str {
        match self {
            Signal::Traces => "resource spans",
            Signal::Logs => "resource logs",
            Signal::Metrics => "resource metrics",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of converting one export request
#[derive(Debug, Default)]
pub struct Conversion {
    /// Events in tree-walk order
    pub events: Vec<TelemetryEvent>,
    /// Records (spans, log records, metrics) seen, accepted or not
    pub record_count: usize,
    /// Records that could not be converted
    pub rejected: Vec<RejectedRecord>,
}

impl Conversion {
    /// Per-event errors for the rejected records
    pub fn event_errors(&self) -> Vec<EventError> {
        self.rejected.iter().map(RejectedRecord::to_event_error).collect()
    }
}

/// A record excluded from a conversion, with its position in the request
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    /// Path such as `resource_spans[0].scope_spans[1].spans[3]`
    pub location: String,
    /// Why it was rejected
    pub error: ConversionError,
}

impl RejectedRecord {
    /// Report as an event error; OTLP records have no client event id
    pub fn to_event_error(&self) -> EventError {
        EventError::new(
            "",
            self.error.code(),
            format!("{}: {}", self.location, self.error),
        )
    }
}

/// Attribute keys read during conversion
pub mod semconv {
    /// `service.name` resource attribute
    pub const SERVICE_NAME: &str = "service.name";
    /// End-user identifier
    pub const USER_ID: &str = "user.id";
    /// Conversation/session identifier
    pub const SESSION_ID: &str = "session.id";
    /// Event name carried as an attribute by older SDKs
    pub const EVENT_NAME: &str = "event.name";

    /// GenAI provider
    pub const GEN_AI_SYSTEM: &str = "gen_ai.system";
    /// Requested model
    pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";
    /// Model that served the response
    pub const GEN_AI_RESPONSE_MODEL: &str = "gen_ai.response.model";
    /// Input tokens
    pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
    /// Input tokens, older name
    pub const GEN_AI_USAGE_PROMPT_TOKENS: &str = "gen_ai.usage.prompt_tokens";
    /// Output tokens
    pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";
    /// Output tokens, older name
    pub const GEN_AI_USAGE_COMPLETION_TOKENS: &str = "gen_ai.usage.completion_tokens";
    /// Total tokens
    pub const GEN_AI_USAGE_TOTAL_TOKENS: &str = "gen_ai.usage.total_tokens";
}
