//! Canonical span model
//!
//! Identifiers are lower-case hex of the raw wire bytes. Timing stays in
//! nanoseconds as `u64`. Unknown span kinds and status codes are carried as
//! their raw integer.

use opentelemetry_proto::tonic::trace::v1::span::{Event as ProtoEvent, Link as ProtoLink};
use opentelemetry_proto::tonic::trace::v1::{Span as ProtoSpan, Status as ProtoStatus};
use serde::{Serialize, Serializer};

use crate::error::ConversionError;
use crate::otlp::attributes::{Attributes, is_zero};

/// Span kind; unknown values pass through as raw integers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    /// 0
    Unspecified,
    /// 1
    Internal,
    /// 2
    Server,
    /// 3
    Client,
    /// 4
    Producer,
    /// 5
    Consumer,
    /// Anything else
    Unknown(i32),
}

impl From<i32> for SpanKind {
    fn from(raw: i32) -> Self {
        match raw {
            0 => SpanKind::Unspecified,
            1 => SpanKind::Internal,
            2 => SpanKind::Server,
            3 => SpanKind::Client,
            4 => SpanKind::Producer,
            5 => SpanKind::Consumer,
            other => SpanKind::Unknown(other),
        }
    }
}

impl Serialize for SpanKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SpanKind::Unspecified => serializer.serialize_str("unspecified"),
            SpanKind::Internal => serializer.serialize_str("internal"),
            SpanKind::Server => serializer.serialize_str("server"),
            SpanKind::Client => serializer.serialize_str("client"),
            SpanKind::Producer => serializer.serialize_str("producer"),
            SpanKind::Consumer => serializer.serialize_str("consumer"),
            SpanKind::Unknown(raw) => serializer.serialize_i32(*raw),
        }
    }
}

/// Span status code; unknown values pass through as raw integers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 0
    Unset,
    /// 1
    Ok,
    /// 2
    Error,
    /// Anything else
    Unknown(i32),
}

impl From<i32> for StatusCode {
    fn from(raw: i32) -> Self {
        match raw {
            0 => StatusCode::Unset,
            1 => StatusCode::Ok,
            2 => StatusCode::Error,
            other => StatusCode::Unknown(other),
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatusCode::Unset => serializer.serialize_str("unset"),
            StatusCode::Ok => serializer.serialize_str("ok"),
            StatusCode::Error => serializer.serialize_str("error"),
            StatusCode::Unknown(raw) => serializer.serialize_i32(*raw),
        }
    }
}

/// Span status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanStatus {
    /// Status code
    pub code: StatusCode,
    /// Description, usually only set on error
    pub message: String,
}

impl SpanStatus {
    fn from_proto(status: Option<&ProtoStatus>) -> Self {
        match status {
            Some(s) => Self {
                code: StatusCode::from(s.code),
                message: s.message.clone(),
            },
            None => Self {
                code: StatusCode::Unset,
                message: String::new(),
            },
        }
    }
}

/// Timed annotation on a span
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanEvent {
    /// Nanoseconds since epoch
    pub time_unix_nano: u64,
    /// Event name
    pub name: String,
    /// Event attributes
    pub attributes: Attributes,
    /// Attributes the sender had to drop
    #[serde(skip_serializing_if = "is_zero")]
    pub dropped_attributes_count: u32,
}

/// Link to another span
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanLink {
    /// Linked trace id, hex
    pub trace_id: String,
    /// Linked span id, hex
    pub span_id: String,
    /// W3C trace state
    #[serde(skip_serializing_if = "String::is_empty")]
    pub trace_state: String,
    /// Link attributes
    pub attributes: Attributes,
    /// Attributes the sender had to drop
    #[serde(skip_serializing_if = "is_zero")]
    pub dropped_attributes_count: u32,
}

/// Canonical span
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    /// 32 hex chars
    pub trace_id: String,
    /// 16 hex chars
    pub span_id: String,
    /// 16 hex chars; `None` for a root span
    pub parent_span_id: Option<String>,
    /// W3C trace state
    #[serde(skip_serializing_if = "String::is_empty")]
    pub trace_state: String,
    /// Operation name
    pub name: String,
    /// Span kind
    pub kind: SpanKind,
    /// Nanoseconds since epoch
    pub start_time_unix_nano: u64,
    /// Nanoseconds since epoch
    pub end_time_unix_nano: u64,
    /// Span attributes
    pub attributes: Attributes,
    /// Span status
    pub status: SpanStatus,
    /// Span events, empty rather than absent
    pub events: Vec<SpanEvent>,
    /// Span links, empty rather than absent
    pub links: Vec<SpanLink>,
    /// Attributes the sender had to drop
    #[serde(skip_serializing_if = "is_zero")]
    pub dropped_attributes_count: u32,
    /// Events the sender had to drop
    #[serde(skip_serializing_if = "is_zero")]
    pub dropped_events_count: u32,
    /// Links the sender had to drop
    #[serde(skip_serializing_if = "is_zero")]
    pub dropped_links_count: u32,
}

impl Span {
    /// Convert a wire span, enforcing identity and timing invariants
    pub fn from_proto(span: &ProtoSpan) -> Result<Self, ConversionError> {
        let trace_id = trace_id_hex(&span.trace_id)?;
        let span_id = span_id_hex(&span.span_id)?;
        let parent_span_id = parent_span_id_hex(&span.parent_span_id)?;

        if parent_span_id.as_deref() == Some(span_id.as_str()) {
            return Err(ConversionError::ParentIsSelf(span_id));
        }

        let (start, end) = (span.start_time_unix_nano, span.end_time_unix_nano);
        if start != 0 && end != 0 && start > end {
            return Err(ConversionError::StartAfterEnd { start, end });
        }

        Ok(Self {
            trace_id,
            span_id,
            parent_span_id,
            trace_state: span.trace_state.clone(),
            name: span.name.clone(),
            kind: SpanKind::from(span.kind),
            start_time_unix_nano: start,
            end_time_unix_nano: end,
            attributes: Attributes::from_proto(&span.attributes),
            status: SpanStatus::from_proto(span.status.as_ref()),
            events: span.events.iter().map(convert_event).collect(),
            links: span
                .links
                .iter()
                .map(convert_link)
                .collect::<Result<_, _>>()?,
            dropped_attributes_count: span.dropped_attributes_count,
            dropped_events_count: span.dropped_events_count,
            dropped_links_count: span.dropped_links_count,
        })
    }

    /// Whether the span has no parent
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Duration in nanoseconds, when both ends are known
    pub fn duration_nanos(&self) -> Option<u64> {
        match (self.start_time_unix_nano, self.end_time_unix_nano) {
            (0, _) | (_, 0) => None,
            (start, end) => end.checked_sub(start),
        }
    }
}

fn convert_event(event: &ProtoEvent) -> SpanEvent {
    SpanEvent {
        time_unix_nano: event.time_unix_nano,
        name: event.name.clone(),
        attributes: Attributes::from_proto(&event.attributes),
        dropped_attributes_count: event.dropped_attributes_count,
    }
}

fn convert_link(link: &ProtoLink) -> Result<SpanLink, ConversionError> {
    Ok(SpanLink {
        trace_id: trace_id_hex(&link.trace_id)?,
        span_id: span_id_hex(&link.span_id)?,
        trace_state: link.trace_state.clone(),
        attributes: Attributes::from_proto(&link.attributes),
        dropped_attributes_count: link.dropped_attributes_count,
    })
}

fn all_zero(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| *b == 0)
}

/// Required 16-byte trace id as lower-case hex
pub fn trace_id_hex(bytes: &[u8]) -> Result<String, ConversionError> {
    if bytes.len() != 16 {
        return Err(ConversionError::InvalidTraceId(bytes.len()));
    }
    if all_zero(bytes) {
        return Err(ConversionError::ZeroTraceId);
    }
    Ok(hex::encode(bytes))
}

/// Required 8-byte span id as lower-case hex
pub fn span_id_hex(bytes: &[u8]) -> Result<String, ConversionError> {
    if bytes.len() != 8 {
        return Err(ConversionError::InvalidSpanId(bytes.len()));
    }
    if all_zero(bytes) {
        return Err(ConversionError::ZeroSpanId);
    }
    Ok(hex::encode(bytes))
}

/// Parent span id; empty or all-zero bytes mean "no parent"
pub fn parent_span_id_hex(bytes: &[u8]) -> Result<Option<String>, ConversionError> {
    if bytes.is_empty() || all_zero(bytes) {
        return Ok(None);
    }
    if bytes.len() != 8 {
        return Err(ConversionError::InvalidParentSpanId(bytes.len()));
    }
    Ok(Some(hex::encode(bytes)))
}

/// Optional trace context on a log record: empty or all-zero means absent
pub fn optional_id_hex(
    bytes: &[u8],
    expected_len: usize,
) -> Result<Option<String>, ConversionError> {
    if bytes.is_empty() || all_zero(bytes) {
        return Ok(None);
    }
    if bytes.len() != expected_len {
        return Err(if expected_len == 16 {
            ConversionError::InvalidTraceId(bytes.len())
        } else {
            ConversionError::InvalidSpanId(bytes.len())
        });
    }
    Ok(Some(hex::encode(bytes)))
}
