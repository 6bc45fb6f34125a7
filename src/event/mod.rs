//! Canonical telemetry events
//!
//! A [`TelemetryEvent`] is the unit handed to the event stream. Events are
//! grouped into a [`Batch`] per ingestion call; the outcome of a call is
//! summarised in a [`BatchResult`].

pub mod validation;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::auth::{Environment, ProjectId};

pub use validation::{RawBatchRequest, validate_event};

/// Kind of a canonical event; the downstream worker dispatches on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new trace
    TraceCreate,
    /// Update to an existing trace
    TraceUpdate,
    /// A new observation (span, generation)
    ObservationCreate,
    /// Update to an existing observation
    ObservationUpdate,
    /// Observation finished
    ObservationComplete,
    /// A quality score attached to a trace or observation
    QualityScoreCreate,
    /// One OTLP log record
    LogRecord,
    /// GenAI semantic-convention event carried in a log record
    GenaiEvent,
    /// One OTLP metric
    MetricRecord,
}

impl EventType {
    /// All event types
    pub const ALL: [EventType; 9] = [
        EventType::TraceCreate,
        EventType::TraceUpdate,
        EventType::ObservationCreate,
        EventType::ObservationUpdate,
        EventType::ObservationComplete,
        EventType::QualityScoreCreate,
        EventType::LogRecord,
        EventType::GenaiEvent,
        EventType::MetricRecord,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TraceCreate => "trace_create",
            EventType::TraceUpdate => "trace_update",
            EventType::ObservationCreate => "observation_create",
            EventType::ObservationUpdate => "observation_update",
            EventType::ObservationComplete => "observation_complete",
            EventType::QualityScoreCreate => "quality_score_create",
            EventType::LogRecord => "log_record",
            EventType::GenaiEvent => "genai_event",
            EventType::MetricRecord => "metric_record",
        }
    }

    /// Whether events of this kind go through the dedup cache.
    ///
    /// Logs and metrics are written idempotently downstream and skip it.
    pub fn is_deduplicated(&self) -> bool {
        matches!(
            self,
            EventType::TraceCreate
                | EventType::TraceUpdate
                | EventType::ObservationCreate
                | EventType::ObservationUpdate
                | EventType::ObservationComplete
                | EventType::QualityScoreCreate
        )
    }

    /// Whether a trace id is mandatory
    pub fn requires_trace_id(&self) -> bool {
        self.is_deduplicated()
    }

    /// Whether a span id is mandatory
    pub fn requires_span_id(&self) -> bool {
        matches!(
            self,
            EventType::ObservationCreate
                | EventType::ObservationUpdate
                | EventType::ObservationComplete
        )
    }

    /// Bucket used for per-category counts in responses
    pub fn category(&self) -> &'static str {
        match self {
            EventType::TraceCreate | EventType::TraceUpdate => "traces",
            EventType::ObservationCreate
            | EventType::ObservationUpdate
            | EventType::ObservationComplete => "observations",
            EventType::QualityScoreCreate => "scores",
            EventType::LogRecord | EventType::GenaiEvent => "logs",
            EventType::MetricRecord => "metrics",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

/// One canonical event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    /// Identity and dedup key
    pub event_id: Ulid,
    /// Event kind
    pub event_type: EventType,
    /// Lower-case hex trace id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Lower-case hex span id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    /// Event body
    pub payload: serde_json::Value,
    /// Time the event refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TelemetryEvent {
    /// Create an event with no trace context
    pub fn new(event_id: Ulid, event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            event_id,
            event_type,
            trace_id: None,
            span_id: None,
            payload,
            timestamp: None,
        }
    }

    /// Attach trace context
    pub fn with_trace(mut self, trace_id: Option<String>, span_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self.span_id = span_id;
        self
    }

    /// Attach a timestamp
    pub fn with_timestamp(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Monotonic ULID source for server-synthesised event ids.
///
/// One generator is used per request so ids within a batch sort in emission
/// order even when minted within the same millisecond.
pub struct EventIdGenerator {
    inner: ulid::Generator,
}

impl std::fmt::Debug for EventIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventIdGenerator").finish_non_exhaustive()
    }
}

impl Default for EventIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl EventIdGenerator {
    /// Create a generator
    pub fn new() -> Self {
        Self {
            inner: ulid::Generator::new(),
        }
    }

    /// Next id; falls back to a fresh random ULID if the millisecond overflows
    pub fn next_id(&mut self) -> Ulid {
        self.inner.generate().unwrap_or_else(|_| Ulid::new())
    }
}

/// Nanoseconds since the Unix epoch as a UTC instant; zero means unset
pub fn timestamp_from_nanos(nanos: u64) -> Option<DateTime<Utc>> {
    if nanos == 0 {
        return None;
    }
    i64::try_from(nanos).ok().map(DateTime::from_timestamp_nanos)
}

/// One publish unit for one tenant stream; immutable once assembled
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    /// Batch identity
    pub batch_id: Ulid,
    /// Owning project
    pub project_id: ProjectId,
    /// Optional environment sub-scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    /// Events in tree-walk order
    pub events: Vec<TelemetryEvent>,
    /// Equal to the millisecond timestamp embedded in `batch_id`
    pub timestamp: DateTime<Utc>,
}

impl Batch {
    /// Assemble a batch under a fresh ULID
    pub fn assemble(
        project_id: ProjectId,
        environment: Option<Environment>,
        events: Vec<TelemetryEvent>,
    ) -> Self {
        Self::with_id(Ulid::new(), project_id, environment, events)
    }

    /// Assemble a batch under a given id; the timestamp is taken from the id
    pub fn with_id(
        batch_id: Ulid,
        project_id: ProjectId,
        environment: Option<Environment>,
        events: Vec<TelemetryEvent>,
    ) -> Self {
        let timestamp = ulid_timestamp(&batch_id);
        Self {
            batch_id,
            project_id,
            environment,
            events,
            timestamp,
        }
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch carries no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Millisecond instant embedded in a ULID
pub fn ulid_timestamp(id: &Ulid) -> DateTime<Utc> {
    let ms = i64::try_from(id.timestamp_ms()).unwrap_or(i64::MAX);
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// One event excluded from a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventError {
    /// Offending event id as submitted (may be empty or malformed)
    pub event_id: String,
    /// Stable machine-readable code
    pub error_code: String,
    /// Human-readable message
    pub error_message: String,
}

impl EventError {
    /// Create an event error
    pub fn new(
        event_id: impl Into<String>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            error_code: error_code.into(),
            error_message: error_message.into(),
        }
    }
}

/// Per-call accounting; computed before the stream write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult {
    /// Batch identity
    pub batch_id: Ulid,
    /// Events handed to the stream
    pub processed_count: usize,
    /// Events dropped as already accepted
    pub duplicate_count: usize,
    /// Events excluded by conversion or validation
    pub failed_count: usize,
    /// Wall time spent on the call
    pub processing_time_ms: u64,
    /// One entry per failed event
    pub errors: Vec<EventError>,
    /// Ids of duplicate events
    pub duplicate_event_ids: Vec<String>,
}
