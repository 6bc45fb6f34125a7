//! Validation of client-submitted events
//!
//! Batch submissions carry events as loosely-typed JSON. Each event is checked
//! field by field and every problem is reported, not just the first one.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use ulid::Ulid;

use crate::error::FieldError;
use crate::event::{EventType, TelemetryEvent};

/// Body of `POST /v1/telemetry/batch`
#[derive(Debug, Clone, Deserialize)]
pub struct RawBatchRequest {
    /// Events as submitted
    pub events: Vec<Value>,

    /// Free-form client metadata, logged but not published
    #[serde(default)]
    pub metadata: Option<Value>,

    /// Fail the whole request with 409 if any event is a duplicate
    #[serde(default)]
    pub fail_on_duplicate: bool,
}

fn field(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn is_hex_of_len(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Submitted `event_id` as a string, for error reporting
pub fn raw_event_id(raw: &Value) -> String {
    raw.get("event_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Validate one submitted event.
///
/// `prefix` is prepended to field paths, e.g. `events[2]`.
pub fn validate_event(raw: &Value, prefix: &str) -> Result<TelemetryEvent, Vec<FieldError>> {
    let Some(object) = raw.as_object() else {
        let name = if prefix.is_empty() { "event" } else { prefix };
        return Err(vec![FieldError::new(
            name,
            "invalid_type",
            "event must be a JSON object",
        )]);
    };

    let mut errors = Vec::new();

    let event_id = match object.get("event_id") {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(
                field(prefix, "event_id"),
                "required",
                "event_id is required",
            ));
            None
        }
        Some(Value::String(s)) => match Ulid::from_string(s) {
            Ok(id) => Some(id),
            Err(e) => {
                errors.push(FieldError::new(
                    field(prefix, "event_id"),
                    "invalid_ulid",
                    format!("event_id must be a 26-character ULID: {}", e),
                ));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new(
                field(prefix, "event_id"),
                "invalid_type",
                "event_id must be a string",
            ));
            None
        }
    };

    let event_type = match object.get("event_type").and_then(Value::as_str) {
        None => {
            errors.push(FieldError::new(
                field(prefix, "event_type"),
                "required",
                "event_type is required",
            ));
            None
        }
        Some(s) => match s.parse::<EventType>() {
            Ok(t) => Some(t),
            Err(message) => {
                errors.push(FieldError::new(
                    field(prefix, "event_type"),
                    "invalid_event_type",
                    message,
                ));
                None
            }
        },
    };

    let payload = match object.get("payload") {
        Some(Value::Object(map)) if !map.is_empty() => Some(Value::Object(map.clone())),
        Some(Value::Object(_)) => {
            errors.push(FieldError::new(
                field(prefix, "payload"),
                "empty_payload",
                "payload must not be empty",
            ));
            None
        }
        None | Some(Value::Null) => {
            errors.push(FieldError::new(
                field(prefix, "payload"),
                "required",
                "payload is required",
            ));
            None
        }
        Some(_) => {
            errors.push(FieldError::new(
                field(prefix, "payload"),
                "invalid_type",
                "payload must be a JSON object",
            ));
            None
        }
    };

    let trace_id = optional_hex(object.get("trace_id"), prefix, "trace_id", 32, &mut errors);
    let span_id = optional_hex(object.get("span_id"), prefix, "span_id", 16, &mut errors);

    if let Some(t) = event_type {
        if t.requires_trace_id() && object.get("trace_id").is_none_or(Value::is_null) {
            errors.push(FieldError::new(
                field(prefix, "trace_id"),
                "required",
                format!("trace_id is required for {} events", t),
            ));
        }
        if t.requires_span_id() && object.get("span_id").is_none_or(Value::is_null) {
            errors.push(FieldError::new(
                field(prefix, "span_id"),
                "required",
                format!("span_id is required for {} events", t),
            ));
        }
    }

    let timestamp = match object.get("timestamp") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                errors.push(FieldError::new(
                    field(prefix, "timestamp"),
                    "invalid_timestamp",
                    format!("timestamp must be RFC 3339: {}", e),
                ));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new(
                field(prefix, "timestamp"),
                "invalid_type",
                "timestamp must be an RFC 3339 string",
            ));
            None
        }
    };

    match (event_id, event_type, payload) {
        (Some(event_id), Some(event_type), Some(payload)) if errors.is_empty() => {
            Ok(TelemetryEvent::new(event_id, event_type, payload)
                .with_trace(trace_id, span_id)
                .with_timestamp(timestamp))
        }
        _ => Err(errors),
    }
}

fn optional_hex(
    value: Option<&Value>,
    prefix: &str,
    name: &str,
    len: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if is_hex_of_len(s, len) => {
            if s.bytes().all(|b| b == b'0') {
                errors.push(FieldError::new(
                    field(prefix, name),
                    "invalid_id",
                    format!("{} must not be all zeros", name),
                ));
                return None;
            }
            Some(s.to_ascii_lowercase())
        }
        Some(_) => {
            errors.push(FieldError::new(
                field(prefix, name),
                "invalid_id",
                format!("{} must be {} hexadecimal characters", name, len),
            ));
            None
        }
    }
}
