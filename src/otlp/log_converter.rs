//! Log converter
//!
//! Every log record becomes a `log_record` event. Records whose event name is
//! a known GenAI semantic-convention event additionally emit a `genai_event`,
//! so one record can yield two events.

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::logs::v1::LogRecord;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ConversionError;
use crate::event::{EventIdGenerator, EventType, TelemetryEvent, timestamp_from_nanos};
use crate::otlp::attributes::{
    AttributeValue, Attributes, MergedAttributes, Resource, Scope, convert, is_zero,
};
use crate::otlp::semconv;
use crate::otlp::span::optional_id_hex;
use crate::otlp::{Conversion, RejectedRecord};

/// Event names that mark a log record as a GenAI event
pub const GENAI_EVENT_NAMES: &[&str] = &[
    "gen_ai.system.message",
    "gen_ai.user.message",
    "gen_ai.assistant.message",
    "gen_ai.tool.message",
    "gen_ai.choice",
    "gen_ai.content.prompt",
    "gen_ai.content.completion",
    "gen_ai.client.inference.operation.details",
    "gen_ai.evaluation.result",
];

/// Whether `name` is a recognised GenAI event name
pub fn is_genai_event(name: &str) -> bool {
    GENAI_EVENT_NAMES.contains(&name)
}

#[derive(Serialize)]
struct LogPayload<'a> {
    time_unix_nano: u64,
    observed_time_unix_nano: u64,
    severity_number: i32,
    #[serde(skip_serializing_if = "str::is_empty")]
    severity_text: &'a str,
    body: &'a AttributeValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_name: Option<&'a str>,
    attributes: &'a Attributes,
    resource_attributes: &'a Attributes,
    scope: &'a Scope,
    #[serde(skip_serializing_if = "is_zero")]
    flags: u32,
    #[serde(skip_serializing_if = "is_zero")]
    dropped_attributes_count: u32,
}

#[derive(Serialize)]
struct GenAiEventPayload<'a> {
    event_name: &'a str,
    time_unix_nano: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    gen_ai_system: Option<&'a str>,
    body: &'a AttributeValue,
    attributes: &'a Attributes,
}

/// Convert a logs export request into canonical events
pub fn convert_logs(request: &ExportLogsServiceRequest, ids: &mut EventIdGenerator) -> Conversion {
    let mut conversion = Conversion::default();

    for (ri, resource_logs) in request.resource_logs.iter().enumerate() {
        let resource = Resource::from_proto(resource_logs.resource.as_ref());

        for (si, scope_logs) in resource_logs.scope_logs.iter().enumerate() {
            let scope = Scope::from_proto(scope_logs.scope.as_ref());

            for (li, record) in scope_logs.log_records.iter().enumerate() {
                conversion.record_count += 1;
                match record_events(record, &scope, &resource, ids) {
                    Ok(events) => conversion.events.extend(events),
                    Err(error) => {
                        let location =
                            format!("resource_logs[{ri}].scope_logs[{si}].log_records[{li}]");
                        warn!(
                            location = %location,
                            code = error.code(),
                            error = %error,
                            "Rejected log record"
                        );
                        conversion.rejected.push(RejectedRecord { location, error });
                    }
                }
            }
        }
    }

    debug!(
        log_records = conversion.record_count,
        events = conversion.events.len(),
        rejected = conversion.rejected.len(),
        "Converted logs export request"
    );

    conversion
}

fn record_events(
    record: &LogRecord,
    scope: &Scope,
    resource: &Resource,
    ids: &mut EventIdGenerator,
) -> Result<Vec<TelemetryEvent>, ConversionError> {
    let trace_id = optional_id_hex(&record.trace_id, 16)?;
    let span_id = optional_id_hex(&record.span_id, 8)?;
    let attributes = Attributes::from_proto(&record.attributes);
    let body = record.body.as_ref().map(convert).unwrap_or(AttributeValue::Null);

    let event_name = if record.event_name.is_empty() {
        attributes
            .get(semconv::EVENT_NAME)
            .and_then(AttributeValue::as_str)
    } else {
        Some(record.event_name.as_str())
    };

    let time = if record.time_unix_nano != 0 {
        record.time_unix_nano
    } else {
        record.observed_time_unix_nano
    };
    let timestamp = timestamp_from_nanos(time);

    let payload = LogPayload {
        time_unix_nano: record.time_unix_nano,
        observed_time_unix_nano: record.observed_time_unix_nano,
        severity_number: record.severity_number,
        severity_text: &record.severity_text,
        body: &body,
        event_name,
        attributes: &attributes,
        resource_attributes: &resource.attributes,
        scope,
        flags: record.flags,
        dropped_attributes_count: record.dropped_attributes_count,
    };

    let mut events = vec![
        TelemetryEvent::new(
            ids.next_id(),
            EventType::LogRecord,
            serde_json::to_value(&payload)?,
        )
        .with_trace(trace_id.clone(), span_id.clone())
        .with_timestamp(timestamp),
    ];

    if let Some(name) = event_name.filter(|n| is_genai_event(n)) {
        let merged = MergedAttributes::new(&attributes, scope, resource);
        let payload = GenAiEventPayload {
            event_name: name,
            time_unix_nano: time,
            gen_ai_system: merged.get_str(semconv::GEN_AI_SYSTEM),
            body: &body,
            attributes: &attributes,
        };
        events.push(
            TelemetryEvent::new(
                ids.next_id(),
                EventType::GenaiEvent,
                serde_json::to_value(&payload)?,
            )
            .with_trace(trace_id, span_id)
            .with_timestamp(timestamp),
        );
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genai_names() {
        assert!(is_genai_event("gen_ai.user.message"));
        assert!(is_genai_event("gen_ai.choice"));
        assert!(!is_genai_event("gen_ai.something.else"));
        assert!(!is_genai_event("user.message"));
    }
}
