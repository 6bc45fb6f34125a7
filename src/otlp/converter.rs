//! Trace converter
//!
//! Walks `ResourceSpans -> ScopeSpans -> Span` in wire order and emits
//! canonical events. A root span emits `trace_create` followed by
//! `observation_create`; any other span emits `observation_create`. Spans
//! that break identity or timing rules are rejected individually.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ConversionError;
use crate::event::{EventIdGenerator, EventType, TelemetryEvent, timestamp_from_nanos};
use crate::otlp::attributes::{Attributes, MergedAttributes, Resource, Scope};
use crate::otlp::semconv;
use crate::otlp::span::Span;
use crate::otlp::{Conversion, RejectedRecord};

/// Token usage reported by a GenAI span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Prompt/input tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<i64>,
    /// Completion/output tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<i64>,
    /// Total tokens, reported or derived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<i64>,
}

impl Usage {
    fn extract(attrs: &MergedAttributes<'_>) -> Option<Self> {
        let input_tokens = attrs
            .get_i64(semconv::GEN_AI_USAGE_INPUT_TOKENS)
            .or_else(|| attrs.get_i64(semconv::GEN_AI_USAGE_PROMPT_TOKENS));
        let output_tokens = attrs
            .get_i64(semconv::GEN_AI_USAGE_OUTPUT_TOKENS)
            .or_else(|| attrs.get_i64(semconv::GEN_AI_USAGE_COMPLETION_TOKENS));
        let total_tokens = attrs
            .get_i64(semconv::GEN_AI_USAGE_TOTAL_TOKENS)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(i), Some(o)) => i.checked_add(o),
                _ => None,
            });

        if input_tokens.is_none() && output_tokens.is_none() && total_tokens.is_none() {
            None
        } else {
            Some(Self {
                input_tokens,
                output_tokens,
                total_tokens,
            })
        }
    }
}

/// Observation classification derived from GenAI attributes
#[derive(Debug, Clone, PartialEq)]
pub struct GenAiSummary<'a> {
    /// `generation` for model calls, otherwise `span`
    pub observation_type: &'static str,
    /// Response model, falling back to request model
    pub model: Option<&'a str>,
    /// Token usage
    pub usage: Option<Usage>,
}

impl<'a> GenAiSummary<'a> {
    /// Classify using the merged record > scope > resource view
    pub fn extract(attrs: &MergedAttributes<'a>) -> Self {
        let is_generation = attrs.get(semconv::GEN_AI_SYSTEM).is_some()
            || attrs.get(semconv::GEN_AI_REQUEST_MODEL).is_some();
        Self {
            observation_type: if is_generation { "generation" } else { "span" },
            model: attrs
                .get_str(semconv::GEN_AI_RESPONSE_MODEL)
                .or_else(|| attrs.get_str(semconv::GEN_AI_REQUEST_MODEL)),
            usage: Usage::extract(attrs),
        }
    }
}

#[derive(Serialize)]
struct ObservationPayload<'a> {
    #[serde(flatten)]
    span: &'a Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_nanos: Option<u64>,
    observation_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
    resource_attributes: &'a Attributes,
    scope: &'a Scope,
}

#[derive(Serialize)]
struct TracePayload<'a> {
    name: &'a str,
    start_time_unix_nano: u64,
    end_time_unix_nano: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    attributes: &'a Attributes,
    resource_attributes: &'a Attributes,
}

/// Convert a trace export request into canonical events
pub fn convert_traces(
    request: &ExportTraceServiceRequest,
    ids: &mut EventIdGenerator,
) -> Conversion {
    let mut conversion = Conversion::default();

    for (ri, resource_spans) in request.resource_spans.iter().enumerate() {
        let resource = Resource::from_proto(resource_spans.resource.as_ref());

        for (si, scope_spans) in resource_spans.scope_spans.iter().enumerate() {
            let scope = Scope::from_proto(scope_spans.scope.as_ref());

            for (pi, proto_span) in scope_spans.spans.iter().enumerate() {
                conversion.record_count += 1;
                let result = Span::from_proto(proto_span)
                    .and_then(|span| span_events(&span, &scope, &resource, ids));
                match result {
                    Ok(events) => conversion.events.extend(events),
                    Err(error) => {
                        let location =
                            format!("resource_spans[{ri}].scope_spans[{si}].spans[{pi}]");
                        warn!(
                            location = %location,
                            code = error.code(),
                            error = %error,
                            "Rejected span"
                        );
                        conversion.rejected.push(RejectedRecord { location, error });
                    }
                }
            }
        }
    }

    debug!(
        spans = conversion.record_count,
        events = conversion.events.len(),
        rejected = conversion.rejected.len(),
        "Converted trace export request"
    );

    conversion
}

fn span_events(
    span: &Span,
    scope: &Scope,
    resource: &Resource,
    ids: &mut EventIdGenerator,
) -> Result<Vec<TelemetryEvent>, ConversionError> {
    let merged = MergedAttributes::new(&span.attributes, scope, resource);
    let genai = GenAiSummary::extract(&merged);
    let timestamp = timestamp_from_nanos(span.start_time_unix_nano);
    let mut events = Vec::with_capacity(2);

    if span.is_root() {
        let payload = TracePayload {
            name: &span.name,
            start_time_unix_nano: span.start_time_unix_nano,
            end_time_unix_nano: span.end_time_unix_nano,
            service_name: resource.attributes.get(semconv::SERVICE_NAME).and_then(|v| v.as_str()),
            user_id: merged.get_str(semconv::USER_ID),
            session_id: merged.get_str(semconv::SESSION_ID),
            attributes: &span.attributes,
            resource_attributes: &resource.attributes,
        };
        events.push(
            TelemetryEvent::new(
                ids.next_id(),
                EventType::TraceCreate,
                serde_json::to_value(&payload)?,
            )
            .with_trace(Some(span.trace_id.clone()), None)
            .with_timestamp(timestamp),
        );
    }

    let payload = ObservationPayload {
        span,
        duration_nanos: span.duration_nanos(),
        observation_type: genai.observation_type,
        model: genai.model,
        usage: genai.usage,
        resource_attributes: &resource.attributes,
        scope,
    };
    events.push(
        TelemetryEvent::new(
            ids.next_id(),
            EventType::ObservationCreate,
            serde_json::to_value(&payload)?,
        )
        .with_trace(Some(span.trace_id.clone()), Some(span.span_id.clone()))
        .with_timestamp(timestamp),
    );

    Ok(events)
}
