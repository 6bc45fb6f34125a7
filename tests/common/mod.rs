//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, InstrumentationScope, KeyValue, any_value::Value as AnyValueKind,
};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::{
    Gauge, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics, metric, number_data_point,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use serde_json::{Value, json};
use telemetry_ingest::config::DedupConfig;
use telemetry_ingest::error::DedupError;
use telemetry_ingest::{
    ApiKeyResolver, AppState, Config, DedupCache, DedupEngine, IngestMetrics, IngestPipeline,
    MockEventStream, ProjectId, TenantContext, router,
};
use uuid::Uuid;

/// API key accepted by [`TestApp`]
pub const API_KEY: &str = "sk-test-key";

/// 2024-01-01T00:00:00Z in nanoseconds
pub const BASE_TIME_NANOS: u64 = 1_704_067_200_000_000_000;

pub const TRACE_ID: [u8; 16] = [
    0x5b, 0x8e, 0xff, 0xf7, 0x98, 0x03, 0x81, 0x03, 0xd2, 0x69, 0xb6, 0x33, 0x81, 0x3f, 0xc6, 0x0c,
];
pub const TRACE_ID_HEX: &str = "5b8efff798038103d269b633813fc60c";

pub fn project() -> ProjectId {
    ProjectId::new(Uuid::new_v4()).expect("random uuid is not nil")
}

pub fn tenant(project_id: ProjectId) -> TenantContext {
    TenantContext::new(project_id, None)
}

pub fn string_value(s: &str) -> AnyValue {
    AnyValue {
        value: Some(AnyValueKind::StringValue(s.to_string())),
    }
}

pub fn int_value(i: i64) -> AnyValue {
    AnyValue {
        value: Some(AnyValueKind::IntValue(i)),
    }
}

pub fn kv(key: &str, value: AnyValue) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(value),
    }
}

pub fn resource(service_name: &str) -> Option<Resource> {
    Some(Resource {
        attributes: vec![kv("service.name", string_value(service_name))],
        ..Default::default()
    })
}

pub fn scope(name: &str) -> Option<InstrumentationScope> {
    Some(InstrumentationScope {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        ..Default::default()
    })
}

/// Span id whose last byte is `n`
pub fn span_id(n: u8) -> Vec<u8> {
    vec![0, 0, 0, 0, 0, 0, 0, n]
}

pub fn span_id_hex(n: u8) -> String {
    hex::encode(span_id(n))
}

/// Span in [`TRACE_ID`] lasting one second
pub fn span(id: u8, parent: Option<u8>, name: &str) -> Span {
    Span {
        trace_id: TRACE_ID.to_vec(),
        span_id: span_id(id),
        parent_span_id: parent.map(span_id).unwrap_or_default(),
        name: name.to_string(),
        kind: 2,
        start_time_unix_nano: BASE_TIME_NANOS,
        end_time_unix_nano: BASE_TIME_NANOS + 1_000_000_000,
        ..Default::default()
    }
}

pub fn trace_request(spans: Vec<Span>) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: resource("checkout"),
            scope_spans: vec![ScopeSpans {
                scope: scope("checkout-lib"),
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

pub fn log_record(body: &str) -> LogRecord {
    LogRecord {
        time_unix_nano: BASE_TIME_NANOS,
        observed_time_unix_nano: BASE_TIME_NANOS + 5,
        severity_number: 9,
        severity_text: "INFO".to_string(),
        body: Some(string_value(body)),
        ..Default::default()
    }
}

pub fn logs_request(records: Vec<LogRecord>) -> ExportLogsServiceRequest {
    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            resource: resource("checkout"),
            scope_logs: vec![ScopeLogs {
                scope: scope("checkout-logger"),
                log_records: records,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

pub fn gauge(name: &str, values: &[f64]) -> Metric {
    let data_points = values
        .iter()
        .enumerate()
        .map(|(i, v)| NumberDataPoint {
            time_unix_nano: BASE_TIME_NANOS + i as u64,
            value: Some(number_data_point::Value::AsDouble(*v)),
            ..Default::default()
        })
        .collect();
    Metric {
        name: name.to_string(),
        unit: "1".to_string(),
        data: Some(metric::Data::Gauge(Gauge { data_points })),
        ..Default::default()
    }
}

pub fn metrics_request(metrics: Vec<Metric>) -> ExportMetricsServiceRequest {
    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: resource("checkout"),
            scope_metrics: vec![ScopeMetrics {
                scope: scope("checkout-meter"),
                metrics,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Valid `observation_create` batch event
pub fn observation_event(event_id: &str) -> Value {
    json!({
        "event_id": event_id,
        "event_type": "observation_create",
        "trace_id": TRACE_ID_HEX,
        "span_id": "00000000000000aa",
        "payload": {"name": "llm-call", "model": "gpt-4o"},
        "timestamp": "2024-01-01T00:00:00Z"
    })
}

/// Valid `log_record` batch event
pub fn log_event(event_id: &str) -> Value {
    json!({
        "event_id": event_id,
        "event_type": "log_record",
        "payload": {"body": "hello"}
    })
}

pub fn new_event_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Pipeline over in-memory dedup and a fresh mock stream
pub fn pipeline() -> (IngestPipeline, MockEventStream) {
    let stream = MockEventStream::new();
    let pipeline = IngestPipeline::in_memory(&Config::default(), Arc::new(stream.clone()));
    (pipeline, stream)
}

/// Pipeline over the given dedup cache
pub fn pipeline_with_cache(
    cache: Arc<dyn DedupCache>,
    dedup: &DedupConfig,
) -> (IngestPipeline, MockEventStream) {
    let stream = MockEventStream::new();
    let pipeline = IngestPipeline::new(
        &Config::default(),
        DedupEngine::new(cache, dedup),
        Arc::new(stream.clone()),
        IngestMetrics::noop(),
    );
    (pipeline, stream)
}

/// Router bound to one project and API key
pub struct TestApp {
    pub router: Router,
    pub stream: MockEventStream,
    pub project_id: ProjectId,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        let stream = MockEventStream::new();
        let pipeline = IngestPipeline::in_memory(config, Arc::new(stream.clone()));
        let project_id = project();
        let auth = Arc::new(ApiKeyResolver::from_pairs([(API_KEY, project_id)]));
        Self {
            router: router(AppState::new(pipeline, auth)),
            stream,
            project_id,
        }
    }
}

/// Dedup cache that fails every call
#[derive(Debug, Default)]
pub struct UnavailableCache {
    pub claims: AtomicU64,
}

#[async_trait]
impl DedupCache for UnavailableCache {
    async fn claim(&self, _key: &str, _ttl: Duration) -> Result<bool, DedupError> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Err(DedupError::Unavailable("connection refused".to_string()))
    }

    async fn release(&self, _key: &str) -> Result<(), DedupError> {
        Err(DedupError::Unavailable("connection refused".to_string()))
    }
}

/// Dedup cache that never answers
#[derive(Debug, Default)]
pub struct StalledCache;

#[async_trait]
impl DedupCache for StalledCache {
    async fn claim(&self, _key: &str, _ttl: Duration) -> Result<bool, DedupError> {
        std::future::pending().await
    }

    async fn release(&self, _key: &str) -> Result<(), DedupError> {
        Ok(())
    }
}
