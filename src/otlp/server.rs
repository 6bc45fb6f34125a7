//! HTTP server for receiving OTLP messages
//!
//! OTLP/HTTP endpoints for traces, logs and metrics, plus the batch
//! submission and validation endpoints, using axum. Handlers authenticate,
//! decode and hand off to the [`IngestPipeline`].

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use crate::api::{IngestPipeline, OtlpIngestOutcome, ValidationReport};
use crate::auth::{AuthResolver, Environment, TenantContext};
use crate::config::ServerConfig;
use crate::error::{DecodeError, FieldError, IngestError, ServerError, ValidationError};
use crate::event::{EventError, RawBatchRequest};
use crate::otlp::decoder::{
    ContentEncoding, ContentType, check_content_length, gunzip, read_limited,
};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Ingestion pipeline
    pub pipeline: IngestPipeline,
    /// Resolves the calling project
    pub auth: Arc<dyn AuthResolver>,
}

impl AppState {
    /// Create handler state
    pub fn new(pipeline: IngestPipeline, auth: Arc<dyn AuthResolver>) -> Self {
        Self { pipeline, auth }
    }

    async fn tenant(&self, headers: &HeaderMap) -> Result<TenantContext, IngestError> {
        let project_id = self.auth.resolve(headers).await?;
        let environment = Environment::from_headers(headers)?;
        Ok(TenantContext::new(project_id, environment))
    }
}

/// HTTP server for OTLP ingestion
#[derive(Clone)]
pub struct OtlpHttpServer {
    config: ServerConfig,
    state: AppState,
}

impl OtlpHttpServer {
    /// Create a new HTTP server
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Configured listen address
    pub fn bind_addr(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| {
                ServerError::BindError(format!(
                    "Invalid address {}:{}: {}",
                    self.config.bind_address, self.config.port, e
                ))
            })
    }

    /// Router with all routes and middleware
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn serve<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.bind_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("{}: {}", addr, e)))?;
        self.serve_with_listener(listener, shutdown).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve_with_listener<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::StartupError(e.to_string()))?;
        info!(addr = %local, "Starting OTLP HTTP server");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::StartupError(e.to_string()))
    }
}

/// Build the ingestion router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/v1/traces", post(handle_traces))
        .route("/v1/logs", post(handle_logs))
        .route("/v1/metrics", post(handle_metrics))
        .route("/v1/telemetry/batch", post(handle_batch))
        .route("/v1/telemetry/validate", post(handle_validate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Response to `POST /v1/traces`
#[derive(Debug, Serialize)]
pub struct TraceExportResponse {
    /// Always `success`
    pub status: &'static str,
    /// Batch identity
    pub batch_id: Ulid,
    /// Spans converted and published
    pub processed_spans: usize,
    /// Spans rejected during conversion
    #[serde(skip_serializing_if = "is_zero")]
    pub rejected_spans: usize,
    /// One entry per rejected span
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EventError>,
}

/// Response to `POST /v1/logs` and `POST /v1/metrics`
#[derive(Debug, Serialize)]
pub struct EventExportResponse {
    /// Batch identity
    pub batch_id: Ulid,
    /// Events published
    pub event_count: usize,
    /// Always `accepted`
    pub status: &'static str,
    /// Log records rejected during conversion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_log_records: Option<usize>,
    /// Metrics rejected during conversion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_metrics: Option<usize>,
    /// One entry per rejected record
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EventError>,
}

/// Response to `POST /v1/telemetry/batch`
#[derive(Debug, Serialize)]
pub struct TelemetryBatchResponse {
    /// Batch identity
    pub batch_id: Ulid,
    /// `accepted`, or `partial` when some events failed or were duplicates
    pub status: &'static str,
    /// Events published
    pub processed_events: usize,
    /// Events dropped as duplicates
    pub duplicate_events: usize,
    /// Events that failed validation
    pub failed_events: usize,
    /// Wall time spent before the stream write
    pub processing_time_ms: u64,
    /// One entry per failed event
    pub errors: Vec<EventError>,
    /// Ids of duplicate events
    pub duplicate_event_ids: Vec<String>,
    /// Published events per category
    pub event_counts: BTreeMap<&'static str, usize>,
    /// Stream offset of the queued batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_traces(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<TraceExportResponse>, IngestError> {
    let tenant = state.tenant(&headers).await?;
    let request: ExportTraceServiceRequest = state
        .pipeline
        .decoder()
        .decode_request(&headers, body)
        .await?;
    let outcome = state.pipeline.ingest_traces(&tenant, &request).await?;

    Ok(Json(TraceExportResponse {
        status: "success",
        batch_id: outcome.result.batch_id,
        processed_spans: outcome.accepted_records(),
        rejected_spans: outcome.rejected_count,
        errors: outcome.result.errors,
    }))
}

async fn handle_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<EventExportResponse>, IngestError> {
    let tenant = state.tenant(&headers).await?;
    let request: ExportLogsServiceRequest = state
        .pipeline
        .decoder()
        .decode_request(&headers, body)
        .await?;
    let outcome = state.pipeline.ingest_logs(&tenant, &request).await?;
    let rejected = nonzero(outcome.rejected_count);
    Ok(Json(event_response(outcome, rejected, None)))
}

async fn handle_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<EventExportResponse>, IngestError> {
    let tenant = state.tenant(&headers).await?;
    let request: ExportMetricsServiceRequest = state
        .pipeline
        .decoder()
        .decode_request(&headers, body)
        .await?;
    let outcome = state.pipeline.ingest_metrics(&tenant, &request).await?;
    let rejected = nonzero(outcome.rejected_count);
    Ok(Json(event_response(outcome, None, rejected)))
}

fn nonzero(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

fn event_response(
    outcome: OtlpIngestOutcome,
    rejected_log_records: Option<usize>,
    rejected_metrics: Option<usize>,
) -> EventExportResponse {
    EventExportResponse {
        batch_id: outcome.result.batch_id,
        event_count: outcome.result.processed_count,
        status: "accepted",
        rejected_log_records,
        rejected_metrics,
        errors: outcome.result.errors,
    }
}

async fn handle_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<TelemetryBatchResponse>), IngestError> {
    let tenant = state.tenant(&headers).await?;
    let request: RawBatchRequest = read_json(&state.pipeline, &headers, body).await?;
    let outcome = state.pipeline.ingest_batch(&tenant, request).await?;

    let result = outcome.result;
    let status = if result.failed_count == 0 && result.duplicate_count == 0 {
        "accepted"
    } else {
        "partial"
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(TelemetryBatchResponse {
            batch_id: result.batch_id,
            status,
            processed_events: result.processed_count,
            duplicate_events: result.duplicate_count,
            failed_events: result.failed_count,
            processing_time_ms: result.processing_time_ms,
            errors: result.errors,
            duplicate_event_ids: result.duplicate_event_ids,
            event_counts: outcome.event_counts,
            job_id: outcome.offset.map(|o| o.0),
        }),
    ))
}

async fn handle_validate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<ValidationReport>, IngestError> {
    state.tenant(&headers).await?;
    let event: Value = read_json(&state.pipeline, &headers, body).await?;
    Ok(Json(state.pipeline.validate_event(&event)))
}

/// Read a JSON body under the same size and encoding rules as OTLP bodies
async fn read_json<T: DeserializeOwned>(
    pipeline: &IngestPipeline,
    headers: &HeaderMap,
    body: Body,
) -> Result<T, IngestError> {
    let limits = pipeline.decoder().limits();
    if ContentType::from_headers(headers)? != ContentType::Json {
        return Err(DecodeError::UnsupportedMediaType(
            "this endpoint accepts application/json only".to_string(),
        )
        .into());
    }
    let encoding = ContentEncoding::from_headers(headers)?;
    check_content_length(headers, limits.max_body_bytes)?;

    let raw = read_limited(body, limits.max_body_bytes).await?;
    let parsed = match encoding {
        ContentEncoding::Identity => serde_json::from_slice(&raw),
        ContentEncoding::Gzip => {
            serde_json::from_slice(&gunzip(&raw, limits.max_decompressed_bytes)?)
        }
    };
    parsed.map_err(|e| ValidationError::InvalidBody(e.to_string()).into())
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    details: &'a [FieldError],
    #[serde(skip_serializing_if = "Option::is_none")]
    duplicate_event_ids: Option<&'a [String]>,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Ingestion request failed");
        } else if status == StatusCode::UNAUTHORIZED {
            warn!(code = self.code(), "Rejected unauthenticated request");
        } else {
            debug!(code = self.code(), error = %self, "Rejected ingestion request");
        }

        let duplicate_event_ids = match &self {
            IngestError::DuplicateEvents(ids) => Some(ids.as_slice()),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
                duplicate_event_ids,
            },
        };
        (status, Json(body)).into_response()
    }
}
