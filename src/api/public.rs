//! Public API for embedded usage
//!
//! [`IngestPipeline`] runs convert → dedup → publish for one ingestion call.
//! The HTTP server is a thin layer over it; it can also be driven directly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::TenantContext;
use crate::config::{BackendKind, Config};
use crate::dedup::{DedupDecision, DedupEngine, MemoryDedupCache, RedisDedupCache};
use crate::error::{ConfigError, FieldError, IngestError, ServerError, ValidationError};
use crate::event::validation::raw_event_id;
use crate::event::{
    Batch, BatchResult, EventError, EventIdGenerator, RawBatchRequest, TelemetryEvent,
    validate_event,
};
use crate::metrics::{BATCH_SIGNAL, IngestMetrics};
use crate::mock::MockEventStream;
use crate::otlp::{
    Conversion, DecodeLimits, ProtocolDecoder, Signal, convert_logs, convert_metrics,
    convert_traces,
};
use crate::stream::{EventStream, RedisEventStream, StreamOffset, StreamPublisher};

/// Outcome of one OTLP export call
#[derive(Debug, Clone)]
pub struct OtlpIngestOutcome {
    /// Signal ingested
    pub signal: Signal,
    /// Records (spans, log records, metrics) in the request
    pub record_count: usize,
    /// Records that could not be converted
    pub rejected_count: usize,
    /// Stream position, when anything was written
    pub offset: Option<StreamOffset>,
    /// Per-call accounting
    pub result: BatchResult,
}

impl OtlpIngestOutcome {
    /// Records converted into at least one event
    pub fn accepted_records(&self) -> usize {
        self.record_count - self.rejected_count
    }
}

/// Outcome of one batch submission
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Per-call accounting
    pub result: BatchResult,
    /// Published events per category (`traces`, `observations`, ...)
    pub event_counts: BTreeMap<&'static str, usize>,
    /// Stream position, when anything was written
    pub offset: Option<StreamOffset>,
}

/// Result of validating one event without ingesting it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Whether the event would be accepted
    pub valid: bool,
    /// Every problem found
    pub errors: Vec<FieldError>,
}

/// Ingestion pipeline shared by all request handlers
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use telemetry_ingest::{Config, IngestPipeline, MockEventStream};
///
/// # async fn example() -> Result<(), telemetry_ingest::IngestError> {
/// let config = Config::default();
/// let stream = MockEventStream::new();
/// let pipeline = IngestPipeline::in_memory(&config, Arc::new(stream.clone()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct IngestPipeline {
    decoder: ProtocolDecoder,
    dedup: DedupEngine,
    publisher: StreamPublisher,
    metrics: IngestMetrics,
    max_events_per_batch: usize,
}

impl IngestPipeline {
    /// Assemble a pipeline from explicit parts
    pub fn new(
        config: &Config,
        dedup: DedupEngine,
        stream: Arc<dyn EventStream>,
        metrics: IngestMetrics,
    ) -> Self {
        Self {
            decoder: ProtocolDecoder::new(DecodeLimits::from(&config.server)),
            dedup,
            publisher: StreamPublisher::new(stream),
            metrics,
            max_events_per_batch: config.server.max_events_per_batch,
        }
    }

    /// In-memory dedup cache over `stream`, no-op metrics
    pub fn in_memory(config: &Config, stream: Arc<dyn EventStream>) -> Self {
        Self::new(
            config,
            DedupEngine::in_memory(&config.dedup),
            stream,
            IngestMetrics::noop(),
        )
    }

    /// Build the backends named in `config` and assemble a pipeline
    pub async fn from_config(config: &Config, metrics: IngestMetrics) -> Result<Self, IngestError> {
        config.validate()?;

        let redis = || {
            config.redis.as_ref().ok_or_else(|| {
                ConfigError::MissingRequiredField("redis.url is required".to_string())
            })
        };

        let dedup = match config.dedup.backend {
            BackendKind::Memory => {
                DedupEngine::new(Arc::new(MemoryDedupCache::new()), &config.dedup)
            }
            BackendKind::Redis => {
                let cache = RedisDedupCache::connect(redis()?).await?;
                DedupEngine::new(Arc::new(cache), &config.dedup)
            }
        };

        let stream: Arc<dyn EventStream> = match config.stream.backend {
            BackendKind::Memory => {
                warn!("Using in-memory event stream; events are not durably queued");
                Arc::new(MockEventStream::new())
            }
            BackendKind::Redis => {
                Arc::new(RedisEventStream::connect(redis()?, &config.stream).await?)
            }
        };

        info!(
            dedup_backend = ?config.dedup.backend,
            stream_backend = ?config.stream.backend,
            unavailable_policy = config.dedup.unavailable_policy.as_str(),
            "Ingestion pipeline initialized"
        );

        Ok(Self::new(config, dedup, stream, metrics))
    }

    /// Request decoder configured with this pipeline's limits
    pub fn decoder(&self) -> &ProtocolDecoder {
        &self.decoder
    }

    /// Self-metrics sink
    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    /// Convert and publish a trace export request
    pub async fn ingest_traces(
        &self,
        tenant: &TenantContext,
        request: &ExportTraceServiceRequest,
    ) -> Result<OtlpIngestOutcome, IngestError> {
        let started = Instant::now();
        let conversion = convert_traces(request, &mut EventIdGenerator::new());
        self.publish_conversion(Signal::Traces, tenant, conversion, started)
            .await
    }

    /// Convert and publish a logs export request
    pub async fn ingest_logs(
        &self,
        tenant: &TenantContext,
        request: &ExportLogsServiceRequest,
    ) -> Result<OtlpIngestOutcome, IngestError> {
        let started = Instant::now();
        let conversion = convert_logs(request, &mut EventIdGenerator::new());
        self.publish_conversion(Signal::Logs, tenant, conversion, started)
            .await
    }

    /// Convert and publish a metrics export request
    pub async fn ingest_metrics(
        &self,
        tenant: &TenantContext,
        request: &ExportMetricsServiceRequest,
    ) -> Result<OtlpIngestOutcome, IngestError> {
        let started = Instant::now();
        let conversion = convert_metrics(request, &mut EventIdGenerator::new());
        self.publish_conversion(Signal::Metrics, tenant, conversion, started)
            .await
    }

    /// OTLP-derived events carry server-minted ids and skip dedup
    async fn publish_conversion(
        &self,
        signal: Signal,
        tenant: &TenantContext,
        conversion: Conversion,
        started: Instant,
    ) -> Result<OtlpIngestOutcome, IngestError> {
        self.metrics.record_request(signal.as_str());

        let errors = conversion.event_errors();
        let record_count = conversion.record_count;
        let rejected_count = conversion.rejected.len();
        let batch = Batch::assemble(
            tenant.project_id,
            tenant.environment.clone(),
            conversion.events,
        );
        let result = BatchResult {
            batch_id: batch.batch_id,
            processed_count: batch.len(),
            duplicate_count: 0,
            failed_count: errors.len(),
            processing_time_ms: elapsed_ms(started),
            errors,
            duplicate_event_ids: Vec::new(),
        };

        let receipt = match self.publisher.publish_batch(&batch).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.metrics.record_publish_failure(signal.as_str());
                return Err(e.into());
            }
        };

        self.metrics.record_outcome(
            signal.as_str(),
            result.processed_count,
            0,
            result.failed_count,
            started.elapsed(),
        );
        info!(
            signal = signal.as_str(),
            project_id = %tenant.project_id,
            batch_id = %batch.batch_id,
            records = record_count,
            events = result.processed_count,
            rejected = rejected_count,
            "Ingested OTLP export request"
        );

        Ok(OtlpIngestOutcome {
            signal,
            record_count,
            rejected_count,
            offset: receipt.offset,
            result,
        })
    }

    /// Validate, dedup and publish a client batch submission.
    ///
    /// Invalid events are excluded and reported; duplicates are dropped and
    /// reported. Nothing is published when `fail_on_duplicate` is set and a
    /// duplicate is found, or when the dedup cache is unavailable under
    /// `fail_closed`.
    pub async fn ingest_batch(
        &self,
        tenant: &TenantContext,
        request: RawBatchRequest,
    ) -> Result<BatchOutcome, IngestError> {
        let started = Instant::now();
        self.metrics.record_request(BATCH_SIGNAL);

        if request.events.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        if request.events.len() > self.max_events_per_batch {
            return Err(ValidationError::BatchTooLarge {
                count: request.events.len(),
                max: self.max_events_per_batch,
            }
            .into());
        }
        if let Some(metadata) = &request.metadata {
            debug!(metadata = %metadata, "Batch submission metadata");
        }

        let mut valid = Vec::with_capacity(request.events.len());
        let mut errors = Vec::new();
        let mut field_errors = Vec::new();
        for (i, raw) in request.events.iter().enumerate() {
            match validate_event(raw, &format!("events[{i}]")) {
                Ok(event) => valid.push(event),
                Err(problems) => {
                    errors.push(event_error(raw, &problems));
                    field_errors.extend(problems);
                }
            }
        }
        if valid.is_empty() {
            self.metrics
                .record_outcome(BATCH_SIGNAL, 0, 0, errors.len(), started.elapsed());
            return Err(ValidationError::Fields(field_errors).into());
        }

        // Once a claim is taken it is either published or released, even if
        // the caller stops polling this future.
        let pipeline = self.clone();
        let tenant = tenant.clone();
        let fail_on_duplicate = request.fail_on_duplicate;
        tokio::spawn(async move {
            pipeline
                .admit_and_publish(tenant, valid, errors, fail_on_duplicate, started)
                .await
        })
        .await
        .map_err(|e| ServerError::TaskFailed(e.to_string()))?
    }

    async fn admit_and_publish(
        self,
        tenant: TenantContext,
        valid: Vec<TelemetryEvent>,
        errors: Vec<EventError>,
        fail_on_duplicate: bool,
        started: Instant,
    ) -> Result<BatchOutcome, IngestError> {
        let project_id = tenant.project_id;
        let mut admitted = Vec::with_capacity(valid.len());
        let mut claimed = Vec::new();
        let mut duplicates = Vec::new();
        for event in valid {
            let decision = match self.dedup.check(&project_id, &event).await {
                Ok(decision) => decision,
                Err(e) => {
                    self.metrics.record_dedup_degraded("rejected");
                    self.dedup.release(&project_id, &claimed).await;
                    return Err(e.into());
                }
            };
            match decision {
                DedupDecision::Duplicate => duplicates.push(event.event_id.to_string()),
                DedupDecision::Claimed => {
                    claimed.push(event.event_id.to_string());
                    admitted.push(event);
                }
                DedupDecision::AdmittedDegraded => {
                    self.metrics.record_dedup_degraded("admitted");
                    admitted.push(event);
                }
                DedupDecision::NotApplicable => admitted.push(event),
            }
        }

        if fail_on_duplicate && !duplicates.is_empty() {
            self.dedup.release(&project_id, &claimed).await;
            info!(
                project_id = %project_id,
                duplicates = duplicates.len(),
                "Rejected batch containing duplicates"
            );
            return Err(IngestError::DuplicateEvents(duplicates));
        }

        let batch = Batch::assemble(project_id, tenant.environment, admitted);
        let mut event_counts = BTreeMap::new();
        for event in &batch.events {
            *event_counts.entry(event.event_type.category()).or_insert(0) += 1;
        }
        let result = BatchResult {
            batch_id: batch.batch_id,
            processed_count: batch.len(),
            duplicate_count: duplicates.len(),
            failed_count: errors.len(),
            processing_time_ms: elapsed_ms(started),
            errors,
            duplicate_event_ids: duplicates,
        };

        let receipt = match self.publisher.publish_batch(&batch).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.metrics.record_publish_failure(BATCH_SIGNAL);
                self.dedup.release(&project_id, &claimed).await;
                return Err(e.into());
            }
        };

        self.metrics.record_outcome(
            BATCH_SIGNAL,
            result.processed_count,
            result.duplicate_count,
            result.failed_count,
            started.elapsed(),
        );
        info!(
            project_id = %project_id,
            batch_id = %batch.batch_id,
            processed = result.processed_count,
            duplicates = result.duplicate_count,
            failed = result.failed_count,
            "Ingested batch submission"
        );

        Ok(BatchOutcome {
            result,
            event_counts,
            offset: receipt.offset,
        })
    }

    /// Check one event without deduplicating or publishing it
    pub fn validate_event(&self, raw: &Value) -> ValidationReport {
        match validate_event(raw, "") {
            Ok(_) => ValidationReport {
                valid: true,
                errors: Vec::new(),
            },
            Err(errors) => ValidationReport {
                valid: false,
                errors,
            },
        }
    }
}

fn event_error(raw: &Value, problems: &[FieldError]) -> EventError {
    let code = problems.first().map_or("validation_failed", |p| p.code);
    let message = problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    EventError::new(raw_event_id(raw), code, message)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
