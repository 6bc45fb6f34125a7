//! Self-metrics sink
//!
//! [`IngestMetrics`] holds the service's own instruments. It is built from an
//! explicit [`Meter`] and passed into the pipeline; nothing is registered
//! globally.

use std::time::Duration;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

use crate::config::TelemetryConfig;

/// Instrumentation scope name
pub const METER_NAME: &str = "telemetry-ingest";

/// Counters and histograms recorded by the ingestion pipeline
#[derive(Clone)]
pub struct IngestMetrics {
    requests: Counter<u64>,
    events_published: Counter<u64>,
    duplicates: Counter<u64>,
    event_failures: Counter<u64>,
    dedup_degraded: Counter<u64>,
    publish_failures: Counter<u64>,
    processing_time: Histogram<f64>,
}

impl IngestMetrics {
    /// Create every instrument on `meter`
    pub fn new(meter: &Meter) -> Self {
        Self {
            requests: meter
                .u64_counter("ingest.requests")
                .with_description("Ingestion requests by signal")
                .build(),
            events_published: meter
                .u64_counter("ingest.events.published")
                .with_description("Events appended to the event stream")
                .build(),
            duplicates: meter
                .u64_counter("ingest.events.duplicate")
                .with_description("Events dropped as already accepted")
                .build(),
            event_failures: meter
                .u64_counter("ingest.events.failed")
                .with_description("Events excluded by conversion or validation")
                .build(),
            dedup_degraded: meter
                .u64_counter("ingest.dedup.degraded")
                .with_description("Dedup checks made while the cache was unavailable")
                .build(),
            publish_failures: meter
                .u64_counter("ingest.publish.failures")
                .with_description("Batches the event stream rejected")
                .build(),
            processing_time: meter
                .f64_histogram("ingest.processing.duration")
                .with_description("Time spent handling one ingestion call")
                .with_unit("ms")
                .build(),
        }
    }

    /// Instruments on a provider with no readers; records are discarded
    pub fn noop() -> Self {
        let provider = SdkMeterProvider::builder().build();
        Self::new(&provider.meter(METER_NAME))
    }

    /// One ingestion request for `signal`
    pub fn record_request(&self, signal: &'static str) {
        self.requests.add(1, &[KeyValue::new("signal", signal)]);
    }

    /// Outcome of one ingestion call
    pub fn record_outcome(
        &self,
        signal: &'static str,
        published: usize,
        duplicates: usize,
        failed: usize,
        elapsed: Duration,
    ) {
        let attrs = [KeyValue::new("signal", signal)];
        if published > 0 {
            self.events_published.add(published as u64, &attrs);
        }
        if duplicates > 0 {
            self.duplicates.add(duplicates as u64, &attrs);
        }
        if failed > 0 {
            self.event_failures.add(failed as u64, &attrs);
        }
        self.processing_time
            .record(elapsed.as_secs_f64() * 1000.0, &attrs);
    }

    /// Dedup check made without the cache; `outcome` is `admitted` or `rejected`
    pub fn record_dedup_degraded(&self, outcome: &'static str) {
        self.dedup_degraded.add(1, &[KeyValue::new("outcome", outcome)]);
    }

    /// Stream write failure
    pub fn record_publish_failure(&self, signal: &'static str) {
        self.publish_failures.add(1, &[KeyValue::new("signal", signal)]);
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::noop()
    }
}

/// Signal label for the batch endpoint, which carries mixed event types
pub const BATCH_SIGNAL: &str = "batch";

/// Build the process meter provider.
///
/// With an endpoint configured, metrics are exported over OTLP/gRPC on a
/// periodic reader; otherwise the provider has no readers.
pub fn init_meter_provider(config: &TelemetryConfig) -> anyhow::Result<SdkMeterProvider> {
    let resource = Resource::builder()
        .with_attributes(vec![
            KeyValue::new("service.name", METER_NAME),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let Some(endpoint) = config.otlp_endpoint.as_deref() else {
        return Ok(SdkMeterProvider::builder().with_resource(resource).build());
    };

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(3))
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(config.export_interval_secs))
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build())
}
