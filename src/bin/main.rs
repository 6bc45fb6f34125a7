//! Standalone Telemetry Ingestion Service
//!
//! Runs the OTLP/HTTP ingestion server. An optional first argument names a
//! YAML configuration file; `OTLP_INGEST_*` environment variables override it.

use std::sync::Arc;

use opentelemetry::metrics::MeterProvider;
use telemetry_ingest::metrics::{METER_NAME, init_meter_provider};
use telemetry_ingest::{
    ApiKeyResolver, AppState, ConfigLoader, IngestMetrics, IngestPipeline, OtlpHttpServer,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let provided = match std::env::args().nth(1) {
        Some(path) => Some(ConfigLoader::from_yaml(&path)?),
        None => None,
    };
    let config = ConfigLoader::load(provided)?;

    let meter_provider = init_meter_provider(&config.telemetry)?;
    let metrics = IngestMetrics::new(&meter_provider.meter(METER_NAME));

    let pipeline = IngestPipeline::from_config(&config, metrics).await?;
    let auth = ApiKeyResolver::from_config(&config.auth);
    if config.auth.api_keys.is_empty() {
        warn!("No API keys configured; every ingestion request will be rejected");
    }

    let server = OtlpHttpServer::new(
        config.server.clone(),
        AppState::new(pipeline, Arc::new(auth)),
    );

    info!(
        bind_address = %config.server.bind_address,
        port = config.server.port,
        "Telemetry ingestion service started"
    );

    let result = server.serve(shutdown_signal()).await;

    info!("Shutting down...");
    if let Err(e) = meter_provider.shutdown() {
        warn!(error = %e, "Failed to flush self-metrics");
    }

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
