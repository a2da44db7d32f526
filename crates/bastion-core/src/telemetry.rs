//! Tracing and OpenTelemetry initialization.
//!
//! The cache layer only emits `tracing` events; the embedding process decides
//! where they go by calling [`init_telemetry`] once at startup.

#[cfg(feature = "telemetry")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "telemetry")]
use opentelemetry::KeyValue;
#[cfg(feature = "telemetry")]
use opentelemetry_otlp::WithExportConfig;
#[cfg(feature = "telemetry")]
use opentelemetry_sdk::{
    runtime,
    trace::{RandomIdGenerator, Sampler},
    Resource,
};
#[cfg(feature = "telemetry")]
use opentelemetry_semantic_conventions::resource::SERVICE_NAME;
#[cfg(feature = "telemetry")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::BastionResult;
use serde::{Deserialize, Serialize};

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether OpenTelemetry span export is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Service name reported with every span.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// OTLP endpoint URL (e.g., "http://localhost:4317").
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Sampling ratio (0.0 to 1.0).
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,

    /// Default filter directive when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json_logs: bool,
}

fn default_service_name() -> String {
    "bastion-cache".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_log_filter() -> String {
    "info,bastion=debug".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: default_service_name(),
            otlp_endpoint: None,
            sampling_ratio: default_sampling_ratio(),
            log_filter: default_log_filter(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Maps the configured ratio onto an OpenTelemetry sampler.
    #[cfg(feature = "telemetry")]
    fn sampler(&self) -> Sampler {
        if self.sampling_ratio >= 1.0 {
            Sampler::AlwaysOn
        } else if self.sampling_ratio <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.sampling_ratio)
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Installs an env-filtered fmt layer (pretty or JSON) and, when
/// `config.enabled`, an OpenTelemetry layer exporting over OTLP.
#[cfg(feature = "telemetry")]
pub fn init_telemetry(config: &TelemetryConfig) -> BastionResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer().json().with_target(true).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    if !config.enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| crate::BastionError::Internal(format!("Failed to install subscriber: {}", e)))?;
        return Ok(());
    }

    let resource = Resource::new(vec![KeyValue::new(SERVICE_NAME, config.service_name.clone())]);

    let builder = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_sampler(config.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource);

    let tracer_provider = match &config.otlp_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| crate::BastionError::Internal(format!("Failed to create OTLP exporter: {}", e)))?;
            builder.with_batch_exporter(exporter, runtime::Tokio).build()
        }
        None => builder.build(),
    };

    let tracer = tracer_provider.tracer("bastion-cache");
    opentelemetry::global::set_tracer_provider(tracer_provider);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()
        .map_err(|e| crate::BastionError::Internal(format!("Failed to install subscriber: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        sampling_ratio = %config.sampling_ratio,
        otlp_endpoint = ?config.otlp_endpoint,
        "Telemetry initialized"
    );

    Ok(())
}

/// Flush pending spans and tear down the global tracer provider.
#[cfg(feature = "telemetry")]
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
    tracing::info!("Telemetry shutdown complete");
}

/// No-op when the `telemetry` feature is disabled.
#[cfg(not(feature = "telemetry"))]
pub fn init_telemetry(_config: &TelemetryConfig) -> BastionResult<()> {
    Ok(())
}

/// No-op when the `telemetry` feature is disabled.
#[cfg(not(feature = "telemetry"))]
pub fn shutdown_telemetry() {}
