use anyhow::Result;
use opentelemetry::{global, trace::TracerProvider as _};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::{SdkTracerProvider, TracerProviderBuilder};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::config::{AppConfig, TelemetryConfig};

const TRACER_NAME: &str = "megaconfigmap";

/// Log lines on stderr, filtered by `RUST_LOG` (`info` when unset). Stdout is
/// left to command output.
fn log_layer(config: &AppConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.structured_logging {
        tracing_subscriber::fmt::layer()
            .json()
            .with_span_list(false)
            .flatten_event(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    layer.with_filter(filter).boxed()
}

fn otlp_tracer_provider(telemetry: &TelemetryConfig) -> Result<SdkTracerProvider> {
    let mut exporter = SpanExporter::builder().with_tonic();
    if let Some(endpoint) = &telemetry.endpoint {
        exporter = exporter.with_endpoint(endpoint.clone());
    }
    Ok(TracerProviderBuilder::default()
        .with_simple_exporter(exporter.build()?)
        .build())
}

/// Installs the global subscriber. Returns the span export pipeline when
/// telemetry is enabled, to be handed to [`shutdown_tracing`] before exit.
pub fn setup_tracing(config: &AppConfig) -> Result<Option<SdkTracerProvider>> {
    let tracer_provider = if config.telemetry.enable_tracing {
        Some(otlp_tracer_provider(&config.telemetry)?)
    } else {
        None
    };
    let span_layer = tracer_provider
        .as_ref()
        .map(|provider| tracing_opentelemetry::layer().with_tracer(provider.tracer(TRACER_NAME)));

    let subscriber = Registry::default().with(log_layer(config)).with(span_layer);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        warn!("global subscriber already installed, keeping it: {:?}", e);
    }
    if let Some(provider) = &tracer_provider {
        global::set_tracer_provider(provider.clone());
    }
    Ok(tracer_provider)
}

/// Exports pending spans and stops the provider.
pub fn shutdown_tracing(tracer_provider: Option<SdkTracerProvider>) {
    let Some(tracer_provider) = tracer_provider else {
        return;
    };
    if let Err(err) = tracer_provider.force_flush() {
        warn!("failed to flush spans: {:?}", err);
    }
    if let Err(err) = tracer_provider.shutdown() {
        warn!("failed to shut down span export: {:?}", err);
    }
}
