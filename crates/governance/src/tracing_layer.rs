//! Logging and distributed tracing configuration.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use secure_exec_core::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

const DEFAULT_FILTER: &str = "info,secure_exec=debug";
const SERVICE_NAME: &str = "secure-exec";

/// Configure stdout logging, plus OTLP export when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Logs go to stderr so stdout stays reserved for execution results.
pub fn configure_tracing(json_logs: bool) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into()),
    );

    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
    let otel_layer = match &endpoint {
        Some(endpoint) => {
            let provider = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(
                    opentelemetry_otlp::new_exporter()
                        .tonic()
                        .with_endpoint(endpoint.clone()),
                )
                .with_trace_config(
                    sdktrace::Config::default().with_resource(Resource::new(vec![KeyValue::new(
                        "service.name",
                        SERVICE_NAME,
                    )])),
                )
                .install_batch(runtime::Tokio)
                .map_err(|e| Error::governance(format!("Failed to install OTLP pipeline: {}", e)))?;

            let tracer = provider.tracer(SERVICE_NAME);
            global::set_tracer_provider(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| Error::governance(format!("Failed to install subscriber: {}", e)))?;

    if let Some(endpoint) = endpoint {
        tracing::info!(endpoint = %endpoint, "OpenTelemetry tracing enabled");
    }

    Ok(())
}

/// Flush and shut down the OTLP exporter, if one was installed.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
}
