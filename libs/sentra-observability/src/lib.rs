//! Process-wide logging and trace export.
//!
//! Logs go to stdout through `tracing-subscriber` (`RUST_LOG`, default
//! `info`; `RUST_LOG_FORMAT=json` for JSON lines). Spans are exported over
//! OTLP/gRPC using the standard `OTEL_EXPORTER_OTLP_*` variables unless
//! `OTEL_SDK_DISABLED=true`, in which case spans are still created but
//! dropped. The W3C trace-context + baggage propagator is installed
//! globally for collaborators that use the global API.

use opentelemetry::global;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry_otlp::{ExporterBuildError, SpanExporter};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::EnvFilter;

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";

#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    #[error("span exporter: {0}")]
    Exporter(#[from] ExporterBuildError),

    #[error("log subscriber: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Keeps the tracer provider alive; `shutdown` flushes pending spans.
pub struct ObservabilityGuard {
    provider: SdkTracerProvider,
}

impl ObservabilityGuard {
    pub fn shutdown(self) {
        if let Err(e) = self.provider.shutdown() {
            tracing::warn!(error = %e, "tracer provider shutdown failed");
        }
    }
}

fn sdk_disabled() -> bool {
    std::env::var(OTEL_SDK_DISABLED)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn json_logs() -> bool {
    std::env::var("RUST_LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
}

/// Install the log subscriber, the global tracer provider and propagator.
pub fn init(service_name: impl Into<String>) -> Result<ObservabilityGuard, ObservabilityError> {
    init_logging()?;

    let service_name = service_name.into();
    let resource = Resource::builder().with_service_name(service_name.clone()).build();
    let mut builder = SdkTracerProvider::builder().with_resource(resource);

    if sdk_disabled() {
        tracing::info!(service = %service_name, "span export disabled ({OTEL_SDK_DISABLED})");
    } else {
        let exporter = SpanExporter::builder().with_tonic().build()?;
        builder = builder.with_batch_exporter(exporter);
        tracing::info!(service = %service_name, "span export over OTLP/gRPC");
    }

    let provider = builder.build();
    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ]));

    Ok(ObservabilityGuard { provider })
}

/// Logging only, for command-line tools.
pub fn init_logging() -> Result<(), ObservabilityError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if json_logs() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .json()
            .try_init()
            .map_err(ObservabilityError::Subscriber)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(ObservabilityError::Subscriber)
    }
}
