//! Tracing setup. See [`init_tracing`].

use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// When set, spans are exported over OTLP/HTTP to this endpoint.
pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Install the global tracing subscriber for `service_name`.
///
/// Logs go to stdout, filtered by `RUST_LOG` (default `info`). Spans are
/// bridged to OpenTelemetry; they leave the process only when
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set, otherwise the provider has no
/// exporter and spans are dropped when they close.
///
/// Returns the tracer provider. Call [`SdkTracerProvider::shutdown`] before
/// exiting so buffered spans are flushed.
pub fn init_tracing(service_name: &'static str) -> eyre::Result<SdkTracerProvider> {
    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, service_name),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let mut builder = SdkTracerProvider::builder().with_resource(resource);
    if std::env::var_os(OTLP_ENDPOINT_ENV).is_some() {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .build()?;
        builder = builder.with_batch_exporter(exporter);
    }
    let provider = builder.build();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .with(tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name)))
        .try_init()?;

    Ok(provider)
}
