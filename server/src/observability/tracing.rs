//! Tracing subscriber and OpenTelemetry tracer provider initialization.
//!
//! Installs a layered `tracing_subscriber` registry with JSON stdout output.
//! When export is enabled, spans are also bridged to an OTLP collector with
//! secret-looking attributes stripped before export.

use anyhow::Context as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{
    BatchSpanProcessor, Sampler, SdkTracerProvider, SpanData, SpanExporter,
};
use opentelemetry_sdk::Resource;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::ObservabilityConfig;

/// RAII guard that shuts down the tracer provider when dropped.
///
/// Bind it to a variable that lives until the end of `main`.
pub struct OtelGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "OTel tracer provider shutdown error");
            }
        }
    }
}

/// Span exporter wrapper that drops attributes whose keys look secret.
#[derive(Debug)]
struct RedactingSpanExporter<E> {
    inner: E,
}

impl<E> SpanExporter for RedactingSpanExporter<E>
where
    E: SpanExporter,
{
    async fn export(&self, mut batch: Vec<SpanData>) -> OTelSdkResult {
        for span in &mut batch {
            span.attributes
                .retain(|kv| !is_secret_attribute_key(kv.key.as_str()));
            for event in &mut span.events.events {
                event
                    .attributes
                    .retain(|kv| !is_secret_attribute_key(kv.key.as_str()));
            }
        }

        self.inner.export(batch).await
    }

    fn shutdown(&mut self) -> OTelSdkResult {
        self.inner.shutdown()
    }

    fn force_flush(&mut self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

/// Keys that may carry webhook secrets or signed payloads.
fn is_secret_attribute_key(key: &str) -> bool {
    const SECRET_PATTERNS: [&str; 6] = [
        "secret",
        "token",
        "signature",
        "authorization",
        "password",
        "raw_event",
    ];

    let lowered = key.to_ascii_lowercase();
    SECRET_PATTERNS.iter().any(|pattern| lowered.contains(pattern))
}

/// Shared [`Resource`] describing this service instance.
pub(crate) fn build_resource(config: &ObservabilityConfig) -> Resource {
    let deployment_env =
        std::env::var("DEPLOYMENT_ENVIRONMENT").unwrap_or_else(|_| "local".to_owned());

    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", deployment_env),
        ])
        .build()
}

/// Install the global `tracing` subscriber.
///
/// With export disabled only the JSON stdout layer is installed and the
/// returned guard is a no-op.
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<OtelGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if !config.enabled {
        Registry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("Failed to install tracing subscriber")?;

        return Ok(OtelGuard {
            tracer_provider: None,
        });
    }

    let sampler = Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
        config.trace_sample_ratio,
    )));

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .context("Failed to build OTLP span exporter")?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_resource(build_resource(config))
        .with_sampler(sampler)
        .with_span_processor(
            BatchSpanProcessor::builder(RedactingSpanExporter {
                inner: span_exporter,
            })
            .build(),
        )
        .build();

    let otel_layer = tracing_opentelemetry::layer().with_tracer(
        opentelemetry::trace::TracerProvider::tracer(&tracer_provider, "mg-server"),
    );

    Registry::default()
        .with(filter)
        .with(otel_layer)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(OtelGuard {
        tracer_provider: Some(tracer_provider),
    })
}
