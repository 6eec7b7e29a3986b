//! Observability: structured logging with optional OTLP traces and metrics.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # use mg_server::{config::ObservabilityConfig, observability};
//! # let config = ObservabilityConfig {
//! #     enabled: false,
//! #     otlp_endpoint: String::new(),
//! #     service_name: String::new(),
//! #     trace_sample_ratio: 0.1,
//! #     log_level: String::new(),
//! # };
//! // In main(), before any logging:
//! let (_otel_guard, _meter_provider) = observability::init(&config).unwrap();
//! // `_otel_guard` must stay alive until the end of `main`.
//! ```

pub mod metrics;
pub mod tracing;

use opentelemetry_sdk::metrics::SdkMeterProvider;
pub use tracing::OtelGuard;

use crate::config::ObservabilityConfig;

/// Initialise tracing, then metrics, and register the router's instruments.
///
/// Returns the guard that flushes span export on drop and the meter provider
/// (`None` when OTLP export is disabled).
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<(OtelGuard, Option<SdkMeterProvider>)> {
    let guard = tracing::init(config)?;
    let meter_provider = metrics::init(config)?;
    metrics::register_metrics();
    Ok((guard, meter_provider))
}
