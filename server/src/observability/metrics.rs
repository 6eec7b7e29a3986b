//! OpenTelemetry meter provider and router instruments.
//!
//! Instruments live in `OnceLock`s and are registered once at startup.
//! Recording before registration is a no-op, so library code and tests can
//! call the `record_*` helpers unconditionally.

use std::sync::OnceLock;

use anyhow::Context as _;
use opentelemetry::metrics::Counter;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::metrics::SdkMeterProvider;

use crate::config::ObservabilityConfig;

static WEBHOOK_EVENTS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
static ROUTE_FAILURES_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
static TEMPLATE_FORWARDS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
static SESSION_RELOADS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
static EVENTS_FED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

/// Initialise the global `OTel` [`SdkMeterProvider`].
///
/// Returns `None` when export is disabled; the global provider then stays the
/// no-op default and instruments record nothing.
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<Option<SdkMeterProvider>> {
    if !config.enabled {
        return Ok(None);
    }

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .context("Failed to build OTLP metric exporter")?;

    // `with_periodic_exporter` defaults to a 60-second interval.
    // Override by setting `OTEL_METRIC_EXPORT_INTERVAL` (milliseconds).
    let provider = SdkMeterProvider::builder()
        .with_resource(super::tracing::build_resource(config))
        .with_periodic_exporter(exporter)
        .build();

    global::set_meter_provider(provider.clone());
    Ok(Some(provider))
}

/// Registers all router metrics. Call once at startup after `init()`.
pub fn register_metrics() {
    let meter = global::meter("mg-server");

    WEBHOOK_EVENTS_TOTAL.get_or_init(|| {
        meter
            .u64_counter("mg_webhook_events_total")
            .with_description("Inbound webhook events by classification")
            .build()
    });

    ROUTE_FAILURES_TOTAL.get_or_init(|| {
        meter
            .u64_counter("mg_route_failures_total")
            .with_description("Contained routing failures by reason")
            .build()
    });

    TEMPLATE_FORWARDS_TOTAL.get_or_init(|| {
        meter
            .u64_counter("mg_template_forwards_total")
            .with_description("Template status forwards by outcome")
            .build()
    });

    SESSION_RELOADS_TOTAL.get_or_init(|| {
        meter
            .u64_counter("mg_session_reloads_total")
            .with_description("Session registry reloads by outcome")
            .build()
    });

    EVENTS_FED_TOTAL.get_or_init(|| {
        meter
            .u64_counter("mg_events_fed_total")
            .with_description("Events handed to live sessions")
            .build()
    });
}

pub fn record_webhook_event(kind: &'static str) {
    if let Some(counter) = WEBHOOK_EVENTS_TOTAL.get() {
        counter.add(1, &[KeyValue::new("kind", kind)]);
    }
}

pub fn record_route_failure(reason: &'static str) {
    if let Some(counter) = ROUTE_FAILURES_TOTAL.get() {
        counter.add(1, &[KeyValue::new("reason", reason)]);
    }
}

/// `outcome` is `delivered`, `failed` or `skipped`.
pub fn record_template_forward(outcome: &'static str) {
    if let Some(counter) = TEMPLATE_FORWARDS_TOTAL.get() {
        counter.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// `outcome` is `ok`, `deduplicated` or `failed`.
pub fn record_session_reload(outcome: &'static str) {
    if let Some(counter) = SESSION_RELOADS_TOTAL.get() {
        counter.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

pub fn record_event_fed() {
    if let Some(counter) = EVENTS_FED_TOTAL.get() {
        counter.add(1, &[]);
    }
}
