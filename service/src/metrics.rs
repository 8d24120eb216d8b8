//! # Prometheus Metrics
//!
//! Exposes operational metrics for the payment service. Scraped by
//! Prometheus at the `/metrics` HTTP endpoint on the configured metrics
//! port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so
//! they do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the service.
///
/// Clone-friendly (wraps `Arc` internally via prometheus handles) so it can
/// be shared across request handlers and the background sweep task.
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of transfers committed to the journal.
    pub transfers_committed_total: IntCounter,
    /// Total number of transfer requests refused by validation.
    pub transfers_rejected_total: IntCounter,
    /// Total number of accounts provisioned.
    pub accounts_created_total: IntCounter,
    /// Total number of recurring payments executed by sweeps.
    pub recurring_executed_total: IntCounter,
    /// Total number of recurring executions the engine refused.
    pub recurring_failed_total: IntCounter,
    /// Total number of scheduler sweeps run.
    pub sweeps_total: IntCounter,
    /// Standing instructions currently on the books.
    pub recurring_instructions_active: IntGauge,
    /// Sum of all account balances, in minor units.
    pub total_balance_minor_units: IntGauge,
    /// Histogram of transfer commit latency in seconds.
    pub transfer_latency_seconds: Histogram,
}

impl ServiceMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("vega".into()), None)
            .expect("failed to create prometheus registry");

        let transfers_committed_total = IntCounter::new(
            "transfers_committed_total",
            "Total number of transfers committed to the journal",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transfers_committed_total.clone()))
            .expect("metric registration");

        let transfers_rejected_total = IntCounter::new(
            "transfers_rejected_total",
            "Total number of transfer requests refused by validation",
        )
        .expect("metric creation");
        registry
            .register(Box::new(transfers_rejected_total.clone()))
            .expect("metric registration");

        let accounts_created_total =
            IntCounter::new("accounts_created_total", "Total number of accounts provisioned")
                .expect("metric creation");
        registry
            .register(Box::new(accounts_created_total.clone()))
            .expect("metric registration");

        let recurring_executed_total = IntCounter::new(
            "recurring_executed_total",
            "Total number of recurring payments executed by sweeps",
        )
        .expect("metric creation");
        registry
            .register(Box::new(recurring_executed_total.clone()))
            .expect("metric registration");

        let recurring_failed_total = IntCounter::new(
            "recurring_failed_total",
            "Total number of recurring executions refused by the transfer engine",
        )
        .expect("metric creation");
        registry
            .register(Box::new(recurring_failed_total.clone()))
            .expect("metric registration");

        let sweeps_total = IntCounter::new("sweeps_total", "Total number of scheduler sweeps run")
            .expect("metric creation");
        registry
            .register(Box::new(sweeps_total.clone()))
            .expect("metric registration");

        let recurring_instructions_active = IntGauge::new(
            "recurring_instructions_active",
            "Number of standing payment instructions currently on the books",
        )
        .expect("metric creation");
        registry
            .register(Box::new(recurring_instructions_active.clone()))
            .expect("metric registration");

        let total_balance_minor_units = IntGauge::new(
            "total_balance_minor_units",
            "Sum of all account balances in minor currency units",
        )
        .expect("metric creation");
        registry
            .register(Box::new(total_balance_minor_units.clone()))
            .expect("metric registration");

        let transfer_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "transfer_latency_seconds",
                "End-to-end transfer commit latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(transfer_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            transfers_committed_total,
            transfers_rejected_total,
            accounts_created_total,
            recurring_executed_total,
            recurring_failed_total,
            sweeps_total,
            recurring_instructions_active,
            total_balance_minor_units,
            transfer_latency_seconds,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<ServiceMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Returns HTTP 500 if encoding fails (should never happen in practice).
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
