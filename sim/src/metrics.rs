//! # Prometheus Metrics
//!
//! Vault totals for the connected wallet, refreshed on every report tick
//! and scraped at `/metrics`.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

use lstvault_core::VaultHandle;

/// Holds all Prometheus metric handles for the simulator.
#[derive(Clone)]
pub struct SimMetrics {
    registry: Registry,
    /// Positions currently open.
    pub open_positions: IntGauge,
    /// Sum of `currentValue` over open positions.
    pub total_value: Gauge,
    /// Sum of accrued earnings over open positions.
    pub total_earnings: Gauge,
    /// Closed positions recorded in history.
    pub history_entries: IntGauge,
    /// Free wBTC.
    pub wbtc_balance: Gauge,
    /// Free stCORE.
    pub stcore_balance: Gauge,
    /// Report ticks since start.
    pub report_ticks_total: IntCounter,
}

impl SimMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("lstvault".into()), None)?;

        let open_positions = IntGauge::new("open_positions", "Number of open vault positions")?;
        registry.register(Box::new(open_positions.clone()))?;

        let total_value = Gauge::new("total_value", "Current value of all open positions")?;
        registry.register(Box::new(total_value.clone()))?;

        let total_earnings = Gauge::new("total_earnings", "Earnings accrued on open positions")?;
        registry.register(Box::new(total_earnings.clone()))?;

        let history_entries =
            IntGauge::new("history_entries", "Number of closed positions in history")?;
        registry.register(Box::new(history_entries.clone()))?;

        let wbtc_balance = Gauge::new("wbtc_balance", "Free wBTC balance")?;
        registry.register(Box::new(wbtc_balance.clone()))?;

        let stcore_balance = Gauge::new("stcore_balance", "Free stCORE balance")?;
        registry.register(Box::new(stcore_balance.clone()))?;

        let report_ticks_total =
            IntCounter::new("report_ticks_total", "Number of totals reports emitted")?;
        registry.register(Box::new(report_ticks_total.clone()))?;

        Ok(Self {
            registry,
            open_positions,
            total_value,
            total_earnings,
            history_entries,
            wbtc_balance,
            stcore_balance,
            report_ticks_total,
        })
    }

    /// Copies the handle's current totals into the gauges.
    pub fn observe(&self, vault: &VaultHandle) {
        let balances = vault.user_balances();
        self.open_positions.set(vault.positions().len() as i64);
        self.total_value.set(vault.total_value());
        self.total_earnings.set(vault.total_earnings());
        self.history_entries.set(vault.earnings_history().len() as i64);
        self.wbtc_balance.set(balances.wbtc);
        self.stcore_balance.set(balances.stcore);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<SimMetrics>;

/// Router serving `/metrics`.
pub fn router(metrics: SharedMetrics) -> axum::Router {
    axum::Router::new()
        .route("/metrics", axum::routing::get(metrics_handler))
        .with_state(metrics)
}

/// Axum handler that renders `/metrics` in Prometheus text format.
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
            tracing::error!(error = %e, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
