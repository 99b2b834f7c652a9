//! Prometheus metrics for the trading engine.
//!
//! All metrics follow the `market_engine_*` naming convention and are
//! rendered on the HTTP boundary's `/metrics` route.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Centralized metrics registry.
pub struct EngineMetrics {
    registry: Registry,
    /// Orders that reached FILLED.
    pub orders_executed: IntCounter,
    /// Orders rejected, labeled by rejection kind.
    pub orders_rejected: IntCounterVec,
    /// Requests refused by the rate limiter.
    pub rate_limited: IntCounter,
    /// Cached balances corrected during reconciliation.
    pub balance_drift_corrections: IntCounter,
}

impl EngineMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_executed = IntCounter::new(
            "market_engine_orders_executed_total",
            "Total orders filled against the AMM",
        )?;
        let orders_rejected = IntCounterVec::new(
            Opts::new(
                "market_engine_orders_rejected_total",
                "Total orders rejected",
            ),
            &["reason"],
        )?;
        let rate_limited = IntCounter::new(
            "market_engine_rate_limited_total",
            "Requests refused by the rate limiter",
        )?;
        let balance_drift_corrections = IntCounter::new(
            "market_engine_balance_drift_corrections_total",
            "Cached balances overwritten by reconciliation",
        )?;

        registry.register(Box::new(orders_executed.clone()))?;
        registry.register(Box::new(orders_rejected.clone()))?;
        registry.register(Box::new(rate_limited.clone()))?;
        registry.register(Box::new(balance_drift_corrections.clone()))?;

        Ok(Self {
            registry,
            orders_executed,
            orders_rejected,
            rate_limited,
            balance_drift_corrections,
        })
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
