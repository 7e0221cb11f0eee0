//! Prometheus self-telemetry for the collector
//!
//! All metrics use the `rustmetrics_` prefix.

use prometheus::{
    CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::sync::Arc;

/// Counters describing what the ingest path accepted, rejected and persisted
#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Arc<Registry>,
    /// Metrics applied to the store, by kind
    pub accepted_total: CounterVec,
    /// Rejected metrics or requests, by reason
    pub rejected_total: CounterVec,
    /// Failed backend writes, by backend
    pub persistence_failures_total: CounterVec,
    /// Number of distinct metric ids held
    pub store_size: GenericGauge<AtomicF64>,
    pub uptime_seconds: GenericGauge<AtomicF64>,
}

impl PipelineMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let accepted_total = CounterVec::new(
            Opts::new("rustmetrics_accepted_total", "Metrics applied to the store"),
            &["kind"],
        )?;
        registry.register(Box::new(accepted_total.clone()))?;

        let rejected_total = CounterVec::new(
            Opts::new("rustmetrics_rejected_total", "Rejected metrics by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(rejected_total.clone()))?;

        let persistence_failures_total = CounterVec::new(
            Opts::new(
                "rustmetrics_persistence_failures_total",
                "Failed snapshot or database writes",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(persistence_failures_total.clone()))?;

        let store_size = Gauge::with_opts(Opts::new(
            "rustmetrics_store_size",
            "Distinct metric ids held in the store",
        ))?;
        registry.register(Box::new(store_size.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "rustmetrics_uptime_seconds",
            "Process uptime in seconds",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            accepted_total,
            rejected_total,
            persistence_failures_total,
            store_size,
            uptime_seconds,
        })
    }

    /// Prometheus text exposition of every registered family.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    fn counter_value(vec: &CounterVec, label: &str) -> f64 {
        vec.get_metric_with_label_values(&[label])
            .map(|c| c.get())
            .unwrap_or(0.0)
    }

    pub fn accepted(&self, kind: &str) -> f64 {
        Self::counter_value(&self.accepted_total, kind)
    }

    pub fn rejected(&self, reason: &str) -> f64 {
        Self::counter_value(&self.rejected_total, reason)
    }

    pub fn persistence_failures(&self, backend: &str) -> f64 {
        Self::counter_value(&self.persistence_failures_total, backend)
    }
}
