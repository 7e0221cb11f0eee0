//! Push-based telemetry reporter
//!
//! Periodically writes the pipeline counters as one structured JSON log line.
//! Nothing is exposed over HTTP.

use crate::domain::ports::MetricReader;
use crate::infrastructure::observability::metrics::PipelineMetrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Telemetry snapshot for JSON output
#[derive(Debug, Serialize)]
pub struct TelemetrySnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub store_size: usize,
    pub accepted_gauges: f64,
    pub accepted_counters: f64,
    pub rejected: RejectionSnapshot,
    pub persistence_failures: PersistenceFailureSnapshot,
}

#[derive(Debug, Serialize)]
pub struct RejectionSnapshot {
    pub protocol: f64,
    pub auth: f64,
    pub invalid: f64,
    pub unsupported: f64,
    pub subnet: f64,
}

#[derive(Debug, Serialize)]
pub struct PersistenceFailureSnapshot {
    pub file: f64,
    pub database: f64,
}

pub struct TelemetryReporter {
    store: Arc<dyn MetricReader>,
    metrics: PipelineMetrics,
    start_time: Instant,
    interval: Duration,
}

impl TelemetryReporter {
    pub fn new(store: Arc<dyn MetricReader>, metrics: PipelineMetrics, interval: Duration) -> Self {
        Self {
            store,
            metrics,
            start_time: Instant::now(),
            interval,
        }
    }

    /// Emit a snapshot every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "TelemetryReporter: Starting push-based telemetry (interval: {:?})",
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("TelemetryReporter: stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let snapshot = self.collect_snapshot();
                    match serde_json::to_string(&snapshot) {
                        Ok(json) => info!(target: "telemetry", "TELEMETRY_JSON:{}", json),
                        Err(e) => warn!("TelemetryReporter: failed to serialize snapshot: {}", e),
                    }
                }
            }
        }
    }

    pub fn collect_snapshot(&self) -> TelemetrySnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let store_size = self.store.len();

        self.metrics.store_size.set(store_size as f64);
        self.metrics.uptime_seconds.set(uptime as f64);

        TelemetrySnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            store_size,
            accepted_gauges: self.metrics.accepted("gauge"),
            accepted_counters: self.metrics.accepted("counter"),
            rejected: RejectionSnapshot {
                protocol: self.metrics.rejected("protocol"),
                auth: self.metrics.rejected("auth"),
                invalid: self.metrics.rejected("invalid"),
                unsupported: self.metrics.rejected("unsupported"),
                subnet: self.metrics.rejected("subnet"),
            },
            persistence_failures: PersistenceFailureSnapshot {
                file: self.metrics.persistence_failures("file"),
                database: self.metrics.persistence_failures("database"),
            },
        }
    }
}
