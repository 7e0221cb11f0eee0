//! Push-based observability
//!
//! Pipeline counters live in a private Prometheus registry and are written
//! out as structured JSON logs. No HTTP exposure.

pub mod metrics;
pub mod reporter;

pub use metrics::PipelineMetrics;
pub use reporter::TelemetryReporter;
