use crate::domain::errors::{DeliveryError, PersistenceError, StoreError};
use crate::domain::metric::{Metric, MetricValue};
use async_trait::async_trait;

/// Read access to current metric values
pub trait MetricReader: Send + Sync {
    fn get(&self, id: &str) -> Option<MetricValue>;
    fn snapshot(&self) -> Vec<Metric>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Write access: merge one observation per its kind's rule
pub trait MetricWriter: Send + Sync {
    fn apply(&self, id: &str, value: MetricValue) -> Result<MetricValue, StoreError>;
}

/// A backend that durably records metric state.
///
/// `persist` receives current values. A whole-store backend treats the slice
/// as the complete store; a row backend upserts each entry.
#[async_trait]
pub trait Persister: Send + Sync {
    fn name(&self) -> &'static str;
    async fn persist(&self, metrics: &[Metric]) -> Result<(), PersistenceError>;
}

/// A backend that can rebuild a store on boot
#[async_trait]
pub trait Restorer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn restore(&self) -> Result<Vec<Metric>, PersistenceError>;
}

/// Source of raw host readings for the agent
pub trait SampleSource: Send {
    fn sample(&mut self) -> Vec<(String, f64)>;
}

/// Delivers an already encoded batch to the collector
#[async_trait]
pub trait MetricTransport: Send + Sync {
    async fn deliver(&self, body: Vec<u8>) -> Result<(), DeliveryError>;
}
