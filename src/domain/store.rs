use crate::domain::errors::StoreError;
use crate::domain::metric::{Metric, MetricKind, MetricValue, decode_snapshot};
use crate::domain::ports::{MetricReader, MetricWriter};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// In-memory, thread-safe map of metric id to current value.
///
/// Gauges are overwritten, counters accumulate. A single mutex guards the map
/// and is only held for the duration of a map operation.
#[derive(Debug, Default)]
pub struct MetricStore {
    metrics: Mutex<HashMap<String, MetricValue>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MetricValue>> {
        // Every mutation is a single insert, a poisoned map is still consistent
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<MetricValue> {
        self.lock().get(id).copied()
    }

    /// Point-in-time copy of the whole store, sorted by id.
    pub fn snapshot(&self) -> Vec<Metric> {
        let mut metrics: Vec<Metric> = self
            .lock()
            .iter()
            .map(|(id, value)| Metric::new(id.clone(), *value))
            .collect();
        metrics.sort_by(|a, b| a.id.cmp(&b.id));
        metrics
    }

    /// Merge `value` into the entry for `id` and return the resulting value.
    pub fn apply(&self, id: &str, value: MetricValue) -> Result<MetricValue, StoreError> {
        let mut metrics = self.lock();
        let merged = merge(metrics.get(id), id, value)?;
        metrics.insert(id.to_string(), merged);
        Ok(merged)
    }

    /// Apply every metric or none of them.
    ///
    /// Kinds are checked against the store and against earlier entries of the
    /// same batch before anything is written. Returns the resulting value of
    /// each distinct id, sorted by id.
    pub fn apply_batch(&self, batch: &[Metric]) -> Result<Vec<Metric>, StoreError> {
        let mut map = self.lock();
        let mut staged: HashMap<&str, MetricValue> = HashMap::with_capacity(batch.len());
        for metric in batch {
            let previous = staged
                .get(metric.id.as_str())
                .or_else(|| map.get(&metric.id))
                .copied();
            let merged = merge(previous.as_ref(), &metric.id, metric.value)?;
            staged.insert(metric.id.as_str(), merged);
        }

        let mut applied: Vec<Metric> = staged
            .into_iter()
            .map(|(id, value)| {
                map.insert(id.to_string(), value);
                Metric::new(id, value)
            })
            .collect();
        applied.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(applied)
    }

    /// Apply the textual form used by `/update/{type}/{name}/{value}`.
    pub fn apply_raw(&self, kind: &str, id: &str, raw: &str) -> Result<Metric, StoreError> {
        let kind: MetricKind = kind.parse()?;
        let value = MetricValue::parse(kind, id, raw)?;
        let stored = self.apply(id, value)?;
        Ok(Metric::new(id, stored))
    }

    /// Merge many metrics under one lock. Entries whose kind conflicts with
    /// the stored one are skipped. Returns the number merged.
    pub fn merge<'a>(&self, metrics: impl IntoIterator<Item = &'a Metric>) -> usize {
        let mut map = self.lock();
        let mut merged = 0;
        for metric in metrics {
            match merge(map.get(&metric.id), &metric.id, metric.value) {
                Ok(value) => {
                    map.insert(metric.id.clone(), value);
                    merged += 1;
                }
                Err(e) => warn!("MetricStore: skipping {}: {}", metric.id, e),
            }
        }
        merged
    }

    /// Merge a snapshot document into the store.
    pub fn load_snapshot(&self, bytes: &[u8]) -> Result<usize, StoreError> {
        let metrics = decode_snapshot(bytes)?;
        Ok(self.merge(&metrics))
    }

    /// Subtract counter deltas that the collector acknowledged.
    ///
    /// Increments recorded while the report was in flight stay in the store.
    /// Gauges are left untouched.
    pub fn settle(&self, sent: &[Metric]) {
        let mut map = self.lock();
        for metric in sent {
            if let MetricValue::Counter(delta) = metric.value
                && let Some(MetricValue::Counter(current)) = map.get_mut(&metric.id)
            {
                *current = current.saturating_sub(delta);
            }
        }
    }
}

fn merge(
    previous: Option<&MetricValue>,
    id: &str,
    incoming: MetricValue,
) -> Result<MetricValue, StoreError> {
    match (previous, incoming) {
        (None, value) => Ok(value),
        (Some(MetricValue::Gauge(_)), MetricValue::Gauge(v)) => Ok(MetricValue::Gauge(v)),
        (Some(MetricValue::Counter(prev)), MetricValue::Counter(delta)) => {
            Ok(MetricValue::Counter(prev.saturating_add(delta)))
        }
        (Some(stored), incoming) => Err(StoreError::TypeMismatch {
            id: id.to_string(),
            stored: stored.kind(),
            incoming: incoming.kind(),
        }),
    }
}

impl MetricReader for MetricStore {
    fn get(&self, id: &str) -> Option<MetricValue> {
        MetricStore::get(self, id)
    }

    fn snapshot(&self) -> Vec<Metric> {
        MetricStore::snapshot(self)
    }

    fn len(&self) -> usize {
        MetricStore::len(self)
    }
}

impl MetricWriter for MetricStore {
    fn apply(&self, id: &str, value: MetricValue) -> Result<MetricValue, StoreError> {
        MetricStore::apply(self, id, value)
    }
}
