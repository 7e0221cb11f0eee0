use crate::application::sync::PersistenceHub;
use crate::domain::errors::{IngestError, StoreError};
use crate::domain::metric::{Metric, MetricKind, WireMetric};
use crate::domain::store::MetricStore;
use crate::infrastructure::observability::PipelineMetrics;
use crate::infrastructure::security::Authenticator;
use std::sync::Arc;
use tracing::{debug, warn};

/// Collector-side ingest: validate, apply, persist.
///
/// Validation checks the kind, then the value field, then the hash. A batch
/// is validated completely before any of it touches the store.
#[derive(Clone)]
pub struct IngestService {
    store: Arc<MetricStore>,
    authenticator: Authenticator,
    hub: Arc<PersistenceHub>,
    telemetry: PipelineMetrics,
}

impl IngestService {
    pub fn new(
        store: Arc<MetricStore>,
        authenticator: Authenticator,
        hub: Arc<PersistenceHub>,
        telemetry: PipelineMetrics,
    ) -> Self {
        Self {
            store,
            authenticator,
            hub,
            telemetry,
        }
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn telemetry(&self) -> &PipelineMetrics {
        &self.telemetry
    }

    fn reject(&self, error: IngestError) -> IngestError {
        let reason = match &error {
            IngestError::Protocol(_) => "protocol",
            IngestError::Auth(_) => "auth",
            IngestError::Store(StoreError::UnsupportedKind(_)) => "unsupported",
            IngestError::Batch { source, .. } => match source.as_ref() {
                IngestError::Auth(_) => "auth",
                IngestError::Store(StoreError::UnsupportedKind(_)) => "unsupported",
                _ => "invalid",
            },
            _ => "invalid",
        };
        self.telemetry.rejected_total.with_label_values(&[reason]).inc();
        warn!("Ingest: rejected: {}", error);
        error
    }

    fn record_accepted(&self, metrics: &[Metric]) {
        for metric in metrics {
            self.telemetry
                .accepted_total
                .with_label_values(&[metric.kind().as_str()])
                .inc();
        }
    }

    /// Turn a wire metric into a typed one, checking its hash.
    pub fn validate(&self, wire: &WireMetric) -> Result<Metric, IngestError> {
        let metric = wire.to_metric()?;
        self.authenticator.verify(wire)?;
        Ok(metric)
    }

    /// `POST /update/`: apply one metric and return its stored value, signed.
    pub async fn ingest_one(&self, wire: WireMetric) -> Result<WireMetric, IngestError> {
        let metric = self.validate(&wire).map_err(|e| self.reject(e))?;
        let stored = self
            .store
            .apply(&metric.id, metric.value)
            .map_err(|e| self.reject(e.into()))?;
        let stored = Metric::new(metric.id, stored);

        self.record_accepted(std::slice::from_ref(&stored));
        self.hub.on_mutation(std::slice::from_ref(&stored)).await;
        Ok(self.authenticator.sign(&stored))
    }

    /// `POST /updates/`: apply a batch atomically.
    pub async fn ingest_batch(&self, batch: Vec<WireMetric>) -> Result<Vec<Metric>, IngestError> {
        let mut metrics = Vec::with_capacity(batch.len());
        for (index, wire) in batch.iter().enumerate() {
            let metric = self.validate(wire).map_err(|source| {
                self.reject(IngestError::Batch {
                    index,
                    source: Box::new(source),
                })
            })?;
            metrics.push(metric);
        }

        let applied = self
            .store
            .apply_batch(&metrics)
            .map_err(|e| self.reject(e.into()))?;

        self.record_accepted(&metrics);
        self.hub.on_mutation(&applied).await;
        debug!("Ingest: applied batch of {} ({} ids)", metrics.len(), applied.len());
        Ok(applied)
    }

    /// `POST /update/{type}/{name}/{value}`.
    pub async fn update_raw(&self, kind: &str, id: &str, raw: &str) -> Result<Metric, IngestError> {
        let stored = self
            .store
            .apply_raw(kind, id, raw)
            .map_err(|e| self.reject(e.into()))?;
        self.record_accepted(std::slice::from_ref(&stored));
        self.hub.on_mutation(std::slice::from_ref(&stored)).await;
        Ok(stored)
    }

    /// Current value of `id`, which must be stored under `kind`.
    pub fn read(&self, kind: &str, id: &str) -> Result<Metric, IngestError> {
        let not_found = || IngestError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        };
        let kind: MetricKind = kind.parse().map_err(|_| not_found())?;
        self.store
            .get(id)
            .filter(|value| value.kind() == kind)
            .map(|value| Metric::new(id, value))
            .ok_or_else(not_found)
    }

    /// `POST /value/`: the stored metric, signed when a key is configured.
    pub fn read_signed(&self, query: &WireMetric) -> Result<WireMetric, IngestError> {
        let metric = self.read(&query.kind, &query.id)?;
        Ok(self.authenticator.sign(&metric))
    }

    /// All metrics, sorted by id.
    pub fn list(&self) -> Vec<Metric> {
        self.store.snapshot()
    }

    /// Count a request refused before reaching the store.
    pub fn reject_request(&self, reason: &str) {
        self.telemetry.rejected_total.with_label_values(&[reason]).inc();
    }
}
