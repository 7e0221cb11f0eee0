use crate::domain::errors::PersistenceError;
use crate::domain::metric::Metric;
use crate::domain::ports::Persister;
use crate::domain::store::MetricStore;
use crate::infrastructure::observability::PipelineMetrics;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Fans accepted mutations out to the configured backends.
///
/// The row backend receives every changed metric. The snapshot backend
/// receives the whole store, inline when snapshots are synchronous,
/// otherwise only on [`PersistenceHub::flush`].
pub struct PersistenceHub {
    store: Arc<MetricStore>,
    snapshot: Option<Box<dyn Persister>>,
    rows: Option<Box<dyn Persister>>,
    synchronous_snapshot: bool,
    telemetry: Option<PipelineMetrics>,
    // Serializes snapshot writes so the newest snapshot is written last
    snapshot_guard: Mutex<()>,
}

impl PersistenceHub {
    pub fn new(store: Arc<MetricStore>) -> Self {
        Self {
            store,
            snapshot: None,
            rows: None,
            synchronous_snapshot: false,
            telemetry: None,
            snapshot_guard: Mutex::new(()),
        }
    }

    /// Backend that stores the whole store at once, e.g. the snapshot file.
    pub fn with_file(mut self, file: impl Persister + 'static, synchronous: bool) -> Self {
        self.snapshot = Some(Box::new(file));
        self.synchronous_snapshot = synchronous;
        self
    }

    /// Backend that upserts changed rows, e.g. the database.
    pub fn with_database(mut self, database: impl Persister + 'static) -> Self {
        self.rows = Some(Box::new(database));
        self
    }

    pub fn with_telemetry(mut self, telemetry: PipelineMetrics) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    pub fn has_file(&self) -> bool {
        self.snapshot.is_some()
    }

    fn record_failure(&self, backend: &str, error: &PersistenceError) {
        warn!("PersistenceHub: {} write failed: {}", backend, error);
        if let Some(telemetry) = &self.telemetry {
            telemetry
                .persistence_failures_total
                .with_label_values(&[backend])
                .inc();
        }
    }

    /// Persist the result of an accepted mutation. Failures are logged and
    /// counted, never returned.
    pub async fn on_mutation(&self, changed: &[Metric]) {
        if changed.is_empty() {
            return;
        }

        if let Some(rows) = &self.rows {
            match rows.persist(changed).await {
                Ok(()) => {}
                Err(PersistenceError::Unavailable) => {
                    debug!("PersistenceHub: {} not connected yet, skipping write-through", rows.name())
                }
                Err(e) => self.record_failure(rows.name(), &e),
            }
        }

        if self.synchronous_snapshot
            && let Err(e) = self.write_snapshot().await
        {
            let backend = self.snapshot.as_ref().map_or("file", |s| s.name());
            self.record_failure(backend, &e);
        }
    }

    /// Write the whole store to the snapshot file, if one is configured.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        self.write_snapshot().await
    }

    async fn write_snapshot(&self) -> Result<(), PersistenceError> {
        let Some(backend) = &self.snapshot else {
            return Ok(());
        };
        let _guard = self.snapshot_guard.lock().await;
        let snapshot = self.store.snapshot();
        backend.persist(&snapshot).await
    }

    /// Write the whole store to the row backend, used once the database
    /// connection is first established.
    pub async fn sync_database(&self) -> Result<(), PersistenceError> {
        match &self.rows {
            Some(rows) => rows.persist(&self.store.snapshot()).await,
            None => Ok(()),
        }
    }
}
