use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::sync::{PersistenceHub, SyncOrchestrator};
use crate::application::system::supervisor::Supervisor;
use crate::config::ServerConfig;
use crate::domain::store::MetricStore;
use crate::infrastructure::observability::PipelineMetrics;
use crate::infrastructure::persistence::{
    Database, DatabaseSlot, FileSnapshot, RetryPolicy, SqliteMetricRepository,
};

pub struct PersistenceHandle {
    pub hub: Arc<PersistenceHub>,
    pub orchestrator: SyncOrchestrator,
    pub database: Option<DatabaseSlot>,
    /// Persistence tasks, stopped only after the ingest surface has drained
    pub tasks: Supervisor,
}

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    /// Wire the configured backends, restore from the snapshot file when
    /// asked to, and start the background database connector.
    ///
    /// The database is never awaited here: ingest starts immediately and
    /// write-through begins once the connector succeeds.
    pub async fn init(
        config: &ServerConfig,
        store: Arc<MetricStore>,
        telemetry: PipelineMetrics,
        retry: RetryPolicy,
    ) -> PersistenceHandle {
        let tasks = Supervisor::new();
        let file = config.store_file.clone().map(FileSnapshot::new);
        let slot = config.database_dsn.as_ref().map(|_| DatabaseSlot::default());

        let mut hub = PersistenceHub::new(store).with_telemetry(telemetry);
        if let Some(file) = &file {
            info!(
                "Persistence: snapshot file {:?} ({})",
                file.path(),
                if config.synchronous_snapshots() {
                    "synchronous".to_string()
                } else {
                    format!("every {:?}", config.store_interval)
                }
            );
            hub = hub.with_file(file.clone(), config.synchronous_snapshots());
        }
        if let Some(slot) = &slot {
            hub = hub.with_database(SqliteMetricRepository::new(slot.clone()));
        }
        let hub = Arc::new(hub);

        if config.restore
            && let Some(file) = &file
        {
            let orchestrator = SyncOrchestrator::new(hub.clone(), config.store_interval);
            if let Err(e) = orchestrator.restore(file).await {
                warn!("Persistence: could not restore from {:?}: {}", file.path(), e);
            }
        }

        if let (Some(dsn), Some(slot)) = (config.database_dsn.clone(), slot.clone()) {
            let restore_from_db = config.restore && file.is_none();
            let hub = hub.clone();
            let token = tasks.token();
            tasks.spawn("database-connector", async move {
                match Database::connect_with_retry(&dsn, &retry, &token).await {
                    Ok(db) => Self::attach_database(&hub, &slot, db, restore_from_db).await,
                    Err(e) => error!("Persistence: database unavailable: {}", e),
                }
            });
        }

        PersistenceHandle {
            orchestrator: SyncOrchestrator::new(hub.clone(), config.store_interval),
            hub,
            database: slot,
            tasks,
        }
    }

    /// Hand a freshly connected database to the ingest path.
    ///
    /// Stored rows are merged into the store before the slot is filled, so
    /// no write-through can overwrite them first. The full store is then
    /// written back, covering updates accepted while disconnected.
    pub async fn attach_database(
        hub: &Arc<PersistenceHub>,
        slot: &DatabaseSlot,
        db: Database,
        restore: bool,
    ) {
        if restore {
            let repository = SqliteMetricRepository::connected(db.clone());
            let orchestrator = SyncOrchestrator::new(hub.clone(), Duration::ZERO);
            if let Err(e) = orchestrator.restore(&repository).await {
                warn!("Persistence: could not restore from database: {}", e);
            }
        }
        if slot.set(db).is_err() {
            warn!("Persistence: database slot already filled");
            return;
        }
        if let Err(e) = hub.sync_database().await {
            warn!("Persistence: initial database sync failed: {}", e);
        }
    }
}
