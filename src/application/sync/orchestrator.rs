use crate::application::sync::persistence_hub::PersistenceHub;
use crate::domain::errors::PersistenceError;
use crate::domain::ports::Restorer;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Periodic snapshot writer bound to the process lifetime
pub struct SyncOrchestrator {
    hub: Arc<PersistenceHub>,
    interval: Duration,
}

impl SyncOrchestrator {
    pub fn new(hub: Arc<PersistenceHub>, interval: Duration) -> Self {
        Self { hub, interval }
    }

    /// Merge a backend's contents into the store. Returns the number of
    /// metrics restored.
    pub async fn restore(&self, restorer: &dyn Restorer) -> Result<usize, PersistenceError> {
        let metrics = restorer.restore().await?;
        let merged = self.hub.store().merge(&metrics);
        info!(
            "SyncOrchestrator: restored {} metric(s) from {}",
            merged,
            restorer.name()
        );
        Ok(merged)
    }

    /// Write snapshots on every tick until cancelled, then write one final
    /// snapshot. With a zero interval snapshots are written by the ingest
    /// path and this task only performs the final write.
    pub async fn run(self, cancel: CancellationToken) {
        if !self.hub.has_file() {
            cancel.cancelled().await;
            return;
        }

        if self.interval.is_zero() {
            cancel.cancelled().await;
        } else {
            info!(
                "SyncOrchestrator: writing snapshots every {:?}",
                self.interval
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.hub.flush().await {
                            error!("SyncOrchestrator: periodic snapshot failed: {}", e);
                        }
                    }
                }
            }
        }

        match self.hub.flush().await {
            Ok(()) => info!("SyncOrchestrator: final snapshot written"),
            Err(e) => error!("SyncOrchestrator: final snapshot failed: {}", e),
        }
    }
}
