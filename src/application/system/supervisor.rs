use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Owns the cancellation token shared by every background task and joins
/// them on shutdown.
#[derive(Clone, Default)]
pub struct Supervisor {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Supervisor: starting {}", name);
        self.tracker.spawn(async move {
            task.await;
            info!("Supervisor: {} finished", name);
        });
    }

    /// Cancel every task and wait up to `grace` for them to finish. Returns
    /// false when the grace period ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.token.cancel();
        self.tracker.close();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => {
                info!("Supervisor: all tasks stopped");
                true
            }
            Err(_) => {
                warn!(
                    "Supervisor: {} task(s) still running after {:?}",
                    self.tracker.len(),
                    grace
                );
                false
            }
        }
    }

    /// Cancel the token on Ctrl+C or SIGTERM.
    pub fn watch_signals(&self) {
        let token = self.token.clone();
        self.spawn("signal-waiter", async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = shutdown_signal() => {
                    info!("Supervisor: shutdown signal received");
                    token.cancel();
                }
            }
        });
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Supervisor: cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Supervisor: cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_shutdown_joins_tasks() {
        let supervisor = Supervisor::new();
        let finished = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let token = supervisor.token();
            let finished = finished.clone();
            supervisor.spawn("worker", async move {
                token.cancelled().await;
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(supervisor.shutdown(Duration::from_secs(1)).await);
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert!(supervisor.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_reports_stuck_task() {
        let supervisor = Supervisor::new();
        supervisor.spawn("stuck", std::future::pending());
        assert!(!supervisor.shutdown(Duration::from_millis(20)).await);
    }
}
