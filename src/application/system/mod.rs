use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

pub mod supervisor;

use crate::application::agent::{Sampler, Sender};
use crate::application::bootstrap::persistence::{PersistenceBootstrap, PersistenceHandle};
use crate::application::ingest::IngestService;
use crate::application::system::supervisor::Supervisor;
use crate::config::{AgentConfig, ServerConfig};
use crate::domain::ports::MetricTransport;
use crate::domain::store::MetricStore;
use crate::infrastructure::observability::{PipelineMetrics, TelemetryReporter};
use crate::infrastructure::persistence::{DatabaseSlot, RetryPolicy};
use crate::infrastructure::sampling::SystemSampler;
use crate::infrastructure::security::{Authenticator, PayloadDecryptor, PayloadEncryptor};
use crate::infrastructure::transport::{Codec, HttpTransport};
use crate::interfaces::http::{self, AppState};

pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Collector process: ingest surface plus persistence tasks
pub struct ServerApplication {
    pub config: ServerConfig,
    pub store: Arc<MetricStore>,
    pub telemetry: PipelineMetrics,
    pub state: AppState,
    supervisor: Supervisor,
    persistence: PersistenceHandle,
}

/// Handle on a started collector
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub supervisor: Supervisor,
    persistence: Supervisor,
    database: Option<DatabaseSlot>,
}

impl ServerApplication {
    pub async fn build(config: ServerConfig) -> Result<Self> {
        Self::build_with_retry(config, RetryPolicy::default()).await
    }

    pub async fn build_with_retry(config: ServerConfig, retry: RetryPolicy) -> Result<Self> {
        info!("Building collector (address: {})...", config.address);

        let mut codec = Codec::plain();
        if let Some(path) = &config.crypto_key {
            let decryptor =
                PayloadDecryptor::from_pem_file(path).context("Failed to load private key")?;
            info!("Payload decryption enabled ({}-byte blocks)", decryptor.block_size());
            codec = codec.with_decryptor(decryptor);
        }

        let authenticator = Authenticator::new(config.key.as_deref());
        if authenticator.is_enabled() {
            info!("Hash verification enabled");
        }

        let supervisor = Supervisor::new();
        let store = Arc::new(MetricStore::new());
        let telemetry = PipelineMetrics::new().context("Failed to register telemetry")?;

        let persistence =
            PersistenceBootstrap::init(&config, store.clone(), telemetry.clone(), retry).await;

        let ingest = IngestService::new(
            store.clone(),
            authenticator,
            persistence.hub.clone(),
            telemetry.clone(),
        );

        let state = AppState {
            ingest,
            codec: Arc::new(codec),
            trusted_subnet: config.trusted_subnet,
            database: persistence.database.clone(),
        };

        Ok(Self {
            config,
            store,
            telemetry,
            state,
            supervisor,
            persistence,
        })
    }

    /// Bind the listener and start every background task.
    pub async fn start(self) -> Result<RunningServer> {
        let listener = TcpListener::bind(&self.config.address)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.address))?;
        let local_addr = listener.local_addr()?;

        let supervisor = self.supervisor;
        supervisor.watch_signals();

        let app = http::router(self.state);
        let token = supervisor.token();
        supervisor.spawn("http", async move {
            if let Err(e) = http::serve(listener, app, token.clone()).await {
                error!("Http: server error: {}", e);
                token.cancel();
            }
        });

        let persistence_tasks = self.persistence.tasks;
        persistence_tasks.spawn(
            "sync-orchestrator",
            self.persistence.orchestrator.run(persistence_tasks.token()),
        );

        let reporter = TelemetryReporter::new(
            self.store,
            self.telemetry,
            self.config.telemetry_interval,
        );
        supervisor.spawn("telemetry", reporter.run(supervisor.token()));

        info!("Collector started on {}", local_addr);
        Ok(RunningServer {
            local_addr,
            supervisor,
            persistence: persistence_tasks,
            database: self.persistence.database,
        })
    }
}

impl RunningServer {
    /// Wait for a shutdown signal, then stop every task and close the
    /// database.
    pub async fn wait(self) {
        self.supervisor.token().cancelled().await;
        self.shutdown().await;
    }

    /// Drain the ingest surface first, then stop persistence so the final
    /// snapshot covers every accepted update.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        self.supervisor.shutdown(SHUTDOWN_GRACE).await;
        self.persistence.shutdown(SHUTDOWN_GRACE).await;
        if let Some(db) = self.database.as_ref().and_then(|slot| slot.get()) {
            db.close().await;
        }
        info!("Shutdown sequence completed.");
    }
}

/// Agent process: poll and report tasks
pub struct AgentApplication {
    pub config: AgentConfig,
    pub store: Arc<MetricStore>,
    supervisor: Supervisor,
    transport: Arc<dyn MetricTransport>,
    codec: Codec,
    authenticator: Authenticator,
}

pub struct RunningAgent {
    pub supervisor: Supervisor,
}

impl AgentApplication {
    pub fn build(config: AgentConfig) -> Result<Self> {
        let transport = HttpTransport::new(
            &config.address,
            config.send_retries,
            config.report_interval.max(Duration::from_secs(5)),
        )
        .with_context(|| format!("Invalid collector address {}", config.address))?;
        info!("Reporting to {}", transport.endpoint());
        Self::build_with_transport(config, Arc::new(transport))
    }

    /// Build with a custom transport (used by tests).
    pub fn build_with_transport(
        config: AgentConfig,
        transport: Arc<dyn MetricTransport>,
    ) -> Result<Self> {
        let mut codec = Codec::plain();
        if let Some(path) = &config.crypto_key {
            let encryptor =
                PayloadEncryptor::from_key_file(path).context("Failed to load public key")?;
            info!("Payload encryption enabled ({}-byte chunks)", encryptor.chunk_size());
            codec = codec.with_encryptor(encryptor);
        }

        Ok(Self {
            authenticator: Authenticator::new(config.key.as_deref()),
            config,
            store: Arc::new(MetricStore::new()),
            supervisor: Supervisor::new(),
            transport,
            codec,
        })
    }

    pub fn start(self) -> RunningAgent {
        self.start_with_source(SystemSampler::new())
    }

    pub fn start_with_source<S>(self, source: S) -> RunningAgent
    where
        S: crate::domain::ports::SampleSource + 'static,
    {
        let supervisor = self.supervisor;
        supervisor.watch_signals();

        let sampler = Sampler::new(source, self.store.clone(), self.config.poll_interval);
        supervisor.spawn("sampler", sampler.run(supervisor.token()));

        let sender = Sender::new(
            self.store,
            self.authenticator,
            self.codec,
            self.transport,
            self.config.report_interval,
        );
        supervisor.spawn("sender", sender.run(supervisor.token()));

        info!(
            "Agent started (poll {:?}, report {:?})",
            self.config.poll_interval, self.config.report_interval
        );
        RunningAgent { supervisor }
    }
}

impl RunningAgent {
    pub async fn wait(self) {
        self.supervisor.token().cancelled().await;
        self.shutdown().await;
    }

    pub async fn shutdown(self) {
        info!("Stopping agent...");
        self.supervisor.shutdown(SHUTDOWN_GRACE).await;
    }
}
