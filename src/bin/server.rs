//! Metrics collector
//!
//! Accepts metric updates over HTTP, keeps current values in memory and
//! persists them to a snapshot file and/or SQLite.
//!
//! # Usage
//! ```sh
//! ADDRESS=0.0.0.0:8080 STORE_INTERVAL=0 cargo run --bin server
//! cargo run --bin server -- -a :8080 -d sqlite://metrics.db -k secret
//! ```
//!
//! # Environment Variables
//! - `ADDRESS`, `KEY`, `CRYPTO_KEY`, `STORE_FILE`, `STORE_INTERVAL`, `RESTORE`,
//!   `DATABASE_DSN`, `TRUSTED_SUBNET`, `CONFIG`
//! - `RUST_LOG` - log filter (default: info)

use anyhow::Result;
use rustmetrics::application::system::ServerApplication;
use rustmetrics::config::ServerConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(stdout_layer)
        .init();

    info!("Metrics collector {} starting...", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load()?;
    info!(
        "Configuration loaded: address={}, store_file={:?}, store_interval={:?}, restore={}, database={}",
        config.address,
        config.store_file,
        config.store_interval,
        config.restore,
        config.database_dsn.is_some()
    );

    let app = ServerApplication::build(config).await?;
    let running = app.start().await?;

    info!("Server running. Press Ctrl+C to shutdown.");
    running.wait().await;

    Ok(())
}
