//! Metrics agent
//!
//! Samples host statistics and pushes them to the collector.
//!
//! # Usage
//! ```sh
//! cargo run --bin agent -- -a localhost:8080 -p 2s -r 10s -k secret
//! ```
//!
//! # Environment Variables
//! - `ADDRESS`, `KEY`, `CRYPTO_KEY`, `POLL_INTERVAL`, `REPORT_INTERVAL`,
//!   `SEND_RETRIES`, `CONFIG`
//! - `RUST_LOG` - log filter (default: info)

use anyhow::Result;
use rustmetrics::application::system::AgentApplication;
use rustmetrics::config::AgentConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("Metrics agent {} starting...", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load()?;
    let running = AgentApplication::build(config)?.start();
    running.wait().await;

    Ok(())
}
