//! Collector HTTP surface.

pub mod error;
pub mod handlers;
pub mod middleware;

use crate::application::ingest::IngestService;
use crate::infrastructure::persistence::DatabaseSlot;
use crate::infrastructure::security::TrustedSubnet;
use crate::infrastructure::transport::Codec;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub ingest: IngestService,
    pub codec: Arc<Codec>,
    pub trusted_subnet: Option<TrustedSubnet>,
    pub database: Option<DatabaseSlot>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/ping", get(handlers::ping))
        .route("/value/", post(handlers::value_json))
        .route("/value/{kind}/{id}", get(handlers::value_path))
        .route("/update/", post(handlers::update_json))
        .route("/update/{kind}/{id}/{value}", post(handlers::update_path))
        .route("/updates/", post(handlers::updates))
        .layer(axum::middleware::from_fn(middleware::gzip_response))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::trusted_subnet,
        ))
        .with_state(state)
}

/// Serve until `shutdown` fires, then finish in-flight requests.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    info!("Http: listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
