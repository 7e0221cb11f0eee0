mod common;

use axum::http::StatusCode;
use common::*;
use rustmetrics::application::system::ServerApplication;
use rustmetrics::config::{ConfigFile, ServerArgs, ServerConfig};
use rustmetrics::domain::metric::{Metric, MetricValue};
use rustmetrics::domain::ports::{Persister, Restorer};
use rustmetrics::infrastructure::persistence::migrations::MIGRATIONS;
use rustmetrics::infrastructure::persistence::{
    Database, DatabaseSlot, FileSnapshot, RetryPolicy, SqliteMetricRepository,
};
use rustmetrics::interfaces::http::router;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn file_config(path: &Path, interval: Duration) -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1:0".into(),
        store_file: Some(path.to_path_buf()),
        store_interval: interval,
        restore: true,
        ..ServerConfig::default()
    }
}

fn database_config(dsn: String) -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1:0".into(),
        database_dsn: Some(dsn),
        ..memory_config()
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        multiplier: 2,
        max_delay: Duration::from_millis(20),
    }
}

async fn wait_for_connection(slot: &DatabaseSlot) -> bool {
    for _ in 0..100 {
        if slot.get().is_some() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_restart_restores_final_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let config = file_config(&path, Duration::from_secs(300));

    let first = ServerApplication::build(config.clone()).await.unwrap();
    let store = first.store.clone();
    let app = router(first.state.clone());
    let running = first.start().await.unwrap();

    let body = batch_json(&[
        wire(&Metric::gauge("Alloc", 123.456)),
        wire(&Metric::counter("PollCount", 7)),
        wire(&Metric::gauge("HeapInuse", 0.1)),
    ]);
    assert_eq!(send(&app, post_gzip_json("/updates/", &body)).await.status(), StatusCode::OK);
    let before = store.snapshot();

    // Periodic mode: nothing on disk until the final flush
    assert!(!path.exists());
    running.shutdown().await;
    assert!(path.exists());

    let second = ServerApplication::build(config).await.unwrap();
    assert_eq!(second.store.snapshot(), before);
}

#[tokio::test]
async fn test_update_in_flight_at_shutdown_reaches_final_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let server = ServerApplication::build(file_config(&path, Duration::from_secs(300)))
        .await
        .unwrap();
    let running = server.start().await.unwrap();

    let body = serde_json::to_string(&wire(&Metric::counter("Hits", 4))).unwrap();
    let mut stream = TcpStream::connect(running.local_addr).await.unwrap();
    let head = format!(
        "POST /update/ HTTP/1.1\r\nhost: localhost\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Shutdown starts while the request body is still outstanding
    let shutdown = tokio::spawn(running.shutdown());
    tokio::time::sleep(Duration::from_millis(150)).await;
    stream.write_all(body.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(String::from_utf8_lossy(&response).starts_with("HTTP/1.1 200"));
    shutdown.await.unwrap();

    let on_disk = FileSnapshot::new(&path).read().await.unwrap().unwrap();
    assert_eq!(on_disk, vec![Metric::counter("Hits", 4)]);
}

#[tokio::test]
async fn test_restore_disabled_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    FileSnapshot::new(&path)
        .write(&[Metric::gauge("Alloc", 1.0)])
        .await
        .unwrap();

    let config = ServerConfig {
        restore: false,
        ..file_config(&path, Duration::from_secs(300))
    };
    let server = ServerApplication::build(config).await.unwrap();
    assert!(server.store.is_empty());
}

#[tokio::test]
async fn test_synchronous_mode_writes_on_every_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("metrics.json");
    let server = ServerApplication::build(file_config(&path, Duration::ZERO))
        .await
        .unwrap();
    let app = router(server.state.clone());

    send(&app, post_empty("/update/counter/Hits/2")).await;
    send(&app, post_empty("/update/counter/Hits/3")).await;

    let on_disk = FileSnapshot::new(&path).read().await.unwrap().unwrap();
    assert_eq!(on_disk, vec![Metric::counter("Hits", 5)]);
}

#[tokio::test]
async fn test_corrupt_snapshot_does_not_block_startup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    std::fs::write(&path, b"{ definitely not a snapshot").unwrap();

    let server = ServerApplication::build(file_config(&path, Duration::from_secs(300)))
        .await
        .unwrap();
    assert!(server.store.is_empty());
}

#[tokio::test]
async fn test_database_write_through_and_ping() {
    let dir = tempfile::tempdir().unwrap();
    let dsn = format!("sqlite://{}", dir.path().join("metrics.db").display());

    let server = ServerApplication::build(database_config(dsn.clone()))
        .await
        .unwrap();
    let slot = server.state.database.clone().unwrap();
    let app = router(server.state.clone());
    let running = server.start().await.unwrap();
    assert!(wait_for_connection(&slot).await, "database never connected");

    assert_eq!(send(&app, get("/ping")).await.status(), StatusCode::OK);

    let body = batch_json(&[
        wire(&Metric::counter("PollCount", 2)),
        wire(&Metric::counter("PollCount", 3)),
        wire(&Metric::gauge("Alloc", 9.5)),
    ]);
    assert_eq!(send(&app, post_gzip_json("/updates/", &body)).await.status(), StatusCode::OK);

    let stored = SqliteMetricRepository::new(slot.clone())
        .restore()
        .await
        .unwrap();
    assert_eq!(
        stored,
        vec![Metric::gauge("Alloc", 9.5), Metric::counter("PollCount", 5)]
    );

    running.shutdown().await;
}

#[tokio::test]
async fn test_database_restore_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let dsn = format!("sqlite://{}", dir.path().join("metrics.db").display());

    {
        let db = Database::connect(&dsn).await.unwrap();
        let repository = SqliteMetricRepository::connected(db.clone());
        repository
            .persist(&[Metric::counter("Hits", 11), Metric::gauge("Alloc", 2.5)])
            .await
            .unwrap();
        db.close().await;
    }

    // Only a DSN and the restore flag, the snapshot file stays off
    let args = ServerArgs {
        address: Some("127.0.0.1:0".into()),
        database_dsn: Some(dsn),
        restore: Some(true),
        ..ServerArgs::default()
    };
    let config = ServerConfig::resolve(args, ConfigFile::default()).unwrap();
    assert!(config.store_file.is_none());
    let server = ServerApplication::build(config).await.unwrap();
    let slot = server.state.database.clone().unwrap();
    assert!(wait_for_connection(&slot).await);

    let mut restored = false;
    for _ in 0..100 {
        if server.store.len() == 2 {
            restored = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(restored, "database contents never reached the store");
    assert_eq!(server.store.get("Hits"), Some(MetricValue::Counter(11)));
    assert_eq!(server.store.get("Alloc"), Some(MetricValue::Gauge(2.5)));
}

#[tokio::test]
async fn test_migrations_are_idempotent_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let dsn = format!("sqlite://{}", dir.path().join("metrics.db").display());

    let first = Database::connect(&dsn).await.unwrap();
    let second = Database::connect(&dsn).await.unwrap();
    assert_eq!(second.migrate().await.unwrap(), 0);

    let (ledger,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM migration")
        .fetch_one(&first.pool)
        .await
        .unwrap();
    assert_eq!(ledger as usize, MIGRATIONS.len());

    first.close().await;
    second.close().await;
}

#[tokio::test]
async fn test_unreachable_database_does_not_block_ingest() {
    let config = ServerConfig {
        database_dsn: Some("sqlite:///dev/null/metrics.db".into()),
        ..memory_config()
    };
    let server = ServerApplication::build_with_retry(config, fast_retry())
        .await
        .unwrap();
    let app = router(server.state.clone());

    let response = send(&app, post_empty("/update/gauge/Alloc/3")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.store.get("Alloc"), Some(MetricValue::Gauge(3.0)));

    assert_eq!(send(&app, get("/ping")).await.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
