//! Embedded schema migrations with an applied-scripts ledger.
//!
//! Scripts run in id order, each at most once. The whole run holds SQLite's
//! write lock (`BEGIN IMMEDIATE`) so two processes sharing a database file
//! cannot both apply the same script.

use crate::domain::errors::PersistenceError;
use chrono::Utc;
use sqlx::{Executor, Row, SqlitePool};
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub script: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "0001_create_metrics.sql",
        script: include_str!("../../../migrations/0001_create_metrics.sql"),
    },
    Migration {
        id: "0002_index_metric_type.sql",
        script: include_str!("../../../migrations/0002_index_metric_type.sql"),
    },
];

/// Apply the embedded migrations. Returns how many were newly applied.
pub async fn run(pool: &SqlitePool) -> Result<usize, PersistenceError> {
    run_migrations(pool, MIGRATIONS).await
}

pub async fn run_migrations(
    pool: &SqlitePool,
    migrations: &[Migration],
) -> Result<usize, PersistenceError> {
    let mut conn = pool.acquire().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migration (
            id TEXT PRIMARY KEY,
            modified_at TIMESTAMP NOT NULL
        );
        "#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let outcome = apply_pending(&mut conn, migrations).await;

    match outcome {
        Ok(applied) => {
            sqlx::query("COMMIT").execute(&mut *conn).await?;
            if applied > 0 {
                info!("Migrations: applied {} script(s)", applied);
            }
            Ok(applied)
        }
        Err(e) => {
            if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!("Migrations: rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

async fn apply_pending(
    conn: &mut sqlx::SqliteConnection,
    migrations: &[Migration],
) -> Result<usize, PersistenceError> {
    let applied: HashSet<String> = sqlx::query("SELECT id FROM migration")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("id"))
        .collect::<Result<_, _>>()?;

    let mut pending: Vec<&Migration> = migrations
        .iter()
        .filter(|m| !applied.contains(m.id))
        .collect();
    pending.sort_by_key(|m| m.id);

    for migration in &pending {
        conn.execute(sqlx::raw_sql(migration.script))
            .await
            .map_err(|source| PersistenceError::Migration {
                id: migration.id.to_string(),
                source,
            })?;

        sqlx::query("INSERT INTO migration (id, modified_at) VALUES (?, ?)")
            .bind(migration.id)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await?;

        info!("Migrations: applied {}", migration.id);
    }

    Ok(pending.len())
}
