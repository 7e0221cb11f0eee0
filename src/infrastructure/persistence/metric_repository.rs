use crate::domain::errors::PersistenceError;
use crate::domain::metric::{Metric, MetricKind, MetricValue};
use crate::domain::ports::{Persister, Restorer};
use crate::infrastructure::persistence::database::Database;
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Set once by the background connector when the database becomes reachable.
pub type DatabaseSlot = Arc<OnceCell<Database>>;

/// Row-per-metric persistence on the `metrics` table
pub struct SqliteMetricRepository {
    slot: DatabaseSlot,
}

impl SqliteMetricRepository {
    pub fn new(slot: DatabaseSlot) -> Self {
        Self { slot }
    }

    pub fn connected(db: Database) -> Self {
        Self {
            slot: Arc::new(OnceCell::new_with(Some(db))),
        }
    }

    fn database(&self) -> Result<&Database, PersistenceError> {
        self.slot.get().ok_or(PersistenceError::Unavailable)
    }
}

#[async_trait]
impl Persister for SqliteMetricRepository {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn persist(&self, metrics: &[Metric]) -> Result<(), PersistenceError> {
        let db = self.database()?;
        let mut tx = db.pool.begin().await?;

        for metric in metrics {
            let (delta, value) = match metric.value {
                MetricValue::Gauge(v) => (None, Some(v)),
                MetricValue::Counter(d) => (Some(d), None),
            };
            sqlx::query(
                r#"
                INSERT INTO metrics (id, metric_type, delta, value)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT(id) DO UPDATE SET
                    metric_type = excluded.metric_type,
                    delta = excluded.delta,
                    value = excluded.value
                "#,
            )
            .bind(&metric.id)
            .bind(metric.kind().as_str())
            .bind(delta)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Database: upserted {} metric(s)", metrics.len());
        Ok(())
    }
}

#[async_trait]
impl Restorer for SqliteMetricRepository {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn restore(&self) -> Result<Vec<Metric>, PersistenceError> {
        let db = self.database()?;
        let rows = sqlx::query("SELECT id, metric_type, delta, value FROM metrics ORDER BY id")
            .fetch_all(&db.pool)
            .await?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let kind: String = row.try_get("metric_type")?;
            let delta: Option<i64> = row.try_get("delta")?;
            let value: Option<f64> = row.try_get("value")?;

            let restored = match kind.parse::<MetricKind>() {
                Ok(MetricKind::Gauge) => value.map(MetricValue::Gauge),
                Ok(MetricKind::Counter) => delta.map(MetricValue::Counter),
                Err(_) => None,
            };
            match restored {
                Some(value) => metrics.push(Metric::new(id, value)),
                None => warn!("Database: skipping unreadable row {} ({})", id, kind),
            }
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repository() -> SqliteMetricRepository {
        SqliteMetricRepository::connected(Database::connect("sqlite::memory:").await.unwrap())
    }

    #[tokio::test]
    async fn test_upsert_overwrites_rows() {
        let repo = repository().await;
        repo.persist(&[Metric::counter("PollCount", 1), Metric::gauge("Alloc", 2.0)])
            .await
            .unwrap();
        repo.persist(&[Metric::counter("PollCount", 9)]).await.unwrap();

        let restored = repo.restore().await.unwrap();
        assert_eq!(
            restored,
            vec![Metric::gauge("Alloc", 2.0), Metric::counter("PollCount", 9)]
        );
    }

    #[tokio::test]
    async fn test_unconnected_slot_is_unavailable() {
        let repo = SqliteMetricRepository::new(DatabaseSlot::default());
        assert!(matches!(
            repo.persist(&[Metric::gauge("a", 1.0)]).await,
            Err(PersistenceError::Unavailable)
        ));
        assert!(matches!(repo.restore().await, Err(PersistenceError::Unavailable)));
    }
}
