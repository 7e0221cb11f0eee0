use crate::domain::errors::{ConnectionError, PersistenceError};
use crate::infrastructure::persistence::migrations;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bounded exponential backoff for establishing the database connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

fn is_memory(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

fn normalize_dsn(dsn: &str) -> String {
    if dsn.starts_with("sqlite:") {
        dsn.to_string()
    } else {
        format!("sqlite://{}", dsn)
    }
}

/// SQLite-backed metric database
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open the database and bring its schema up to date.
    pub async fn connect(dsn: &str) -> Result<Self, PersistenceError> {
        let url = normalize_dsn(dsn);
        let memory = is_memory(&url);

        // Ensure the directory exists if it's a file path
        if !memory
            && let Some(path_part) = url.strip_prefix("sqlite://")
        {
            let path = Path::new(path_part.split('?').next().unwrap_or(path_part));
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| PersistenceError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }

        let mut options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
        if !memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to `:memory:` is its own database, keep exactly one alive
        let pool_options = if memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options.connect_with(options).await?;
        info!("Database: connected to {}", dsn);

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Connect with bounded exponential backoff, giving up early when
    /// `cancel` fires.
    pub async fn connect_with_retry(
        dsn: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<Self, ConnectionError> {
        let mut last = String::new();
        for attempt in 1..=policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(ConnectionError::Cancelled);
            }
            match Self::connect(dsn).await {
                Ok(db) => return Ok(db),
                Err(e) => {
                    warn!(
                        "Database: connection attempt {}/{} failed: {}",
                        attempt, policy.max_attempts, e
                    );
                    last = e.to_string();
                }
            }
            if attempt < policy.max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
                    _ = tokio::time::sleep(policy.delay_for(attempt)) => {}
                }
            }
        }
        Err(ConnectionError::Exhausted {
            attempts: policy.max_attempts,
            last,
        })
    }

    pub async fn migrate(&self) -> Result<usize, PersistenceError> {
        migrations::run(&self.pool).await
    }

    pub async fn ping(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(5), Duration::from_secs(16));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_memory_database_pings() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_gives_up_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result =
            Database::connect_with_retry("sqlite::memory:", &RetryPolicy::default(), &cancel).await;
        assert!(matches!(result, Err(ConnectionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_retry_exhausts_on_unopenable_path() {
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            multiplier: 2,
            max_delay: Duration::from_millis(5),
        };
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file
        let dsn = format!("sqlite://{}", dir.path().display());
        let result =
            Database::connect_with_retry(&dsn, &policy, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ConnectionError::Exhausted { attempts: 2, .. })));
    }
}
