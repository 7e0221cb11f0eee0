pub mod database;
pub mod file_snapshot;
pub mod metric_repository;
pub mod migrations;

pub use database::{Database, RetryPolicy};
pub use file_snapshot::FileSnapshot;
pub use metric_repository::{DatabaseSlot, SqliteMetricRepository};
