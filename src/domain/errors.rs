use crate::domain::metric::MetricKind;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while parsing or applying metrics to a store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Metric {id} is stored as {stored}, refusing {incoming} update")]
    TypeMismatch {
        id: String,
        stored: MetricKind,
        incoming: MetricKind,
    },

    #[error("Unsupported metric type: '{0}'")]
    UnsupportedKind(String),

    #[error("Cannot parse '{raw}' as {kind} value for {id}")]
    ParseError {
        id: String,
        kind: MetricKind,
        raw: String,
    },

    #[error("Metric {id} of type {kind} carries no value")]
    MissingValue { id: String, kind: MetricKind },

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

/// Errors related to metric authentication
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Metric {id} has no hash while a key is configured")]
    MissingHash { id: String },

    #[error("Hash mismatch for metric {id}")]
    Mismatch { id: String },
}

/// Errors from the JSON / gzip / RSA transport layers
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Compression failure: {0}")]
    Compression(#[from] std::io::Error),

    #[error("Decompressed payload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Cannot load key {path}: {reason}")]
    Key { path: PathBuf, reason: String },
}

/// Errors from the snapshot file and database backends
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot content rejected: {0}")]
    Snapshot(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection not established")]
    Unavailable,

    #[error("Migration {id} failed: {source}")]
    Migration {
        id: String,
        #[source]
        source: sqlx::Error,
    },
}

/// Errors while establishing the database connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("Database unreachable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Errors reported by an agent transport
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Collector answered with status {0}")]
    Status(u16),

    #[error("Transport failure: {0}")]
    Transport(String),
}

/// Per-request failures of the collector ingest path
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Metric {kind}/{id} not found")]
    NotFound { kind: String, id: String },

    #[error("Batch item {index} rejected: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// HTTP status answered for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            IngestError::Protocol(_) => 400,
            IngestError::Auth(_) => 400,
            IngestError::Store(StoreError::UnsupportedKind(_)) => 501,
            IngestError::Store(_) => 400,
            IngestError::NotFound { .. } => 404,
            IngestError::Batch { source, .. } => source.status_code(),
        }
    }
}
