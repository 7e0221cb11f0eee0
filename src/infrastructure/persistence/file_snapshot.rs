use crate::domain::errors::PersistenceError;
use crate::domain::metric::{Metric, decode_snapshot, encode_snapshot};
use crate::domain::ports::{Persister, Restorer};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Whole-store JSON snapshot file.
///
/// Each write truncates the file and replaces its contents with the full
/// store. A missing file restores as an empty store.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    pub async fn write(&self, metrics: &[Metric]) -> Result<(), PersistenceError> {
        let content = encode_snapshot(metrics)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        fs::write(&self.path, content)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!("FileSnapshot: wrote {} metric(s) to {:?}", metrics.len(), self.path);
        Ok(())
    }

    pub async fn read(&self) -> Result<Option<Vec<Metric>>, PersistenceError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let metrics = decode_snapshot(&content)?;
        info!("FileSnapshot: loaded {} metric(s) from {:?}", metrics.len(), self.path);
        Ok(Some(metrics))
    }
}

#[async_trait]
impl Persister for FileSnapshot {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn persist(&self, metrics: &[Metric]) -> Result<(), PersistenceError> {
        self.write(metrics).await
    }
}

#[async_trait]
impl Restorer for FileSnapshot {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn restore(&self) -> Result<Vec<Metric>, PersistenceError> {
        Ok(self.read().await?.unwrap_or_default())
    }
}
