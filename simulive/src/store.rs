use crate::errors::StreamerError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::path::PathBuf;
use tracing::error;

/// Holds the currently published manifest. Writers replace the whole
/// document, so a reader sees either the previous or the next one.
#[async_trait]
pub trait ManifestStore {
    async fn write(&self, text: String) -> Result<(), StreamerError>;
    async fn read(&self) -> Result<Bytes, StreamerError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: RwLock<Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl ManifestStore for MemoryStore {
    async fn write(&self, text: String) -> Result<(), StreamerError> {
        let document = Bytes::from(text);
        *self.slot.write() = document;
        Ok(())
    }

    async fn read(&self) -> Result<Bytes, StreamerError> {
        Ok(self.slot.read().clone())
    }
}

/// Keeps the manifest on disk. Each write goes to a sibling temporary file
/// that is then renamed over the target.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    staging: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");

        FileStore {
            path,
            staging: PathBuf::from(staging),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ManifestStore for FileStore {
    async fn write(&self, text: String) -> Result<(), StreamerError> {
        tokio::fs::write(&self.staging, text).await.map_err(|e| {
            error!("Failed to write file {}: {}", self.staging.display(), e);
            StreamerError::StorageError(format!("Failed to write manifest: {}", e))
        })?;

        tokio::fs::rename(&self.staging, &self.path)
            .await
            .map_err(|e| {
                error!("Failed to replace file {}: {}", self.path.display(), e);
                StreamerError::StorageError(format!("Failed to replace manifest: {}", e))
            })
    }

    async fn read(&self) -> Result<Bytes, StreamerError> {
        let content = tokio::fs::read(&self.path).await.map_err(|e| {
            StreamerError::StorageError(format!(
                "Failed to read manifest {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Bytes::from(content))
    }
}
