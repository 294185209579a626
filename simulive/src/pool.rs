use crate::errors::StreamerError;
use bytes::Bytes;
use std::path::Path;
use tracing::{error, info};

/// Physical segments replayed by the stream, in playback order.
#[derive(Debug, Clone)]
pub struct SegmentPool {
    segments: Vec<Bytes>,
}

impl SegmentPool {
    pub fn from_payloads(segments: Vec<Bytes>) -> Result<Self, StreamerError> {
        if segments.is_empty() {
            return Err(StreamerError::ConfigError(
                "at least one segment is required".to_string(),
            ));
        }

        Ok(SegmentPool { segments })
    }

    /// Read every segment file into memory, keeping the given order.
    pub async fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, StreamerError> {
        let mut segments = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let content = tokio::fs::read(path).await.map_err(|e| {
                error!("Failed to read segment {}: {}", path.display(), e);
                StreamerError::StorageError(format!(
                    "Failed to read segment {}: {}",
                    path.display(),
                    e
                ))
            })?;

            info!(
                "segment {}: {} loaded ({} bytes)",
                segments.len(),
                path.display(),
                content.len()
            );
            segments.push(Bytes::from(content));
        }

        Self::from_payloads(segments)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.segments.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_payloads_rejects_empty_pool() {
        let result = SegmentPool::from_payloads(Vec::new());
        assert!(matches!(result, Err(StreamerError::ConfigError(_))));
    }

    #[tokio::test]
    async fn load_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a.mp4");
        let second = dir.path().join("b.mp4");
        std::fs::write(&first, b"first").unwrap();
        std::fs::write(&second, b"second").unwrap();

        let pool = SegmentPool::load(&[second, first]).await.unwrap();

        assert_eq!(pool.len(), 2);
        assert_eq!(&pool.get(0).unwrap()[..], b"second");
        assert_eq!(&pool.get(1).unwrap()[..], b"first");
        assert!(pool.get(2).is_none());
    }

    #[tokio::test]
    async fn load_missing_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.mp4");

        let result = SegmentPool::load(&[missing]).await;

        assert!(matches!(result, Err(StreamerError::StorageError(_))));
    }

    #[tokio::test]
    async fn load_without_paths_is_config_error() {
        let paths: Vec<String> = Vec::new();
        let result = SegmentPool::load(&paths).await;
        assert!(matches!(result, Err(StreamerError::ConfigError(_))));
    }
}
