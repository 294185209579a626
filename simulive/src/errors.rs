use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Request error: {0}")]
    RequestError(String),
}
