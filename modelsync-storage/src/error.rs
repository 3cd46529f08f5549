//! Error types for the storage layer.

use modelsync_model::ModelError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Model not present in the schema registry.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The store never became usable.
    #[error("store initialization failed: {0}")]
    Initialization(String),

    /// Snapshot version check or replacement failed.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    TaskJoin(String),
}

impl From<ModelError> for StorageError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::UnknownModel(name) => Self::UnknownModel(name),
            ModelError::InvalidSchema(msg) => Self::InvalidData(msg),
        }
    }
}

impl From<modelsync_types::Error> for StorageError {
    fn from(err: modelsync_types::Error) -> Self {
        Self::InvalidData(err.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
