//! Error types for the sync layer.

use modelsync_model::ModelError;
use modelsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Protocol error (malformed request or response).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Schema registry lookup failed.
    #[error("schema error: {0}")]
    Schema(#[from] ModelError),

    /// A composite request was requested for zero models.
    #[error("no model queries to merge")]
    EmptyRequest,

    /// The response carried no `data` object at all.
    #[error("incomplete response: {0}")]
    IncompleteResponse(String),

    /// The merge transaction did not commit.
    #[error("merge failed: {0}")]
    MergeFailed(String),

    /// The backend kept returning continuation tokens.
    #[error("pagination exceeded {0} pages")]
    PaginationLimit(usize),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}
