//! Core type definitions for modelsync.
//!
//! This crate defines the model-agnostic types shared by the schema registry,
//! the local store and the sync engine:
//! - [`Timestamp`]: wall-clock milliseconds used for watermarks and `_lastChangedAt`
//! - [`Record`]: one instance of a named model (id + JSON fields)
//! - [`RecordMetadata`] / [`ModelWithMetadata`]: sync metadata carried next to a record
//! - [`SyncWatermark`]: the persisted "everything before this is merged" boundary
//!
//! Model-specific structure (which fields exist, which model overlays which)
//! belongs to `modelsync-model`, not here.

mod record;
mod timestamp;
mod watermark;

pub use record::{fields, ModelWithMetadata, Record, RecordMetadata};
pub use timestamp::Timestamp;
pub use watermark::SyncWatermark;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
