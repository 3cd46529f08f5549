//! SQLite storage layer for modelsync.
//!
//! Provides the local replica the sync engine merges into.
//!
//! # Architecture
//!
//! - [`LocalStore`] / [`StoreWriter`] are the storage seams the engine writes through
//! - [`SqliteStore`] keeps one table per registered model, fields as a JSON blob
//! - [`SettingsStore`] persists the watermark and version markers outside the database
//! - [`Bootstrapper`] seeds the database from a bundled snapshot before first use;
//!   the store's [`ReadinessGate`] holds every operation until it has finished

mod bootstrap;
mod error;
mod gate;
mod settings;
mod sql;
mod sqlite;
mod store;

pub use bootstrap::{
    read_db_version, stamp_db_version, BootstrapOutcome, Bootstrapper, BundledSnapshot,
    ReadyCallback, StoreConfig, VersionMarkers,
};
pub use error::{StorageError, StorageResult};
pub use gate::{Readiness, ReadinessGate};
pub use settings::{keys, MemorySettings, SettingsStore, SqliteSettings};
pub use sqlite::SqliteStore;
pub use store::{LocalStore, StoreWriter};
