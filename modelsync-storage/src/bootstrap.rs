//! Seeding and migrating the local database from a bundled snapshot.
//!
//! Runs once per store open, before the store accepts any operation:
//!
//! 1. Read the local database's schema stamp (`model_version` table) and the
//!    extra version recorded in settings.
//! 2. Compare them with the bundled snapshot's markers. A missing local file
//!    counts as a mismatch.
//! 3. On mismatch, copy the snapshot over the local file and stamp it with
//!    the snapshot's schema version. Record the snapshot's extra version, the
//!    running model-set version and the snapshot's `updated_at` as the sync
//!    watermark, so the first cycle continues incrementally from the seed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use modelsync_types::Timestamp;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::settings::SettingsStore;
use crate::{StorageError, StorageResult};

/// Row id of the single `model_version` row.
const VERSION_ROW: &str = "current";

/// A prebuilt database shipped with the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundledSnapshot {
    pub path: PathBuf,
    /// Schema stamp of the snapshot. `None` reads it from the snapshot file.
    #[serde(default)]
    pub schema_version: Option<String>,
    /// Content revision of the snapshot, bumped whenever its data is rebuilt.
    pub extra_version: i64,
    /// Time the snapshot's data was exported; becomes the initial watermark.
    pub updated_at: Timestamp,
}

/// Where the local database lives and what it may be seeded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub snapshot: Option<BundledSnapshot>,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: None,
        }
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot: BundledSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}

/// The local database's version markers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionMarkers {
    pub schema_version: Option<String>,
    pub extra_version: i64,
}

/// What a bootstrap run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Local markers matched; the database was left alone.
    NoAction,
    /// The snapshot was copied over the local database.
    Replaced { markers: VersionMarkers, watermark: Timestamp },
}

/// Completion callback, invoked once after a successful run.
pub type ReadyCallback = Box<dyn FnOnce(&BootstrapOutcome) + Send>;

/// Version check and snapshot replacement for one local database.
pub struct Bootstrapper {
    db_path: PathBuf,
    schema_version: String,
    snapshot: Option<BundledSnapshot>,
    settings: Arc<dyn SettingsStore>,
    on_ready: Mutex<Option<ReadyCallback>>,
    ran: AtomicBool,
}

impl Bootstrapper {
    /// `schema_version` is the running model set's version. It is stamped
    /// into a database that is not seeded from a snapshot, and recorded as
    /// the settings' model-set version after a snapshot replaced the database.
    pub fn new(
        db_path: impl Into<PathBuf>,
        schema_version: impl Into<String>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            schema_version: schema_version.into(),
            snapshot: None,
            settings,
            on_ready: Mutex::new(None),
            ran: AtomicBool::new(false),
        }
    }

    pub fn from_config(
        config: &StoreConfig,
        schema_version: impl Into<String>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let mut bootstrapper = Self::new(&config.path, schema_version, settings);
        bootstrapper.snapshot = config.snapshot.clone();
        bootstrapper
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot: BundledSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    #[must_use]
    pub fn on_ready(mut self, callback: impl FnOnce(&BootstrapOutcome) + Send + 'static) -> Self {
        self.on_ready = Mutex::new(Some(Box::new(callback)));
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Markers currently recorded for the local database.
    pub fn local_markers(&self) -> StorageResult<VersionMarkers> {
        Ok(VersionMarkers {
            schema_version: read_db_version(&self.db_path)?,
            extra_version: self.settings.extra_version()?,
        })
    }

    /// Markers of the bundled snapshot, if one is configured.
    pub fn snapshot_markers(&self) -> StorageResult<Option<VersionMarkers>> {
        let Some(snapshot) = &self.snapshot else {
            return Ok(None);
        };
        let schema_version = match &snapshot.schema_version {
            Some(v) => Some(v.clone()),
            None => read_db_version(&snapshot.path)?,
        };
        Ok(Some(VersionMarkers {
            schema_version,
            extra_version: snapshot.extra_version,
        }))
    }

    /// True if the snapshot must be copied over the local database.
    pub fn needs_replace(&self) -> StorageResult<bool> {
        let Some(bundled) = self.snapshot_markers()? else {
            return Ok(false);
        };
        if !self.db_path.exists() {
            debug!(path = %self.db_path.display(), "local database missing");
            return Ok(true);
        }
        let local = self.local_markers()?;
        Ok(local != bundled)
    }

    /// Runs the version check and, when needed, the replacement.
    ///
    /// Blocking; call it from a blocking context. A second call on the same
    /// bootstrapper does nothing and returns [`BootstrapOutcome::NoAction`].
    pub fn run(&self) -> StorageResult<BootstrapOutcome> {
        if self.ran.swap(true, Ordering::SeqCst) {
            debug!("bootstrap already ran for this store");
            return Ok(BootstrapOutcome::NoAction);
        }

        if !self.needs_replace()? {
            if self.snapshot.is_none() {
                stamp_db_version(&self.db_path, &self.schema_version)?;
            }
            debug!(path = %self.db_path.display(), "local database up to date");
            return Ok(BootstrapOutcome::NoAction);
        }

        let (snapshot, markers) = match (&self.snapshot, self.snapshot_markers()?) {
            (Some(s), Some(m)) => (s, m),
            _ => return Ok(BootstrapOutcome::NoAction),
        };
        if !snapshot.path.exists() {
            return Err(StorageError::Bootstrap(format!(
                "bundled snapshot not found: {}",
                snapshot.path.display()
            )));
        }

        replace_file(&snapshot.path, &self.db_path)?;
        if let Some(version) = &markers.schema_version {
            stamp_db_version(&self.db_path, version)?;
        }
        self.settings.save_extra_version(markers.extra_version)?;
        self.settings.save_model_set_version(&self.schema_version)?;
        self.settings.save_last_sync(snapshot.updated_at)?;

        info!(
            path = %self.db_path.display(),
            schema_version = ?markers.schema_version,
            extra_version = markers.extra_version,
            watermark = %snapshot.updated_at,
            "seeded local database from bundled snapshot"
        );
        Ok(BootstrapOutcome::Replaced {
            markers,
            watermark: snapshot.updated_at,
        })
    }

    /// Fires the completion callback, at most once.
    pub fn notify_ready(&self, outcome: &BootstrapOutcome) {
        let callback = match self.on_ready.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                warn!("bootstrap callback lock poisoned");
                None
            }
        };
        if let Some(callback) = callback {
            callback(outcome);
        }
    }
}

/// Reads a database file's schema stamp.
///
/// Returns `None` if the file, the `model_version` table or its row is missing.
pub fn read_db_version(path: &Path) -> StorageResult<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let has_table: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'model_version')",
        [],
        |row| row.get(0),
    )?;
    if !has_table {
        return Ok(None);
    }
    let version = conn
        .query_row(
            "SELECT version FROM model_version WHERE id = ?1",
            params![VERSION_ROW],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version)
}

/// Writes a database file's schema stamp, creating the file if needed.
pub fn stamp_db_version(path: &Path, version: &str) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS model_version (
            id TEXT PRIMARY KEY,
            version TEXT NOT NULL
        );",
    )?;
    conn.execute(
        "INSERT INTO model_version (id, version) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET version = excluded.version",
        params![VERSION_ROW, version],
    )?;
    Ok(())
}

/// Copies `from` over `to` through a temporary sibling and a rename, and
/// drops stale journal files of the old database.
fn replace_file(from: &Path, to: &Path) -> StorageResult<()> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = sibling(to, "bootstrap-tmp");
    fs::copy(from, &tmp).map_err(|e| {
        StorageError::Bootstrap(format!("copy {} failed: {e}", from.display()))
    })?;
    for suffix in ["wal", "shm", "journal"] {
        let stale = sibling(to, suffix);
        if stale.exists() {
            fs::remove_file(&stale)?;
        }
    }
    fs::rename(&tmp, to)?;
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!("-{suffix}"));
    PathBuf::from(name)
}
