//! Process-wide key-value settings: the sync watermark and version markers.
//!
//! Settings live outside the replicated database so a snapshot replacement
//! cannot wipe them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use modelsync_types::{SyncWatermark, Timestamp};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{StorageError, StorageResult};

/// Keys used by the sync engine.
pub mod keys {
    pub const LAST_SYNC: &str = "sync.last_sync";
    pub const LOCALE: &str = "sync.locale";
    pub const MODEL_SET_VERSION: &str = "sync.model_set_version";
    pub const EXTRA_VERSION: &str = "bootstrap.extra_version";
}

/// Key-value persistence for sync bookkeeping.
///
/// Implementors provide `get`/`set`/`remove`; the typed accessors are built
/// on top of them.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Last committed watermark; zero if never synced.
    fn last_sync(&self) -> StorageResult<Timestamp> {
        match self.get(keys::LAST_SYNC)? {
            Some(raw) => raw
                .parse::<u64>()
                .map(Timestamp::from_millis)
                .map_err(|e| StorageError::InvalidData(format!("last_sync {raw:?}: {e}"))),
            None => Ok(Timestamp::ZERO),
        }
    }

    fn save_last_sync(&self, ts: Timestamp) -> StorageResult<()> {
        self.set(keys::LAST_SYNC, &ts.as_millis().to_string())
    }

    fn locale(&self) -> StorageResult<Option<String>> {
        self.get(keys::LOCALE)
    }

    fn save_locale(&self, locale: Option<&str>) -> StorageResult<()> {
        match locale {
            Some(tag) => self.set(keys::LOCALE, tag),
            None => self.remove(keys::LOCALE),
        }
    }

    fn model_set_version(&self) -> StorageResult<Option<String>> {
        self.get(keys::MODEL_SET_VERSION)
    }

    fn save_model_set_version(&self, version: &str) -> StorageResult<()> {
        self.set(keys::MODEL_SET_VERSION, version)
    }

    /// Extra version of the snapshot the database was last seeded from; 0 if none.
    fn extra_version(&self) -> StorageResult<i64> {
        match self.get(keys::EXTRA_VERSION)? {
            Some(raw) => raw
                .parse()
                .map_err(|e| StorageError::InvalidData(format!("extra_version {raw:?}: {e}"))),
            None => Ok(0),
        }
    }

    fn save_extra_version(&self, version: i64) -> StorageResult<()> {
        self.set(keys::EXTRA_VERSION, &version.to_string())
    }

    /// Persists every watermark component. `last_sync` is written last, so a
    /// failed write never advances the watermark past markers that were not
    /// recorded. A `None` model-set version leaves the stored one alone.
    fn save_watermark(&self, watermark: &SyncWatermark) -> StorageResult<()> {
        self.save_locale(watermark.locale.as_deref())?;
        if let Some(version) = &watermark.model_set_version {
            self.save_model_set_version(version)?;
        }
        self.save_last_sync(watermark.last_sync)
    }

    /// Reads all watermark components at once.
    fn watermark(&self) -> StorageResult<SyncWatermark> {
        Ok(SyncWatermark {
            last_sync: self.last_sync()?,
            model_set_version: self.model_set_version()?,
            locale: self.locale()?,
        })
    }
}

/// Settings persisted in their own SQLite file.
pub struct SqliteSettings {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSettings {
    /// Opens (or creates) a settings file.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory settings store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Initialization("settings lock poisoned".into()))
    }
}

impl SettingsStore for SqliteSettings {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        upsert(&*self.conn()?, key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        delete(&*self.conn()?, key)
    }

    /// Writes all components in one transaction.
    fn save_watermark(&self, watermark: &SyncWatermark) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        match &watermark.locale {
            Some(tag) => upsert(&tx, keys::LOCALE, tag)?,
            None => delete(&tx, keys::LOCALE)?,
        }
        if let Some(version) = &watermark.model_set_version {
            upsert(&tx, keys::MODEL_SET_VERSION, version)?;
        }
        upsert(&tx, keys::LAST_SYNC, &watermark.last_sync.as_millis().to_string())?;
        tx.commit()?;
        Ok(())
    }
}

fn upsert(conn: &Connection, key: &str, value: &str) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn delete(conn: &Connection, key: &str) -> StorageResult<()> {
    conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
    Ok(())
}

/// Volatile settings.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| StorageError::Initialization("settings lock poisoned".into()))
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.values()?.remove(key);
        Ok(())
    }
}
