//! SQLite-backed [`LocalStore`].
//!
//! One table per registered model:
//!
//! ```sql
//! CREATE TABLE "<Model>" (
//!     id      TEXT PRIMARY KEY,
//!     data    TEXT NOT NULL,      -- record fields as a JSON object
//!     version INTEGER NOT NULL    -- last applied sync `_version`
//! );
//! ```
//!
//! plus a `model_version` table holding the database's schema stamp.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use modelsync_model::{QueryPredicate, SchemaRegistry};
use modelsync_types::{fields, Record};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::bootstrap::Bootstrapper;
use crate::gate::{Readiness, ReadinessGate};
use crate::sql::{field_expr, to_sql};
use crate::store::{LocalStore, StoreWriter};
use crate::{StorageError, StorageResult};

type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// SQLite local store.
///
/// The connection slot stays empty until bootstrap has finished with the
/// database file; operations wait on the readiness gate before touching it.
#[derive(Clone)]
pub struct SqliteStore {
    conn: SharedConnection,
    registry: Arc<SchemaRegistry>,
    gate: ReadinessGate,
}

impl SqliteStore {
    /// Opens (or creates) a store at `path` without a bootstrap step.
    pub fn open(path: impl AsRef<Path>, registry: Arc<SchemaRegistry>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::ready_with(conn, registry)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory(registry: Arc<SchemaRegistry>) -> StorageResult<Self> {
        Self::ready_with(Connection::open_in_memory()?, registry)
    }

    fn ready_with(conn: Connection, registry: Arc<SchemaRegistry>) -> StorageResult<Self> {
        init_schema(&conn, &registry)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            registry,
            gate: ReadinessGate::ready(),
        })
    }

    /// Returns a pending store and runs `bootstrapper` in the background.
    ///
    /// The database file is opened only after the bootstrapper finished with
    /// it. Until then every operation waits; if bootstrap fails, every
    /// operation fails with [`StorageError::Initialization`].
    pub async fn open_with_bootstrap(
        bootstrapper: Bootstrapper,
        registry: Arc<SchemaRegistry>,
    ) -> Self {
        let store = Self {
            conn: Arc::new(Mutex::new(None)),
            registry,
            gate: ReadinessGate::new(),
        };

        let conn_slot = store.conn.clone();
        let registry = store.registry.clone();
        let gate = store.gate.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || -> StorageResult<()> {
                let outcome = bootstrapper.run()?;
                let conn = Connection::open(bootstrapper.db_path())?;
                init_schema(&conn, &registry)?;
                *lock(&conn_slot)? = Some(conn);
                bootstrapper.notify_ready(&outcome);
                Ok(())
            })
            .await
            .map_err(StorageError::from)
            .and_then(|r| r);

            match result {
                Ok(()) => {
                    info!("local store ready");
                    gate.mark_ready();
                }
                Err(e) => {
                    error!("local store failed to initialize: {e}");
                    gate.mark_failed(e.to_string());
                }
            }
        });

        store
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn readiness(&self) -> Readiness {
        self.gate.state()
    }

    /// Runs `f` against the open connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection, &SchemaRegistry) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.gate.wait().await?;
        let conn = self.conn.clone();
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            let conn = guard
                .as_mut()
                .ok_or_else(|| StorageError::Initialization("store is not open".into()))?;
            f(conn, &registry)
        })
        .await?
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn ready(&self) -> StorageResult<()> {
        self.gate.wait().await
    }

    async fn with_transaction<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut dyn StoreWriter) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn, registry| {
            let tx = conn.transaction()?;
            let out = {
                let mut writer = SqliteWriter {
                    conn: &tx,
                    registry,
                };
                f(&mut writer)?
            };
            tx.commit()?;
            Ok(out)
        })
        .await
    }

    async fn query(&self, model: &str, predicate: QueryPredicate) -> StorageResult<Vec<Record>> {
        let model = model.to_string();
        self.blocking(move |conn, registry| {
            let caps = registry.capabilities(&model)?;
            let filter = to_sql(&predicate)?;
            let mut sql = format!("SELECT id, data FROM \"{model}\" WHERE {}", filter.clause);
            if caps.sort {
                let sort = field_expr(fields::SORT)?;
                sql.push_str(&format!(" ORDER BY {sort} IS NULL, {sort}, id"));
            } else {
                sql.push_str(" ORDER BY id");
            }

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(filter.params.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (id, data) = row?;
                records.push(decode(&model, id, &data)?);
            }
            debug!(model = %model, count = records.len(), "query");
            Ok(records)
        })
        .await
    }
}

/// [`StoreWriter`] over an open SQLite transaction.
struct SqliteWriter<'a> {
    conn: &'a Connection,
    registry: &'a SchemaRegistry,
}

impl SqliteWriter<'_> {
    fn table(&self, model: &str) -> StorageResult<()> {
        if self.registry.contains(model) {
            Ok(())
        } else {
            Err(StorageError::UnknownModel(model.to_string()))
        }
    }
}

impl StoreWriter for SqliteWriter<'_> {
    fn save_versioned(&mut self, record: &Record, version: i64) -> StorageResult<()> {
        self.table(&record.model)?;
        let data = serde_json::to_string(&record.fields)?;
        self.conn.execute(
            &format!(
                "INSERT INTO \"{}\" (id, data, version) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET data = excluded.data, version = excluded.version",
                record.model
            ),
            params![record.id, data, version],
        )?;
        Ok(())
    }

    fn delete(&mut self, model: &str, id: &str) -> StorageResult<bool> {
        self.table(model)?;
        let n = self
            .conn
            .execute(&format!("DELETE FROM \"{model}\" WHERE id = ?1"), params![id])?;
        Ok(n > 0)
    }

    fn get(&self, model: &str, id: &str) -> StorageResult<Option<Record>> {
        self.table(model)?;
        let data: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT data FROM \"{model}\" WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|d| decode(model, id.to_string(), &d)).transpose()
    }

    fn version_of(&self, model: &str, id: &str) -> StorageResult<Option<i64>> {
        self.table(model)?;
        Ok(self
            .conn
            .query_row(
                &format!("SELECT version FROM \"{model}\" WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn update_fields(
        &mut self,
        model: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> StorageResult<bool> {
        let Some(mut record) = self.get(model, id)? else {
            return Ok(false);
        };
        for (name, value) in fields {
            record.set(name, value.clone());
        }
        let data = serde_json::to_string(&record.fields)?;
        let n = self.conn.execute(
            &format!("UPDATE \"{model}\" SET data = ?2 WHERE id = ?1"),
            params![id, data],
        )?;
        Ok(n > 0)
    }
}

fn lock(conn: &SharedConnection) -> StorageResult<MutexGuard<'_, Option<Connection>>> {
    conn.lock()
        .map_err(|_| StorageError::Initialization("store lock poisoned".into()))
}

fn decode(model: &str, id: String, data: &str) -> StorageResult<Record> {
    let fields: Map<String, Value> = serde_json::from_str(data)?;
    Ok(Record {
        model: model.to_string(),
        id,
        fields,
    })
}

/// Creates the version table and one table per registered model.
pub(crate) fn init_schema(conn: &Connection, registry: &SchemaRegistry) -> StorageResult<()> {
    let mut ddl = String::from(
        "CREATE TABLE IF NOT EXISTS model_version (
            id TEXT PRIMARY KEY,
            version TEXT NOT NULL
        );\n",
    );
    for model in registry.models() {
        ddl.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0
            );\n",
            model.name
        ));
    }
    conn.execute_batch(&ddl)?;
    Ok(())
}
