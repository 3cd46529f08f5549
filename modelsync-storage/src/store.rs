//! Storage traits the sync engine writes through.

use async_trait::async_trait;
use modelsync_model::QueryPredicate;
use modelsync_types::Record;
use serde_json::{Map, Value};

use crate::StorageResult;

/// Write access inside one storage transaction.
///
/// Every call made through a writer commits or rolls back together.
pub trait StoreWriter {
    /// Inserts or replaces a record by identifier, recording its sync version.
    fn save_versioned(&mut self, record: &Record, version: i64) -> StorageResult<()>;

    /// Removes a record. Returns whether a row existed.
    fn delete(&mut self, model: &str, id: &str) -> StorageResult<bool>;

    fn get(&self, model: &str, id: &str) -> StorageResult<Option<Record>>;

    /// Sync version last stored for a record.
    fn version_of(&self, model: &str, id: &str) -> StorageResult<Option<i64>>;

    /// Overwrites the given top-level fields of an existing record, leaving
    /// all other fields alone. Returns whether the record existed.
    fn update_fields(
        &mut self,
        model: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> StorageResult<bool>;

    /// Inserts or replaces a record with no known sync version.
    fn save(&mut self, record: &Record) -> StorageResult<()> {
        self.save_versioned(record, 0)
    }
}

/// A transactional, model-aware record store.
///
/// All operations wait for the store to become ready; a store whose
/// bootstrap failed rejects every call with
/// [`StorageError::Initialization`](crate::StorageError::Initialization).
#[async_trait]
pub trait LocalStore: Send + Sync + 'static {
    /// Resolves once the store accepts operations.
    async fn ready(&self) -> StorageResult<()>;

    /// Runs `f` inside one write transaction. The transaction commits if `f`
    /// returns `Ok` and rolls back otherwise.
    async fn with_transaction<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut dyn StoreWriter) -> StorageResult<T> + Send + 'static,
        T: Send + 'static;

    /// Records of `model` matching `predicate`.
    async fn query(&self, model: &str, predicate: QueryPredicate) -> StorageResult<Vec<Record>>;

    async fn save(&self, records: Vec<Record>) -> StorageResult<()> {
        self.with_transaction(move |w| {
            for record in &records {
                w.save(record)?;
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, records: Vec<Record>) -> StorageResult<()> {
        self.with_transaction(move |w| {
            for record in &records {
                w.delete(&record.model, &record.id)?;
            }
            Ok(())
        })
        .await
    }

    async fn get(&self, model: &str, id: &str) -> StorageResult<Option<Record>> {
        let model = model.to_string();
        let id = id.to_string();
        self.with_transaction(move |w| w.get(&model, &id)).await
    }
}
