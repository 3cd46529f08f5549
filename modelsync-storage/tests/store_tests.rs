use std::sync::Arc;

use modelsync_model::{FieldType, ModelSchema, QueryPredicate, SchemaRegistry};
use modelsync_storage::{LocalStore, SqliteStore, StorageError};
use modelsync_types::Record;
use pretty_assertions::assert_eq;
use serde_json::{json, Map};

fn registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::new("v1")
        .with_model(
            ModelSchema::new("Sticker")
                .field("name", FieldType::String)
                .field("sort", FieldType::Int)
                .field("grayRelease", FieldType::Int),
        )
        .unwrap()
        .with_model(ModelSchema::new("Font").field("name", FieldType::String))
        .unwrap();
    Arc::new(registry)
}

fn sticker(id: &str, name: &str, sort: i64) -> Record {
    Record::new("Sticker", id)
        .with_field("name", name)
        .with_field("sort", sort)
}

fn store() -> SqliteStore {
    SqliteStore::open_in_memory(registry()).unwrap()
}

// ── Save / get / delete ──────────────────────────────────────────

#[tokio::test]
async fn save_and_get() {
    let store = store();
    store.save(vec![sticker("s1", "Cat", 1)]).await.unwrap();

    let got = store.get("Sticker", "s1").await.unwrap().unwrap();
    assert_eq!(got, sticker("s1", "Cat", 1));
}

#[tokio::test]
async fn save_replaces_by_id() {
    let store = store();
    store.save(vec![sticker("s1", "Cat", 1)]).await.unwrap();
    store.save(vec![sticker("s1", "Dog", 2)]).await.unwrap();

    let all = store.query("Sticker", QueryPredicate::All).await.unwrap();
    assert_eq!(all, vec![sticker("s1", "Dog", 2)]);
}

#[tokio::test]
async fn delete_removes() {
    let store = store();
    store
        .save(vec![sticker("s1", "Cat", 1), sticker("s2", "Dog", 2)])
        .await
        .unwrap();
    store.delete(vec![sticker("s1", "", 0)]).await.unwrap();

    assert!(store.get("Sticker", "s1").await.unwrap().is_none());
    assert!(store.get("Sticker", "s2").await.unwrap().is_some());
}

#[tokio::test]
async fn get_missing_is_none() {
    assert!(store().get("Sticker", "nope").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_model_is_rejected() {
    let err = store()
        .save(vec![Record::new("Ghost", "g1")])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UnknownModel(m) if m == "Ghost"));
}

// ── Queries ──────────────────────────────────────────────────────

#[tokio::test]
async fn query_orders_by_sort() {
    let store = store();
    store
        .save(vec![
            sticker("a", "A", 3),
            sticker("b", "B", 1),
            sticker("c", "C", 2),
        ])
        .await
        .unwrap();

    let ids: Vec<_> = store
        .query("Sticker", QueryPredicate::All)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["b", "c", "a"]);
}

#[tokio::test]
async fn query_applies_predicate() {
    let store = store();
    store
        .save(vec![
            sticker("a", "A", 1).with_field("grayRelease", 2),
            sticker("b", "B", 2).with_field("grayRelease", 8),
            sticker("c", "C", 3),
        ])
        .await
        .unwrap();

    let gt = store
        .query("Sticker", QueryPredicate::gt("grayRelease", 4))
        .await
        .unwrap();
    assert_eq!(gt.len(), 1);
    assert_eq!(gt[0].id, "b");

    let not_gt = store
        .query("Sticker", QueryPredicate::gt("grayRelease", 4).negate())
        .await
        .unwrap();
    let ids: Vec<_> = not_gt.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);

    let ne = store
        .query("Sticker", QueryPredicate::ne("grayRelease", 2))
        .await
        .unwrap();
    let ids: Vec<_> = ne.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c"]);
}

#[tokio::test]
async fn query_agrees_with_in_memory_evaluation() {
    let store = store();
    let records = vec![
        sticker("a", "Alpha", 1).with_field("grayRelease", 1),
        sticker("b", "Beta", 2).with_field("grayRelease", 5),
        sticker("c", "Gamma", 3),
    ];
    store.save(records.clone()).await.unwrap();

    let predicate = QueryPredicate::gt("grayRelease", 0)
        .and(QueryPredicate::eq("name", "Gamma").or(QueryPredicate::lt("sort", 3)));
    let from_sql: Vec<_> = store
        .query("Sticker", predicate.clone())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    let in_memory: Vec<_> = records
        .iter()
        .filter(|r| predicate.evaluate(r))
        .map(|r| r.id.clone())
        .collect();
    assert_eq!(from_sql, in_memory);
}

// ── Transactions ─────────────────────────────────────────────────

#[tokio::test]
async fn failed_transaction_rolls_back() {
    let store = store();
    let result: Result<(), _> = store
        .with_transaction(|w| {
            w.save(&sticker("s1", "Cat", 1))?;
            w.save(&Record::new("Ghost", "g1"))?;
            Ok(())
        })
        .await;
    assert!(result.is_err());
    assert!(store.get("Sticker", "s1").await.unwrap().is_none());
}

#[tokio::test]
async fn transaction_returns_value() {
    let store = store();
    let deleted = store
        .with_transaction(|w| {
            w.save(&sticker("s1", "Cat", 1))?;
            w.delete("Sticker", "s1")
        })
        .await
        .unwrap();
    assert!(deleted);
}

#[tokio::test]
async fn versions_are_tracked() {
    let store = store();
    let version = store
        .with_transaction(|w| {
            w.save_versioned(&sticker("s1", "Cat", 1), 7)?;
            w.version_of("Sticker", "s1")
        })
        .await
        .unwrap();
    assert_eq!(version, Some(7));
}

#[tokio::test]
async fn update_fields_touches_only_given_fields() {
    let store = store();
    store.save(vec![sticker("s1", "Cat", 1)]).await.unwrap();

    let mut patch = Map::new();
    patch.insert("name".into(), json!("Katze"));
    let updated = store
        .with_transaction(move |w| {
            let hit = w.update_fields("Sticker", "s1", &patch)?;
            let miss = w.update_fields("Sticker", "nope", &patch)?;
            Ok((hit, miss))
        })
        .await
        .unwrap();
    assert_eq!(updated, (true, false));

    let got = store.get("Sticker", "s1").await.unwrap().unwrap();
    assert_eq!(got, sticker("s1", "Katze", 1));
}

// ── On-disk ──────────────────────────────────────────────────────

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replica.db");
    {
        let store = SqliteStore::open(&path, registry()).unwrap();
        store.save(vec![sticker("s1", "Cat", 1)]).await.unwrap();
    }
    let store = SqliteStore::open(&path, registry()).unwrap();
    assert!(store.get("Sticker", "s1").await.unwrap().is_some());
}
