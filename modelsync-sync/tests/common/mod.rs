#![allow(dead_code)]

use std::sync::Arc;

use modelsync_model::{FieldType, ModelSchema, SchemaRegistry};
use modelsync_types::{ModelWithMetadata, Record, RecordMetadata, Timestamp};
use serde_json::{json, Value};

pub fn registry() -> Arc<SchemaRegistry> {
    let registry = SchemaRegistry::new("models-v1")
        .with_model(
            ModelSchema::new("Sticker")
                .field("name", FieldType::String)
                .field("sort", FieldType::Int)
                .field("grayRelease", FieldType::Int)
                .field("updatedAt", FieldType::DateTime),
        )
        .unwrap()
        .with_model(
            ModelSchema::new("StickerLocale")
                .field("name", FieldType::String)
                .field("sort", FieldType::Int)
                .field("locale", FieldType::String)
                .field("materialID", FieldType::String)
                .field("updatedAt", FieldType::DateTime),
        )
        .unwrap()
        .with_model(
            ModelSchema::new("Font")
                .field("name", FieldType::String)
                .field("updatedAt", FieldType::DateTime),
        )
        .unwrap();
    Arc::new(registry)
}

pub fn sticker(id: &str, name: &str, sort: i64) -> Record {
    Record::new("Sticker", id)
        .with_field("name", name)
        .with_field("sort", sort)
}

pub fn overlay(id: &str, material_id: &str, name: &str, sort: i64) -> Record {
    Record::new("StickerLocale", id)
        .with_field("materialID", material_id)
        .with_field("name", name)
        .with_field("sort", sort)
        .with_field("locale", "de")
}

pub fn live(record: Record, version: i64, changed_at: u64) -> ModelWithMetadata {
    ModelWithMetadata::new(
        record,
        RecordMetadata::new(version, Timestamp::from_millis(changed_at), false),
    )
}

pub fn tombstone(record: Record, version: i64, changed_at: u64) -> ModelWithMetadata {
    ModelWithMetadata::new(
        record,
        RecordMetadata::new(version, Timestamp::from_millis(changed_at), true),
    )
}

/// One model's list result in wire shape.
pub fn list(items: &[ModelWithMetadata], next_token: Option<&str>) -> Value {
    json!({
        "items": items.iter().map(ModelWithMetadata::to_item).collect::<Vec<_>>(),
        "nextToken": next_token,
        "startedAt": 1_700_000_000_000u64,
    })
}

/// A composite response with the given `(alias, list)` entries.
pub fn response(entries: Vec<(&str, Value)>) -> Value {
    let data: serde_json::Map<String, Value> = entries
        .into_iter()
        .map(|(alias, value)| (alias.to_string(), value))
        .collect();
    json!({ "data": data })
}

/// An empty response for every registered model.
pub fn empty_response() -> Value {
    response(vec![
        ("listSticker", list(&[], None)),
        ("listStickerLocale", list(&[], None)),
        ("listFont", list(&[], None)),
    ])
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
