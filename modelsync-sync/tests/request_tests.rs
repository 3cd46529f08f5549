mod common;

use modelsync_model::{FieldType, ModelSchema, QueryPredicate, SchemaRegistry};
use modelsync_sync::{alias_for, RequestMerger, SyncError};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn merger() -> RequestMerger {
    RequestMerger::new(common::registry())
}

// ── Child queries ────────────────────────────────────────────────

#[test]
fn child_query_shape() {
    let q = merger()
        .model_query("Font", QueryPredicate::All, 500, None)
        .unwrap();
    assert_eq!(q.alias, "listFont");
    assert_eq!(
        q.body,
        "listFont: listFonts(filter: $filter, limit: $limit, nextToken: $nextToken) \
         { items { id name updatedAt _version _deleted _lastChangedAt } nextToken startedAt }"
    );
    assert_eq!(q.variables["filter"], Value::Null);
    assert_eq!(q.variables["limit"], 500);
    assert_eq!(q.variables["nextToken"], Value::Null);
    assert_eq!(q.next_token(), None);
}

#[test]
fn continuation_carries_token() {
    let q = merger()
        .model_query("Font", QueryPredicate::All, 500, None)
        .unwrap();
    let next = q.continuation("tok-2");
    assert_eq!(next.next_token(), Some("tok-2"));
    assert_eq!(next.body, q.body);
}

#[test]
fn standalone_document() {
    let q = merger()
        .model_query("Font", QueryPredicate::All, 10, Some("abc"))
        .unwrap();
    let doc = q.document();
    assert!(doc.starts_with(
        "query SyncFont($filter: ModelFontFilterInput, $limit: Int, $nextToken: String) {"
    ));
    assert_eq!(q.next_token(), Some("abc"));
}

#[test]
fn unknown_model_fails_fast() {
    let err = merger()
        .model_query("Ghost", QueryPredicate::All, 10, None)
        .unwrap_err();
    assert!(matches!(err, SyncError::Schema(_)));
}

#[test]
fn alias_convention() {
    assert_eq!(alias_for("StickerLocale"), "listStickerLocale");
}

// ── Merging ──────────────────────────────────────────────────────

#[test]
fn merge_zero_queries_is_an_error() {
    assert!(matches!(merger().merge(&[]), Err(SyncError::EmptyRequest)));
}

#[test]
fn merged_document_and_variables() {
    let m = merger();
    let sticker = m
        .model_query("Sticker", QueryPredicate::gt("grayRelease", 3), 100, None)
        .unwrap();
    let font = m
        .model_query("Font", QueryPredicate::All, 100, Some("t1"))
        .unwrap();
    let merged = m.merge(&[sticker, font]).unwrap();

    assert_eq!(
        merged.document.lines().next().unwrap(),
        "query ListAllModel($filterFont: ModelFontFilterInput, \
         $filterSticker: ModelStickerFilterInput, $limit: Int, \
         $nextTokenFont: String, $nextTokenSticker: String) {"
    );
    assert!(merged.document.contains(
        "listSticker: listStickers(filter: $filterSticker, limit: $limit, nextToken: $nextTokenSticker)"
    ));
    assert!(merged.document.contains(
        "listFont: listFonts(filter: $filterFont, limit: $limit, nextToken: $nextTokenFont)"
    ));
    assert!(merged.document.ends_with("}\n"));

    assert_eq!(
        Value::Object(merged.variables),
        json!({
            "filterSticker": {"grayRelease": {"gt": 3}},
            "nextTokenSticker": null,
            "filterFont": null,
            "nextTokenFont": "t1",
            "limit": 100
        })
    );
    let aliases: Vec<_> = merged.children.iter().map(|c| c.alias.as_str()).collect();
    assert_eq!(aliases, vec!["listSticker", "listFont"]);
}

#[test]
fn duplicate_model_rejected() {
    let m = merger();
    let a = m.model_query("Font", QueryPredicate::All, 1, None).unwrap();
    assert!(matches!(
        m.merge(&[a.clone(), a]),
        Err(SyncError::Protocol(_))
    ));
}

#[test]
fn conflicting_shared_declaration_rejected() {
    let m = merger();
    let a = m.model_query("Font", QueryPredicate::All, 1, None).unwrap();
    let mut b = m.model_query("Sticker", QueryPredicate::All, 1, None).unwrap();
    for decl in &mut b.declarations {
        if decl.name == "limit" {
            decl.graphql_type = "String".into();
        }
    }
    assert!(matches!(m.merge(&[a, b]), Err(SyncError::Protocol(_))));
}

// ── Namespacing property ─────────────────────────────────────────

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn registry_of(names: &[String]) -> Arc<SchemaRegistry> {
        let mut registry = SchemaRegistry::new("p");
        for name in names {
            registry
                .register(ModelSchema::new(name.as_str()).field("name", FieldType::String))
                .unwrap();
        }
        Arc::new(registry)
    }

    proptest! {
        #[test]
        fn per_model_variables_never_collide(
            names in prop::collection::btree_set("[A-Z][a-z]{1,8}", 2..6)
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let merger = RequestMerger::new(registry_of(&names));
            let queries: Vec<_> = names
                .iter()
                .map(|n| merger.model_query(n, QueryPredicate::eq("name", n.as_str()), 10, None).unwrap())
                .collect();
            let merged = merger.merge(&queries).unwrap();

            // Two per-model keys per model plus the shared limit.
            prop_assert_eq!(merged.variables.len(), names.len() * 2 + 1);
            for n in &names {
                let filter = format!("filter{n}");
                prop_assert_eq!(&merged.variables[&filter], &json!({"name": {"eq": n}}));
                let next_token = format!("nextToken{n}");
                prop_assert!(merged.variables.contains_key(&next_token));
                prop_assert_ne!(filter.as_str(), "limit");
                let declared = format!("${filter}: Model{n}FilterInput");
                prop_assert!(merged.document.contains(&declared));
            }
            prop_assert_eq!(merged.document.matches("$limit: Int").count(), 1);
        }
    }
}
