mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{list, live, registry, response, sticker};
use modelsync_model::QueryPredicate;
use modelsync_storage::{LocalStore, MemorySettings, SqliteStore};
use modelsync_sync::{
    HttpTransport, HttpTransportConfig, RequestMerger, SyncConfig, SyncError, SyncOrchestrator,
    SyncTransport,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport_for(server: &MockServer) -> HttpTransport {
    HttpTransport::new(HttpTransportConfig {
        endpoint: format!("{}/graphql", server.uri()),
        headers: HashMap::from([("x-api-key".to_string(), "test-key".to_string())]),
        timeout_ms: 2_000,
    })
    .unwrap()
}

fn font_query() -> modelsync_sync::MergedQuery {
    let merger = RequestMerger::new(registry());
    let query = merger
        .model_query("Font", QueryPredicate::All, 10, None)
        .unwrap();
    merger.merge(&[query]).unwrap()
}

// ── Config defaults ─────────────────────────────────────────────

#[test]
fn http_config_default() {
    let cfg = HttpTransportConfig::default();
    assert_eq!(cfg.endpoint, "http://localhost:20002/graphql");
    assert!(cfg.headers.is_empty());
    assert_eq!(cfg.timeout_ms, 30_000);
}

#[test]
fn http_config_serde_fills_defaults() {
    let cfg: HttpTransportConfig =
        serde_json::from_str(r#"{"endpoint": "https://api.example.com/graphql"}"#).unwrap();
    assert_eq!(cfg.endpoint, "https://api.example.com/graphql");
    assert_eq!(cfg.timeout_ms, 30_000);
}

#[test]
fn http_transport_exposes_endpoint() {
    let transport = HttpTransport::new(HttpTransportConfig::default()).unwrap();
    assert_eq!(transport.endpoint(), "http://localhost:20002/graphql");
}

// ── Requests ────────────────────────────────────────────────────

#[tokio::test]
async fn posts_query_and_variables() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("x-api-key", "test-key"))
        .and(body_partial_json(json!({
            "variables": {"limit": 10, "filterFont": null, "nextTokenFont": null}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"listFont": {"items": [], "nextToken": null}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = font_query();
    let body = transport_for(&server).execute(&query).await.unwrap();
    assert_eq!(body["data"]["listFont"]["items"], json!([]));

    let received = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(sent["query"], query.document.as_str());
}

#[tokio::test]
async fn non_success_status_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = transport_for(&server).execute(&font_query()).await.unwrap_err();
    match err {
        SyncError::Network(msg) => {
            assert!(msg.contains("503"));
            assert!(msg.contains("maintenance"));
        }
        other => panic!("expected network error, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_json_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = transport_for(&server).execute(&font_query()).await.unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {}}))
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(HttpTransportConfig {
        endpoint: format!("{}/graphql", server.uri()),
        timeout_ms: 50,
        ..Default::default()
    })
    .unwrap();
    let err = transport.execute(&font_query()).await.unwrap_err();
    assert!(matches!(err, SyncError::Timeout));
}

#[tokio::test]
async fn unreachable_endpoint_is_network_error() {
    let transport = HttpTransport::new(HttpTransportConfig {
        endpoint: "http://127.0.0.1:1/graphql".into(),
        timeout_ms: 2_000,
        ..Default::default()
    })
    .unwrap();
    let err = transport.execute(&font_query()).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
}

// ── End to end ──────────────────────────────────────────────────

#[tokio::test]
async fn full_cycle_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(response(vec![
            ("listSticker", list(&[live(sticker("s1", "Cat", 1), 1, 1_000)], None)),
            ("listStickerLocale", list(&[], None)),
            ("listFont", list(&[], None)),
        ])))
        .mount(&server)
        .await;

    let registry = registry();
    let store = Arc::new(SqliteStore::open_in_memory(registry.clone()).unwrap());
    let orchestrator = SyncOrchestrator::new(
        SyncConfig::default(),
        registry,
        store.clone(),
        Arc::new(MemorySettings::new()),
        Arc::new(transport_for(&server)),
    );

    let outcome = orchestrator.sync_now().await.unwrap();
    assert_eq!(outcome.merged, 1);
    let stored = store.get("Sticker", "s1").await.unwrap().unwrap();
    assert_eq!(stored.display_name(), Some("Cat"));
}
