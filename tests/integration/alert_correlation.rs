//! Integration tests for alert delivery through the full engine
//!
//! Channels are configured the way operators do it, through settings, and
//! pointed at a mock HTTP server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use linkwatch::engine::Engine;
use linkwatch::storage::MemoryBackend;
use linkwatch::{AlertKind, TargetKey};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn channel_settings(server: &MockServer) -> HashMap<String, String> {
    [
        ("down_count", "1".to_string()),
        ("webhook_enabled", "true".to_string()),
        ("webhook_url", format!("{}/hooks/noc", server.uri())),
        ("telegram_enabled", "true".to_string()),
        ("telegram_bot_token", "123:abc".to_string()),
        ("telegram_chat_id", "-100".to_string()),
        ("telegram_api_base", server.uri()),
        ("alert_template_down", "{name} ({kind}) went {status}".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

async fn start(store: Arc<MemoryBackend>, pinger: Arc<ScriptedPinger>, server: &MockServer) -> Engine {
    let engine = Engine::start_with(
        store,
        channel_settings(server),
        pinger,
        Arc::new(FakeAgents::default()),
    )
    .await
    .unwrap();
    assert!(eventually(|| async { engine.writer_stats().await.unwrap().results >= 1 }).await);
    engine.flush_writes().await.unwrap();
    engine
}

#[tokio::test]
async fn test_down_alert_reaches_every_enabled_channel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/noc"))
        .and(body_partial_json(json!({
            "device": "Valley PtP",
            "message": "Valley PtP (device) went offline",
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_partial_json(json!({ "chat_id": "-100" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryBackend::new());
    store.insert_target(target(TargetKey::device(4), "Valley PtP", "10.40.0.4"));
    let pinger = Arc::new(ScriptedPinger::default());
    let engine = start(store.clone(), pinger.clone(), &server).await;

    pinger.set_down("10.40.0.4", true);
    engine.run_probe_cycle_now().await.unwrap();
    engine.flush_writes().await.unwrap();

    assert!(eventually(|| async { server.received_requests().await.unwrap_or_default().len() == 2 }).await);
    let alerts = store.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Down);
    assert!(!alerts[0].suppressed);

    engine.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_muted_engine_records_without_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryBackend::new());
    store.insert_target(target(TargetKey::device(5), "Quarry AP", "10.40.0.5"));
    let pinger = Arc::new(ScriptedPinger::default());
    let engine = start(store.clone(), pinger.clone(), &server).await;

    engine.mute_alerts(Duration::from_secs(3600)).await.unwrap();
    assert!(engine.alert_state().await.unwrap().muted_until.is_some());

    pinger.set_down("10.40.0.5", true);
    engine.run_probe_cycle_now().await.unwrap();
    engine.flush_writes().await.unwrap();

    assert!(eventually(|| async { store.alerts().len() == 1 }).await);
    assert!(store.alerts()[0].suppressed);
    let state = engine.alert_state().await.unwrap();
    assert_eq!(state.suppressed, 1);
    assert_eq!(state.dispatched, 0);

    engine.shutdown().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_failing_channel_does_not_block_the_other() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/noc"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream broken"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryBackend::new());
    store.insert_target(target(TargetKey::device(6), "Silo CPE", "10.40.0.6"));
    let pinger = Arc::new(ScriptedPinger::default());
    let engine = start(store.clone(), pinger.clone(), &server).await;

    pinger.set_down("10.40.0.6", true);
    engine.run_probe_cycle_now().await.unwrap();
    engine.flush_writes().await.unwrap();
    pinger.set_down("10.40.0.6", false);
    engine.run_probe_cycle_now().await.unwrap();
    engine.flush_writes().await.unwrap();

    assert!(eventually(|| async { server.received_requests().await.unwrap_or_default().len() == 4 }).await);
    let kinds: Vec<AlertKind> = store.alerts().iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AlertKind::Down, AlertKind::Recovered]);

    engine.shutdown().await.unwrap();
    server.verify().await;
}
