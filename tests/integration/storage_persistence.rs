//! Integration tests for engine state persisted in SQLite
//!
//! These tests verify that state survives a restart:
//! - Failure counters resume where the previous process stopped
//! - Alerts and settings are read back from the database

use std::collections::HashMap;
use std::sync::Arc;

use linkwatch::engine::Engine;
use linkwatch::storage::StorageBackend;
use linkwatch::storage::sqlite::SqliteBackend;
use linkwatch::{AlertKind, DeviceStatus, TargetKey};
use tempfile::TempDir;

use crate::helpers::*;

async fn start(dir: &TempDir, pinger: Arc<ScriptedPinger>) -> Engine {
    let store = SqliteBackend::new(dir.path().join("linkwatch.db"))
        .await
        .unwrap();
    Engine::start_with(
        Arc::new(store),
        HashMap::from([("down_count".to_string(), "3".to_string())]),
        pinger,
        Arc::new(FakeAgents::default()),
    )
    .await
    .unwrap()
}

/// Wait for the startup probe cycle to reach the writer, then persist it
async fn settle(engine: &Engine) {
    assert!(eventually(|| async { engine.writer_stats().await.unwrap().results >= 1 }).await);
    engine.flush_writes().await.unwrap();
}

#[tokio::test]
async fn test_failure_count_survives_restart() {
    let dir = TempDir::new().unwrap();
    let key = TargetKey::device(1);
    {
        let store = SqliteBackend::new(dir.path().join("linkwatch.db"))
            .await
            .unwrap();
        store
            .upsert_target(&target(key, "Hilltop AP", "10.20.0.1"))
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let pinger = Arc::new(ScriptedPinger::default());
    pinger.set_down("10.20.0.1", true);

    let engine = start(&dir, pinger.clone()).await;
    settle(&engine).await;
    engine.run_probe_cycle_now().await.unwrap();
    engine.flush_writes().await.unwrap();

    let state = engine.target_state(key).await.unwrap().unwrap();
    assert_eq!(state.status, DeviceStatus::Online);
    assert_eq!(state.consecutive_failures, 2);
    engine.shutdown().await.unwrap();

    // third failure after the restart crosses the threshold
    let engine = start(&dir, pinger).await;
    settle(&engine).await;

    let state = engine.target_state(key).await.unwrap().unwrap();
    assert_eq!(state.status, DeviceStatus::Offline);
    assert_eq!(state.consecutive_failures, 3);

    assert!(eventually(|| async { !engine.recent_alerts(10).await.unwrap().is_empty() }).await);
    let alerts = engine.recent_alerts(10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Down);
    assert_eq!(alerts[0].device_name, "Hilltop AP");

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_settings_and_synthetic_targets_persist() {
    let dir = TempDir::new().unwrap();
    let pinger = Arc::new(ScriptedPinger::default());

    let engine = start(&dir, pinger.clone()).await;
    engine
        .update_settings(&[("anomaly_sigma".to_string(), "2.5".to_string())])
        .await
        .unwrap();
    engine.add_synthetic_target("Quad9", "9.9.9.9").await.unwrap();
    engine.shutdown().await.unwrap();

    let engine = start(&dir, pinger).await;
    assert_eq!(engine.settings().anomaly.sigma, 2.5);
    // the file layer still applies underneath the stored one
    assert_eq!(engine.settings().ping.down_count, 3);

    let synthetic = engine.list_synthetic_targets().await.unwrap();
    assert_eq!(synthetic.len(), 1);
    assert_eq!(synthetic[0].address, "9.9.9.9");
    engine.shutdown().await.unwrap();
}
