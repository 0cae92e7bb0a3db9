//! Integration tests for the anomaly engine driven through the engine's
//! operator entry points

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use linkwatch::engine::Engine;
use linkwatch::storage::{MemoryBackend, Severity, StorageBackend, TelemetryRow};
use linkwatch::{AlertKind, LatencySample, TargetKey};

use crate::helpers::*;

async fn start(store: Arc<MemoryBackend>, pinger: Arc<ScriptedPinger>) -> Engine {
    Engine::start_with(
        store,
        HashMap::from([("anomaly_loop_enabled".to_string(), "false".to_string())]),
        pinger,
        Arc::new(FakeAgents::default()),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_trained_baseline_flags_sustained_latency_jump() {
    let store = Arc::new(MemoryBackend::new());
    let pinger = Arc::new(ScriptedPinger::default());
    let engine = start(store.clone(), pinger.clone()).await;

    let resolver = engine.add_synthetic_target("Resolver", "9.9.9.9").await.unwrap();

    // two weeks of ~20 ms samples, one every 30 minutes
    let now = Utc::now();
    let samples = (1..=14 * 48)
        .map(|i| LatencySample {
            target_id: resolver.id,
            latency_ms: 20.0 + (i % 5) as f64,
            timestamp: now - Duration::minutes(30 * i),
        })
        .collect();
    store.insert_latency_samples(samples).await.unwrap();
    assert_eq!(engine.train_baselines_now().await.unwrap(), 24);

    pinger.set_latency("9.9.9.9", 21.0);
    let normal = engine.run_detection_now().await.unwrap();
    assert_eq!((normal.probed, normal.anomalous), (1, 0));

    pinger.set_latency("9.9.9.9", 95.0);
    let first = engine.run_detection_now().await.unwrap();
    let second = engine.run_detection_now().await.unwrap();
    assert_eq!((first.anomalous, first.escalated), (1, 0));
    assert_eq!((second.anomalous, second.escalated), (1, 1));

    assert!(eventually(|| async { store.alerts().len() == 1 }).await);
    let alert = &store.alerts()[0];
    assert_eq!(alert.kind, AlertKind::LatencyAnomaly);
    assert_eq!(alert.address, "9.9.9.9");

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_removed_target_is_no_longer_probed() {
    let store = Arc::new(MemoryBackend::new());
    let pinger = Arc::new(ScriptedPinger::default());
    let engine = start(store.clone(), pinger).await;

    let upstream = engine.add_synthetic_target("Upstream", "1.1.1.1").await.unwrap();
    assert_eq!(engine.run_detection_now().await.unwrap().probed, 1);

    assert!(engine.remove_synthetic_target(upstream.id).await.unwrap());
    assert_eq!(engine.run_detection_now().await.unwrap().probed, 0);
    assert_eq!(store.latency_samples().len(), 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_capacity_job_flags_saturated_link() {
    let store = Arc::new(MemoryBackend::new());
    store.insert_target(target(TargetKey::tower(2), "Backbone", "10.50.0.2"));
    let pinger = Arc::new(ScriptedPinger::default());
    let engine = start(store.clone(), pinger).await;

    // 92-96 Mbps on an estimated 100 Mbps link
    let now = Utc::now();
    let rows = (1..=8)
        .map(|day| {
            let mut row = TelemetryRow::new(TargetKey::tower(2), now - Duration::days(day));
            row.out_mbps = Some(92.0 + (day % 5) as f64);
            row
        })
        .collect();
    store.insert_telemetry(rows).await.unwrap();

    assert_eq!(engine.run_capacity_now().await.unwrap(), 1);
    let insights = store.insights();
    assert_eq!(insights[0].severity, Severity::Critical);
    assert_eq!(insights[0].target, TargetKey::tower(2));

    assert!(eventually(|| async { store.alerts().len() == 1 }).await);
    assert_eq!(store.alerts()[0].kind, AlertKind::Capacity);

    engine.shutdown().await.unwrap();
}
