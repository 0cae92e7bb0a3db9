//! Integration tests for the probe pipeline
//!
//! Pinger → broadcast → Writer → Alert actor → channels, against the
//! in-memory store:
//! - Hysteresis across consecutive cycles
//! - Topology suppression when parent and child fail together
//! - Status persistence

use linkwatch::{AlertKind, DeviceStatus, TargetKey};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_device_goes_down_after_three_failures_and_recovers_at_once() {
    let pipeline = Pipeline::start(&[("down_count", "3")]).await;
    let cpe = TargetKey::device(10);

    pipeline.pinger.set_down("10.0.1.10", true);

    pipeline.cycle().await;
    assert_eq!(pipeline.status(cpe).await, (DeviceStatus::Online, 1));
    pipeline.cycle().await;
    assert_eq!(pipeline.status(cpe).await, (DeviceStatus::Online, 2));
    assert!(pipeline.store.alerts().is_empty());

    pipeline.cycle().await;
    assert_eq!(pipeline.status(cpe).await, (DeviceStatus::Offline, 3));
    assert!(eventually(|| async { pipeline.recording.sent().len() == 1 }).await);
    assert_eq!(pipeline.recording.sent()[0].kind, AlertKind::Down);

    pipeline.pinger.set_down("10.0.1.10", false);
    pipeline.cycle().await;
    assert_eq!(pipeline.status(cpe).await, (DeviceStatus::Online, 0));
    assert!(eventually(|| async { pipeline.recording.sent().len() == 2 }).await);
    assert_eq!(pipeline.recording.sent()[1].kind, AlertKind::Recovered);

    let stored = pipeline.store.target(cpe).unwrap();
    assert_eq!(stored.last_known_status, DeviceStatus::Online);
    assert_eq!(stored.consecutive_failure_count, 0);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_child_alert_suppressed_when_tower_fails_in_same_cycle() {
    let pipeline = Pipeline::start(&[("down_count", "1")]).await;

    pipeline.pinger.set_down("10.0.0.1", true);
    pipeline.pinger.set_down("10.0.1.10", true);
    pipeline.cycle().await;

    assert!(eventually(|| async { pipeline.store.alerts().len() == 2 }).await);
    let alerts = pipeline.store.alerts();
    let tower = alerts.iter().find(|a| a.device_name == "North ridge").unwrap();
    let cpe = alerts.iter().find(|a| a.device_name == "Farm CPE").unwrap();
    assert!(!tower.suppressed);
    assert!(cpe.suppressed);

    assert!(eventually(|| async { pipeline.recording.sent().len() == 1 }).await);
    assert_eq!(pipeline.recording.sent()[0].device_name, "North ridge");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_every_result_lands_in_history() {
    let pipeline = Pipeline::start(&[]).await;
    let before = pipeline.store.history().len();

    pipeline.pinger.set_latency("10.0.0.1", 12.5);
    pipeline.cycle().await;
    pipeline.cycle().await;

    let history = pipeline.store.history();
    assert_eq!(history.len(), before + 4);
    let latest_tower = history
        .iter()
        .rev()
        .find(|row| row.key == TargetKey::tower(1))
        .unwrap();
    assert_eq!(latest_tower.latency_ms, Some(12.5));

    let stats = pipeline.writer.stats().await.unwrap();
    assert_eq!(stats.buffered, 0);
    assert_eq!(stats.failed_flushes, 0);

    pipeline.shutdown().await;
}
