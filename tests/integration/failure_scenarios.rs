//! Integration tests for failure handling
//!
//! - Database stall: buffers are dropped, monitoring carries on
//! - A panicking probe batch only loses its own results

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use linkwatch::actors::pinger::PingerHandle;
use linkwatch::config::Settings;
use linkwatch::probe::{PingOptions, Pinger};
use linkwatch::registry::Registry;
use linkwatch::{AlertKind, DeviceStatus, ProbeResult, TargetKey};
use tokio::sync::broadcast;

use crate::helpers::*;

#[tokio::test]
async fn test_database_stall_drops_batch_but_keeps_monitoring() {
    let pipeline = Pipeline::start(&[("down_count", "1")]).await;
    let cpe = TargetKey::device(10);

    pipeline.store.set_fail_writes(true);
    pipeline.pinger.set_down("10.0.1.10", true);
    pipeline.probes.run_now().await.unwrap();
    assert!(pipeline.writer.flush().await.is_err());

    let stats = pipeline.writer.stats().await.unwrap();
    assert_eq!(stats.failed_flushes, 1);
    assert_eq!(stats.buffered, 0);
    assert_eq!(pipeline.status(cpe).await.0, DeviceStatus::Offline);

    // the alert log write fails too, the page still goes out
    assert!(eventually(|| async { pipeline.recording.sent().len() == 1 }).await);
    assert_eq!(pipeline.recording.sent()[0].kind, AlertKind::Down);
    assert!(pipeline.store.alerts().is_empty());

    pipeline.store.set_fail_writes(false);
    let before = pipeline.store.history().len();
    pipeline.cycle().await;

    assert_eq!(pipeline.store.history().len(), before + 2);
    let stored = pipeline.store.target(cpe).unwrap();
    assert_eq!(stored.last_known_status, DeviceStatus::Offline);

    pipeline.shutdown().await;
}

/// Panics when asked to probe one poisoned address
struct PoisonedPinger {
    poisoned: &'static str,
}

#[async_trait]
impl Pinger for PoisonedPinger {
    async fn ping_batch(&self, addresses: &[String], _options: &PingOptions) -> Vec<ProbeResult> {
        assert!(
            !addresses.iter().any(|a| a == self.poisoned),
            "probe blew up on {}",
            self.poisoned
        );
        addresses
            .iter()
            .map(|address| ProbeResult {
                target_address: address.clone(),
                is_reachable: true,
                latency_ms: Some(3.0),
                packet_loss: 0.0,
                timestamp: Utc::now(),
            })
            .collect()
    }
}

#[tokio::test]
async fn test_panicking_batch_does_not_sink_the_cycle() {
    let registry = Registry::new(Settings::from_pairs(&HashMap::from([(
        "ping_batch_size".to_string(),
        "1".to_string(),
    )])));
    registry.replace(vec![
        target(TargetKey::device(1), "a", "10.60.0.1"),
        target(TargetKey::device(2), "b", "10.60.0.2"),
        target(TargetKey::device(3), "c", "10.60.0.3"),
    ]);
    let (result_tx, _result_rx) = broadcast::channel(16);

    let probes = PingerHandle::spawn(
        Arc::new(PoisonedPinger {
            poisoned: "10.60.0.2",
        }),
        registry,
        result_tx,
    );

    assert_eq!(probes.run_now().await.unwrap(), 2);
    // the actor itself is still alive
    assert_eq!(probes.run_now().await.unwrap(), 2);
    probes.shutdown().await.unwrap();
}
