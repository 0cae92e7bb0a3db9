//! Integration tests for SNMP telemetry collection
//!
//! - Vendor identification and per-cycle rows
//! - Counter deltas turned into rates on the second poll
//! - Unreachable agents never stall the others

use std::sync::Arc;
use std::time::Duration;

use linkwatch::actors::telemetry::TelemetryHandle;
use linkwatch::alerts::AlertEvent;
use linkwatch::config::Settings;
use linkwatch::registry::Registry;
use linkwatch::snmp::Value;
use linkwatch::storage::MemoryBackend;
use linkwatch::{AlertKind, Brand, TargetKey, TargetThresholds};
use tokio::sync::mpsc;

use crate::helpers::*;

const HC_IN_3: &str = "1.3.6.1.2.1.31.1.1.1.6.3";
const HC_OUT_3: &str = "1.3.6.1.2.1.31.1.1.1.10.3";

fn agents() -> FakeAgents {
    FakeAgents::default()
        .agent(
            "10.30.0.1",
            &[
                (
                    "1.3.6.1.2.1.1.2.0",
                    Value::ObjectId("1.3.6.1.4.1.14988.1".parse().unwrap()),
                ),
                ("1.3.6.1.2.1.1.1.0", Value::OctetString(b"RouterOS CCR2004".to_vec())),
                (HC_IN_3, Value::Counter64(0)),
                (HC_OUT_3, Value::Counter64(0)),
            ],
        )
        .tick("10.30.0.1", HC_IN_3, 50_000_000)
        .tick("10.30.0.1", HC_OUT_3, 5_000_000)
}

struct Rig {
    store: Arc<MemoryBackend>,
    registry: Registry,
    telemetry: TelemetryHandle,
    alert_rx: mpsc::Receiver<AlertEvent>,
}

fn rig(thresholds: TargetThresholds) -> Rig {
    let store = Arc::new(MemoryBackend::new());
    let mut edge = target(TargetKey::device(1), "Edge router", "10.30.0.1");
    edge.traffic_interface_index = Some(3);
    edge.thresholds = thresholds;
    let mut dead = target(TargetKey::device(2), "Silent switch", "10.30.0.2");
    dead.traffic_interface_index = Some(1);

    store.insert_target(edge.clone());
    store.insert_target(dead.clone());
    let registry = Registry::new(Settings::default());
    registry.replace(vec![edge, dead]);

    let (alert_tx, alert_rx) = mpsc::channel(16);
    let telemetry =
        TelemetryHandle::spawn(store.clone(), registry.clone(), Arc::new(agents()), alert_tx);

    Rig {
        store,
        registry,
        telemetry,
        alert_rx,
    }
}

#[tokio::test]
async fn test_two_polls_produce_rates_for_reachable_agent_only() {
    let rig = rig(TargetThresholds::default());

    rig.telemetry.poll_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    rig.telemetry.poll_now().await.unwrap();

    let rows = rig.store.telemetry();
    assert!(rows.iter().all(|row| row.target == TargetKey::device(1)));
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].in_mbps, None);
    let in_mbps = rows[1].in_mbps.unwrap();
    let out_mbps = rows[1].out_mbps.unwrap();
    assert!(in_mbps > out_mbps, "{in_mbps} vs {out_mbps}");

    let edge = rig.registry.snapshot().get(&TargetKey::device(1)).cloned().unwrap();
    assert_eq!(edge.brand, Brand::Mikrotik);
    assert_eq!(rig.store.target(TargetKey::device(1)).unwrap().brand, Brand::Mikrotik);

    rig.telemetry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_inbound_threshold_breach_reaches_alert_queue() {
    let mut rig = rig(TargetThresholds {
        max_in_mbps: Some(10.0),
        ..Default::default()
    });

    rig.telemetry.poll_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    rig.telemetry.poll_now().await.unwrap();

    match rig.alert_rx.try_recv() {
        Ok(AlertEvent::Threshold { target, kind, .. }) => {
            assert_eq!(target.key, TargetKey::device(1));
            assert_eq!(kind, AlertKind::MaxIn);
        }
        other => panic!("expected a threshold event, got {other:?}"),
    }
    // cooldown holds back the same breach on the next cycle
    tokio::time::sleep(Duration::from_millis(50)).await;
    rig.telemetry.poll_now().await.unwrap();
    assert!(rig.alert_rx.try_recv().is_err());

    rig.telemetry.shutdown().await.unwrap();
}
