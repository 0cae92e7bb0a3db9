//! Helper functions for integration tests

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use linkwatch::actors::alert::AlertHandle;
use linkwatch::actors::pinger::PingerHandle;
use linkwatch::actors::writer::WriterHandle;
use linkwatch::alerts::Correlator;
use linkwatch::channels::{ChannelResult, ChannelRoute, NotificationChannel};
use linkwatch::config::Settings;
use linkwatch::probe::{PingOptions, Pinger};
use linkwatch::registry::Registry;
use linkwatch::snmp::{Agent, Oid, SnmpClient, SnmpError, Value, VarBind};
use linkwatch::storage::MemoryBackend;
use linkwatch::{
    Alert, Brand, DeviceStatus, MonitoredTarget, ProbeResult, TargetKey, TargetThresholds,
};
use tokio::sync::broadcast;

pub fn target(key: TargetKey, name: &str, address: &str) -> MonitoredTarget {
    MonitoredTarget {
        key,
        name: name.to_string(),
        address: address.to_string(),
        parent_device_id: None,
        parent_tower_id: None,
        brand: Brand::Unknown,
        snmp: Default::default(),
        interface_index: None,
        traffic_interface_index: None,
        thresholds: TargetThresholds::default(),
        last_known_status: DeviceStatus::Online,
        consecutive_failure_count: 0,
    }
}

/// Pinger whose answers are switched per address by the test
#[derive(Default)]
pub struct ScriptedPinger {
    down: Mutex<HashSet<String>>,
    latency: Mutex<HashMap<String, f64>>,
}

impl ScriptedPinger {
    pub fn set_down(&self, address: &str, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    pub fn set_latency(&self, address: &str, latency_ms: f64) {
        self.latency
            .lock()
            .unwrap()
            .insert(address.to_string(), latency_ms);
    }
}

#[async_trait]
impl Pinger for ScriptedPinger {
    async fn ping_batch(&self, addresses: &[String], _options: &PingOptions) -> Vec<ProbeResult> {
        let down = self.down.lock().unwrap().clone();
        let latency = self.latency.lock().unwrap().clone();
        addresses
            .iter()
            .map(|address| {
                if down.contains(address) {
                    ProbeResult::unreachable(address, Utc::now())
                } else {
                    ProbeResult {
                        target_address: address.clone(),
                        is_reachable: true,
                        latency_ms: Some(latency.get(address).copied().unwrap_or(5.0)),
                        packet_loss: 0.0,
                        timestamp: Utc::now(),
                    }
                }
            })
            .collect()
    }
}

/// SNMP agents keyed by host. Unknown hosts time out.
#[derive(Default)]
pub struct FakeAgents {
    mibs: Mutex<HashMap<String, BTreeMap<Oid, Value>>>,
    steps: HashMap<(String, Oid), u64>,
}

impl FakeAgents {
    pub fn agent(self, host: &str, entries: &[(&str, Value)]) -> Self {
        self.mibs.lock().unwrap().insert(
            host.to_string(),
            entries
                .iter()
                .map(|(oid, value)| (oid.parse().unwrap(), value.clone()))
                .collect(),
        );
        self
    }

    /// Advance a counter by `step` after every read
    pub fn tick(mut self, host: &str, oid: &str, step: u64) -> Self {
        self.steps.insert((host.to_string(), oid.parse().unwrap()), step);
        self
    }
}

#[async_trait]
impl SnmpClient for FakeAgents {
    async fn get(&self, agent: &Agent, oids: &[Oid]) -> Result<Vec<VarBind>, SnmpError> {
        let mut mibs = self.mibs.lock().unwrap();
        let Some(mib) = mibs.get_mut(&agent.host) else {
            return Err(SnmpError::Timeout(Duration::from_millis(1)));
        };
        Ok(oids
            .iter()
            .map(|oid| {
                let value = mib.get(oid).cloned().unwrap_or(Value::NoSuchObject);
                if let Some(step) = self.steps.get(&(agent.host.clone(), oid.clone()))
                    && let Some(Value::Counter64(current)) = mib.get_mut(oid)
                {
                    *current += step;
                }
                VarBind::new(oid.clone(), value)
            })
            .collect())
    }

    async fn get_next(&self, agent: &Agent, oid: &Oid) -> Result<VarBind, SnmpError> {
        let mibs = self.mibs.lock().unwrap();
        let Some(mib) = mibs.get(&agent.host) else {
            return Err(SnmpError::Timeout(Duration::from_millis(1)));
        };
        Ok(mib
            .iter()
            .find(|(k, _)| *k > oid)
            .map(|(k, v)| VarBind::new(k.clone(), v.clone()))
            .unwrap_or_else(|| VarBind::new(oid.clone(), Value::EndOfMibView)))
    }
}

/// Channel that keeps every alert it is asked to deliver
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<(String, Alert)>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<Alert> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, alert)| alert.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, destination: &str, alert: &Alert) -> ChannelResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), alert.clone()));
        Ok(())
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Pinger, writer and alert actors wired together over the in-memory store,
/// seeded with a tower (10.0.0.1) and a CPE behind it (10.0.1.10)
pub struct Pipeline {
    pub store: Arc<MemoryBackend>,
    pub pinger: Arc<ScriptedPinger>,
    pub recording: Arc<RecordingChannel>,
    pub probes: PingerHandle,
    pub writer: WriterHandle,
    pub alerts: AlertHandle,
}

impl Pipeline {
    pub async fn start(settings: &[(&str, &str)]) -> Self {
        let store = Arc::new(MemoryBackend::new());
        let tower = target(TargetKey::tower(1), "North ridge", "10.0.0.1");
        let mut cpe = target(TargetKey::device(10), "Farm CPE", "10.0.1.10");
        cpe.parent_tower_id = Some(1);
        store.insert_target(tower);
        store.insert_target(cpe);

        let pairs: HashMap<String, String> = settings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let registry = Registry::new(Settings::from_pairs(&pairs));
        registry.reload(store.as_ref(), &pairs).await.unwrap();

        let recording = Arc::new(RecordingChannel::default());
        let correlator =
            Correlator::new(store.clone(), registry.clone()).with_routes(vec![ChannelRoute {
                channel: recording.clone(),
                destination: "noc".to_string(),
            }]);
        let alerts = AlertHandle::spawn(correlator);

        let (result_tx, result_rx) = broadcast::channel(64);
        let writer = WriterHandle::spawn(
            store.clone(),
            registry.clone(),
            result_rx,
            alerts.event_sender(),
        );
        let pinger = Arc::new(ScriptedPinger::default());
        let probes = PingerHandle::spawn(pinger.clone(), registry, result_tx);

        // the startup cycle runs on its own, wait until it is absorbed
        let absorbed = eventually(|| async { writer.stats().await.unwrap().results >= 2 }).await;
        assert!(absorbed, "startup probe cycle never reached the writer");
        writer.flush().await.unwrap();

        Self {
            store,
            pinger,
            recording,
            probes,
            writer,
            alerts,
        }
    }

    pub async fn cycle(&self) {
        self.probes.run_now().await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn status(&self, key: TargetKey) -> (DeviceStatus, u32) {
        let state = self.writer.state(key).await.unwrap().unwrap();
        (state.status, state.consecutive_failures)
    }

    pub async fn shutdown(self) {
        self.probes.shutdown().await.unwrap();
        self.writer.shutdown().await.unwrap();
        self.alerts.shutdown().await.unwrap();
    }
}
