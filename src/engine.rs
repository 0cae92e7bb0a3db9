//! Engine - owns the registry and every actor, and is the operator surface
//!
//! The excluded API layer drives the core exclusively through the public
//! methods here: run a cycle now, pause or resume the detection loop,
//! manage synthetic targets, change settings, mute alerts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::actors::alert::AlertHandle;
use crate::actors::anomaly::AnomalyHandle;
use crate::actors::messages::{AlertState, DetectionReport, TargetState, WriterStats};
use crate::actors::pinger::PingerHandle;
use crate::actors::telemetry::TelemetryHandle;
use crate::actors::writer::WriterHandle;
use crate::alerts::Correlator;
use crate::config::Settings;
use crate::probe::{IcmpPinger, Pinger};
use crate::registry::Registry;
use crate::snmp::discovery::InterfaceThroughput;
use crate::snmp::{SnmpClient, UdpSnmpClient};
use crate::storage::StorageBackend;
use crate::supervisor::supervise;
use crate::{Alert, SyntheticTarget, TargetId, TargetKey};

/// Probe results buffered for the writer before the oldest are dropped
pub const RESULT_CHANNEL_CAPACITY: usize = 2048;

const RELOADER_RESTART_DELAY: Duration = Duration::from_secs(5);

pub struct Engine {
    store: Arc<dyn StorageBackend>,
    registry: Registry,
    file_settings: Arc<HashMap<String, String>>,

    pinger: PingerHandle,
    writer: WriterHandle,
    telemetry: TelemetryHandle,
    anomaly: AnomalyHandle,
    alerts: AlertHandle,

    reloader: JoinHandle<()>,
}

impl Engine {
    /// Start with native ICMP and UDP SNMP clients
    pub async fn start(
        store: Arc<dyn StorageBackend>,
        file_settings: HashMap<String, String>,
    ) -> Result<Self> {
        let initial = Settings::from_pairs(&file_settings);
        let snmp = Arc::new(UdpSnmpClient::new(initial.snmp.timeout()));
        Self::start_with(store, file_settings, Arc::new(IcmpPinger::new()), snmp).await
    }

    /// Start with the given probe clients
    #[instrument(skip_all)]
    pub async fn start_with(
        store: Arc<dyn StorageBackend>,
        file_settings: HashMap<String, String>,
        pinger: Arc<dyn Pinger>,
        snmp: Arc<dyn SnmpClient>,
    ) -> Result<Self> {
        let health = store
            .health_check()
            .await
            .context("storage health check failed")?;
        if !health.healthy {
            warn!("storage reports unhealthy: {}", health.message);
        }

        let registry = Registry::new(Settings::from_pairs(&file_settings));
        match registry.reload(store.as_ref(), &file_settings).await {
            Ok(count) => info!("loaded {count} monitored targets"),
            Err(e) => warn!("initial registry load failed, starting empty: {e}"),
        }

        let file_settings = Arc::new(file_settings);
        let reloader = spawn_reloader(store.clone(), registry.clone(), file_settings.clone());

        let alerts = AlertHandle::spawn(Correlator::new(store.clone(), registry.clone()));

        let (result_tx, result_rx) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
        let writer = WriterHandle::spawn(
            store.clone(),
            registry.clone(),
            result_rx,
            alerts.event_sender(),
        );
        let telemetry = TelemetryHandle::spawn(
            store.clone(),
            registry.clone(),
            snmp,
            alerts.event_sender(),
        );
        let anomaly = AnomalyHandle::spawn(
            store.clone(),
            registry.clone(),
            pinger.clone(),
            alerts.event_sender(),
        );
        let pinger = PingerHandle::spawn(pinger, registry.clone(), result_tx);

        info!("monitoring engine started");
        Ok(Self {
            store,
            registry,
            file_settings,
            pinger,
            writer,
            telemetry,
            anomaly,
            alerts,
            reloader,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> Arc<dyn StorageBackend> {
        self.store.clone()
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.registry.settings()
    }

    /// Reload targets and settings right away instead of waiting for the
    /// next reload interval
    pub async fn reload_registry(&self) -> Result<usize> {
        self.registry
            .reload(self.store.as_ref(), &self.file_settings)
            .await
            .context("failed to reload registry")
    }

    pub async fn run_probe_cycle_now(&self) -> Result<usize> {
        self.pinger.run_now().await
    }

    /// Persist buffered probe results and forward pending transitions
    pub async fn flush_writes(&self) -> Result<()> {
        self.writer.flush().await
    }

    pub async fn writer_stats(&self) -> Result<WriterStats> {
        self.writer.stats().await
    }

    pub async fn target_state(&self, key: TargetKey) -> Result<Option<TargetState>> {
        self.writer.state(key).await
    }

    pub async fn poll_telemetry_now(&self) -> Result<usize> {
        self.telemetry.poll_now().await
    }

    pub async fn discover_interface(&self, key: TargetKey) -> Result<Option<InterfaceThroughput>> {
        self.telemetry.discover_interface(key).await
    }

    pub async fn run_detection_now(&self) -> Result<DetectionReport> {
        self.anomaly.run_detection_now().await
    }

    /// Pause or resume the background detection loop
    pub async fn set_detection_loop(&self, enabled: bool) -> Result<()> {
        self.anomaly.set_loop_enabled(enabled).await
    }

    pub async fn train_baselines_now(&self) -> Result<usize> {
        self.anomaly.train_now().await
    }

    pub async fn run_capacity_now(&self) -> Result<usize> {
        self.anomaly.run_capacity_now().await
    }

    pub async fn list_synthetic_targets(&self) -> Result<Vec<SyntheticTarget>> {
        self.store
            .list_synthetic_targets()
            .await
            .context("failed to list synthetic targets")
    }

    pub async fn add_synthetic_target(&self, name: &str, address: &str) -> Result<SyntheticTarget> {
        anyhow::ensure!(!address.trim().is_empty(), "synthetic target needs an address");
        let target = self
            .store
            .add_synthetic_target(name.trim(), address.trim())
            .await
            .context("failed to add synthetic target")?;
        info!("monitoring synthetic target {} ({})", target.name, target.address);
        Ok(target)
    }

    /// Returns false when no such target existed
    pub async fn remove_synthetic_target(&self, id: TargetId) -> Result<bool> {
        self.store
            .remove_synthetic_target(id)
            .await
            .context("failed to remove synthetic target")
    }

    /// Persist setting overrides and push the new values to every actor
    #[instrument(skip(self))]
    pub async fn update_settings(&self, pairs: &[(String, String)]) -> Result<Arc<Settings>> {
        self.store
            .save_settings(pairs)
            .await
            .context("failed to save settings")?;
        self.reload_registry().await?;

        let settings = self.registry.settings();
        self.pinger.update_settings(settings.ping.clone()).await?;
        self.telemetry.update_settings(settings.snmp.clone()).await?;
        self.anomaly.update_settings(settings.anomaly.clone()).await?;
        debug!("applied {} setting overrides", pairs.len());
        Ok(settings)
    }

    pub async fn mute_alerts(&self, duration: Duration) -> Result<()> {
        self.alerts.mute(duration).await
    }

    pub async fn unmute_alerts(&self) -> Result<()> {
        self.alerts.unmute().await
    }

    pub async fn alert_state(&self) -> Result<AlertState> {
        self.alerts.state().await
    }

    pub async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        self.store
            .recent_alerts(limit)
            .await
            .context("failed to load recent alerts")
    }

    /// Stop producers first so the writer's final flush and the alert
    /// queue drain see everything
    #[instrument(skip(self))]
    pub async fn shutdown(self) -> Result<()> {
        self.reloader.abort();

        self.pinger.shutdown().await?;
        self.telemetry.shutdown().await?;
        self.anomaly.shutdown().await?;

        if let Err(e) = self.writer.flush().await {
            warn!("final flush failed: {e}");
        }
        self.writer.shutdown().await?;
        self.alerts.shutdown().await?;

        self.store.close().await.context("failed to close storage")?;
        info!("monitoring engine stopped");
        Ok(())
    }
}

fn spawn_reloader(
    store: Arc<dyn StorageBackend>,
    registry: Registry,
    file_settings: Arc<HashMap<String, String>>,
) -> JoinHandle<()> {
    supervise("registry reloader", RELOADER_RESTART_DELAY, move || {
        let store = store.clone();
        let registry = registry.clone();
        let file_settings = file_settings.clone();
        async move {
            loop {
                tokio::time::sleep(registry.settings().registry_reload()).await;
                if let Err(e) = registry.reload(store.as_ref(), &file_settings).await {
                    error!("registry reload failed, keeping previous snapshot: {e}");
                }
            }
        }
    })
}
