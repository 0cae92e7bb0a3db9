//! TelemetryActor - SNMP polling of online targets
//!
//! ## Message Flow
//!
//! ```text
//! Cadence sleep → online targets → poll tasks (semaphore-bounded) → outcomes
//!                                                                     ↓
//!                            counter cache → rates → TelemetryRow + threshold alerts
//! ```
//!
//! Poll tasks only talk SNMP. Everything stateful (the counter cache,
//! cooldowns, discovery bookkeeping) is applied by the actor after the tasks
//! return, so it never leaves this task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::AlertEvent;
use crate::config::{Settings, SnmpSettings};
use crate::registry::Registry;
use crate::snmp::discovery::{InterfaceThroughput, discover_traffic_interface};
use crate::snmp::rates::{CounterCache, CounterSample, Rate};
use crate::snmp::vendor::{HealthReading, SignalReading, read_identity};
use crate::snmp::{SnmpClient, SnmpSession, identify_brand, profile_for};
use crate::storage::{StorageBackend, TelemetryRow};
use crate::supervisor::{Mailbox, supervise};
use crate::util::cadence_sleep;
use crate::{AlertKind, Brand, MonitoredTarget, TargetKey};

use super::RESTART_DELAY;
use super::messages::TelemetryCommand;

/// A configured traffic interface is re-measured this often
const REVALIDATE_INTERFACE_HOURS: i64 = 24;

/// Devices without a busy interface are re-measured this often
const DISCOVERY_RETRY_MINUTES: i64 = 60;

/// What to do about a target's traffic interface this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterfacePlan {
    Use(u32),
    Revalidate(u32),
    Discover,
    Skip,
}

/// Everything one poll task learned about its target
#[derive(Debug)]
struct PollOutcome {
    target: MonitoredTarget,
    reachable: bool,
    identified: Option<Brand>,
    discovered: Option<InterfaceThroughput>,
    counters: Option<CounterSample>,
    signal: SignalReading,
    health: HealthReading,
}

pub struct TelemetryActor {
    store: Arc<dyn StorageBackend>,
    registry: Registry,
    client: Arc<dyn SnmpClient>,
    alert_tx: mpsc::Sender<AlertEvent>,
    command_rx: Mailbox<mpsc::Receiver<TelemetryCommand>>,
    settings: SnmpSettings,
    settings_rx: watch::Receiver<Arc<Settings>>,

    counters: CounterCache,

    /// Last threshold alert per (target, kind)
    last_alert: HashMap<(TargetKey, AlertKind), DateTime<Utc>>,

    /// Last discovery attempt or validation per target
    interface_checked: HashMap<TargetKey, DateTime<Utc>>,
}

impl TelemetryActor {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        registry: Registry,
        client: Arc<dyn SnmpClient>,
        alert_tx: mpsc::Sender<AlertEvent>,
        command_rx: impl Into<Mailbox<mpsc::Receiver<TelemetryCommand>>>,
    ) -> Self {
        let mut settings_rx = registry.subscribe_settings();
        let settings = settings_rx.borrow_and_update().snmp.clone();
        Self {
            store,
            registry,
            client,
            alert_tx,
            command_rx: command_rx.into(),
            settings,
            settings_rx,
            counters: CounterCache::new(),
            last_alert: HashMap::new(),
            interface_checked: HashMap::new(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting telemetry actor");

        let mut commands = self.command_rx.open().await;
        let next_cycle = time::sleep(self.settings.interval());
        tokio::pin!(next_cycle);

        loop {
            tokio::select! {
                () = &mut next_cycle => {
                    let started = Instant::now();
                    self.run_cycle().await;
                    let sleep = cadence_sleep(self.settings.interval(), started.elapsed());
                    next_cycle.as_mut().reset(Instant::now() + sleep);
                }

                Some(cmd) = commands.recv() => {
                    match cmd {
                        TelemetryCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let rows = self.run_cycle().await;
                            let _ = respond_to.send(rows);
                        }

                        TelemetryCommand::DiscoverInterface { key, respond_to } => {
                            self.spawn_discovery(key, respond_to);
                        }

                        TelemetryCommand::UpdateSettings { settings } => {
                            debug!("SNMP interval now {}s", settings.interval_secs);
                            self.settings = settings;
                            next_cycle.as_mut().reset(Instant::now() + self.settings.interval());
                        }

                        TelemetryCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("telemetry actor stopped");
    }

    fn refresh_settings(&mut self) {
        if self.settings_rx.has_changed().unwrap_or(false) {
            self.settings = self.settings_rx.borrow_and_update().snmp.clone();
            debug!("picked up new SNMP settings");
        }
    }

    /// Poll every online target once. Returns the number of telemetry rows written.
    #[instrument(skip(self))]
    async fn run_cycle(&mut self) -> usize {
        self.refresh_settings();

        let snapshot = self.registry.snapshot();
        self.last_alert.retain(|(key, _), _| snapshot.get(key).is_some());
        self.interface_checked.retain(|key, _| snapshot.get(key).is_some());

        let targets: Vec<MonitoredTarget> = self
            .registry
            .online()
            .into_iter()
            .filter_map(|key| snapshot.get(&key).cloned())
            .filter(|target| !target.address.is_empty())
            .collect();

        if targets.is_empty() {
            trace!("no online targets to poll");
            return 0;
        }

        let now = Utc::now();
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut polls = JoinSet::new();

        for target in targets {
            let plan = self.plan_interface(&target, now);
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let settings = self.settings.clone();

            polls.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                Some(poll_target(client, target, plan, &settings).await)
            });
        }

        let deadline = Instant::now() + self.settings.cycle_timeout();
        let mut outcomes = Vec::new();

        loop {
            match time::timeout_at(deadline, polls.join_next()).await {
                Ok(Some(Ok(Some(outcome)))) => outcomes.push(outcome),
                Ok(Some(Ok(None))) => {}
                Ok(Some(Err(e))) => error!("SNMP poll task failed: {e}"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "SNMP cycle exceeded {:?}, abandoning {} polls",
                        self.settings.cycle_timeout(),
                        polls.len()
                    );
                    polls.abort_all();
                    break;
                }
            }
        }

        let mut rows = Vec::with_capacity(outcomes.len());
        let mut events = Vec::new();
        for outcome in outcomes {
            if let Some(row) = self.absorb(outcome, &mut events).await {
                rows.push(row);
            }
        }

        let written = rows.len();
        if let Err(e) = self.store.insert_telemetry(rows).await {
            error!("failed to write {written} telemetry rows: {e}");
        }

        for event in events {
            if self.alert_tx.send(event).await.is_err() {
                warn!("alert actor gone, threshold alert not forwarded");
            }
        }

        debug!("SNMP cycle wrote {written} telemetry rows");
        written
    }

    fn plan_interface(&mut self, target: &MonitoredTarget, now: DateTime<Utc>) -> InterfacePlan {
        match target.traffic_interface() {
            Some(if_index) => {
                let checked = self.interface_checked.entry(target.key).or_insert(now);
                if now - *checked >= chrono::Duration::hours(REVALIDATE_INTERFACE_HOURS) {
                    *checked = now;
                    InterfacePlan::Revalidate(if_index)
                } else {
                    InterfacePlan::Use(if_index)
                }
            }
            None => match self.interface_checked.get(&target.key) {
                Some(last) if now - *last < chrono::Duration::minutes(DISCOVERY_RETRY_MINUTES) => {
                    InterfacePlan::Skip
                }
                _ => {
                    self.interface_checked.insert(target.key, now);
                    InterfacePlan::Discover
                }
            },
        }
    }

    /// Apply one outcome to the actor state and build its telemetry row
    async fn absorb(
        &mut self,
        outcome: PollOutcome,
        events: &mut Vec<AlertEvent>,
    ) -> Option<TelemetryRow> {
        let target = &outcome.target;
        let key = target.key;

        if let Some(brand) = outcome.identified {
            persist_brand(self.store.as_ref(), &self.registry, key, brand).await;
        }

        if let Some(iface) = &outcome.discovered {
            persist_interface(self.store.as_ref(), &self.registry, key, iface).await;
        }

        if !outcome.reachable {
            trace!("{key} did not answer SNMP");
            return None;
        }

        let rate = match outcome.counters {
            Some(sample) => self.counters.observe(key, sample),
            None => None,
        }
        .or_else(|| {
            outcome.discovered.as_ref().map(|iface| Rate {
                in_mbps: iface.in_mbps,
                out_mbps: iface.out_mbps,
            })
        });

        let now = Utc::now();
        let mut row = TelemetryRow::new(key, now);
        row.in_mbps = rate.map(|r| r.in_mbps);
        row.out_mbps = rate.map(|r| r.out_mbps);
        row.signal_dbm = outcome.signal.signal_dbm;
        row.link_quality = outcome.signal.link_quality;
        row.snr_db = outcome.signal.snr_db;
        row.clients = outcome.signal.clients;
        row.cpu_pct = outcome.health.cpu_pct;
        row.memory_pct = outcome.health.memory_pct;
        row.disk_pct = outcome.health.disk_pct;
        row.temperature_c = outcome.health.temperature_c;
        row.voltage_v = outcome.health.voltage_v;

        self.check_thresholds(target, &row, now, events);

        Some(row)
    }

    fn check_thresholds(
        &mut self,
        target: &MonitoredTarget,
        row: &TelemetryRow,
        now: DateTime<Utc>,
        events: &mut Vec<AlertEvent>,
    ) {
        let name = target.display_name();
        let thresholds = target.thresholds;
        let mut breaches = Vec::new();

        if let (Some(max), Some(observed)) = (thresholds.max_in_mbps, row.in_mbps)
            && observed > max
        {
            breaches.push((
                AlertKind::MaxIn,
                format!("{name} inbound traffic {observed:.1} Mbps exceeds {max:.1} Mbps"),
            ));
        }

        if let (Some(max), Some(observed)) = (thresholds.max_out_mbps, row.out_mbps)
            && observed > max
        {
            breaches.push((
                AlertKind::MaxOut,
                format!("{name} outbound traffic {observed:.1} Mbps exceeds {max:.1} Mbps"),
            ));
        }

        if let (Some(min), Some(observed)) = (thresholds.min_voltage, row.voltage_v)
            && observed < min
        {
            breaches.push((
                AlertKind::LowVoltage,
                format!("{name} voltage {observed:.1} V below {min:.1} V"),
            ));
        }

        let cooldown = self.settings.alert_cooldown();
        for (kind, message) in breaches {
            if let Some(last) = self.last_alert.get(&(target.key, kind))
                && now - *last < cooldown
            {
                trace!("{kind} for {} still cooling down", target.key);
                continue;
            }

            info!("{message}");
            self.last_alert.insert((target.key, kind), now);
            events.push(AlertEvent::Threshold {
                target: target.clone(),
                kind,
                message,
                timestamp: now,
            });
        }
    }

    /// Measure and persist a target's busiest interface off the actor task
    fn spawn_discovery(
        &self,
        key: TargetKey,
        respond_to: oneshot::Sender<Option<InterfaceThroughput>>,
    ) {
        let Some(target) = self.registry.snapshot().get(&key).cloned() else {
            warn!("discovery requested for unknown target {key}");
            let _ = respond_to.send(None);
            return;
        };

        let store = self.store.clone();
        let registry = self.registry.clone();
        let client = self.client.clone();
        let settings = self.settings.clone();

        tokio::spawn(async move {
            let session = SnmpSession::for_target(client, &target, &settings.default_community);
            let busiest = discover_traffic_interface(&session, settings.discovery_window()).await;
            if let Some(iface) = &busiest {
                persist_interface(store.as_ref(), &registry, key, iface).await;
            }
            let _ = respond_to.send(busiest);
        });
    }
}

#[instrument(skip_all, fields(target = %target.key))]
async fn poll_target(
    client: Arc<dyn SnmpClient>,
    target: MonitoredTarget,
    plan: InterfacePlan,
    settings: &SnmpSettings,
) -> PollOutcome {
    let session = SnmpSession::for_target(client, &target, &settings.default_community);
    let mut outcome = PollOutcome {
        target,
        reachable: false,
        identified: None,
        discovered: None,
        counters: None,
        signal: SignalReading::default(),
        health: HealthReading::default(),
    };

    let brand = if outcome.target.brand.is_identified() {
        outcome.target.brand
    } else {
        let identity = read_identity(&session).await;
        if session.is_unreachable() {
            return outcome;
        }
        let brand = identity.as_ref().map(identify_brand).unwrap_or(Brand::Generic);
        debug!("identified as {brand}");
        outcome.identified = Some(brand);
        brand
    };
    let profile = profile_for(brand);

    let if_index = match plan {
        InterfacePlan::Use(if_index) => Some(if_index),
        InterfacePlan::Revalidate(configured) => {
            match discover_traffic_interface(&session, settings.discovery_window()).await {
                Some(busiest) if busiest.if_index != configured => {
                    info!(
                        "traffic moved from interface {configured} to {} ({})",
                        busiest.if_index, busiest.name
                    );
                    let if_index = busiest.if_index;
                    outcome.discovered = Some(busiest);
                    Some(if_index)
                }
                _ => Some(configured),
            }
        }
        InterfacePlan::Discover => {
            let busiest = discover_traffic_interface(&session, settings.discovery_window()).await;
            let if_index = busiest.as_ref().map(|iface| iface.if_index);
            outcome.discovered = busiest;
            if_index
        }
        InterfacePlan::Skip => None,
    };

    if let Some(if_index) = if_index {
        outcome.counters = profile.traffic(&session, if_index).await;
    }
    outcome.signal = profile.signal(&session).await;
    outcome.health = profile.health(&session).await;
    outcome.reachable = !session.is_unreachable();
    outcome
}

async fn persist_brand(store: &dyn StorageBackend, registry: &Registry, key: TargetKey, brand: Brand) {
    if let Err(e) = store.update_brand(key, brand).await {
        warn!("failed to store brand of {key}: {e}");
    }
    registry.update_target(key, |target| target.brand = brand);
}

async fn persist_interface(
    store: &dyn StorageBackend,
    registry: &Registry,
    key: TargetKey,
    iface: &InterfaceThroughput,
) {
    info!(
        "{key}: traffic interface {} ({}), {:.1} Mbps",
        iface.if_index,
        iface.name,
        iface.total_mbps()
    );
    if let Err(e) = store.update_traffic_interface(key, iface.if_index).await {
        warn!("failed to store traffic interface of {key}: {e}");
    }
    registry.update_target(key, |target| target.traffic_interface_index = Some(iface.if_index));
}

/// Handle for controlling the TelemetryActor
#[derive(Clone)]
pub struct TelemetryHandle {
    sender: mpsc::Sender<TelemetryCommand>,
}

impl TelemetryHandle {
    pub fn spawn(
        store: Arc<dyn StorageBackend>,
        registry: Registry,
        client: Arc<dyn SnmpClient>,
        alert_tx: mpsc::Sender<AlertEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let commands = Mailbox::new(cmd_rx);
        supervise("telemetry actor", RESTART_DELAY, move || {
            TelemetryActor::new(
                store.clone(),
                registry.clone(),
                client.clone(),
                alert_tx.clone(),
                commands.clone(),
            )
            .run()
        });
        Self { sender: cmd_tx }
    }

    pub async fn poll_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TelemetryCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;
        rx.await.context("failed to receive response")
    }

    pub async fn discover_interface(&self, key: TargetKey) -> Result<Option<InterfaceThroughput>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(TelemetryCommand::DiscoverInterface {
                key,
                respond_to: tx,
            })
            .await
            .context("failed to send DiscoverInterface command")?;
        rx.await.context("failed to receive response")
    }

    pub async fn update_settings(&self, settings: SnmpSettings) -> Result<()> {
        self.sender
            .send(TelemetryCommand::UpdateSettings { settings })
            .await
            .context("failed to send UpdateSettings command")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(TelemetryCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
