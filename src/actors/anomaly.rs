//! AnomalyActor - latency baselines, live judgment and capacity trends
//!
//! Three schedules share this actor:
//!
//! - **Detection** (every `anomaly_check_interval_seconds`, pausable): ping
//!   every enabled synthetic target, store the sample, judge it against the
//!   baseline for the current UTC hour and escalate after a streak.
//! - **Training** (every `baseline_training_hours`): rebuild hourly baselines
//!   from the recent sample history.
//! - **Capacity** (every `capacity_interval_hours`): fit traffic growth per
//!   target and emit an insight when a link is running out of headroom.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Timelike, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::AlertEvent;
use crate::analytics::baseline::train;
use crate::analytics::{
    BaselineSet, CapacityPolicy, Judge, Judgment, Method, StreakTracker, capacity_insight,
    metric_key,
};
use crate::config::{AnomalySettings, Settings};
use crate::probe::{PingOptions, Pinger};
use crate::registry::Registry;
use crate::storage::{StorageBackend, StorageResult};
use crate::supervisor::{Mailbox, supervise};
use crate::{LatencySample, ProbeResult, SyntheticTarget};

use super::RESTART_DELAY;
use super::messages::{AnomalyCommand, DetectionReport};

pub struct AnomalyActor {
    store: Arc<dyn StorageBackend>,
    registry: Registry,
    pinger: Arc<dyn Pinger>,
    alert_tx: mpsc::Sender<AlertEvent>,
    command_rx: Mailbox<mpsc::Receiver<AnomalyCommand>>,
    settings: AnomalySettings,
    settings_rx: watch::Receiver<Arc<Settings>>,

    /// Operator override of `anomaly_loop_enabled`
    loop_override: Option<bool>,

    baselines: BaselineSet,
    streaks: StreakTracker,
}

impl AnomalyActor {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        registry: Registry,
        pinger: Arc<dyn Pinger>,
        alert_tx: mpsc::Sender<AlertEvent>,
        command_rx: impl Into<Mailbox<mpsc::Receiver<AnomalyCommand>>>,
    ) -> Self {
        let mut settings_rx = registry.subscribe_settings();
        let settings = settings_rx.borrow_and_update().anomaly.clone();
        Self {
            store,
            registry,
            pinger,
            alert_tx,
            command_rx: command_rx.into(),
            settings,
            settings_rx,
            loop_override: None,
            baselines: BaselineSet::default(),
            streaks: StreakTracker::new(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting anomaly actor");

        let mut commands = self.command_rx.open().await;

        let mut scheduled = self.job_periods();
        let (training_period, capacity_period) = scheduled;

        // training runs right away so judgment starts with fresh baselines
        let mut training = time::interval(training_period);
        let mut capacity = time::interval_at(Instant::now() + capacity_period, capacity_period);

        let next_detection = time::sleep(self.check_interval());
        tokio::pin!(next_detection);

        loop {
            let periods = self.job_periods();
            if periods != scheduled {
                let (training_period, capacity_period) = periods;
                debug!("rescheduling training every {training_period:?}, capacity every {capacity_period:?}");
                training = time::interval_at(Instant::now() + training_period, training_period);
                capacity = time::interval_at(Instant::now() + capacity_period, capacity_period);
                scheduled = periods;
            }

            tokio::select! {
                () = &mut next_detection => {
                    self.refresh_settings();
                    if self.loop_enabled() {
                        self.run_detection().await;
                    } else {
                        trace!("detection loop paused");
                    }
                    next_detection.as_mut().reset(Instant::now() + self.check_interval());
                }

                _ = training.tick() => {
                    if let Err(e) = self.train_baselines().await {
                        error!("baseline training failed: {e}");
                    }
                }

                _ = capacity.tick() => {
                    if let Err(e) = self.run_capacity().await {
                        error!("capacity trend job failed: {e}");
                    }
                }

                Ok(()) = self.settings_rx.changed() => {
                    self.settings = self.settings_rx.borrow_and_update().anomaly.clone();
                    debug!("picked up new anomaly settings");
                }

                Some(cmd) = commands.recv() => {
                    match cmd {
                        AnomalyCommand::RunDetectionNow { respond_to } => {
                            let report = self.run_detection().await;
                            let _ = respond_to.send(report);
                        }

                        AnomalyCommand::SetLoopEnabled { enabled } => {
                            info!("detection loop {}", if enabled { "resumed" } else { "paused" });
                            self.loop_override = Some(enabled);
                        }

                        AnomalyCommand::TrainNow { respond_to } => {
                            let result = self.train_baselines().await.context("baseline training failed");
                            let _ = respond_to.send(result);
                        }

                        AnomalyCommand::RunCapacityNow { respond_to } => {
                            let result = self.run_capacity().await.context("capacity trend job failed");
                            let _ = respond_to.send(result);
                        }

                        AnomalyCommand::UpdateSettings { settings } => {
                            self.settings = settings;
                            next_detection.as_mut().reset(Instant::now() + self.check_interval());
                        }

                        AnomalyCommand::Shutdown => {
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

        debug!("anomaly actor stopped");
    }

    /// Training and capacity periods; zero hours is read as one
    fn job_periods(&self) -> (Duration, Duration) {
        let hours = |h: u64| Duration::from_secs(h.max(1) * 3600);
        (
            hours(self.settings.training_hours),
            hours(self.settings.capacity_interval_hours),
        )
    }

    fn check_interval(&self) -> Duration {
        Duration::from_secs(self.settings.check_interval_secs)
    }

    fn loop_enabled(&self) -> bool {
        self.loop_override.unwrap_or(self.settings.loop_enabled)
    }

    fn refresh_settings(&mut self) {
        if self.settings_rx.has_changed().unwrap_or(false) {
            self.settings = self.settings_rx.borrow_and_update().anomaly.clone();
            debug!("picked up new anomaly settings");
        }
    }

    async fn enabled_targets(&self) -> StorageResult<Vec<SyntheticTarget>> {
        Ok(self
            .store
            .list_synthetic_targets()
            .await?
            .into_iter()
            .filter(|target| target.enabled && !target.address.is_empty())
            .collect())
    }

    /// One detection cycle over every enabled synthetic target
    #[instrument(skip(self))]
    async fn run_detection(&mut self) -> DetectionReport {
        let mut report = DetectionReport::default();

        let targets = match self.enabled_targets().await {
            Ok(targets) => targets,
            Err(e) => {
                error!("failed to load synthetic targets: {e}");
                return report;
            }
        };
        self.streaks
            .retain(|id| targets.iter().any(|target| target.id == id));
        if targets.is_empty() {
            return report;
        }

        let mut addresses: Vec<String> = targets.iter().map(|t| t.address.clone()).collect();
        addresses.sort();
        addresses.dedup();

        let options = PingOptions::from(&self.registry.settings().ping);
        let results: HashMap<String, ProbeResult> = self
            .pinger
            .ping_batch(&addresses, &options)
            .await
            .into_iter()
            .map(|result| (result.target_address.clone(), result))
            .collect();

        let now = Utc::now();
        let hour = now.hour();
        let judge = Judge::from(&self.settings);
        let mut samples = Vec::new();

        for target in &targets {
            let latency = results
                .get(&target.address)
                .filter(|result| result.is_reachable)
                .and_then(|result| result.latency_ms);

            let judgment = latency.map(|observed| {
                samples.push(LatencySample {
                    target_id: target.id,
                    latency_ms: observed,
                    timestamp: now,
                });
                judge.judge(self.baselines.get(&metric_key(target.id), hour), observed)
            });

            // an unreachable destination counts as an anomalous cycle
            let anomalous = judgment.is_none_or(|j| j.anomalous);
            report.probed += 1;
            if anomalous {
                report.anomalous += 1;
            }

            if self
                .streaks
                .record(target.id, anomalous, self.settings.streak_cycles)
            {
                let message = describe(target, judgment.as_ref(), hour, self.settings.streak_cycles);
                warn!("{message}");
                report.escalated += 1;
                let event = AlertEvent::Anomaly {
                    target: target.clone(),
                    message,
                    timestamp: now,
                };
                if self.alert_tx.send(event).await.is_err() {
                    warn!("alert actor gone, anomaly not forwarded");
                }
            }
        }

        if let Err(e) = self.store.insert_latency_samples(samples).await {
            error!("failed to store latency samples: {e}");
        }

        debug!(
            "detection cycle: {} probed, {} anomalous, {} escalated",
            report.probed, report.anomalous, report.escalated
        );
        report
    }

    /// Rebuild hourly baselines. Returns the number of buckets written.
    #[instrument(skip(self))]
    async fn train_baselines(&mut self) -> StorageResult<usize> {
        self.refresh_settings();

        let now = Utc::now();
        let since = now - chrono::Duration::days(self.settings.window_days);
        let mut trained = Vec::new();

        for target in self.enabled_targets().await? {
            let samples = self.store.latency_samples_since(target.id, since).await?;
            trained.extend(train(&metric_key(target.id), &samples, now));
        }

        let written = trained.len();
        self.store.upsert_baselines(trained).await?;
        self.baselines = BaselineSet::new(self.store.load_baselines().await?);

        info!("trained {written} baseline buckets");
        Ok(written)
    }

    /// Capacity trend over every target. Returns the number of insights emitted.
    #[instrument(skip(self))]
    async fn run_capacity(&mut self) -> StorageResult<usize> {
        self.refresh_settings();

        let policy = CapacityPolicy::from(&self.settings);
        let now = Utc::now();
        let since = now - chrono::Duration::days(self.settings.capacity_window_days);
        let snapshot = self.registry.snapshot();
        let mut emitted = 0;

        for target in snapshot.targets() {
            let peaks = match self.store.daily_peak_traffic(target.key, since).await {
                Ok(peaks) => peaks,
                Err(e) => {
                    warn!("no traffic history for {}: {e}", target.key);
                    continue;
                }
            };

            let Some(projection) = policy.project(target.key, &peaks) else {
                continue;
            };
            let Some(severity) = policy.assess(&projection) else {
                trace!("{}: {projection:?} needs no action", target.key);
                continue;
            };

            let insight = capacity_insight(
                &target.display_name(),
                &projection,
                severity,
                policy.threshold_ratio,
                now,
            );
            info!("{}: {}", severity.as_str(), insight.message);
            if let Err(e) = self.store.insert_insight(&insight).await {
                warn!("failed to store capacity insight for {}: {e}", target.key);
                continue;
            }

            let event = AlertEvent::Capacity {
                target: target.clone(),
                message: insight.message,
                timestamp: now,
            };
            if self.alert_tx.send(event).await.is_err() {
                warn!("alert actor gone, capacity insight not forwarded");
            }
            emitted += 1;
        }

        Ok(emitted)
    }
}

fn describe(target: &SyntheticTarget, judgment: Option<&Judgment>, hour: u32, streak: u32) -> String {
    let name = &target.name;
    let address = &target.address;
    match judgment {
        None => format!("{name} ({address}) unreachable for {streak} consecutive checks"),
        Some(Judgment {
            observed_ms,
            method: Method::ZScore { mean, z },
            ..
        }) => format!(
            "{name} ({address}) latency {observed_ms:.1} ms is {z:.1} sigma above the {hour:02}:00 UTC baseline of {mean:.1} ms"
        ),
        Some(Judgment {
            observed_ms,
            method: Method::ColdStart { threshold_ms },
            ..
        }) => format!(
            "{name} ({address}) latency {observed_ms:.1} ms exceeds {threshold_ms:.0} ms"
        ),
    }
}

/// Handle for controlling the AnomalyActor
#[derive(Clone)]
pub struct AnomalyHandle {
    sender: mpsc::Sender<AnomalyCommand>,
}

impl AnomalyHandle {
    pub fn spawn(
        store: Arc<dyn StorageBackend>,
        registry: Registry,
        pinger: Arc<dyn Pinger>,
        alert_tx: mpsc::Sender<AlertEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let commands = Mailbox::new(cmd_rx);
        supervise("anomaly actor", RESTART_DELAY, move || {
            AnomalyActor::new(
                store.clone(),
                registry.clone(),
                pinger.clone(),
                alert_tx.clone(),
                commands.clone(),
            )
            .run()
        });
        Self { sender: cmd_tx }
    }

    pub async fn run_detection_now(&self) -> Result<DetectionReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AnomalyCommand::RunDetectionNow { respond_to: tx })
            .await
            .context("failed to send RunDetectionNow command")?;
        rx.await.context("failed to receive response")
    }

    pub async fn set_loop_enabled(&self, enabled: bool) -> Result<()> {
        self.sender
            .send(AnomalyCommand::SetLoopEnabled { enabled })
            .await
            .context("failed to send SetLoopEnabled command")
    }

    pub async fn train_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AnomalyCommand::TrainNow { respond_to: tx })
            .await
            .context("failed to send TrainNow command")?;
        rx.await.context("failed to receive response")?
    }

    pub async fn run_capacity_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AnomalyCommand::RunCapacityNow { respond_to: tx })
            .await
            .context("failed to send RunCapacityNow command")?;
        rx.await.context("failed to receive response")?
    }

    pub async fn update_settings(&self, settings: AnomalySettings) -> Result<()> {
        self.sender
            .send(AnomalyCommand::UpdateSettings { settings })
            .await
            .context("failed to send UpdateSettings command")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(AnomalyCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
