//! WriterActor - turns the probe result stream into status and history rows
//!
//! ## Batching Strategy
//!
//! Results are folded through the hysteresis filter as they arrive and the
//! resulting rows are buffered:
//! - **Size trigger**: flush after 200 rows
//! - **Time trigger**: flush every 2 seconds
//!
//! The buffer is cleared after every flush attempt, successful or not.
//! Status transitions are forwarded to the alert actor after the flush, when
//! the status board already reflects every transition of the batch.
//!
//! The failure counters live here and nowhere else. Results for one target
//! are handled in arrival order, which keeps the counters consistent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::AlertEvent;
use crate::probe::ProbeEvaluation;
use crate::registry::Registry;
use crate::storage::{PingHistoryRow, StatusUpdate, StorageBackend, StorageResult};
use crate::supervisor::{Mailbox, supervise};
use crate::{ProbeResult, StatusTransition, TargetKey};

use super::RESTART_DELAY;
use super::messages::{TargetState, WriterCommand, WriterStats};

/// Flush after this many buffered rows
const BATCH_SIZE_TRIGGER: usize = 200;

/// Flush at least this often
const BATCH_TIME_TRIGGER: Duration = Duration::from_secs(2);

const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct WriterActor {
    store: Arc<dyn StorageBackend>,
    registry: Registry,
    result_rx: Mailbox<broadcast::Receiver<ProbeResult>>,
    command_rx: Mailbox<mpsc::Receiver<WriterCommand>>,
    alert_tx: mpsc::Sender<AlertEvent>,

    /// Consecutive failures per target
    failures: HashMap<TargetKey, u32>,

    updates: Vec<StatusUpdate>,
    history: Vec<PingHistoryRow>,
    transitions: Vec<StatusTransition>,

    stats: WriterStats,
}

impl WriterActor {
    pub fn new(
        store: Arc<dyn StorageBackend>,
        registry: Registry,
        result_rx: impl Into<Mailbox<broadcast::Receiver<ProbeResult>>>,
        command_rx: impl Into<Mailbox<mpsc::Receiver<WriterCommand>>>,
        alert_tx: mpsc::Sender<AlertEvent>,
    ) -> Self {
        Self {
            store,
            registry,
            result_rx: result_rx.into(),
            command_rx: command_rx.into(),
            alert_tx,
            failures: HashMap::new(),
            updates: Vec::with_capacity(BATCH_SIZE_TRIGGER),
            history: Vec::with_capacity(BATCH_SIZE_TRIGGER),
            transitions: Vec::new(),
            stats: WriterStats::default(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting writer actor");

        let mut results = self.result_rx.open().await;
        let mut commands = self.command_rx.open().await;

        let mut flush_interval = time::interval(BATCH_TIME_TRIGGER);
        let mut cleanup_interval = time::interval(CLEANUP_INTERVAL);

        loop {
            tokio::select! {
                // queued results are absorbed before any command, so a
                // Flush covers everything broadcast before it was sent
                biased;

                result = results.recv() => {
                    match result {
                        Ok(result) => {
                            self.absorb(result);
                            if self.updates.len() >= BATCH_SIZE_TRIGGER {
                                trace!("size-based flush triggered ({} rows)", self.updates.len());
                                let _ = self.flush().await;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("writer lagged, dropped {skipped} probe results");
                            self.stats.dropped += skipped;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("probe result channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = flush_interval.tick() => {
                    if !self.updates.is_empty() {
                        trace!("time-based flush triggered ({} rows)", self.updates.len());
                        let _ = self.flush().await;
                    }
                }

                _ = cleanup_interval.tick() => {
                    self.run_cleanup().await;
                }

                Some(cmd) = commands.recv() => {
                    match cmd {
                        WriterCommand::Flush { respond_to } => {
                            let result = self.flush().await.context("probe batch write failed");
                            let _ = respond_to.send(result);
                        }

                        WriterCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.current_stats());
                        }

                        WriterCommand::GetState { key, respond_to } => {
                            let state = self.registry.snapshot().get(&key).map(|target| TargetState {
                                status: self.registry.status(&key),
                                consecutive_failures: self
                                    .failures
                                    .get(&key)
                                    .copied()
                                    .unwrap_or(target.consecutive_failure_count),
                            });
                            let _ = respond_to.send(state);
                        }

                        WriterCommand::Shutdown => {
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

        if !self.updates.is_empty() || !self.transitions.is_empty() {
            debug!("final flush before shutdown ({} rows)", self.updates.len());
            let _ = self.flush().await;
        }

        debug!("writer actor stopped");
    }

    fn current_stats(&self) -> WriterStats {
        WriterStats {
            buffered: self.updates.len(),
            ..self.stats
        }
    }

    /// Fold one result into every target probed at its address
    fn absorb(&mut self, result: ProbeResult) {
        self.stats.results += 1;

        let snapshot = self.registry.snapshot();
        let down_count = self.registry.settings().ping.down_count;

        for target in snapshot.by_address(&result.target_address) {
            let key = target.key;
            let current = self.registry.status(&key);
            let failures = self
                .failures
                .get(&key)
                .copied()
                .unwrap_or(target.consecutive_failure_count);

            let evaluated =
                ProbeEvaluation::evaluate(current, failures, result.is_reachable, down_count);
            trace!("{key}: {:?} ({} failures)", evaluated.evaluation, evaluated.failures);

            self.failures.insert(key, evaluated.failures);

            if evaluated.status != current {
                self.registry.set_status(key, evaluated.status);
                self.transitions.push(StatusTransition {
                    target: target.clone(),
                    old_status: current,
                    new_status: evaluated.status,
                    timestamp: result.timestamp,
                });
            }

            self.updates.push(StatusUpdate {
                key,
                status: evaluated.status,
                consecutive_failure_count: evaluated.failures,
                last_latency_ms: result.latency_ms,
                last_seen: result.is_reachable.then_some(result.timestamp),
            });
            self.history.push(PingHistoryRow {
                key,
                timestamp: result.timestamp,
                is_reachable: result.is_reachable,
                latency_ms: result.latency_ms,
                packet_loss: result.packet_loss,
            });
        }
    }

    /// Write the buffer, then forward the transitions it contained
    async fn flush(&mut self) -> StorageResult<()> {
        let updates = std::mem::take(&mut self.updates);
        let history = std::mem::take(&mut self.history);
        let transitions = std::mem::take(&mut self.transitions);

        let result = if updates.is_empty() && history.is_empty() {
            Ok(())
        } else {
            let rows = updates.len();
            match self.store.write_probe_batch(updates, history).await {
                Ok(()) => {
                    self.stats.flush_count += 1;
                    trace!("flush #{} complete ({rows} rows)", self.stats.flush_count);
                    Ok(())
                }
                Err(e) => {
                    self.stats.failed_flushes += 1;
                    error!("failed to write probe batch, {rows} rows discarded: {e}");
                    Err(e)
                }
            }
        };

        for transition in transitions {
            self.stats.transitions += 1;
            info!(
                "{} is now {} (was {})",
                transition.target.display_name(),
                transition.new_status,
                transition.old_status
            );
            if self
                .alert_tx
                .send(AlertEvent::StatusChanged(transition))
                .await
                .is_err()
            {
                warn!("alert actor gone, transition not forwarded");
            }
        }

        result
    }

    async fn run_cleanup(&mut self) {
        let snapshot = self.registry.snapshot();
        self.failures.retain(|key, _| snapshot.get(key).is_some());

        let retention_days = self.registry.settings().history_retention_days;
        if retention_days == 0 {
            return;
        }

        let before = Utc::now() - ChronoDuration::days(i64::from(retention_days));
        match self.store.cleanup_history(before).await {
            Ok(deleted) => debug!("retention cleanup removed {deleted} rows"),
            Err(e) => error!("retention cleanup failed: {e}"),
        }
    }
}

/// Handle for controlling a WriterActor
#[derive(Clone)]
pub struct WriterHandle {
    sender: mpsc::Sender<WriterCommand>,
}

impl WriterHandle {
    pub fn spawn(
        store: Arc<dyn StorageBackend>,
        registry: Registry,
        result_rx: broadcast::Receiver<ProbeResult>,
        alert_tx: mpsc::Sender<AlertEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let results = Mailbox::new(result_rx);
        let commands = Mailbox::new(cmd_rx);
        supervise("writer actor", RESTART_DELAY, move || {
            WriterActor::new(
                store.clone(),
                registry.clone(),
                results.clone(),
                commands.clone(),
                alert_tx.clone(),
            )
            .run()
        });
        Self { sender: cmd_tx }
    }

    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WriterCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;
        rx.await.context("failed to receive response")?
    }

    pub async fn stats(&self) -> Result<WriterStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WriterCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;
        rx.await.context("failed to receive response")
    }

    pub async fn state(&self, key: TargetKey) -> Result<Option<TargetState>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WriterCommand::GetState { key, respond_to: tx })
            .await
            .context("failed to send GetState command")?;
        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(WriterCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
