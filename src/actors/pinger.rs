//! PingerActor - fixed-cadence liveness probe cycles
//!
//! ## Message Flow
//!
//! ```text
//! Cadence sleep → Snapshot addresses → Batches (semaphore-bounded) → broadcast ProbeResult → [Writer]
//!     ↑
//!     └─── Commands (RunNow, UpdateSettings, Shutdown)
//! ```
//!
//! Each batch runs in its own task. A cycle that exceeds its timeout aborts
//! the batches still in flight and the next cycle is scheduled normally.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tracing::{debug, error, instrument, trace, warn};

use crate::ProbeResult;
use crate::config::{PingSettings, Settings};
use crate::probe::{PingOptions, Pinger};
use crate::registry::Registry;
use crate::supervisor::{Mailbox, supervise};
use crate::util::cadence_sleep;

use super::RESTART_DELAY;
use super::messages::PingerCommand;

pub struct PingerActor {
    pinger: Arc<dyn Pinger>,
    registry: Registry,
    settings: PingSettings,
    settings_rx: watch::Receiver<Arc<Settings>>,
    command_rx: Mailbox<mpsc::Receiver<PingerCommand>>,
    result_tx: broadcast::Sender<ProbeResult>,
}

impl PingerActor {
    pub fn new(
        pinger: Arc<dyn Pinger>,
        registry: Registry,
        command_rx: impl Into<Mailbox<mpsc::Receiver<PingerCommand>>>,
        result_tx: broadcast::Sender<ProbeResult>,
    ) -> Self {
        let mut settings_rx = registry.subscribe_settings();
        let settings = settings_rx.borrow_and_update().ping.clone();
        Self {
            pinger,
            registry,
            settings,
            settings_rx,
            command_rx: command_rx.into(),
            result_tx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting pinger actor");

        let mut commands = self.command_rx.open().await;
        let next_cycle = time::sleep(Duration::ZERO);
        tokio::pin!(next_cycle);

        loop {
            tokio::select! {
                () = &mut next_cycle => {
                    let started = Instant::now();
                    self.run_cycle().await;
                    let sleep = cadence_sleep(self.settings.interval(), started.elapsed());
                    trace!("next probe cycle in {sleep:?}");
                    next_cycle.as_mut().reset(Instant::now() + sleep);
                }

                Some(cmd) = commands.recv() => {
                    match cmd {
                        PingerCommand::RunNow { respond_to } => {
                            debug!("received RunNow command");
                            let produced = self.run_cycle().await;
                            let _ = respond_to.send(produced);
                        }

                        PingerCommand::UpdateSettings { settings } => {
                            debug!("probe interval now {}s", settings.interval_secs);
                            self.settings = settings;
                            next_cycle.as_mut().reset(Instant::now() + self.settings.interval());
                        }

                        PingerCommand::Shutdown => {
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

        debug!("pinger actor stopped");
    }

    fn refresh_settings(&mut self) {
        if self.settings_rx.has_changed().unwrap_or(false) {
            self.settings = self.settings_rx.borrow_and_update().ping.clone();
            debug!("picked up new probe settings");
        }
    }

    /// Probe every registry address once. Returns the number of results broadcast.
    #[instrument(skip(self))]
    async fn run_cycle(&mut self) -> usize {
        self.refresh_settings();

        let addresses = self.registry.snapshot().addresses();
        if addresses.is_empty() {
            trace!("no targets to probe");
            return 0;
        }

        let options = PingOptions::from(&self.settings);
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_batches));
        let mut batches = JoinSet::new();

        for batch in addresses.chunks(self.settings.batch_size) {
            let batch = batch.to_vec();
            let pinger = self.pinger.clone();
            let semaphore = semaphore.clone();
            let result_tx = self.result_tx.clone();

            batches.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return 0;
                };
                let results = pinger.ping_batch(&batch, &options).await;
                let produced = results.len();
                for result in results {
                    // no subscribers is fine
                    let _ = result_tx.send(result);
                }
                produced
            });
        }

        let deadline = Instant::now() + self.settings.cycle_timeout();
        let mut produced = 0;

        loop {
            match time::timeout_at(deadline, batches.join_next()).await {
                Ok(Some(Ok(count))) => produced += count,
                Ok(Some(Err(e))) => error!("probe batch failed: {e}"),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "probe cycle exceeded {:?}, abandoning {} batches",
                        self.settings.cycle_timeout(),
                        batches.len()
                    );
                    batches.abort_all();
                    break;
                }
            }
        }

        debug!("probe cycle produced {produced} results for {} addresses", addresses.len());
        produced
    }
}

/// Handle for controlling a PingerActor
#[derive(Clone)]
pub struct PingerHandle {
    sender: mpsc::Sender<PingerCommand>,
}

impl PingerHandle {
    pub fn spawn(
        pinger: Arc<dyn Pinger>,
        registry: Registry,
        result_tx: broadcast::Sender<ProbeResult>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let commands = Mailbox::new(cmd_rx);
        supervise("pinger actor", RESTART_DELAY, move || {
            PingerActor::new(
                pinger.clone(),
                registry.clone(),
                commands.clone(),
                result_tx.clone(),
            )
            .run()
        });
        Self { sender: cmd_tx }
    }

    /// Run one probe cycle immediately
    pub async fn run_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PingerCommand::RunNow { respond_to: tx })
            .await
            .context("failed to send RunNow command")?;
        rx.await.context("failed to receive response")
    }

    pub async fn update_settings(&self, settings: PingSettings) -> Result<()> {
        self.sender
            .send(PingerCommand::UpdateSettings { settings })
            .await
            .context("failed to send UpdateSettings command")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PingerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
