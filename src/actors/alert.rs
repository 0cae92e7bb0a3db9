//! AlertActor - serializes alert handling through one [`Correlator`]
//!
//! Events arrive on their own queue from the writer, the telemetry
//! collector and the anomaly engine. Deliveries run detached, so a slow
//! channel never holds up the queue.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use crate::alerts::{AlertEvent, Correlator};
use crate::supervisor::{Mailbox, supervise};

use super::RESTART_DELAY;
use super::messages::{AlertCommand, AlertState};

/// Queued events beyond this apply backpressure to the producers
const EVENT_QUEUE: usize = 1024;

pub struct AlertActor {
    correlator: Correlator,
    event_rx: Mailbox<mpsc::Receiver<AlertEvent>>,
    command_rx: Mailbox<mpsc::Receiver<AlertCommand>>,
}

impl AlertActor {
    pub fn new(
        correlator: Correlator,
        event_rx: impl Into<Mailbox<mpsc::Receiver<AlertEvent>>>,
        command_rx: impl Into<Mailbox<mpsc::Receiver<AlertCommand>>>,
    ) -> Self {
        Self {
            correlator,
            event_rx: event_rx.into(),
            command_rx: command_rx.into(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alert actor");

        let mut events = self.event_rx.open().await;
        let mut commands = self.command_rx.open().await;

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    self.handle_event(event).await;
                }

                Some(cmd) = commands.recv() => {
                    match cmd {
                        AlertCommand::Mute { duration } => {
                            let until = Utc::now()
                                + chrono::Duration::from_std(duration)
                                    .unwrap_or_else(|_| chrono::Duration::days(365));
                            self.correlator.mute_until(until);
                        }

                        AlertCommand::Unmute => {
                            debug!("alerts unmuted");
                            self.correlator.unmute();
                        }

                        AlertCommand::GetState { respond_to } => {
                            let _ = respond_to.send(self.state());
                        }

                        AlertCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("alert channels closed, shutting down");
                    break;
                }
            }
        }

        // events already queued are still recorded
        while let Ok(event) = events.try_recv() {
            self.handle_event(event).await;
        }

        debug!("alert actor stopped");
    }

    async fn handle_event(&mut self, event: AlertEvent) {
        if let Some(handled) = self.correlator.handle(event).await {
            trace!(
                "{} alert for {} ({} deliveries)",
                handled.alert.kind,
                handled.alert.device_name,
                handled.deliveries.len()
            );
        }
    }

    fn state(&self) -> AlertState {
        let stats = self.correlator.stats();
        AlertState {
            muted_until: self
                .correlator
                .muted_until()
                .filter(|until| *until > Utc::now()),
            recorded: stats.recorded,
            dispatched: stats.dispatched,
            suppressed: stats.suppressed,
        }
    }
}

/// Handle for controlling the AlertActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
    events: mpsc::Sender<AlertEvent>,
}

impl AlertHandle {
    /// A restarted actor starts from a clone of `correlator`, unmuted and
    /// with fresh stats
    pub fn spawn(correlator: Correlator) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let events = Mailbox::new(event_rx);
        let commands = Mailbox::new(cmd_rx);
        supervise("alert actor", RESTART_DELAY, move || {
            AlertActor::new(correlator.clone(), events.clone(), commands.clone()).run()
        });
        Self {
            sender: cmd_tx,
            events: event_tx,
        }
    }

    /// Queue for producers of alert events
    pub fn event_sender(&self) -> mpsc::Sender<AlertEvent> {
        self.events.clone()
    }

    pub async fn submit(&self, event: AlertEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .context("failed to queue alert event")
    }

    pub async fn mute(&self, duration: Duration) -> Result<()> {
        self.sender
            .send(AlertCommand::Mute { duration })
            .await
            .context("failed to send Mute command")
    }

    pub async fn unmute(&self) -> Result<()> {
        self.sender
            .send(AlertCommand::Unmute)
            .await
            .context("failed to send Unmute command")
    }

    pub async fn state(&self) -> Result<AlertState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertCommand::GetState { respond_to: tx })
            .await
            .context("failed to send GetState command")?;
        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(AlertCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
