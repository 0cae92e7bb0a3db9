//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: request/response messages sent to one actor via mpsc
//! 2. **Events**: probe results are broadcast; alert events are queued to the alert actor
//! 3. **Request/Response**: oneshot channels for synchronous queries

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::config::{AnomalySettings, PingSettings, SnmpSettings};
use crate::snmp::discovery::InterfaceThroughput;
use crate::{DeviceStatus, TargetKey};

pub use crate::alerts::AlertEvent;

/// Commands for the liveness probe actor
#[derive(Debug)]
pub enum PingerCommand {
    /// Run one cycle now and report how many results were broadcast
    RunNow { respond_to: oneshot::Sender<usize> },

    /// Replace the probe settings until the next settings publication
    UpdateSettings { settings: PingSettings },

    Shutdown,
}

/// Commands for the batch persistence writer
#[derive(Debug)]
pub enum WriterCommand {
    /// Flush buffered rows and forward pending transitions now
    Flush {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    GetStats {
        respond_to: oneshot::Sender<WriterStats>,
    },

    /// Current failure counter and status of one target
    GetState {
        key: TargetKey,
        respond_to: oneshot::Sender<Option<TargetState>>,
    },

    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Probe results received from the broadcast channel
    pub results: u64,

    /// Results lost because the writer lagged behind
    pub dropped: u64,

    /// Rows currently waiting for a flush
    pub buffered: usize,

    pub flush_count: u64,

    pub failed_flushes: u64,

    pub transitions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetState {
    pub status: DeviceStatus,
    pub consecutive_failures: u32,
}

/// Commands for the SNMP telemetry collector
#[derive(Debug)]
pub enum TelemetryCommand {
    /// Poll every online target now; responds with the number of rows written
    PollNow { respond_to: oneshot::Sender<usize> },

    /// Measure every interface of one target and persist the busiest
    DiscoverInterface {
        key: TargetKey,
        respond_to: oneshot::Sender<Option<InterfaceThroughput>>,
    },

    UpdateSettings { settings: SnmpSettings },

    Shutdown,
}

/// Commands for the alert actor
#[derive(Debug)]
pub enum AlertCommand {
    /// Record but do not dispatch alerts for a while, e.g. during maintenance
    Mute { duration: Duration },

    Unmute,

    GetState {
        respond_to: oneshot::Sender<AlertState>,
    },

    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    pub muted_until: Option<DateTime<Utc>>,
    pub recorded: u64,
    pub dispatched: u64,
    pub suppressed: u64,
}

/// Commands for the anomaly engine
#[derive(Debug)]
pub enum AnomalyCommand {
    /// Run one detection cycle now, even when the loop is paused
    RunDetectionNow {
        respond_to: oneshot::Sender<DetectionReport>,
    },

    /// Pause or resume the background detection loop
    SetLoopEnabled { enabled: bool },

    TrainNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    RunCapacityNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    UpdateSettings { settings: AnomalySettings },

    Shutdown,
}

/// Outcome of one detection cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionReport {
    pub probed: usize,
    pub anomalous: usize,
    pub escalated: usize,
}
