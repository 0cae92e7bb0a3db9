//! Actor-based monitoring engine
//!
//! Every long-running job is an independent async task that owns its state
//! and talks to the rest of the engine over Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 +-------------------+
//!                 |  Engine (hub)     |  registry reload, settings watch
//!                 +---------+---------+
//!                           | spawns
//!        +------------------+-------------------+-----------------+
//!        |                  |                   |                 |
//! +------v-------+  +-------v--------+  +-------v-------+  +------v-------+
//! | PingerActor  |  | TelemetryActor |  | AnomalyActor  |  |  AlertActor  |
//! +------+-------+  +-------+--------+  +-------+-------+  +------^-------+
//!        | ProbeResult      |                   |                 |
//! +------v-------+          |  Threshold        |  Anomaly,       |
//! |  broadcast   |          |  events           |  Capacity       |
//! +------+-------+          +---------+---------+-----------------+
//!        | subscribe                  |
//! +------v-------+                    | mpsc AlertEvent
//! | WriterActor  +--------------------+
//! +--------------+  StatusChanged
//! ```
//!
//! ## Actor Types
//!
//! - **PingerActor**: ICMP liveness cycles over every registry address
//! - **WriterActor**: Evaluates probe results, batches status and history writes
//! - **TelemetryActor**: SNMP polling, vendor identification, interface discovery
//! - **AnomalyActor**: Latency baselines, anomaly streaks, capacity trends
//! - **AlertActor**: Topology suppression, persistence and channel delivery
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: Probe results fan out over broadcast, alert events funnel into one mpsc queue
//! 3. **Request/Response**: oneshot channels for synchronous queries
//!
//! ## Supervision
//!
//! Every actor runs under [`supervise`](crate::supervisor::supervise). Its
//! receivers live in a [`Mailbox`](crate::supervisor::Mailbox), so an actor
//! that panics is rebuilt from its handle's factory and resumes on the same
//! queue. State held only in memory (hysteresis counters, counter samples,
//! streaks) starts over after a restart.

use std::time::Duration;

/// Pause before a panicked actor is started again
pub(crate) const RESTART_DELAY: Duration = Duration::from_secs(1);

pub mod alert;
pub mod anomaly;
pub mod messages;
pub mod pinger;
pub mod telemetry;
pub mod writer;
