//! Liveness probing
//!
//! [`Pinger`] is the seam between the probe actor and the network. The
//! production implementation is [`icmp::IcmpPinger`]; tests script their own.

pub mod hysteresis;
pub mod icmp;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ProbeResult;
use crate::config::PingSettings;

pub use hysteresis::{Evaluated, ProbeEvaluation};
pub use icmp::IcmpPinger;

#[derive(Debug)]
pub enum ProbeError {
    Timeout(Duration),
    Network(String),
    /// The system `ping` fallback failed or printed something unexpected
    Command(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout(after) => write!(f, "probe timed out after {after:?}"),
            ProbeError::Network(msg) => write!(f, "network error: {msg}"),
            ProbeError::Command(msg) => write!(f, "command failed: {msg}"),
        }
    }
}

impl std::error::Error for ProbeError {}

/// Per-host echo parameters for one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingOptions {
    pub count: u32,
    pub spacing: Duration,
    pub timeout: Duration,
}

impl From<&PingSettings> for PingOptions {
    fn from(settings: &PingSettings) -> Self {
        Self {
            count: settings.count,
            spacing: settings.spacing(),
            timeout: settings.timeout(),
        }
    }
}

impl Default for PingOptions {
    fn default() -> Self {
        Self::from(&crate::config::Settings::default().ping)
    }
}

#[async_trait]
pub trait Pinger: Send + Sync {
    /// Probe every address of the batch. Returns one result per address;
    /// unreachable hosts are failed results, never errors.
    async fn ping_batch(&self, addresses: &[String], options: &PingOptions) -> Vec<ProbeResult>;
}

/// Measured round trips include a roughly constant amount of scheduling overhead
pub const OVERHEAD_COMPENSATION_MS: f64 = 1.0;

/// Below this, a live host is reported at [`NOMINAL_LATENCY_MS`]
pub const LATENCY_FLOOR_MS: f64 = 2.0;

pub const NOMINAL_LATENCY_MS: f64 = 1.0;

/// Latency reported for a live host from its fastest echo
pub fn clean_latency(min_rtt_ms: f64) -> f64 {
    let compensated = min_rtt_ms - OVERHEAD_COMPENSATION_MS;
    if compensated < LATENCY_FLOOR_MS {
        NOMINAL_LATENCY_MS
    } else {
        compensated
    }
}

/// Fold per-echo round trips (`None` = lost) into one result
pub fn summarize(
    address: &str,
    round_trips: &[Option<Duration>],
    timestamp: DateTime<Utc>,
) -> ProbeResult {
    if round_trips.is_empty() {
        return ProbeResult::unreachable(address, timestamp);
    }

    let received: Vec<f64> = round_trips
        .iter()
        .flatten()
        .map(|rtt| rtt.as_secs_f64() * 1000.0)
        .collect();

    let lost = round_trips.len() - received.len();
    let packet_loss = lost as f64 * 100.0 / round_trips.len() as f64;

    let min_rtt = received.iter().copied().reduce(f64::min);

    ProbeResult {
        target_address: address.to_string(),
        is_reachable: min_rtt.is_some(),
        latency_ms: min_rtt.map(clean_latency),
        packet_loss,
        timestamp,
    }
}
