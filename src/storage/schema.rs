//! Row types exchanged with storage backends
//!
//! Timestamps are stored as Unix milliseconds, statuses and brands as their
//! lowercase names.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{DeviceStatus, TargetKey};

/// Status columns of a device or tower, written after every probe batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub key: TargetKey,
    pub status: DeviceStatus,
    pub consecutive_failure_count: u32,
    pub last_latency_ms: Option<f64>,
    /// Set only by reachable probes
    pub last_seen: Option<DateTime<Utc>>,
}

/// One probe outcome kept for latency charts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingHistoryRow {
    pub key: TargetKey,
    pub timestamp: DateTime<Utc>,
    pub is_reachable: bool,
    pub latency_ms: Option<f64>,
    pub packet_loss: f64,
}

/// One successful SNMP poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub target: TargetKey,
    pub timestamp: DateTime<Utc>,
    pub in_mbps: Option<f64>,
    pub out_mbps: Option<f64>,
    pub signal_dbm: Option<f64>,
    pub link_quality: Option<f64>,
    pub snr_db: Option<f64>,
    pub clients: Option<u32>,
    pub cpu_pct: Option<f64>,
    pub memory_pct: Option<f64>,
    pub disk_pct: Option<f64>,
    pub temperature_c: Option<f64>,
    pub voltage_v: Option<f64>,
}

impl TelemetryRow {
    pub fn new(target: TargetKey, timestamp: DateTime<Utc>) -> Self {
        Self {
            target,
            timestamp,
            in_mbps: None,
            out_mbps: None,
            signal_dbm: None,
            link_quality: None,
            snr_db: None,
            clients: None,
            cpu_pct: None,
            memory_pct: None,
            disk_pct: None,
            temperature_c: None,
            voltage_v: None,
        }
    }

    /// Larger of the two directions, if any traffic was measured
    pub fn peak_mbps(&self) -> Option<f64> {
        match (self.in_mbps, self.out_mbps) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Highest traffic rate seen on one UTC day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPeak {
    pub day: NaiveDate,
    pub peak_mbps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Forecast emitted by the capacity trend job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRow {
    pub target: TargetKey,
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

pub(crate) fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
