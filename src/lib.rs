pub mod actors;
pub mod alerts;
pub mod analytics;
pub mod channels;
pub mod config;
pub mod engine;
pub mod probe;
pub mod registry;
pub mod snmp;
pub mod storage;
pub mod supervisor;
pub mod util;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database identifier of a device or tower
pub type TargetId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Device,
    Tower,
    /// Latency probe destination, see [`SyntheticTarget`]
    Synthetic,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Device => "device",
            TargetKind::Tower => "tower",
            TargetKind::Synthetic => "synthetic",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "device" => Some(TargetKind::Device),
            "tower" => Some(TargetKind::Tower),
            "synthetic" => Some(TargetKind::Synthetic),
            _ => None,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Devices and towers live in separate tables, so an id alone is ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetKey {
    pub kind: TargetKind,
    pub id: TargetId,
}

impl TargetKey {
    pub fn device(id: TargetId) -> Self {
        Self {
            kind: TargetKind::Device,
            id,
        }
    }

    pub fn tower(id: TargetId) -> Self {
        Self {
            kind: TargetKind::Tower,
            id,
        }
    }

    pub fn synthetic(id: TargetId) -> Self {
        Self {
            kind: TargetKind::Synthetic,
            id,
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
    /// Never probed since it was added
    #[default]
    Unknown,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "online" | "up" => DeviceStatus::Online,
            "offline" | "down" => DeviceStatus::Offline,
            _ => DeviceStatus::Unknown,
        })
    }
}

/// Hardware vendor, used to pick a vendor OID profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brand {
    Mikrotik,
    Ubiquiti,
    Cambium,
    Mimosa,
    /// Identification was attempted and matched nothing
    Generic,
    /// Identification has not run yet
    #[default]
    Unknown,
}

impl Brand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Brand::Mikrotik => "mikrotik",
            Brand::Ubiquiti => "ubiquiti",
            Brand::Cambium => "cambium",
            Brand::Mimosa => "mimosa",
            Brand::Generic => "generic",
            Brand::Unknown => "unknown",
        }
    }

    pub fn is_identified(&self) -> bool {
        !matches!(self, Brand::Unknown)
    }
}

impl fmt::Display for Brand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Brand {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "mikrotik" => Brand::Mikrotik,
            "ubiquiti" | "ubnt" => Brand::Ubiquiti,
            "cambium" => Brand::Cambium,
            "mimosa" => Brand::Mimosa,
            "generic" => Brand::Generic,
            _ => Brand::Unknown,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnmpCredentials {
    /// Configured community; `None` means only the default community is tried
    pub community: Option<String>,
    pub port: u16,
}

/// Per-target alert thresholds for SNMP telemetry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetThresholds {
    pub max_in_mbps: Option<f64>,
    pub max_out_mbps: Option<f64>,
    pub min_voltage: Option<f64>,
}

/// A device or tower the engine watches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub key: TargetKey,
    pub name: String,
    pub address: String,
    pub parent_device_id: Option<TargetId>,
    /// Owning tower for devices, parent tower for towers
    pub parent_tower_id: Option<TargetId>,
    pub brand: Brand,
    pub snmp: SnmpCredentials,
    pub interface_index: Option<u32>,
    pub traffic_interface_index: Option<u32>,
    pub thresholds: TargetThresholds,
    pub last_known_status: DeviceStatus,
    pub consecutive_failure_count: u32,
}

impl MonitoredTarget {
    /// Interface used for bandwidth, falling back to the general interface
    pub fn traffic_interface(&self) -> Option<u32> {
        self.traffic_interface_index.or(self.interface_index)
    }

    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.address.clone()
        } else {
            self.name.clone()
        }
    }
}

/// Outcome of probing one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target_address: String,
    pub is_reachable: bool,
    pub latency_ms: Option<f64>,
    /// Percentage of echoes without a reply (0-100)
    pub packet_loss: f64,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn unreachable(address: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            target_address: address.into(),
            is_reachable: false,
            latency_ms: None,
            packet_loss: 100.0,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub target: MonitoredTarget,
    pub old_status: DeviceStatus,
    pub new_status: DeviceStatus,
    pub timestamp: DateTime<Utc>,
}

/// Alert category, used for cooldowns and the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Down,
    Recovered,
    MaxIn,
    MaxOut,
    LowVoltage,
    LatencyAnomaly,
    Capacity,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Down => "down",
            AlertKind::Recovered => "recovered",
            AlertKind::MaxIn => "max_in",
            AlertKind::MaxOut => "max_out",
            AlertKind::LowVoltage => "low_voltage",
            AlertKind::LatencyAnomaly => "latency_anomaly",
            AlertKind::Capacity => "capacity",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "down" => AlertKind::Down,
            "recovered" => AlertKind::Recovered,
            "max_in" => AlertKind::MaxIn,
            "max_out" => AlertKind::MaxOut,
            "low_voltage" => AlertKind::LowVoltage,
            "latency_anomaly" => AlertKind::LatencyAnomaly,
            "capacity" => AlertKind::Capacity,
            _ => return None,
        })
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable alert log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub device_kind: TargetKind,
    pub device_name: String,
    pub address: String,
    pub kind: AlertKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Recorded but withheld from external channels
    pub suppressed: bool,
}

/// Latency probe destination used to train baselines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticTarget {
    pub id: TargetId,
    pub name: String,
    pub address: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySample {
    pub target_id: TargetId,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Learned latency profile for one hour of the day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub metric_key: String,
    pub hour_of_day: u32,
    pub mean: f64,
    pub stddev: f64,
    pub sample_count: u32,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityProjection {
    pub target: TargetKey,
    pub current_peak: f64,
    pub estimated_capacity: f64,
    pub growth_rate_per_day: f64,
    /// `None` when usage is flat or shrinking
    pub days_until_threshold: Option<f64>,
}
