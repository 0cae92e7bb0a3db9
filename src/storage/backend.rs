//! Storage backend trait definition
//!
//! Every store-facing contract of the engine goes through [`StorageBackend`]:
//! the target source, the probe persistence sink, the alert log, the key/value
//! settings source and the analytics history.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{DailyPeak, InsightRow, PingHistoryRow, StatusUpdate, TelemetryRow};
use crate::{
    Alert, Baseline, Brand, LatencySample, MonitoredTarget, SyntheticTarget, TargetId, TargetKey,
};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// Implementations must be `Send + Sync`, they are shared between actors
/// behind an `Arc`. Bulk operations must accept empty input and do nothing.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// All devices and towers with topology and last known status
    async fn load_targets(&self) -> StorageResult<Vec<MonitoredTarget>>;

    /// Upsert status columns and append history rows in one transaction
    async fn write_probe_batch(
        &self,
        updates: Vec<StatusUpdate>,
        history: Vec<PingHistoryRow>,
    ) -> StorageResult<()>;

    async fn insert_alert(&self, alert: &Alert) -> StorageResult<()>;

    /// Most recent alerts, newest first
    async fn recent_alerts(&self, limit: usize) -> StorageResult<Vec<Alert>>;

    /// Key/value settings table
    async fn load_settings(&self) -> StorageResult<HashMap<String, String>>;

    async fn save_settings(&self, pairs: &[(String, String)]) -> StorageResult<()>;

    /// Cache the identified brand on the target row
    async fn update_brand(&self, key: TargetKey, brand: Brand) -> StorageResult<()>;

    async fn update_traffic_interface(&self, key: TargetKey, if_index: u32) -> StorageResult<()>;

    async fn insert_telemetry(&self, rows: Vec<TelemetryRow>) -> StorageResult<()>;

    /// Per-day maximum of in/out traffic since the given time, oldest day first
    async fn daily_peak_traffic(
        &self,
        key: TargetKey,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<DailyPeak>>;

    async fn list_synthetic_targets(&self) -> StorageResult<Vec<SyntheticTarget>>;

    async fn add_synthetic_target(&self, name: &str, address: &str)
    -> StorageResult<SyntheticTarget>;

    /// Returns whether a target was removed
    async fn remove_synthetic_target(&self, id: TargetId) -> StorageResult<bool>;

    async fn insert_latency_samples(&self, samples: Vec<LatencySample>) -> StorageResult<()>;

    /// Samples for one synthetic target, oldest first
    async fn latency_samples_since(
        &self,
        target_id: TargetId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<LatencySample>>;

    /// Replace baselines with the same `(metric_key, hour_of_day)`
    async fn upsert_baselines(&self, baselines: Vec<Baseline>) -> StorageResult<()>;

    async fn load_baselines(&self) -> StorageResult<Vec<Baseline>>;

    async fn insert_insight(&self, insight: &InsightRow) -> StorageResult<()>;

    /// Delete ping history and latency samples older than `before`.
    /// Returns the number of rows deleted.
    async fn cleanup_history(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
