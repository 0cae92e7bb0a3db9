//! In-memory storage backend (no persistence)
//!
//! Used when the configuration selects `"backend": "none"` and as the store
//! behind most tests. Writes can be made to fail on demand to exercise the
//! database-stall paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{DailyPeak, InsightRow, PingHistoryRow, StatusUpdate, TelemetryRow};
use crate::{
    Alert, Baseline, Brand, LatencySample, MonitoredTarget, SyntheticTarget, TargetId, TargetKey,
};

#[derive(Default)]
struct MemoryState {
    targets: BTreeMap<TargetKey, MonitoredTarget>,
    history: Vec<PingHistoryRow>,
    alerts: Vec<Alert>,
    settings: HashMap<String, String>,
    telemetry: Vec<TelemetryRow>,
    synthetic: BTreeMap<TargetId, SyntheticTarget>,
    samples: Vec<LatencySample>,
    baselines: BTreeMap<(String, u32), Baseline>,
    insights: Vec<InsightRow>,
    rejected_insights: HashSet<TargetKey>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    next_synthetic_id: AtomicI64,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }

    /// Make every subsequent write fail until re-enabled
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail insight writes for one target only
    pub fn reject_insights_for(&self, key: TargetKey) {
        self.write().rejected_insights.insert(key);
    }

    pub fn insert_target(&self, target: MonitoredTarget) {
        self.write().targets.insert(target.key, target);
    }

    pub fn remove_target(&self, key: TargetKey) {
        self.write().targets.remove(&key);
    }

    pub fn target(&self, key: TargetKey) -> Option<MonitoredTarget> {
        self.read().targets.get(&key).cloned()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.read().alerts.clone()
    }

    pub fn history(&self) -> Vec<PingHistoryRow> {
        self.read().history.clone()
    }

    pub fn telemetry(&self) -> Vec<TelemetryRow> {
        self.read().telemetry.clone()
    }

    pub fn insights(&self) -> Vec<InsightRow> {
        self.read().insights.clone()
    }

    pub fn latency_samples(&self) -> Vec<LatencySample> {
        self.read().samples.clone()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load_targets(&self) -> StorageResult<Vec<MonitoredTarget>> {
        Ok(self.read().targets.values().cloned().collect())
    }

    async fn write_probe_batch(
        &self,
        updates: Vec<StatusUpdate>,
        history: Vec<PingHistoryRow>,
    ) -> StorageResult<()> {
        self.check_writable()?;
        debug!(
            "in-memory probe batch: {} updates, {} history rows",
            updates.len(),
            history.len()
        );

        let mut state = self.write();
        for update in updates {
            if let Some(target) = state.targets.get_mut(&update.key) {
                target.last_known_status = update.status;
                target.consecutive_failure_count = update.consecutive_failure_count;
            }
        }
        state.history.extend(history);
        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> StorageResult<()> {
        self.check_writable()?;
        self.write().alerts.push(alert.clone());
        Ok(())
    }

    async fn recent_alerts(&self, limit: usize) -> StorageResult<Vec<Alert>> {
        Ok(self.read().alerts.iter().rev().take(limit).cloned().collect())
    }

    async fn load_settings(&self) -> StorageResult<HashMap<String, String>> {
        Ok(self.read().settings.clone())
    }

    async fn save_settings(&self, pairs: &[(String, String)]) -> StorageResult<()> {
        self.check_writable()?;
        self.write().settings.extend(pairs.iter().cloned());
        Ok(())
    }

    async fn update_brand(&self, key: TargetKey, brand: Brand) -> StorageResult<()> {
        self.check_writable()?;
        if let Some(target) = self.write().targets.get_mut(&key) {
            target.brand = brand;
        }
        Ok(())
    }

    async fn update_traffic_interface(&self, key: TargetKey, if_index: u32) -> StorageResult<()> {
        self.check_writable()?;
        match self.write().targets.get_mut(&key) {
            Some(target) => {
                target.traffic_interface_index = Some(if_index);
                Ok(())
            }
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    async fn insert_telemetry(&self, rows: Vec<TelemetryRow>) -> StorageResult<()> {
        self.check_writable()?;
        self.write().telemetry.extend(rows);
        Ok(())
    }

    async fn daily_peak_traffic(
        &self,
        key: TargetKey,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<DailyPeak>> {
        let state = self.read();
        let mut peaks: BTreeMap<_, f64> = BTreeMap::new();

        for row in state
            .telemetry
            .iter()
            .filter(|row| row.target == key && row.timestamp >= since)
        {
            if let Some(peak) = row.peak_mbps() {
                let entry = peaks.entry(row.timestamp.date_naive()).or_insert(peak);
                *entry = entry.max(peak);
            }
        }

        Ok(peaks
            .into_iter()
            .map(|(day, peak_mbps)| DailyPeak { day, peak_mbps })
            .collect())
    }

    async fn list_synthetic_targets(&self) -> StorageResult<Vec<SyntheticTarget>> {
        Ok(self.read().synthetic.values().cloned().collect())
    }

    async fn add_synthetic_target(
        &self,
        name: &str,
        address: &str,
    ) -> StorageResult<SyntheticTarget> {
        self.check_writable()?;
        let target = SyntheticTarget {
            id: self.next_synthetic_id.fetch_add(1, Ordering::SeqCst) + 1,
            name: name.to_string(),
            address: address.to_string(),
            enabled: true,
        };
        self.write().synthetic.insert(target.id, target.clone());
        Ok(target)
    }

    async fn remove_synthetic_target(&self, id: TargetId) -> StorageResult<bool> {
        self.check_writable()?;
        Ok(self.write().synthetic.remove(&id).is_some())
    }

    async fn insert_latency_samples(&self, samples: Vec<LatencySample>) -> StorageResult<()> {
        self.check_writable()?;
        self.write().samples.extend(samples);
        Ok(())
    }

    async fn latency_samples_since(
        &self,
        target_id: TargetId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<LatencySample>> {
        let mut samples: Vec<_> = self
            .read()
            .samples
            .iter()
            .filter(|s| s.target_id == target_id && s.timestamp >= since)
            .cloned()
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }

    async fn upsert_baselines(&self, baselines: Vec<Baseline>) -> StorageResult<()> {
        self.check_writable()?;
        let mut state = self.write();
        for baseline in baselines {
            state
                .baselines
                .insert((baseline.metric_key.clone(), baseline.hour_of_day), baseline);
        }
        Ok(())
    }

    async fn load_baselines(&self) -> StorageResult<Vec<Baseline>> {
        Ok(self.read().baselines.values().cloned().collect())
    }

    async fn insert_insight(&self, insight: &InsightRow) -> StorageResult<()> {
        self.check_writable()?;
        let mut state = self.write();
        if state.rejected_insights.contains(&insight.target) {
            return Err(StorageError::QueryFailed(format!(
                "insight for {} rejected",
                insight.target
            )));
        }
        state.insights.push(insight.clone());
        Ok(())
    }

    async fn cleanup_history(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        self.check_writable()?;
        let mut state = self.write();
        let count = state.history.len() + state.samples.len();
        state.history.retain(|row| row.timestamp >= before);
        state.samples.retain(|s| s.timestamp >= before);
        Ok(count - state.history.len() - state.samples.len())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.read();
        Ok(HealthStatus {
            healthy: !self.fail_writes.load(Ordering::SeqCst),
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("targets".to_string(), state.targets.len().to_string()),
                ("history_rows".to_string(), state.history.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
