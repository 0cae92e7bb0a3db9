//! SQLite storage backend implementation
//!
//! - **WAL mode**: probe batches are written while the analytics jobs read
//! - **Connection pooling**: shared by all actors
//! - **Migrations**: embedded from `migrations/` and applied on open
//!
//! Timestamps are stored as Unix milliseconds.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    DailyPeak, InsightRow, PingHistoryRow, StatusUpdate, TelemetryRow, millis_to_timestamp,
};
use crate::{
    Alert, AlertKind, Baseline, Brand, LatencySample, MonitoredTarget, SnmpCredentials,
    SyntheticTarget, TargetId, TargetKey, TargetKind, TargetThresholds,
};

const MILLIS_PER_DAY: i64 = 86_400_000;

fn table(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Device => "devices",
        TargetKind::Tower => "towers",
        TargetKind::Synthetic => "synthetic_targets",
    }
}

pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Open (or create) the database file and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Insert or replace a device/tower row, keeping its id.
    ///
    /// Target CRUD belongs to the management layer; this is the seeding path.
    #[instrument(skip(self, target), fields(key = %target.key))]
    pub async fn upsert_target(&self, target: &MonitoredTarget) -> StorageResult<()> {
        let query = match target.key.kind {
            TargetKind::Device => sqlx::query(
                r#"
                INSERT INTO devices (
                    id, name, address, parent_device_id, tower_id, brand,
                    snmp_community, snmp_port, interface_index, traffic_interface_index,
                    max_in_mbps, max_out_mbps, min_voltage, status, consecutive_failures
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name,
                    address = excluded.address,
                    parent_device_id = excluded.parent_device_id,
                    tower_id = excluded.tower_id,
                    brand = excluded.brand,
                    snmp_community = excluded.snmp_community,
                    snmp_port = excluded.snmp_port,
                    interface_index = excluded.interface_index,
                    traffic_interface_index = excluded.traffic_interface_index,
                    max_in_mbps = excluded.max_in_mbps,
                    max_out_mbps = excluded.max_out_mbps,
                    min_voltage = excluded.min_voltage,
                    status = excluded.status,
                    consecutive_failures = excluded.consecutive_failures
                "#,
            )
            .bind(target.key.id)
            .bind(&target.name)
            .bind(&target.address)
            .bind(target.parent_device_id)
            .bind(target.parent_tower_id),
            TargetKind::Tower => sqlx::query(
                r#"
                INSERT INTO towers (
                    id, name, address, parent_tower_id, brand,
                    snmp_community, snmp_port, interface_index, traffic_interface_index,
                    max_in_mbps, max_out_mbps, min_voltage, status, consecutive_failures
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name,
                    address = excluded.address,
                    parent_tower_id = excluded.parent_tower_id,
                    brand = excluded.brand,
                    snmp_community = excluded.snmp_community,
                    snmp_port = excluded.snmp_port,
                    interface_index = excluded.interface_index,
                    traffic_interface_index = excluded.traffic_interface_index,
                    max_in_mbps = excluded.max_in_mbps,
                    max_out_mbps = excluded.max_out_mbps,
                    min_voltage = excluded.min_voltage,
                    status = excluded.status,
                    consecutive_failures = excluded.consecutive_failures
                "#,
            )
            .bind(target.key.id)
            .bind(&target.name)
            .bind(&target.address)
            .bind(target.parent_tower_id),
            TargetKind::Synthetic => {
                return Err(StorageError::QueryFailed(
                    "synthetic targets are added with add_synthetic_target".to_string(),
                ));
            }
        };

        query
            .bind(target.brand.as_str())
            .bind(target.snmp.community.as_deref())
            .bind(target.snmp.port as i64)
            .bind(target.interface_index.map(i64::from))
            .bind(target.traffic_interface_index.map(i64::from))
            .bind(target.thresholds.max_in_mbps)
            .bind(target.thresholds.max_out_mbps)
            .bind(target.thresholds.min_voltage)
            .bind(target.last_known_status.as_str())
            .bind(target.consecutive_failure_count as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn target_from_row(kind: TargetKind, row: &SqliteRow) -> StorageResult<MonitoredTarget> {
        let brand: String = row.try_get("brand")?;
        let status: String = row.try_get("status")?;
        let port: i64 = row.try_get("snmp_port")?;
        let failures: i64 = row.try_get("consecutive_failures")?;

        let index = |column: &str| -> StorageResult<Option<u32>> {
            let value: Option<i64> = row.try_get(column)?;
            Ok(value.and_then(|v| u32::try_from(v).ok()))
        };

        Ok(MonitoredTarget {
            key: TargetKey {
                kind,
                id: row.try_get("id")?,
            },
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            parent_device_id: row.try_get("parent_device_id")?,
            parent_tower_id: row.try_get("parent_tower_id")?,
            brand: brand.parse().unwrap_or_default(),
            snmp: SnmpCredentials {
                community: row.try_get("snmp_community")?,
                port: u16::try_from(port).unwrap_or(161),
            },
            interface_index: index("interface_index")?,
            traffic_interface_index: index("traffic_interface_index")?,
            thresholds: TargetThresholds {
                max_in_mbps: row.try_get("max_in_mbps")?,
                max_out_mbps: row.try_get("max_out_mbps")?,
                min_voltage: row.try_get("min_voltage")?,
            },
            last_known_status: status.parse().unwrap_or_default(),
            consecutive_failure_count: u32::try_from(failures).unwrap_or(0),
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn load_targets(&self) -> StorageResult<Vec<MonitoredTarget>> {
        const COLUMNS: &str = "id, name, address, brand, snmp_community, snmp_port, \
            interface_index, traffic_interface_index, max_in_mbps, max_out_mbps, min_voltage, \
            status, consecutive_failures";

        let devices = sqlx::query(&format!(
            "SELECT {COLUMNS}, parent_device_id, tower_id AS parent_tower_id FROM devices ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let towers = sqlx::query(&format!(
            "SELECT {COLUMNS}, NULL AS parent_device_id, parent_tower_id FROM towers ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut targets = Vec::with_capacity(devices.len() + towers.len());
        for row in &towers {
            targets.push(Self::target_from_row(TargetKind::Tower, row)?);
        }
        for row in &devices {
            targets.push(Self::target_from_row(TargetKind::Device, row)?);
        }

        debug!("loaded {} targets", targets.len());
        Ok(targets)
    }

    #[instrument(skip_all, fields(updates = updates.len(), history = history.len()))]
    async fn write_probe_batch(
        &self,
        updates: Vec<StatusUpdate>,
        history: Vec<PingHistoryRow>,
    ) -> StorageResult<()> {
        if updates.is_empty() && history.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for update in &updates {
            let sql = format!(
                r#"
                UPDATE {} SET
                    status = ?,
                    consecutive_failures = ?,
                    last_latency_ms = COALESCE(?, last_latency_ms),
                    last_seen = COALESCE(?, last_seen)
                WHERE id = ?
                "#,
                table(update.key.kind)
            );

            sqlx::query(&sql)
                .bind(update.status.as_str())
                .bind(update.consecutive_failure_count as i64)
                .bind(update.last_latency_ms)
                .bind(update.last_seen.map(|t| t.timestamp_millis()))
                .bind(update.key.id)
                .execute(&mut *tx)
                .await?;
        }

        for row in &history {
            sqlx::query(
                r#"
                INSERT INTO ping_history (
                    target_kind, target_id, timestamp, is_reachable, latency_ms, packet_loss
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.key.kind.as_str())
            .bind(row.key.id)
            .bind(row.timestamp.timestamp_millis())
            .bind(row.is_reachable)
            .bind(row.latency_ms)
            .bind(row.packet_loss)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("probe batch written");
        Ok(())
    }

    #[instrument(skip(self, alert), fields(kind = %alert.kind, suppressed = alert.suppressed))]
    async fn insert_alert(&self, alert: &Alert) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (device_kind, device_name, address, kind, message, timestamp, suppressed)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(alert.device_kind.as_str())
        .bind(&alert.device_name)
        .bind(&alert.address)
        .bind(alert.kind.as_str())
        .bind(&alert.message)
        .bind(alert.timestamp.timestamp_millis())
        .bind(alert.suppressed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_alerts(&self, limit: usize) -> StorageResult<Vec<Alert>> {
        let rows = sqlx::query(
            r#"
            SELECT device_kind, device_name, address, kind, message, timestamp, suppressed
            FROM alerts
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let device_kind: String = row.try_get("device_kind")?;
                let kind: String = row.try_get("kind")?;
                Ok(Alert {
                    device_kind: TargetKind::from_name(&device_kind).ok_or_else(|| {
                        StorageError::SerializationError(format!("device kind {device_kind:?}"))
                    })?,
                    device_name: row.try_get("device_name")?,
                    address: row.try_get("address")?,
                    kind: AlertKind::from_name(&kind).ok_or_else(|| {
                        StorageError::SerializationError(format!("alert kind {kind:?}"))
                    })?,
                    message: row.try_get("message")?,
                    timestamp: millis_to_timestamp(row.try_get("timestamp")?),
                    suppressed: row.try_get("suppressed")?,
                })
            })
            .collect()
    }

    async fn load_settings(&self) -> StorageResult<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().collect())
    }

    #[instrument(skip_all, fields(count = pairs.len()))]
    async fn save_settings(&self, pairs: &[(String, String)]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in pairs {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value) VALUES (?, ?)
                ON CONFLICT (key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_brand(&self, key: TargetKey, brand: Brand) -> StorageResult<()> {
        sqlx::query(&format!("UPDATE {} SET brand = ? WHERE id = ?", table(key.kind)))
            .bind(brand.as_str())
            .bind(key.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_traffic_interface(&self, key: TargetKey, if_index: u32) -> StorageResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET traffic_interface_index = ? WHERE id = ?",
            table(key.kind)
        ))
        .bind(i64::from(if_index))
        .bind(key.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(count = rows.len()))]
    async fn insert_telemetry(&self, rows: Vec<TelemetryRow>) -> StorageResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO telemetry (
                    target_kind, target_id, timestamp, in_mbps, out_mbps, signal_dbm,
                    link_quality, snr_db, clients, cpu_pct, memory_pct, disk_pct,
                    temperature_c, voltage_v
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(row.target.kind.as_str())
            .bind(row.target.id)
            .bind(row.timestamp.timestamp_millis())
            .bind(row.in_mbps)
            .bind(row.out_mbps)
            .bind(row.signal_dbm)
            .bind(row.link_quality)
            .bind(row.snr_db)
            .bind(row.clients.map(i64::from))
            .bind(row.cpu_pct)
            .bind(row.memory_pct)
            .bind(row.disk_pct)
            .bind(row.temperature_c)
            .bind(row.voltage_v)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn daily_peak_traffic(
        &self,
        key: TargetKey,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<DailyPeak>> {
        let rows: Vec<(i64, f64)> = sqlx::query_as(
            r#"
            SELECT timestamp / ? AS day,
                   MAX(MAX(COALESCE(in_mbps, 0), COALESCE(out_mbps, 0))) AS peak
            FROM telemetry
            WHERE target_kind = ? AND target_id = ? AND timestamp >= ?
              AND (in_mbps IS NOT NULL OR out_mbps IS NOT NULL)
            GROUP BY day
            ORDER BY day ASC
            "#,
        )
        .bind(MILLIS_PER_DAY)
        .bind(key.kind.as_str())
        .bind(key.id)
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(day, peak_mbps)| {
                DateTime::from_timestamp(day * 86_400, 0).map(|d| DailyPeak {
                    day: d.date_naive(),
                    peak_mbps,
                })
            })
            .collect())
    }

    async fn list_synthetic_targets(&self) -> StorageResult<Vec<SyntheticTarget>> {
        let rows: Vec<(i64, String, String, bool)> =
            sqlx::query_as("SELECT id, name, address, enabled FROM synthetic_targets ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, address, enabled)| SyntheticTarget {
                id,
                name,
                address,
                enabled,
            })
            .collect())
    }

    async fn add_synthetic_target(
        &self,
        name: &str,
        address: &str,
    ) -> StorageResult<SyntheticTarget> {
        let result =
            sqlx::query("INSERT INTO synthetic_targets (name, address, enabled) VALUES (?, ?, 1)")
                .bind(name)
                .bind(address)
                .execute(&self.pool)
                .await?;

        Ok(SyntheticTarget {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            address: address.to_string(),
            enabled: true,
        })
    }

    async fn remove_synthetic_target(&self, id: TargetId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM synthetic_targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(count = samples.len()))]
    async fn insert_latency_samples(&self, samples: Vec<LatencySample>) -> StorageResult<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for sample in &samples {
            sqlx::query(
                "INSERT INTO latency_samples (target_id, latency_ms, timestamp) VALUES (?, ?, ?)",
            )
            .bind(sample.target_id)
            .bind(sample.latency_ms)
            .bind(sample.timestamp.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn latency_samples_since(
        &self,
        target_id: TargetId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<LatencySample>> {
        let rows: Vec<(f64, i64)> = sqlx::query_as(
            r#"
            SELECT latency_ms, timestamp FROM latency_samples
            WHERE target_id = ? AND timestamp >= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(target_id)
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(latency_ms, timestamp)| LatencySample {
                target_id,
                latency_ms,
                timestamp: millis_to_timestamp(timestamp),
            })
            .collect())
    }

    #[instrument(skip_all, fields(count = baselines.len()))]
    async fn upsert_baselines(&self, baselines: Vec<Baseline>) -> StorageResult<()> {
        if baselines.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for baseline in &baselines {
            sqlx::query(
                r#"
                INSERT INTO baselines (metric_key, hour_of_day, mean, stddev, sample_count, last_updated)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (metric_key, hour_of_day) DO UPDATE SET
                    mean = excluded.mean,
                    stddev = excluded.stddev,
                    sample_count = excluded.sample_count,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(&baseline.metric_key)
            .bind(i64::from(baseline.hour_of_day))
            .bind(baseline.mean)
            .bind(baseline.stddev)
            .bind(i64::from(baseline.sample_count))
            .bind(baseline.last_updated.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_baselines(&self) -> StorageResult<Vec<Baseline>> {
        let rows: Vec<(String, i64, f64, f64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT metric_key, hour_of_day, mean, stddev, sample_count, last_updated
            FROM baselines
            ORDER BY metric_key, hour_of_day
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(metric_key, hour, mean, stddev, count, updated)| Baseline {
                    metric_key,
                    hour_of_day: u32::try_from(hour).unwrap_or(0),
                    mean,
                    stddev,
                    sample_count: u32::try_from(count).unwrap_or(0),
                    last_updated: millis_to_timestamp(updated),
                },
            )
            .collect())
    }

    #[instrument(skip(self, insight), fields(target = %insight.target, severity = insight.severity.as_str()))]
    async fn insert_insight(&self, insight: &InsightRow) -> StorageResult<()> {
        let payload = serde_json::to_string(&insight.payload)?;

        sqlx::query(
            r#"
            INSERT INTO insights (target_kind, target_id, kind, severity, message, payload, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(insight.target.kind.as_str())
        .bind(insight.target.id)
        .bind(&insight.kind)
        .bind(insight.severity.as_str())
        .bind(&insight.message)
        .bind(payload)
        .bind(insight.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(before = %before))]
    async fn cleanup_history(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let before_millis = before.timestamp_millis();

        let pings = sqlx::query("DELETE FROM ping_history WHERE timestamp < ?")
            .bind(before_millis)
            .execute(&self.pool)
            .await?;

        let samples = sqlx::query("DELETE FROM latency_samples WHERE timestamp < ?")
            .bind(before_millis)
            .execute(&self.pool)
            .await?;

        let deleted = (pings.rows_affected() + samples.rows_affected()) as usize;
        info!("deleted {} old history rows", deleted);

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let metadata = HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]);

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
