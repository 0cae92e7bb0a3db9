//! Configuration
//!
//! Two layers:
//!
//! - [`Config`]: the bootstrap JSON file (storage backend, optional settings overrides)
//! - [`Settings`]: runtime key/value parameters, refreshed periodically from the store
//!
//! Effective settings are built as documented defaults, overlaid by the file's
//! `settings` map, overlaid by the store's key/value table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{trace, warn};

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        /// Retention period in days for probe and latency history
        #[serde(default = "default_retention_days")]
        retention_days: u32,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./linkwatch.db")
}

fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Setting overrides applied on top of the documented defaults
    #[serde(default)]
    pub settings: HashMap<String, serde_json::Value>,
}

impl Config {
    /// File overrides flattened to the string form used by the key/value store
    pub fn setting_pairs(&self) -> HashMap<String, String> {
        self.settings
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

/// Smallest allowed probe cadence
pub const MIN_PING_INTERVAL_SECS: u64 = 5;

/// Liveness probe parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PingSettings {
    pub interval_secs: u64,
    pub timeout_ms: u64,
    pub count: u32,
    pub spacing_ms: u64,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub cycle_timeout_secs: u64,
    pub down_count: u32,
}

impl PingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

/// SNMP collector parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SnmpSettings {
    pub interval_secs: u64,
    pub concurrency: usize,
    pub timeout_ms: u64,
    pub cycle_timeout_secs: u64,
    pub default_community: String,
    pub discovery_window_secs: u64,
    pub alert_cooldown_hours: u64,
}

impl SnmpSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_secs(self.discovery_window_secs)
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(self.alert_cooldown_hours as i64)
    }
}

/// Alert message templates and notification channel destinations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertSettings {
    pub template_down: Option<String>,
    pub template_up: Option<String>,
    pub discord: Option<DiscordChannel>,
    pub webhook: Option<WebhookChannel>,
    pub telegram: Option<TelegramChannel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscordChannel {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookChannel {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramChannel {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
}

/// Baseline training, live judgment and capacity trend parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalySettings {
    pub loop_enabled: bool,
    pub check_interval_secs: u64,
    pub sigma: f64,
    pub min_samples: u32,
    pub stddev_floor_ms: f64,
    pub cold_start_ms: f64,
    pub streak_cycles: u32,
    pub training_hours: u64,
    pub window_days: i64,
    pub capacity_interval_hours: u64,
    pub capacity_window_days: i64,
    pub capacity_min_points: usize,
    pub capacity_threshold_ratio: f64,
    pub capacity_warning_days: f64,
    pub capacity_min_peak_mbps: f64,
}

/// Effective runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ping: PingSettings,
    pub snmp: SnmpSettings,
    pub alerts: AlertSettings,
    pub anomaly: AnomalySettings,
    pub registry_reload_secs: u64,
    pub history_retention_days: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_pairs(&HashMap::new())
    }
}

impl Settings {
    /// Build settings from key/value pairs; absent or malformed keys take their default
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Self {
        let kv = KeyValues(pairs);

        let ping = PingSettings {
            interval_secs: kv
                .get("ping_interval_seconds", 30u64)
                .max(MIN_PING_INTERVAL_SECS),
            timeout_ms: kv.get("ping_timeout_ms", 1000u64).max(1),
            count: kv.get("ping_count", 3u32).max(1),
            spacing_ms: kv.get("ping_spacing_ms", 100u64),
            batch_size: kv.get("ping_batch_size", 10usize).max(1),
            max_concurrent_batches: kv.get("ping_max_concurrent_batches", 5usize).max(1),
            cycle_timeout_secs: kv.get("ping_cycle_timeout_seconds", 60u64).max(1),
            down_count: kv.get("down_count", 3u32).max(1),
        };

        let snmp = SnmpSettings {
            interval_secs: kv.get("snmp_interval_seconds", 10u64).max(1),
            concurrency: kv.get("snmp_concurrency", 25usize).max(1),
            timeout_ms: kv.get("snmp_timeout_ms", 2000u64).max(1),
            cycle_timeout_secs: kv.get("snmp_cycle_timeout_seconds", 25u64).max(1),
            default_community: kv
                .text("snmp_default_community")
                .unwrap_or_else(|| "public".to_string()),
            discovery_window_secs: kv.get("interface_discovery_window_seconds", 3u64),
            alert_cooldown_hours: kv.get("alert_cooldown_hours", 6u64),
        };

        let discord = kv
            .flag("discord_enabled")
            .then(|| kv.text("discord_webhook_url"))
            .flatten()
            .map(|url| DiscordChannel {
                url,
                user_id: kv.text("discord_user_id"),
            });

        let webhook = kv
            .flag("webhook_enabled")
            .then(|| kv.text("webhook_url"))
            .flatten()
            .map(|url| WebhookChannel { url });

        let telegram = if kv.flag("telegram_enabled") {
            match (kv.text("telegram_bot_token"), kv.text("telegram_chat_id")) {
                (Some(bot_token), Some(chat_id)) => Some(TelegramChannel {
                    api_base: kv
                        .text("telegram_api_base")
                        .unwrap_or_else(|| "https://api.telegram.org".to_string()),
                    bot_token,
                    chat_id,
                }),
                _ => {
                    warn!("telegram enabled but bot token or chat id missing, channel disabled");
                    None
                }
            }
        } else {
            None
        };

        let alerts = AlertSettings {
            template_down: kv.text("alert_template_down"),
            template_up: kv.text("alert_template_up"),
            discord,
            webhook,
            telegram,
        };

        let anomaly = AnomalySettings {
            loop_enabled: kv.flag_or("anomaly_loop_enabled", true),
            check_interval_secs: kv.get("anomaly_check_interval_seconds", 60u64).max(1),
            sigma: kv.get("anomaly_sigma", 3.0f64),
            min_samples: kv.get("anomaly_min_samples", 10u32),
            stddev_floor_ms: kv.get("anomaly_stddev_floor_ms", 1.0f64),
            cold_start_ms: kv.get("anomaly_cold_start_ms", 150.0f64),
            streak_cycles: kv.get("anomaly_streak_cycles", 2u32).max(1),
            training_hours: kv.get("baseline_training_hours", 6u64).max(1),
            window_days: kv.get("baseline_window_days", 14i64).max(1),
            capacity_interval_hours: kv.get("capacity_interval_hours", 168u64).max(1),
            capacity_window_days: kv.get("capacity_window_days", 30i64).max(1),
            capacity_min_points: kv.get("capacity_min_points", 7usize).max(2),
            capacity_threshold_ratio: kv.get("capacity_threshold_ratio", 0.9f64),
            capacity_warning_days: kv.get("capacity_warning_days", 60.0f64),
            capacity_min_peak_mbps: kv.get("capacity_min_peak_mbps", 1.0f64),
        };

        Self {
            ping,
            snmp,
            alerts,
            anomaly,
            registry_reload_secs: kv.get("registry_reload_seconds", 60u64).max(1),
            history_retention_days: kv.get("history_retention_days", 30u32),
        }
    }

    /// Merge layers, later layers win
    pub fn from_layers(layers: &[&HashMap<String, String>]) -> Self {
        let mut merged = HashMap::new();
        for layer in layers {
            merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Self::from_pairs(&merged)
    }

    pub fn registry_reload(&self) -> Duration {
        Duration::from_secs(self.registry_reload_secs)
    }
}

struct KeyValues<'a>(&'a HashMap<String, String>);

impl KeyValues<'_> {
    fn get<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + Copy,
    {
        let Some(raw) = self.0.get(key) else {
            return default;
        };

        raw.trim().parse().unwrap_or_else(|_| {
            warn!("invalid value {raw:?} for setting {key}, using default");
            default
        })
    }

    fn flag_or(&self, key: &str, default: bool) -> bool {
        let Some(raw) = self.0.get(key) else {
            return default;
        };

        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                warn!("invalid flag {raw:?} for setting {key}, using default");
                default
            }
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.flag_or(key, false)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.0
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.ping.interval_secs, 30);
        assert_eq!(settings.ping.down_count, 3);
        assert_eq!(settings.ping.batch_size, 10);
        assert_eq!(settings.ping.max_concurrent_batches, 5);
        assert_eq!(settings.snmp.concurrency, 25);
        assert_eq!(settings.snmp.default_community, "public");
        assert_eq!(settings.anomaly.sigma, 3.0);
        assert_eq!(settings.anomaly.streak_cycles, 2);
        assert!(settings.alerts.discord.is_none());
        assert!(settings.alerts.webhook.is_none());
    }

    #[test]
    fn test_ping_interval_clamped_to_minimum() {
        let settings = Settings::from_pairs(&pairs(&[("ping_interval_seconds", "1")]));
        assert_eq!(settings.ping.interval_secs, MIN_PING_INTERVAL_SECS);
    }

    #[test]
    fn test_invalid_value_falls_back_to_default() {
        let settings = Settings::from_pairs(&pairs(&[("down_count", "many")]));
        assert_eq!(settings.ping.down_count, 3);
    }

    #[test]
    fn test_channel_requires_flag_and_destination() {
        let settings = Settings::from_pairs(&pairs(&[("discord_webhook_url", "http://x")]));
        assert!(settings.alerts.discord.is_none());

        let settings = Settings::from_pairs(&pairs(&[
            ("discord_enabled", "1"),
            ("discord_webhook_url", "http://x"),
            ("webhook_enabled", "true"),
        ]));
        assert_eq!(
            settings.alerts.discord,
            Some(DiscordChannel {
                url: "http://x".to_string(),
                user_id: None
            })
        );
        // enabled but no url
        assert!(settings.alerts.webhook.is_none());
    }

    #[test]
    fn test_telegram_needs_token_and_chat() {
        let settings = Settings::from_pairs(&pairs(&[
            ("telegram_enabled", "true"),
            ("telegram_bot_token", "abc"),
        ]));
        assert!(settings.alerts.telegram.is_none());

        let settings = Settings::from_pairs(&pairs(&[
            ("telegram_enabled", "true"),
            ("telegram_bot_token", "abc"),
            ("telegram_chat_id", "-100"),
        ]));
        let telegram = settings.alerts.telegram.unwrap();
        assert_eq!(telegram.api_base, "https://api.telegram.org");
        assert_eq!(telegram.chat_id, "-100");
    }

    #[test]
    fn test_layers_later_wins() {
        let file = pairs(&[("down_count", "5"), ("ping_count", "4")]);
        let store = pairs(&[("down_count", "2")]);
        let settings = Settings::from_layers(&[&file, &store]);
        assert_eq!(settings.ping.down_count, 2);
        assert_eq!(settings.ping.count, 4);
    }

    #[test]
    fn test_config_file_settings_flattened() {
        let config: Config = serde_json::from_str(
            r#"{
                "storage": { "backend": "none" },
                "settings": { "down_count": 4, "discord_enabled": true, "snmp_default_community": "private" }
            }"#,
        )
        .unwrap();

        let pairs = config.setting_pairs();
        assert_eq!(pairs.get("down_count").map(String::as_str), Some("4"));
        assert_eq!(pairs.get("discord_enabled").map(String::as_str), Some("true"));
        assert_eq!(
            pairs.get("snmp_default_community").map(String::as_str),
            Some("private")
        );
        assert!(matches!(config.storage, Some(StorageConfig::None)));
    }
}
