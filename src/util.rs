use std::time::Duration;

const LINKWATCH_CONFIG: &str = "LINKWATCH_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./linkwatch.json";

pub fn get_config_path() -> String {
    std::env::var(LINKWATCH_CONFIG).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const LINKWATCH_DB: &str = "LINKWATCH_DB";

/// Database path override, takes precedence over the config file
pub fn get_db_path() -> Option<String> {
    std::env::var(LINKWATCH_DB).ok().filter(|v| !v.is_empty())
}

/// Remaining sleep to hold a fixed cadence, never shorter than half a second
pub fn cadence_sleep(interval: Duration, elapsed: Duration) -> Duration {
    const MIN_SLEEP: Duration = Duration::from_millis(500);
    interval.saturating_sub(elapsed).max(MIN_SLEEP)
}
