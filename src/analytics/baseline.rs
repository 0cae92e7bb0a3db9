//! Hour-of-day latency baselines and Z-score judgment

use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};

use crate::config::AnomalySettings;
use crate::{Baseline, LatencySample, TargetId};

pub fn metric_key(target_id: TargetId) -> String {
    format!("latency:{target_id}")
}

/// Mean and population standard deviation
pub fn mean_stddev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

/// One baseline per UTC hour that has samples, ordered by hour
pub fn train(metric_key: &str, samples: &[LatencySample], now: DateTime<Utc>) -> Vec<Baseline> {
    let mut buckets: [Vec<f64>; 24] = Default::default();
    for sample in samples {
        buckets[sample.timestamp.hour() as usize].push(sample.latency_ms);
    }

    buckets
        .iter()
        .enumerate()
        .filter_map(|(hour, values)| {
            let (mean, stddev) = mean_stddev(values)?;
            Some(Baseline {
                metric_key: metric_key.to_string(),
                hour_of_day: hour as u32,
                mean,
                stddev,
                sample_count: values.len() as u32,
                last_updated: now,
            })
        })
        .collect()
}

/// Read-only view of trained baselines
#[derive(Debug, Clone, Default)]
pub struct BaselineSet {
    by_bucket: HashMap<(String, u32), Baseline>,
}

impl BaselineSet {
    pub fn new(baselines: Vec<Baseline>) -> Self {
        Self {
            by_bucket: baselines
                .into_iter()
                .map(|b| ((b.metric_key.clone(), b.hour_of_day), b))
                .collect(),
        }
    }

    pub fn get(&self, metric_key: &str, hour_of_day: u32) -> Option<&Baseline> {
        self.by_bucket.get(&(metric_key.to_string(), hour_of_day))
    }

    pub fn len(&self) -> usize {
        self.by_bucket.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_bucket.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    ZScore { mean: f64, z: f64 },
    /// No sufficiently trained baseline for this hour
    ColdStart { threshold_ms: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Judgment {
    pub observed_ms: f64,
    pub method: Method,
    pub anomalous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Judge {
    pub sigma: f64,
    pub min_samples: u32,
    pub stddev_floor_ms: f64,
    pub cold_start_ms: f64,
}

impl From<&AnomalySettings> for Judge {
    fn from(settings: &AnomalySettings) -> Self {
        Self {
            sigma: settings.sigma,
            min_samples: settings.min_samples,
            stddev_floor_ms: settings.stddev_floor_ms,
            cold_start_ms: settings.cold_start_ms,
        }
    }
}

impl Judge {
    pub fn judge(&self, baseline: Option<&Baseline>, observed_ms: f64) -> Judgment {
        let method = match baseline {
            Some(b) if b.sample_count > self.min_samples => Method::ZScore {
                mean: b.mean,
                z: (observed_ms - b.mean) / b.stddev.max(self.stddev_floor_ms),
            },
            _ => Method::ColdStart {
                threshold_ms: self.cold_start_ms,
            },
        };

        let anomalous = match method {
            Method::ZScore { z, .. } => z > self.sigma,
            Method::ColdStart { threshold_ms } => observed_ms > threshold_ms,
        };

        Judgment {
            observed_ms,
            method,
            anomalous,
        }
    }
}

/// Consecutive anomalous cycles per target
#[derive(Debug, Default)]
pub struct StreakTracker {
    streaks: HashMap<TargetId, u32>,
}

impl StreakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one cycle. Returns true exactly once per streak, on the cycle
    /// the streak reaches `threshold`.
    pub fn record(&mut self, target: TargetId, anomalous: bool, threshold: u32) -> bool {
        if !anomalous {
            self.streaks.remove(&target);
            return false;
        }
        let streak = self.streaks.entry(target).or_default();
        *streak += 1;
        *streak == threshold.max(1)
    }

    pub fn streak(&self, target: TargetId) -> u32 {
        self.streaks.get(&target).copied().unwrap_or(0)
    }

    /// Drop state for targets no longer monitored
    pub fn retain(&mut self, live: impl Fn(TargetId) -> bool) {
        self.streaks.retain(|id, _| live(*id));
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn baseline(mean: f64, stddev: f64, sample_count: u32) -> Baseline {
        Baseline {
            metric_key: metric_key(1),
            hour_of_day: 14,
            mean,
            stddev,
            sample_count,
            last_updated: Utc::now(),
        }
    }

    fn judge() -> Judge {
        Judge {
            sigma: 3.0,
            min_samples: 10,
            stddev_floor_ms: 1.0,
            cold_start_ms: 150.0,
        }
    }

    #[test]
    fn test_zscore_flags_large_deviation() {
        let b = baseline(50.0, 5.0, 100);

        let high = judge().judge(Some(&b), 70.0);
        assert!(high.anomalous);
        assert_eq!(high.method, Method::ZScore { mean: 50.0, z: 4.0 });

        let mild = judge().judge(Some(&b), 55.0);
        assert!(!mild.anomalous);
    }

    #[test]
    fn test_stddev_floor_applies() {
        // a perfectly flat baseline would otherwise flag any change
        let b = baseline(20.0, 0.0, 100);
        assert!(!judge().judge(Some(&b), 22.0).anomalous);
        assert!(judge().judge(Some(&b), 24.0).anomalous);
    }

    #[test]
    fn test_cold_start_below_min_samples() {
        let b = baseline(50.0, 5.0, 10);

        let judgment = judge().judge(Some(&b), 70.0);
        assert_eq!(judgment.method, Method::ColdStart { threshold_ms: 150.0 });
        assert!(!judgment.anomalous);

        assert!(judge().judge(None, 151.0).anomalous);
    }

    #[test]
    fn test_train_buckets_by_utc_hour() {
        let at = |hour, minute| Utc.with_ymd_and_hms(2025, 3, 1, hour, minute, 0).unwrap();
        let samples: Vec<LatencySample> = [(3, 0, 10.0), (3, 30, 20.0), (4, 10, 8.0)]
            .into_iter()
            .map(|(h, m, latency_ms)| LatencySample {
                target_id: 1,
                latency_ms,
                timestamp: at(h, m),
            })
            .collect();

        let baselines = train("latency:1", &samples, at(5, 0));

        assert_eq!(baselines.len(), 2);
        assert_eq!(baselines[0].hour_of_day, 3);
        assert_eq!(baselines[0].mean, 15.0);
        assert_eq!(baselines[0].stddev, 5.0);
        assert_eq!(baselines[0].sample_count, 2);
        assert_eq!(baselines[1].hour_of_day, 4);
        assert_eq!(baselines[1].stddev, 0.0);
    }

    #[test]
    fn test_baseline_set_lookup() {
        let set = BaselineSet::new(vec![baseline(50.0, 5.0, 20)]);
        assert!(set.get("latency:1", 14).is_some());
        assert!(set.get("latency:1", 15).is_none());
        assert!(set.get("latency:2", 14).is_none());
    }

    #[test]
    fn test_streak_escalates_once() {
        let mut streaks = StreakTracker::new();

        assert!(!streaks.record(1, true, 2));
        assert!(streaks.record(1, true, 2));
        assert!(!streaks.record(1, true, 2));
        assert_eq!(streaks.streak(1), 3);

        assert!(!streaks.record(1, false, 2));
        assert_eq!(streaks.streak(1), 0);
        assert!(!streaks.record(1, true, 2));
        assert!(streaks.record(1, true, 2));
    }
}
