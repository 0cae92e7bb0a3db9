//! Link capacity trend forecasting

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::AnomalySettings;
use crate::storage::{DailyPeak, InsightRow, Severity};
use crate::{CapacityProjection, TargetKey};

pub const CAPACITY_TIERS_MBPS: [f64; 10] = [
    10.0, 20.0, 50.0, 100.0, 200.0, 300.0, 500.0, 1000.0, 2500.0, 10000.0,
];

pub const INSIGHT_KIND: &str = "capacity_trend";

/// Smallest common link speed that carries `peak_mbps`
pub fn estimate_capacity(peak_mbps: f64) -> f64 {
    CAPACITY_TIERS_MBPS
        .into_iter()
        .find(|tier| *tier >= peak_mbps)
        .unwrap_or(peak_mbps)
}

/// Least-squares line through `points`, as `(slope, intercept)`
pub fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityPolicy {
    pub min_points: usize,
    pub threshold_ratio: f64,
    pub warning_days: f64,
    pub min_peak_mbps: f64,
}

impl From<&AnomalySettings> for CapacityPolicy {
    fn from(settings: &AnomalySettings) -> Self {
        Self {
            min_points: settings.capacity_min_points,
            threshold_ratio: settings.capacity_threshold_ratio,
            warning_days: settings.capacity_warning_days,
            min_peak_mbps: settings.capacity_min_peak_mbps,
        }
    }
}

impl CapacityPolicy {
    /// Fit a trend over daily peaks. `None` without enough data or traffic.
    pub fn project(&self, target: TargetKey, peaks: &[DailyPeak]) -> Option<CapacityProjection> {
        if peaks.len() < self.min_points {
            return None;
        }

        let current_peak = peaks.iter().map(|p| p.peak_mbps).fold(f64::MIN, f64::max);
        if current_peak < self.min_peak_mbps {
            return None;
        }

        let first_day = peaks.iter().map(|p| p.day).min()?;
        let points: Vec<(f64, f64)> = peaks
            .iter()
            .map(|p| ((p.day - first_day).num_days() as f64, p.peak_mbps))
            .collect();
        let (slope, _) = linear_fit(&points)?;

        let estimated_capacity = estimate_capacity(current_peak);
        let threshold = estimated_capacity * self.threshold_ratio;

        let days_until_threshold = if current_peak >= threshold {
            Some(0.0)
        } else if slope > 0.0 {
            Some((threshold - current_peak) / slope)
        } else {
            None
        };

        Some(CapacityProjection {
            target,
            current_peak,
            estimated_capacity,
            growth_rate_per_day: slope,
            days_until_threshold,
        })
    }

    /// Critical when already past the threshold, warning when it will be
    /// reached inside the warning window
    pub fn assess(&self, projection: &CapacityProjection) -> Option<Severity> {
        let threshold = projection.estimated_capacity * self.threshold_ratio;
        if projection.current_peak >= threshold {
            return Some(Severity::Critical);
        }
        projection
            .days_until_threshold
            .filter(|days| *days <= self.warning_days)
            .map(|_| Severity::Warning)
    }
}

pub fn capacity_insight(
    name: &str,
    projection: &CapacityProjection,
    severity: Severity,
    ratio: f64,
    now: DateTime<Utc>,
) -> InsightRow {
    let percent = ratio * 100.0;
    let message = match severity {
        Severity::Critical => format!(
            "{name} is at {:.1} Mbps, already above {percent:.0}% of its estimated {:.0} Mbps capacity",
            projection.current_peak, projection.estimated_capacity
        ),
        Severity::Warning => format!(
            "{name} is growing {:.2} Mbps/day and will reach {percent:.0}% of its estimated {:.0} Mbps capacity in about {:.0} days",
            projection.growth_rate_per_day,
            projection.estimated_capacity,
            projection.days_until_threshold.unwrap_or_default()
        ),
    };

    InsightRow {
        target: projection.target,
        kind: INSIGHT_KIND.to_string(),
        severity,
        message,
        payload: json!({
            "current_peak_mbps": projection.current_peak,
            "estimated_capacity_mbps": projection.estimated_capacity,
            "growth_rate_per_day": projection.growth_rate_per_day,
            "days_until_threshold": projection.days_until_threshold,
            "threshold_ratio": ratio,
        }),
        timestamp: now,
    }
}
