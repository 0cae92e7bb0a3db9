//! Latency baselines, anomaly judgment and capacity forecasting
//!
//! Everything here is pure computation; the anomaly actor owns scheduling
//! and storage.

pub mod baseline;
pub mod capacity;

pub use baseline::{BaselineSet, Judge, Judgment, Method, StreakTracker, metric_key};
pub use capacity::{CapacityPolicy, capacity_insight, estimate_capacity, linear_fit};
