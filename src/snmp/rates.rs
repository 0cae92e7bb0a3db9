use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::TargetKey;

/// Which counter pair a sample was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterWidth {
    /// ifInOctets / ifOutOctets
    Bits32,
    /// ifHCInOctets / ifHCOutOctets
    #[default]
    Bits64,
}

/// One reading of an interface's octet counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSample {
    pub if_index: u32,
    pub width: CounterWidth,
    pub in_octets: u64,
    pub out_octets: u64,
    pub sampled_at: DateTime<Utc>,
}

/// Inbound/outbound throughput between two samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate {
    pub in_mbps: f64,
    pub out_mbps: f64,
}

/// Octets counted between two readings. A lower second reading means the
/// counter wrapped or the device rebooted; that interval counts as zero.
pub fn octet_delta(previous: u64, current: u64) -> u64 {
    current.saturating_sub(previous)
}

pub fn rate_mbps(delta_octets: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    (delta_octets as f64 * 8.0) / (elapsed_secs * 1_000_000.0)
}

/// Rate between two samples of the same interface
pub fn compute_rate(previous: &CounterSample, current: &CounterSample) -> Rate {
    let elapsed = (current.sampled_at - previous.sampled_at).num_milliseconds() as f64 / 1000.0;
    Rate {
        in_mbps: rate_mbps(octet_delta(previous.in_octets, current.in_octets), elapsed),
        out_mbps: rate_mbps(octet_delta(previous.out_octets, current.out_octets), elapsed),
    }
}

/// Rate between two samples, `None` when they come from counters of
/// different widths and cannot be compared
pub fn rate_between(previous: &CounterSample, current: &CounterSample) -> Option<Rate> {
    (previous.width == current.width).then(|| compute_rate(previous, current))
}

/// Last counter sample per (target, interface). Owned by the telemetry collector.
#[derive(Debug, Default)]
pub struct CounterCache {
    samples: HashMap<(TargetKey, u32), CounterSample>,
}

impl CounterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `sample` and return the rate against the previous one. A
    /// switch between 32 and 64-bit counters only re-seeds the cache.
    pub fn observe(&mut self, target: TargetKey, sample: CounterSample) -> Option<Rate> {
        self.samples
            .insert((target, sample.if_index), sample)
            .and_then(|previous| rate_between(&previous, &sample))
    }

    pub fn forget(&mut self, target: TargetKey) {
        self.samples.retain(|(key, _), _| *key != target);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn sample(in_octets: u64, out_octets: u64, at: DateTime<Utc>) -> CounterSample {
        CounterSample {
            if_index: 1,
            width: CounterWidth::Bits64,
            in_octets,
            out_octets,
            sampled_at: at,
        }
    }

    #[test]
    fn test_rate_from_delta() {
        // 12.5 MB in 10s is 10 Mbps
        assert_eq!(rate_mbps(12_500_000, 10.0), 10.0);
        assert_eq!(rate_mbps(12_500_000, 0.0), 0.0);
    }

    #[test]
    fn test_rollover_clamps_to_zero() {
        assert_eq!(octet_delta(4_294_967_000, 100), 0);

        let t0 = Utc::now();
        let rate = compute_rate(
            &sample(4_294_967_000, 10, t0),
            &sample(100, 1_250_010, t0 + Duration::seconds(1)),
        );
        assert_eq!(rate.in_mbps, 0.0);
        assert_eq!(rate.out_mbps, 10.0);
    }

    #[test]
    fn test_cache_needs_two_samples() {
        let mut cache = CounterCache::new();
        let t0 = Utc::now();
        let device = TargetKey::device(7);

        assert_eq!(cache.observe(device, sample(0, 0, t0)), None);

        let rate = cache
            .observe(device, sample(2_500_000, 1_250_000, t0 + Duration::seconds(10)))
            .unwrap();
        assert_eq!(rate.in_mbps, 2.0);
        assert_eq!(rate.out_mbps, 1.0);

        // a tower with the same id is a different key
        assert_eq!(cache.observe(TargetKey::tower(7), sample(0, 0, t0)), None);
        assert_eq!(cache.len(), 2);

        cache.forget(device);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_counter_width_switch_reseeds() {
        let mut cache = CounterCache::new();
        let t0 = Utc::now();
        let device = TargetKey::device(9);

        let wide = sample(9_000_000_000, 9_000_000_000, t0);
        let narrow = CounterSample {
            width: CounterWidth::Bits32,
            ..sample(1_000, 1_000, t0 + Duration::seconds(10))
        };

        assert_eq!(cache.observe(device, wide), None);
        // diffing 32-bit against 64-bit readings would be garbage
        assert_eq!(cache.observe(device, narrow), None);

        let next = CounterSample {
            width: CounterWidth::Bits32,
            ..sample(2_501_000, 1_251_000, t0 + Duration::seconds(20))
        };
        let rate = cache.observe(device, next).unwrap();
        assert_eq!(rate.in_mbps, 2.0);
        assert_eq!(rate.out_mbps, 1.0);
    }
}
