// Counters for where fetch interception answered from.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub cache_hits: u64,
    pub network_fetches: u64,
    pub offline_fallbacks: u64,
    pub failures: u64,
    pub served_bytes: u64,
    /// Share of handled requests answered from cache, fallbacks included.
    pub cache_hit_rate: f64,
}

pub struct StatsCollector {
    cache_hits: AtomicU64,
    network_fetches: AtomicU64,
    offline_fallbacks: AtomicU64,
    failures: AtomicU64,
    served_bytes: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            cache_hits: AtomicU64::new(0),
            network_fetches: AtomicU64::new(0),
            offline_fallbacks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            served_bytes: AtomicU64::new(0),
        }
    }

    pub fn record_cache_hit(&self, bytes: u64) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.served_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_network(&self, bytes: u64) {
        self.network_fetches.fetch_add(1, Ordering::Relaxed);
        self.served_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_fallback(&self, bytes: u64) {
        self.offline_fallbacks.fetch_add(1, Ordering::Relaxed);
        self.served_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let network_fetches = self.network_fetches.load(Ordering::Relaxed);
        let offline_fallbacks = self.offline_fallbacks.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);

        let handled = cache_hits + network_fetches + offline_fallbacks + failures;
        let cache_hit_rate = if handled > 0 {
            (cache_hits + offline_fallbacks) as f64 / handled as f64
        } else {
            0.0
        };

        StatsSnapshot {
            cache_hits,
            network_fetches,
            offline_fallbacks,
            failures,
            served_bytes: self.served_bytes.load(Ordering::Relaxed),
            cache_hit_rate,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = StatsCollector::new();
        stats.record_cache_hit(100);
        stats.record_cache_hit(50);
        stats.record_network(1000);
        stats.record_fallback(10);

        let snap = stats.snapshot();
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.network_fetches, 1);
        assert_eq!(snap.offline_fallbacks, 1);
        assert_eq!(snap.served_bytes, 1160);
        assert!((snap.cache_hit_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_empty() {
        let snap = StatsCollector::new().snapshot();
        assert_eq!(snap, StatsSnapshot::default());
    }
}
