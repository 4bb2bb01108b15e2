//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, admissions and evictions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Metrics ==
/// Lock-free counters updated on every cache operation.
#[derive(Debug, Default)]
pub struct Metrics {
    hits: AtomicU64,
    misses: AtomicU64,
    keys_added: AtomicU64,
    keys_updated: AtomicU64,
    keys_evicted: AtomicU64,
    keys_expired: AtomicU64,
    sets_rejected: AtomicU64,
    updates_dropped: AtomicU64,
    cost_added: AtomicU64,
    cost_evicted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an admitted write; `replaced` tells an update from a new key.
    pub fn record_set(&self, cost: i64, replaced: bool) {
        if replaced {
            self.keys_updated.fetch_add(1, Ordering::Relaxed);
        } else {
            self.keys_added.fetch_add(1, Ordering::Relaxed);
        }
        self.cost_added.fetch_add(cost.max(0) as u64, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.sets_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, cost: i64) {
        self.keys_evicted.fetch_add(1, Ordering::Relaxed);
        self.cost_evicted.fetch_add(cost.max(0) as u64, Ordering::Relaxed);
    }

    pub fn record_expiration(&self) {
        self.keys_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_update(&self) {
        self.updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.keys_added,
            &self.keys_updated,
            &self.keys_evicted,
            &self.keys_expired,
            &self.sets_rejected,
            &self.updates_dropped,
            &self.cost_added,
            &self.cost_evicted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    // == Snapshot ==
    /// Captures the counters together with the current store size and cost.
    pub fn snapshot(&self, total_entries: usize, total_cost: i64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            keys_added: self.keys_added.load(Ordering::Relaxed),
            keys_updated: self.keys_updated.load(Ordering::Relaxed),
            keys_evicted: self.keys_evicted.load(Ordering::Relaxed),
            keys_expired: self.keys_expired.load(Ordering::Relaxed),
            sets_rejected: self.sets_rejected.load(Ordering::Relaxed),
            updates_dropped: self.updates_dropped.load(Ordering::Relaxed),
            cost_added: self.cost_added.load(Ordering::Relaxed),
            cost_evicted: self.cost_evicted.load(Ordering::Relaxed),
            total_entries,
            total_cost,
        }
    }
}

// == Cache Stats ==
/// Point-in-time view of the cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of new keys admitted
    pub keys_added: u64,
    /// Number of writes replacing a resident key
    pub keys_updated: u64,
    /// Number of entries evicted by the admission policy
    pub keys_evicted: u64,
    /// Number of entries removed by the expiry sweep
    pub keys_expired: u64,
    /// Number of writes refused for cost or frequency
    pub sets_rejected: u64,
    /// Number of access records lost to a full update buffer
    pub updates_dropped: u64,
    /// Total cost of admitted writes
    pub cost_added: u64,
    /// Total cost of evicted entries
    pub cost_evicted: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Current cost budget usage
    pub total_cost: i64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_starts_at_zero() {
        let metrics = Metrics::new();
        let stats = metrics.snapshot(0, 0);
        assert_eq!(stats, CacheStats::default());
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = Metrics::new().snapshot(0, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let metrics = Metrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        assert_eq!(metrics.snapshot(0, 0).hit_rate(), 0.75);
    }

    #[test]
    fn test_set_counters() {
        let metrics = Metrics::new();
        metrics.record_set(4, false);
        metrics.record_set(2, true);
        metrics.record_rejection();

        let stats = metrics.snapshot(1, 2);
        assert_eq!(stats.keys_added, 1);
        assert_eq!(stats.keys_updated, 1);
        assert_eq!(stats.cost_added, 6);
        assert_eq!(stats.sets_rejected, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_cost, 2);
    }

    #[test]
    fn test_eviction_and_expiration_counters() {
        let metrics = Metrics::new();
        metrics.record_eviction(3);
        metrics.record_eviction(2);
        metrics.record_expiration();
        metrics.record_dropped_update();

        let stats = metrics.snapshot(0, 0);
        assert_eq!(stats.keys_evicted, 2);
        assert_eq!(stats.cost_evicted, 5);
        assert_eq!(stats.keys_expired, 1);
        assert_eq!(stats.updates_dropped, 1);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_hit();
        metrics.record_eviction(1);
        metrics.reset();
        assert_eq!(metrics.snapshot(0, 0), CacheStats::default());
    }

    #[test]
    fn test_stats_serialize() {
        let metrics = Metrics::new();
        metrics.record_hit();
        let json = serde_json::to_value(metrics.snapshot(1, 1)).unwrap();
        assert_eq!(json["hits"], 1);
        assert_eq!(json["total_entries"], 1);
    }
}
