//! Admission & Eviction Policy Module
//!
//! TinyLFU-style admission over a sampled victim set.
//!
//! When a write pushes the cost budget over its ceiling the policy flushes
//! pending access records into the sketch, samples resident entries and
//! compares the incoming key's estimated frequency with the coldest sample:
//!
//! ```text
//!   incoming > victim  -> evict victim, re-check budget
//!   incoming <= victim -> reject incoming (ties keep the resident)
//!   empty sample       -> admit without eviction
//! ```

use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::buffer::{UpdateDrain, UpdateKind};
use crate::cache::shard::ShardStore;
use crate::cache::sketch::FrequencySketch;
use crate::cache::CacheEntry;

// == Cost Budget ==
/// Process-wide tally of admitted cost.
///
/// Writers reserve their cost before the admission decision and release it
/// again if rejected, so concurrent writers all see each other's claims.
#[derive(Debug)]
pub struct CostBudget {
    used: AtomicI64,
    max: i64,
}

impl CostBudget {
    pub fn new(max: i64) -> Self {
        Self {
            used: AtomicI64::new(0),
            max,
        }
    }

    /// Claims `cost`, returning the new total.
    pub fn reserve(&self, cost: i64) -> i64 {
        self.used.fetch_add(cost, Ordering::AcqRel) + cost
    }

    pub fn release(&self, cost: i64) {
        self.used.fetch_sub(cost, Ordering::AcqRel);
    }

    pub fn used(&self) -> i64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn is_over(&self) -> bool {
        self.used() > self.max
    }
}

// == Admission ==
/// How the budget overflow should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    /// New key: must out-rank the coldest sampled victim
    Compete,
    /// Already resident key: victims are evicted unconditionally
    Update,
}

/// Outcome of an admission round.
#[derive(Debug)]
pub enum Admission<V> {
    Admit { evicted: Vec<CacheEntry<V>> },
    Reject { evicted: Vec<CacheEntry<V>> },
}

impl<V> Admission<V> {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit { .. })
    }

    pub fn into_evicted(self) -> Vec<CacheEntry<V>> {
        match self {
            Admission::Admit { evicted } | Admission::Reject { evicted } => evicted,
        }
    }
}

/// Summary of one flush pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    pub hits: usize,
    pub sets: usize,
    pub cost: i64,
}

impl FlushSummary {
    pub fn total(&self) -> usize {
        self.hits + self.sets
    }
}

struct PolicyState {
    sketch: FrequencySketch,
    drain: UpdateDrain,
}

impl PolicyState {
    fn flush(&mut self) -> FlushSummary {
        let sketch = &mut self.sketch;
        let mut summary = FlushSummary::default();
        self.drain.drain(|record| {
            sketch.increment(record.key_hash);
            match record.kind {
                UpdateKind::Hit => summary.hits += 1,
                UpdateKind::Set => {
                    summary.sets += 1;
                    summary.cost += record.cost;
                }
            }
        });
        summary
    }
}

// == Policy ==
/// Frequency sketch plus the single-flusher lock around it.
pub struct Policy {
    state: Mutex<PolicyState>,
    sample_size: usize,
}

impl Policy {
    // == Constructor ==
    pub fn new(num_counters: usize, sample_size: usize, drain: UpdateDrain) -> Self {
        Self {
            state: Mutex::new(PolicyState {
                sketch: FrequencySketch::new(num_counters),
                drain,
            }),
            sample_size: sample_size.max(1),
        }
    }

    // == Flush ==
    /// Applies every buffered record to the sketch, waiting for a concurrent flush.
    pub fn flush(&self) -> FlushSummary {
        self.state.lock().flush()
    }

    /// Like `flush`, but gives up immediately if another flush is running.
    pub fn try_flush(&self) -> Option<FlushSummary> {
        self.state.try_lock().map(|mut state| state.flush())
    }

    /// Drops buffered records unapplied.
    pub fn discard_pending(&self) -> usize {
        self.state.lock().drain.drain(|_| {})
    }

    /// Discards buffered records and zeroes the sketch.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.drain.drain(|_| {});
        state.sketch.clear();
    }

    /// Estimated recent frequency of `key_hash`.
    #[allow(dead_code)]
    pub fn estimate(&self, key_hash: u64) -> u8 {
        self.state.lock().sketch.estimate(key_hash)
    }

    /// Holds the flush lock until the guard drops.
    #[cfg(test)]
    pub(crate) fn block_flushes(&self) -> impl Sized + '_ {
        self.state.lock()
    }

    // == Make Room ==
    /// Brings `budget` back under its ceiling on behalf of an incoming entry
    /// whose cost is already reserved.
    ///
    /// On rejection the incoming reservation is released. Victims removed
    /// before a rejection stay removed and are returned either way; their
    /// costs are already released.
    pub fn make_room<V>(
        &self,
        key_hash: u64,
        key: &[u8],
        cost: i64,
        mode: AdmissionMode,
        store: &ShardStore<V>,
        budget: &CostBudget,
    ) -> Admission<V> {
        let mut state = self.state.lock();
        state.flush();

        let incoming = state.sketch.estimate(key_hash);
        let mut evicted = Vec::new();

        while budget.is_over() {
            let candidates = store.sample(self.sample_size, key_hash, key);
            let Some((victim, victim_freq)) = candidates
                .into_iter()
                .map(|c| {
                    let freq = state.sketch.estimate(c.key_hash);
                    (c, freq)
                })
                .min_by_key(|(_, freq)| *freq)
            else {
                debug!(key_hash, "eviction sample empty, admitting without eviction");
                break;
            };

            if mode == AdmissionMode::Compete && incoming <= victim_freq {
                trace!(key_hash, incoming, victim_freq, "admission rejected");
                budget.release(cost);
                return Admission::Reject { evicted };
            }

            if let Some(entry) = store.remove(victim.key_hash, &victim.key) {
                trace!(
                    victim = victim.key_hash,
                    victim_freq,
                    cost = entry.cost,
                    "evicting sampled victim"
                );
                budget.release(entry.cost);
                evicted.push(entry);
            }
        }

        Admission::Admit { evicted }
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("sample_size", &self.sample_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::buffer::UpdateBuffer;
    use crate::cache::shard::key_hash;
    use std::time::Duration;

    struct Fixture {
        buffer: UpdateBuffer,
        policy: Policy,
        store: ShardStore<u32>,
        budget: CostBudget,
    }

    fn fixture(max_cost: i64) -> Fixture {
        let (buffer, drain) = UpdateBuffer::new(4096);
        Fixture {
            buffer,
            policy: Policy::new(10_000, 5, drain),
            store: ShardStore::new(4),
            budget: CostBudget::new(max_cost),
        }
    }

    impl Fixture {
        fn insert(&self, key: &str, cost: i64) {
            let hash = key_hash(key.as_bytes());
            self.budget.reserve(cost);
            self.store
                .put(hash, CacheEntry::new(key.as_bytes(), 0, cost, Duration::ZERO));
            self.buffer.record_set(hash, cost);
        }

        fn admit(&self, key: &str, cost: i64, mode: AdmissionMode) -> Admission<u32> {
            let hash = key_hash(key.as_bytes());
            self.budget.reserve(cost);
            self.policy
                .make_room(hash, key.as_bytes(), cost, mode, &self.store, &self.budget)
        }
    }

    #[test]
    fn test_budget_reserve_and_release() {
        let budget = CostBudget::new(10);
        assert_eq!(budget.reserve(7), 7);
        assert!(!budget.is_over());
        assert_eq!(budget.reserve(4), 11);
        assert!(budget.is_over());
        budget.release(4);
        assert_eq!(budget.used(), 7);
        assert_eq!(budget.max(), 10);
    }

    #[test]
    fn test_flush_applies_records_to_sketch() {
        let f = fixture(10);
        let hash = key_hash(b"hot");
        for _ in 0..3 {
            f.buffer.record_hit(hash);
        }
        f.buffer.record_set(hash, 2);

        let summary = f.policy.flush();
        assert_eq!(summary.hits, 3);
        assert_eq!(summary.sets, 1);
        assert_eq!(summary.cost, 2);
        assert_eq!(summary.total(), 4);
        assert_eq!(f.policy.estimate(hash), 4);
    }

    #[test]
    fn test_frequent_newcomer_evicts_victim() {
        let f = fixture(10);
        for i in 0..10 {
            f.insert(&format!("key{}", i), 1);
        }
        for _ in 0..10 {
            f.buffer.record_hit(key_hash(b"newcomer"));
        }

        let admission = f.admit("newcomer", 1, AdmissionMode::Compete);
        assert!(admission.is_admitted());
        assert_eq!(admission.into_evicted().len(), 1);
        assert_eq!(f.budget.used(), 10);
        assert_eq!(f.store.len(), 9);
    }

    #[test]
    fn test_cold_newcomer_is_rejected() {
        let f = fixture(10);
        for i in 0..10 {
            f.insert(&format!("key{}", i), 1);
        }

        let admission = f.admit("cold", 1, AdmissionMode::Compete);
        assert!(!admission.is_admitted());
        assert!(admission.into_evicted().is_empty());
        assert_eq!(f.budget.used(), 10);
        assert_eq!(f.store.len(), 10);
    }

    #[test]
    fn test_equal_frequency_is_rejected() {
        let f = fixture(1);
        f.insert("resident", 1);
        f.buffer.record_hit(key_hash(b"challenger"));

        // Both sit at frequency 1 after the flush
        let admission = f.admit("challenger", 1, AdmissionMode::Compete);
        assert!(!admission.is_admitted());
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn test_update_mode_evicts_regardless_of_frequency() {
        let f = fixture(3);
        f.insert("a", 1);
        f.insert("b", 1);
        for _ in 0..10 {
            f.buffer.record_hit(key_hash(b"a"));
            f.buffer.record_hit(key_hash(b"b"));
        }

        let admission = f.admit("c", 2, AdmissionMode::Update);
        assert!(admission.is_admitted());
        assert_eq!(admission.into_evicted().len(), 1);
        assert_eq!(f.budget.used(), 3);
    }

    #[test]
    fn test_empty_sample_admits() {
        let f = fixture(5);
        let admission = f.admit("big", 5, AdmissionMode::Compete);
        assert!(admission.is_admitted());

        // Over budget with nothing resident to evict
        f.budget.reserve(1);
        let admission = f.admit("next", 1, AdmissionMode::Compete);
        assert!(admission.is_admitted());
    }

    #[test]
    fn test_reset_forgets_frequencies() {
        let f = fixture(5);
        let hash = key_hash(b"k");
        f.buffer.record_hit(hash);
        f.policy.flush();
        f.buffer.record_hit(hash);

        f.policy.reset();
        assert_eq!(f.policy.estimate(hash), 0);
        assert_eq!(f.policy.flush().total(), 0);
    }
}
