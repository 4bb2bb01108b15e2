//! Cache Facade Module
//!
//! Public `get`/`set`/`del`/`close` surface tying together the shard store,
//! update buffer, admission policy and expiration index, and owning the
//! background maintenance task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cache::buffer::UpdateBuffer;
use crate::cache::entry::current_timestamp_ms;
use crate::cache::expiry::ExpirationIndex;
use crate::cache::policy::{AdmissionMode, CostBudget, Policy};
use crate::cache::shard::{key_hash, ShardStore};
use crate::cache::stats::Metrics;
use crate::cache::{CacheEntry, CacheStats};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::tasks::spawn_maintenance_task;

// == Eviction Listener ==
/// Why an entry left the cache without being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Evicted to make room for an admitted entry
    Capacity,
    /// Removed by the expiry sweep
    Expired,
}

/// An entry handed to the eviction listener.
#[derive(Debug, Clone)]
pub struct EvictedEntry<V> {
    pub key: Box<[u8]>,
    pub value: V,
    pub cost: i64,
    pub reason: RemovalReason,
}

/// Callback invoked for every evicted or expired entry.
pub type EvictionListener<V> = Arc<dyn Fn(EvictedEntry<V>) + Send + Sync>;

/// Work done by one maintenance cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Update records applied to the frequency sketch
    pub flushed: usize,
    /// Entries removed by the expiry sweep
    pub expired: usize,
}

// == Cache Inner ==
/// State shared between the facade and the maintenance task.
pub(crate) struct CacheInner<V> {
    store: ShardStore<V>,
    policy: Policy,
    buffer: UpdateBuffer,
    expiry: ExpirationIndex,
    budget: CostBudget,
    metrics: Metrics,
    listener: Option<EvictionListener<V>>,
    closed: AtomicBool,
    default_ttl: Duration,
    max_key_length: usize,
    allow_empty_keys: bool,
    /// Pending record count past which an access opportunistically flushes
    flush_threshold: usize,
}

impl<V> CacheInner<V> {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    fn validate_key(&self, key: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if key.is_empty() && !self.allow_empty_keys {
            return Err(CacheError::InvalidKey("Key must not be empty".to_string()));
        }
        if key.len() > self.max_key_length {
            return Err(CacheError::InvalidKey(format!(
                "Key exceeds maximum length of {} bytes",
                self.max_key_length
            )));
        }
        Ok(())
    }

    fn record_hit(&self, hash: u64) {
        if !self.buffer.record_hit(hash) {
            self.metrics.record_dropped_update();
        }
        self.flush_if_backed_up();
    }

    fn record_set(&self, hash: u64, cost: i64) {
        if !self.buffer.record_set(hash, cost) {
            self.metrics.record_dropped_update();
        }
        self.flush_if_backed_up();
    }

    /// Drains the buffer past the threshold unless another flush holds the policy.
    fn flush_if_backed_up(&self) {
        if self.buffer.pending() >= self.flush_threshold {
            if let Some(summary) = self.policy.try_flush() {
                trace!(flushed = summary.total(), "flushed update buffer at threshold");
            }
        }
    }

    fn insert(&self, key: &[u8], value: V, cost: i64, ttl: Duration) -> Result<bool> {
        if cost > self.budget.max() {
            debug!(cost, max_cost = self.budget.max(), "set rejected: cost exceeds budget");
            self.metrics.record_rejection();
            return Ok(false);
        }

        let hash = key_hash(key);
        // An expired entry awaiting the sweep does not make this an update
        let mode = if self.store.contains_live(hash, key, current_timestamp_ms()) {
            AdmissionMode::Update
        } else {
            AdmissionMode::Compete
        };

        let total = self.budget.reserve(cost);
        if mode == AdmissionMode::Compete && total > self.budget.max() {
            let admission = self
                .policy
                .make_room(hash, key, cost, mode, &self.store, &self.budget);
            let admitted = admission.is_admitted();
            self.discard(admission.into_evicted(), RemovalReason::Capacity);
            if !admitted {
                self.metrics.record_rejection();
                self.record_set(hash, cost);
                return Ok(false);
            }
        }

        let entry = CacheEntry::new(key, value, cost, ttl);
        let expires_at = entry.expires_at;
        let replaced = self.store.put(hash, entry);
        if let Some(old) = &replaced {
            self.budget.release(old.cost);
            if let Some(at) = old.expires_at {
                self.expiry.untrack(hash, at);
            }
        }
        if let Some(at) = expires_at {
            self.expiry.track(hash, at);
        }

        // A close that cleared the store while this write was in flight
        if self.is_closed() {
            if let Some(entry) = self.store.remove(hash, key) {
                self.budget.release(entry.cost);
                if let Some(at) = entry.expires_at {
                    self.expiry.untrack(hash, at);
                }
            }
            return Err(CacheError::Closed);
        }

        if mode == AdmissionMode::Update && self.budget.is_over() {
            let admission = self
                .policy
                .make_room(hash, key, cost, mode, &self.store, &self.budget);
            self.discard(admission.into_evicted(), RemovalReason::Capacity);
        }

        self.metrics.record_set(cost, replaced.is_some());
        self.record_set(hash, cost);
        Ok(true)
    }

    /// Finishes removal of entries already taken out of the store and budget.
    fn discard(&self, removed: Vec<CacheEntry<V>>, reason: RemovalReason) {
        for entry in removed {
            match reason {
                RemovalReason::Capacity => {
                    if let Some(at) = entry.expires_at {
                        self.expiry.untrack(key_hash(&entry.key), at);
                    }
                    self.metrics.record_eviction(entry.cost);
                }
                RemovalReason::Expired => self.metrics.record_expiration(),
            }
            if let Some(listener) = &self.listener {
                listener(EvictedEntry {
                    key: entry.key,
                    value: entry.value,
                    cost: entry.cost,
                    reason,
                });
            }
        }
    }

    // == Maintain ==
    /// Flushes buffered access records and sweeps due expiry buckets.
    pub(crate) fn maintain(&self) -> MaintenanceReport {
        let flushed = self.policy.flush().total();

        let now = current_timestamp_ms();
        let mut expired = Vec::new();
        for hash in self.expiry.sweep(now) {
            expired.extend(self.store.remove_expired(hash, now));
        }
        for entry in &expired {
            self.budget.release(entry.cost);
        }

        let report = MaintenanceReport {
            flushed,
            expired: expired.len(),
        };
        self.discard(expired, RemovalReason::Expired);
        report
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// == Cache ==
/// Concurrent, cost-bounded cache with TinyLFU admission and TTL expiry.
///
/// Must be created inside a tokio runtime, which runs its maintenance task.
pub struct Cache<V> {
    inner: Arc<CacheInner<V>>,
    shutdown: CancellationToken,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache and starts its maintenance task.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Creates a cache that reports evicted and expired entries to `listener`.
    pub fn with_listener<F>(config: CacheConfig, listener: F) -> Result<Self>
    where
        F: Fn(EvictedEntry<V>) + Send + Sync + 'static,
    {
        Self::build(config, Some(Arc::new(listener)))
    }

    fn build(config: CacheConfig, listener: Option<EvictionListener<V>>) -> Result<Self> {
        config.validate()?;
        tokio::runtime::Handle::try_current().map_err(|_| CacheError::NoRuntime)?;

        let (buffer, drain) = UpdateBuffer::new(config.buffer_capacity);
        let inner = Arc::new(CacheInner {
            store: ShardStore::new(config.shard_count),
            policy: Policy::new(config.num_counters, config.sample_size, drain),
            flush_threshold: (config.buffer_capacity * 3 / 4).max(1),
            buffer,
            expiry: ExpirationIndex::default(),
            budget: CostBudget::new(config.max_cost),
            metrics: Metrics::new(),
            listener,
            closed: AtomicBool::new(false),
            default_ttl: config.default_ttl,
            max_key_length: config.max_key_length,
            allow_empty_keys: config.allow_empty_keys,
        });

        let shutdown = CancellationToken::new();
        let handle = spawn_maintenance_task(
            Arc::clone(&inner),
            config.maintenance_interval,
            shutdown.clone(),
        );

        info!(
            shards = config.shard_count,
            max_cost = config.max_cost,
            sample_size = config.sample_size,
            "cache created"
        );

        Ok(Self {
            inner,
            shutdown,
            maintenance: Mutex::new(Some(handle)),
        })
    }

    // == Set ==
    /// Stores `value` under `key` with the configured default TTL.
    ///
    /// Returns whether the entry was admitted. A rejection (cost above the
    /// budget, or too cold to displace a resident) is not an error.
    pub fn set(&self, key: impl AsRef<[u8]>, value: V, cost: i64) -> Result<bool> {
        let ttl = self.inner.default_ttl;
        self.set_with_ttl(key, value, cost, ttl)
    }

    /// Stores `value` under `key` expiring after `ttl`; `Duration::ZERO` never expires.
    pub fn set_with_ttl(
        &self,
        key: impl AsRef<[u8]>,
        value: V,
        cost: i64,
        ttl: Duration,
    ) -> Result<bool> {
        let key = key.as_ref();
        self.inner.validate_key(key)?;
        if cost < 0 {
            return Err(CacheError::InvalidCost(cost));
        }
        self.inner.insert(key, value, cost, ttl)
    }

    // == Get ==
    /// Returns the live value stored under `key`.
    ///
    /// Every lookup, hit or miss, counts towards the key's frequency.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<V>> {
        let key = key.as_ref();
        self.inner.validate_key(key)?;

        let hash = key_hash(key);
        self.inner.record_hit(hash);
        let value = self.inner.store.get(hash, key, current_timestamp_ms());
        if value.is_some() {
            self.inner.metrics.record_hit();
        } else {
            self.inner.metrics.record_miss();
        }
        Ok(value)
    }

    // == Time To Live ==
    /// Remaining lifetime of `key`; None when absent, expired or without TTL.
    pub fn ttl(&self, key: impl AsRef<[u8]>) -> Result<Option<Duration>> {
        let key = key.as_ref();
        self.inner.validate_key(key)?;
        Ok(self
            .inner
            .store
            .ttl(key_hash(key), key, current_timestamp_ms()))
    }

    // == Delete ==
    /// Removes `key`, returning whether it was resident.
    pub fn del(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        let key = key.as_ref();
        self.inner.validate_key(key)?;

        let hash = key_hash(key);
        match self.inner.store.remove(hash, key) {
            Some(entry) => {
                self.inner.budget.release(entry.cost);
                if let Some(at) = entry.expires_at {
                    self.inner.expiry.untrack(hash, at);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // == Clear ==
    /// Drops every entry, buffered record, frequency count and metric.
    pub fn clear(&self) -> Result<()> {
        self.inner.ensure_open()?;
        let (entries, cost) = self.inner.store.clear();
        self.inner.budget.release(cost);
        self.inner.expiry.clear();
        self.inner.policy.reset();
        self.inner.metrics.reset();
        debug!(entries, cost, "cache cleared");
        Ok(())
    }

    // == Maintenance ==
    /// Runs one maintenance cycle immediately.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport> {
        self.inner.ensure_open()?;
        Ok(self.inner.maintain())
    }

    // == Close ==
    /// Stops the maintenance task, discards buffered records and drops every entry.
    ///
    /// Every later operation fails with `CacheError::Closed`.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Err(CacheError::Closed);
        }

        self.shutdown.cancel();
        let handle = self.maintenance.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!("maintenance task ended abnormally: {}", err);
            }
        }

        let discarded = self.inner.policy.discard_pending();
        let (entries, cost) = self.inner.store.clear();
        self.inner.budget.release(cost);
        self.inner.expiry.clear();

        info!(discarded, entries, "cache closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    // == Introspection ==
    /// Number of resident entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Cost currently charged against the budget.
    pub fn cost(&self) -> i64 {
        self.inner.budget.used()
    }

    /// Configured cost ceiling.
    pub fn max_cost(&self) -> i64 {
        self.inner.budget.max()
    }

    /// Snapshot of the cache metrics.
    pub fn stats(&self) -> CacheStats {
        self.inner
            .metrics
            .snapshot(self.inner.store.len(), self.inner.budget.used())
    }

    /// Summed cost of resident entries, counted shard by shard.
    #[cfg(test)]
    pub(crate) fn resident_cost(&self) -> i64 {
        self.inner.store.total_cost()
    }

    /// Estimated frequency of `key` after applying buffered records.
    #[cfg(test)]
    pub(crate) fn estimate(&self, key: &[u8]) -> u8 {
        self.inner.policy.flush();
        self.inner.policy.estimate(key_hash(key))
    }
}

impl<V> Drop for Cache<V> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl<V> std::fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.inner.store.len())
            .field("cost", &self.inner.budget.used())
            .field("max_cost", &self.inner.budget.max())
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}
