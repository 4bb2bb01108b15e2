//! Expiration Index Module
//!
//! Groups key hashes into coarse time buckets by deadline so the maintenance
//! task can expire them without scanning the whole store.
//!
//! Bucket `b` holds deadlines in `[(b - 1) * width, b * width)` and becomes
//! due once `now >= b * width`. Buckets live in a `DashMap`, so tracking and
//! sweeping only contend when they touch the same map shard.

use std::collections::HashMap;

use dashmap::DashMap;

/// Default bucket width in milliseconds.
pub const DEFAULT_BUCKET_WIDTH_MS: u64 = 1000;

// == Expiration Index ==
/// Time-bucketed deadlines of resident entries.
#[derive(Debug)]
pub struct ExpirationIndex {
    /// Bucket number -> key hash -> number of tracked entries with that hash
    buckets: DashMap<u64, HashMap<u64, u32>>,
    width_ms: u64,
}

impl ExpirationIndex {
    // == Constructor ==
    /// Creates an index with one bucket per `width_ms` milliseconds.
    pub fn new(width_ms: u64) -> Self {
        Self {
            buckets: DashMap::new(),
            width_ms: width_ms.max(1),
        }
    }

    fn bucket_of(&self, expires_at: u64) -> u64 {
        expires_at / self.width_ms + 1
    }

    // == Track ==
    /// Registers `key_hash` as expiring at `expires_at` (Unix milliseconds).
    pub fn track(&self, key_hash: u64, expires_at: u64) {
        let bucket = self.bucket_of(expires_at);
        *self
            .buckets
            .entry(bucket)
            .or_default()
            .entry(key_hash)
            .or_insert(0) += 1;
    }

    // == Untrack ==
    /// Forgets one registration of `key_hash` at `expires_at`.
    ///
    /// A no-op when the bucket was already swept.
    pub fn untrack(&self, key_hash: u64, expires_at: u64) {
        let bucket = self.bucket_of(expires_at);
        if let Some(mut members) = self.buckets.get_mut(&bucket) {
            if let Some(count) = members.get_mut(&key_hash) {
                *count -= 1;
                if *count == 0 {
                    members.remove(&key_hash);
                }
            }
        }
        self.buckets.remove_if(&bucket, |_, members| members.is_empty());
    }

    // == Sweep ==
    /// Removes every bucket that is fully in the past and returns its members.
    ///
    /// Sweeping again at the same `now` yields nothing.
    pub fn sweep(&self, now: u64) -> Vec<u64> {
        let due: Vec<u64> = self
            .buckets
            .iter()
            .map(|bucket| *bucket.key())
            .filter(|bucket| bucket.saturating_mul(self.width_ms) <= now)
            .collect();

        let mut expired = Vec::new();
        for bucket in due {
            if let Some((_, members)) = self.buckets.remove(&bucket) {
                expired.extend(members.into_keys());
            }
        }
        expired
    }

    // == Clear ==
    /// Drops every bucket.
    pub fn clear(&self) {
        self.buckets.clear();
    }

    /// Number of live buckets.
    #[allow(dead_code)]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of distinct tracked key hashes across all buckets.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.value().len()).sum()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Default for ExpirationIndex {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_WIDTH_MS)
    }
}
