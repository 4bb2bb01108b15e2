//! Shard Store Module
//!
//! Fixed set of independently locked hash maps holding resident entries.
//!
//! A key lives in shard `hash(key) & (shard_count - 1)`. Each shard maps a key
//! hash to the entries carrying that hash; distinct keys that collide on the
//! hash share a slot and are told apart by byte equality. Every shard also
//! keeps a dense list of its hashes so eviction sampling can pick a random
//! resident in O(1).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;

use crate::cache::CacheEntry;

/// Random probes per requested candidate before falling back to a scan.
const PROBES_PER_CANDIDATE: usize = 2;

/// Hashes key bytes for shard routing, sketch counting and expiry tracking.
pub fn key_hash(key: &[u8]) -> u64 {
    seahash::hash(key)
}

// == Candidate ==
/// A resident entry drawn as a potential eviction victim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key_hash: u64,
    pub key: Box<[u8]>,
    pub cost: i64,
}

#[derive(Debug)]
struct Slot<V> {
    /// Position of this slot's hash in `Shard::hashes`
    pos: usize,
    entries: Vec<CacheEntry<V>>,
}

#[derive(Debug)]
struct Shard<V> {
    slots: HashMap<u64, Slot<V>>,
    hashes: Vec<u64>,
    len: usize,
}

impl<V> Shard<V> {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
            hashes: Vec::new(),
            len: 0,
        }
    }

    fn find(&self, hash: u64, key: &[u8]) -> Option<&CacheEntry<V>> {
        self.slots
            .get(&hash)?
            .entries
            .iter()
            .find(|entry| &*entry.key == key)
    }

    fn insert(&mut self, hash: u64, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        match self.slots.entry(hash) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if let Some(existing) = slot.entries.iter_mut().find(|e| e.key == entry.key) {
                    return Some(std::mem::replace(existing, entry));
                }
                slot.entries.push(entry);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot {
                    pos: self.hashes.len(),
                    entries: vec![entry],
                });
                self.hashes.push(hash);
            }
        }
        self.len += 1;
        None
    }

    fn remove_where<F>(&mut self, hash: u64, mut matches: F) -> Vec<CacheEntry<V>>
    where
        F: FnMut(&CacheEntry<V>) -> bool,
    {
        let Some(slot) = self.slots.get_mut(&hash) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        let mut i = 0;
        while i < slot.entries.len() {
            if matches(&slot.entries[i]) {
                removed.push(slot.entries.swap_remove(i));
            } else {
                i += 1;
            }
        }

        if slot.entries.is_empty() {
            let pos = slot.pos;
            self.slots.remove(&hash);
            self.hashes.swap_remove(pos);
            if let Some(moved) = self.hashes.get(pos) {
                if let Some(moved_slot) = self.slots.get_mut(moved) {
                    moved_slot.pos = pos;
                }
            }
        }

        self.len -= removed.len();
        removed
    }

    fn candidate_at(
        &self,
        hash: u64,
        exclude_hash: u64,
        exclude_key: &[u8],
        picked: &[Candidate],
    ) -> Option<Candidate> {
        self.slots
            .get(&hash)?
            .entries
            .iter()
            .filter(|entry| !(hash == exclude_hash && &*entry.key == exclude_key))
            .find(|entry| {
                !picked
                    .iter()
                    .any(|c| c.key_hash == hash && c.key == entry.key)
            })
            .map(|entry| Candidate {
                key_hash: hash,
                key: entry.key.clone(),
                cost: entry.cost,
            })
    }
}

// == Shard Store ==
/// Sharded map of resident entries.
#[derive(Debug)]
pub struct ShardStore<V> {
    shards: Box<[RwLock<Shard<V>>]>,
    mask: u64,
}

impl<V> ShardStore<V> {
    // == Constructor ==
    /// Creates a store with `shard_count` shards (a power of two).
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1).next_power_of_two();
        Self {
            shards: (0..shard_count).map(|_| RwLock::new(Shard::new())).collect(),
            mask: (shard_count - 1) as u64,
        }
    }

    fn shard(&self, hash: u64) -> &RwLock<Shard<V>> {
        &self.shards[(hash & self.mask) as usize]
    }

    /// Number of shards.
    #[cfg(test)]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard index a hash routes to.
    #[cfg(test)]
    pub fn shard_index(&self, hash: u64) -> usize {
        (hash & self.mask) as usize
    }

    /// Write-locks the shard `hash` routes to until the guard drops.
    #[cfg(test)]
    pub(crate) fn lock_shard(&self, hash: u64) -> impl Sized + '_ {
        self.shard(hash).write()
    }

    // == Get ==
    /// Returns a clone of the live value stored under `key`.
    ///
    /// Entries past their deadline at `now` read as absent even before the
    /// sweep removes them.
    pub fn get(&self, hash: u64, key: &[u8], now: u64) -> Option<V>
    where
        V: Clone,
    {
        let shard = self.shard(hash).read();
        shard
            .find(hash, key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value.clone())
    }

    /// Remaining lifetime of a live entry, None when absent, expired or immortal.
    pub fn ttl(&self, hash: u64, key: &[u8], now: u64) -> Option<Duration> {
        let shard = self.shard(hash).read();
        shard
            .find(hash, key)
            .filter(|entry| !entry.is_expired_at(now))
            .and_then(|entry| entry.ttl_remaining_at(now))
    }

    /// Whether `key` is resident, expired or not.
    #[cfg(test)]
    pub fn contains(&self, hash: u64, key: &[u8]) -> bool {
        self.shard(hash).read().find(hash, key).is_some()
    }

    /// Whether `key` is resident and unexpired at `now`.
    pub fn contains_live(&self, hash: u64, key: &[u8], now: u64) -> bool {
        self.shard(hash)
            .read()
            .find(hash, key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    // == Put ==
    /// Inserts or replaces an entry, returning the one it replaced.
    ///
    /// Cost accounting stays with the caller.
    pub fn put(&self, hash: u64, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        self.shard(hash).write().insert(hash, entry)
    }

    // == Remove ==
    /// Removes `key`, returning its entry if it was resident.
    pub fn remove(&self, hash: u64, key: &[u8]) -> Option<CacheEntry<V>> {
        self.shard(hash)
            .write()
            .remove_where(hash, |entry| &*entry.key == key)
            .pop()
    }

    /// Removes every entry under `hash` whose deadline has passed at `now`.
    pub fn remove_expired(&self, hash: u64, now: u64) -> Vec<CacheEntry<V>> {
        self.shard(hash)
            .write()
            .remove_where(hash, |entry| entry.is_expired_at(now))
    }

    // == Sample ==
    /// Draws up to `count` distinct resident entries, skipping the excluded key.
    ///
    /// Random probes come first; a sparse store that defeats them is scanned
    /// shard by shard from a random starting point. An empty result means no
    /// other entry is resident.
    pub fn sample(&self, count: usize, exclude_hash: u64, exclude_key: &[u8]) -> Vec<Candidate> {
        let mut rng = rand::rng();
        let mut picked: Vec<Candidate> = Vec::with_capacity(count);

        for _ in 0..count * PROBES_PER_CANDIDATE {
            if picked.len() == count {
                return picked;
            }
            let shard = self.shards[rng.random_range(0..self.shards.len())].read();
            if shard.hashes.is_empty() {
                continue;
            }
            let hash = shard.hashes[rng.random_range(0..shard.hashes.len())];
            if let Some(candidate) = shard.candidate_at(hash, exclude_hash, exclude_key, &picked) {
                picked.push(candidate);
            }
        }

        if !picked.is_empty() {
            return picked;
        }

        let start = rng.random_range(0..self.shards.len());
        for offset in 0..self.shards.len() {
            let shard = self.shards[(start + offset) % self.shards.len()].read();
            for &hash in &shard.hashes {
                while let Some(candidate) =
                    shard.candidate_at(hash, exclude_hash, exclude_key, &picked)
                {
                    picked.push(candidate);
                    if picked.len() == count {
                        return picked;
                    }
                }
            }
        }
        picked
    }

    // == Clear ==
    /// Empties every shard, returning how many entries and how much cost were dropped.
    pub fn clear(&self) -> (usize, i64) {
        let mut removed = 0;
        let mut cost = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            cost += shard
                .slots
                .values()
                .flat_map(|slot| slot.entries.iter())
                .map(|entry| entry.cost)
                .sum::<i64>();
            removed += shard.len;
            *shard = Shard::new();
        }
        (removed, cost)
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the costs of resident entries.
    pub fn total_cost(&self) -> i64 {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .slots
                    .values()
                    .flat_map(|slot| slot.entries.iter())
                    .map(|entry| entry.cost)
                    .sum::<i64>()
            })
            .sum()
    }
}
