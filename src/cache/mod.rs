//! Cache Module
//!
//! Provides a sharded in-memory cache with cost-aware TinyLFU admission,
//! sampled eviction and TTL expiration.

mod buffer;
mod entry;
mod expiry;
mod policy;
mod shard;
mod sketch;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use sketch::FrequencySketch;
pub use stats::CacheStats;
pub use store::{Cache, EvictedEntry, EvictionListener, MaintenanceReport, RemovalReason};

pub(crate) use store::CacheInner;
