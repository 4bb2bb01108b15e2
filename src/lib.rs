//! TinyLFU Cache - A concurrent in-memory key-value cache
//!
//! Bounds resident entries by total cost, admits new keys only when they are
//! accessed more often than a sampled victim, and expires entries by TTL.

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{Cache, CacheStats, EvictedEntry, RemovalReason};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
