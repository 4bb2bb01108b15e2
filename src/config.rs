//! Configuration Module
//!
//! Handles construction options for the cache, with defaults and
//! environment variable overrides.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Cache construction parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Number of independently locked partitions (power of two)
    pub shard_count: usize,
    /// Ceiling on the summed cost of resident entries
    pub max_cost: i64,
    /// Width of the frequency sketch; roughly 10x the expected resident keys
    pub num_counters: usize,
    /// TTL applied when `set` omits one, `Duration::ZERO` = no expiry
    pub default_ttl: Duration,
    /// Number of eviction candidates drawn per admission round
    pub sample_size: usize,
    /// Maximum number of queued access records
    pub buffer_capacity: usize,
    /// Period of the background flush and expiry sweep
    pub maintenance_interval: Duration,
    /// Longest accepted key in bytes
    pub max_key_length: usize,
    /// Whether a zero-length key is a valid key
    pub allow_empty_keys: bool,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_SHARD_COUNT` - Number of shards (default: 16x available parallelism, rounded up to a power of two)
    /// - `CACHE_MAX_COST` - Cost budget (default: 10_000)
    /// - `CACHE_NUM_COUNTERS` - Sketch width (default: 100_000)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 0, no expiry)
    /// - `CACHE_SAMPLE_SIZE` - Eviction sample size (default: 5)
    /// - `CACHE_BUFFER_CAPACITY` - Update buffer capacity (default: 4096)
    /// - `CACHE_MAINTENANCE_INTERVAL_MS` - Maintenance period in milliseconds (default: 1000)
    /// - `CACHE_MAX_KEY_LENGTH` - Maximum key length in bytes (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            shard_count: env_or("CACHE_SHARD_COUNT", defaults.shard_count),
            max_cost: env_or("CACHE_MAX_COST", defaults.max_cost),
            num_counters: env_or("CACHE_NUM_COUNTERS", defaults.num_counters),
            default_ttl: Duration::from_millis(env_or(
                "CACHE_DEFAULT_TTL_MS",
                defaults.default_ttl.as_millis() as u64,
            )),
            sample_size: env_or("CACHE_SAMPLE_SIZE", defaults.sample_size),
            buffer_capacity: env_or("CACHE_BUFFER_CAPACITY", defaults.buffer_capacity),
            maintenance_interval: Duration::from_millis(env_or(
                "CACHE_MAINTENANCE_INTERVAL_MS",
                defaults.maintenance_interval.as_millis() as u64,
            )),
            max_key_length: env_or("CACHE_MAX_KEY_LENGTH", defaults.max_key_length),
            allow_empty_keys: defaults.allow_empty_keys,
        }
    }

    // == Validate ==
    /// Checks that every option is usable by the engine.
    pub fn validate(&self) -> Result<()> {
        if self.shard_count == 0 || !self.shard_count.is_power_of_two() {
            return Err(CacheError::InvalidConfig(format!(
                "shard_count must be a non-zero power of two, got {}",
                self.shard_count
            )));
        }
        if self.max_cost <= 0 {
            return Err(CacheError::InvalidConfig(format!(
                "max_cost must be positive, got {}",
                self.max_cost
            )));
        }
        if self.num_counters == 0 {
            return Err(CacheError::InvalidConfig(
                "num_counters must be positive".to_string(),
            ));
        }
        if self.sample_size == 0 {
            return Err(CacheError::InvalidConfig(
                "sample_size must be positive".to_string(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "buffer_capacity must be positive".to_string(),
            ));
        }
        if self.maintenance_interval.is_zero() {
            return Err(CacheError::InvalidConfig(
                "maintenance_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            shard_count: (parallelism * 16).next_power_of_two(),
            max_cost: 10_000,
            num_counters: 100_000,
            default_ttl: Duration::ZERO,
            sample_size: 5,
            buffer_capacity: 4096,
            maintenance_interval: Duration::from_secs(1),
            max_key_length: 256,
            allow_empty_keys: false,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert!(config.shard_count.is_power_of_two());
        assert_eq!(config.max_cost, 10_000);
        assert_eq!(config.default_ttl, Duration::ZERO);
        assert_eq!(config.sample_size, 5);
        assert_eq!(config.max_key_length, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_MAX_COST");
        env::remove_var("CACHE_SAMPLE_SIZE");
        env::remove_var("CACHE_DEFAULT_TTL_MS");
        env::remove_var("CACHE_MAINTENANCE_INTERVAL_MS");

        let config = CacheConfig::from_env();
        assert_eq!(config.max_cost, 10_000);
        assert_eq!(config.sample_size, 5);
        assert_eq!(config.default_ttl, Duration::ZERO);
        assert_eq!(config.maintenance_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_config_rejects_bad_shard_count() {
        let config = CacheConfig {
            shard_count: 12,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_rejects_non_positive_budget() {
        let config = CacheConfig {
            max_cost: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_config_rejects_zero_buffer() {
        let config = CacheConfig {
            buffer_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
