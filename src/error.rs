//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
///
/// Capacity rejections are not errors: `set` reports them as `Ok(false)`.
/// Dropped update records and empty eviction samples never surface here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key is empty (when disallowed) or longer than the configured maximum
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Entry cost is negative
    #[error("Invalid cost: {0}")]
    InvalidCost(i64),

    /// Configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation attempted after `close`
    #[error("Cache closed")]
    Closed,

    /// Construction outside of a tokio runtime
    #[error("No tokio runtime available to run cache maintenance")]
    NoRuntime,
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CacheError::InvalidKey("too long".to_string()).to_string(),
            "Invalid key: too long"
        );
        assert_eq!(CacheError::InvalidCost(-3).to_string(), "Invalid cost: -3");
        assert_eq!(CacheError::Closed.to_string(), "Cache closed");
    }
}
