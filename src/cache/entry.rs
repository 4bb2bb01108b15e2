//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with cost and TTL support.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// A resident key with its value, admission cost and optional deadline.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The caller-supplied key bytes
    pub key: Box<[u8]>,
    /// The stored value
    pub value: V,
    /// Weight charged against the cost budget
    pub cost: i64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry with an optional TTL.
    ///
    /// A zero TTL means the entry never expires.
    pub fn new(key: &[u8], value: V, cost: i64, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            cost,
            expires_at: deadline_after(ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now` (Unix milliseconds).
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiration time.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns the remaining lifetime at `now`, or None if no expiration is set.
    pub fn ttl_remaining_at(&self, now: u64) -> Option<Duration> {
        self.expires_at
            .map(|expires| Duration::from_millis(expires.saturating_sub(now)))
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Absolute deadline for a TTL starting now, None for a zero TTL.
pub fn deadline_after(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    // Sub-millisecond TTLs still expire.
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
    Some(current_timestamp_ms().saturating_add(ttl_ms))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new(b"key", "test_value", 1, Duration::ZERO);

        assert_eq!(entry.value, "test_value");
        assert_eq!(&*entry.key, b"key");
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired_at(current_timestamp_ms()));
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(b"key", "test_value", 1, Duration::from_secs(60));

        assert!(entry.expires_at.is_some());
        assert!(!entry.is_expired_at(current_timestamp_ms()));
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(b"key", (), 1, Duration::from_millis(50));

        assert!(!entry.is_expired_at(current_timestamp_ms()));

        sleep(Duration::from_millis(60));

        assert!(entry.is_expired_at(current_timestamp_ms()));
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new(b"key", (), 1, Duration::from_secs(10));

        let remaining = entry.ttl_remaining_at(current_timestamp_ms()).unwrap();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining >= Duration::from_secs(9));
    }

    #[test]
    fn test_ttl_remaining_no_expiration() {
        let entry = CacheEntry::new(b"key", (), 1, Duration::ZERO);
        assert!(entry.ttl_remaining_at(current_timestamp_ms()).is_none());
    }

    #[test]
    fn test_ttl_remaining_after_deadline_is_zero() {
        let entry = CacheEntry {
            key: b"key".to_vec().into_boxed_slice(),
            value: (),
            cost: 1,
            expires_at: Some(1_000),
        };
        assert_eq!(entry.ttl_remaining_at(5_000), Some(Duration::ZERO));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let entry = CacheEntry {
            key: b"key".to_vec().into_boxed_slice(),
            value: (),
            cost: 1,
            expires_at: Some(now), // Expires exactly at creation time
        };

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(now - 1));
    }

    #[test]
    fn test_sub_millisecond_ttl_still_expires() {
        let deadline = deadline_after(Duration::from_micros(10)).unwrap();
        assert!(deadline > current_timestamp_ms() - 1);
    }

    #[test]
    fn test_huge_ttl_saturates_instead_of_wrapping() {
        let now = current_timestamp_ms();
        let deadline = deadline_after(Duration::from_secs(18_446_744_073_709_552)).unwrap();
        assert_eq!(deadline, u64::MAX);

        let entry = CacheEntry::new(b"key", (), 1, Duration::MAX);
        assert_eq!(entry.expires_at, Some(u64::MAX));
        assert!(!entry.is_expired_at(now + 1_000));
    }
}
