use std::time::{Duration, Instant};

/// A cached value together with the instant it was stored.
///
/// Entries are owned by the [`TtlStore`](crate::TtlStore). The instant comes
/// from the store's [`Clock`](crate::Clock), so TTL checks are monotonic and
/// can be driven by a mock clock in tests.
///
/// # Examples
///
/// ```
/// use classcache_core::CacheEntry;
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let entry = CacheEntry::new(vec!["math", "physics"], now);
///
/// assert!(!entry.is_expired(now + Duration::from_secs(180), Duration::from_secs(180)));
/// assert!(entry.is_expired(now + Duration::from_secs(181), Duration::from_secs(180)));
/// ```
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Creates an entry stamped with `now`.
    pub fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            inserted_at: now,
        }
    }

    /// Age of the entry at `now`.
    ///
    /// Saturates to zero if `now` is earlier than the insertion instant.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    /// Returns true once the entry is strictly older than `ttl`.
    ///
    /// An entry exactly `ttl` old is still fresh.
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_not_expired() {
        let now = Instant::now();
        let entry = CacheEntry::new(42, now);
        assert_eq!(entry.value, 42);
        assert!(!entry.is_expired(now, Duration::from_secs(10)));
    }

    #[test]
    fn test_entry_expiration_boundary() {
        let now = Instant::now();
        let ttl = Duration::from_secs(180);
        let entry = CacheEntry::new("classes", now);

        assert!(!entry.is_expired(now + ttl, ttl));
        assert!(entry.is_expired(now + ttl + Duration::from_millis(1), ttl));
    }

    #[test]
    fn test_age_saturates_when_clock_is_behind() {
        let now = Instant::now();
        let entry = CacheEntry::new((), now + Duration::from_secs(5));
        assert_eq!(entry.age(now), Duration::ZERO);
        assert!(!entry.is_expired(now, Duration::ZERO));
    }
}
