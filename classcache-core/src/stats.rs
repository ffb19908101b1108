use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing how reads were served.
///
/// A read is a **hit** when the store answered it, a **miss** when it started
/// a fetch, and **coalesced** when it joined a fetch already in flight. Every
/// read lands in exactly one bucket.
///
/// All counters are atomics updated with `Relaxed` ordering; they are
/// monitoring data, not synchronization.
///
/// # Examples
///
/// ```
/// use classcache_core::CacheStats;
///
/// let stats = CacheStats::new();
/// stats.record_hit();
/// stats.record_miss();
/// stats.record_coalesced();
///
/// assert_eq!(stats.total_reads(), 3);
/// assert_eq!(stats.fetches_saved(), 2);
/// ```
#[derive(Debug)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    invalidated: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            invalidated: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a read that joined an in-flight fetch.
    #[inline]
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `count` entries removed by invalidation.
    #[inline]
    pub fn record_invalidated(&self, count: usize) {
        self.invalidated.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn invalidated(&self) -> u64 {
        self.invalidated.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total_reads(&self) -> u64 {
        self.hits() + self.misses() + self.coalesced()
    }

    /// Reads that did not trigger a remote fetch of their own.
    #[inline]
    pub fn fetches_saved(&self) -> u64 {
        self.hits() + self.coalesced()
    }

    /// Fraction of reads answered by the store, 0.0 when nothing was read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_reads();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.coalesced.store(0, Ordering::Relaxed);
        self.invalidated.store(0, Ordering::Relaxed);
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            hits: AtomicU64::new(self.hits()),
            misses: AtomicU64::new(self.misses()),
            coalesced: AtomicU64::new(self.coalesced()),
            invalidated: AtomicU64::new(self.invalidated()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats() {
        let stats = CacheStats::new();
        assert_eq!(stats.total_reads(), 0);
        assert_eq!(stats.invalidated(), 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_buckets_are_disjoint() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_coalesced();

        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.coalesced(), 1);
        assert_eq!(stats.total_reads(), 4);
        assert_eq!(stats.fetches_saved(), 3);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalidated_accumulates_counts() {
        let stats = CacheStats::new();
        stats.record_invalidated(3);
        stats.record_invalidated(0);
        stats.record_invalidated(2);
        assert_eq!(stats.invalidated(), 5);
    }

    #[test]
    fn test_reset_and_clone_independence() {
        let stats = CacheStats::new();
        stats.record_hit();
        let snapshot = stats.clone();

        stats.reset();
        assert_eq!(stats.hits(), 0);
        assert_eq!(snapshot.hits(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(CacheStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_hit();
                        stats.record_coalesced();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.hits(), 800);
        assert_eq!(stats.coalesced(), 800);
    }
}
