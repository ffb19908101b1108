use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};
use crate::prefix_index::PrefixIndex;
use crate::{CacheConfig, CacheEntry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A thread-safe map from string keys to values with time-based expiry.
///
/// Every entry is stamped with the store's [`Clock`] when it is set. An entry
/// is readable while `now - inserted_at <= ttl`; the first read after that
/// removes it. There is no sliding expiration: reading an entry never
/// refreshes it.
///
/// # Structure
///
/// The entries, the [`PrefixIndex`] over their keys and a generation counter
/// live behind one `parking_lot::RwLock`, so a key is in the index exactly
/// when it is in the map. Reads take the shared lock; only an expired read
/// upgrades to the exclusive lock, and it re-checks the entry before removing
/// it because another thread may have overwritten it in between.
///
/// # Generation
///
/// Every invalidation (`delete`, `delete_by_prefix`, `delete_many`, `clear`)
/// bumps [`generation`](Self::generation), whether or not anything was
/// removed. A fetch that captured the generation before it started can store
/// its result with [`set_if_generation`](Self::set_if_generation), which
/// refuses the write if any invalidation happened in the meantime.
///
/// # Examples
///
/// ```
/// use classcache_core::TtlStore;
/// use std::time::Duration;
///
/// let store = TtlStore::new(Duration::from_secs(180));
/// store.set("classes", vec!["algebra", "biology"]);
/// store.set("dashboard_2024-01_2024-02", vec!["stats"]);
///
/// assert_eq!(store.get("classes"), Some(vec!["algebra", "biology"]));
///
/// store.delete_by_prefix("dashboard_").unwrap();
/// assert_eq!(store.get("dashboard_2024-01_2024-02"), None);
/// ```
pub struct TtlStore<V> {
    inner: RwLock<StoreInner<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

struct StoreInner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    index: PrefixIndex,
    generation: u64,
}

impl<V> StoreInner<V> {
    fn remove(&mut self, key: &str) -> bool {
        self.index.remove(key);
        self.entries.remove(key).is_some()
    }

    fn remove_prefix(&mut self, prefix: &str) -> usize {
        let keys = self.index.drain_prefix(prefix);
        for key in &keys {
            self.entries.remove(key);
        }
        keys.len()
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

impl<V> TtlStore<V> {
    /// Creates an empty store using the system clock.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Creates an empty store driven by `clock`.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                entries: HashMap::new(),
                index: PrefixIndex::new(),
                generation: 0,
            }),
            ttl,
            clock,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Inserts or overwrites `key`, resetting its insertion instant.
    pub fn set(&self, key: &str, value: V) {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        inner.index.insert(key);
        inner
            .entries
            .insert(key.to_string(), CacheEntry::new(value, now));
        trace!(key, "cache set");
    }

    /// Inserts `key` only if no invalidation happened since `generation` was
    /// read. Returns whether the value was stored.
    pub fn set_if_generation(&self, key: &str, value: V, generation: u64) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        if inner.generation != generation {
            debug!(
                key,
                expected = generation,
                current = inner.generation,
                "store invalidated while fetching, result not cached"
            );
            return false;
        }
        inner.index.insert(key);
        inner
            .entries
            .insert(key.to_string(), CacheEntry::new(value, now));
        trace!(key, "cache set");
        true
    }

    /// Removes `key`. Returns whether an entry was present.
    ///
    /// Deleting an absent key is a no-op, never an error.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        inner.bump();
        let removed = inner.remove(key);
        trace!(key, removed, "cache delete");
        removed
    }

    /// Removes every key starting with `prefix` and returns how many were
    /// removed.
    ///
    /// # Errors
    ///
    /// [`CacheError::EmptyPrefix`] if `prefix` is empty; nothing is removed.
    pub fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        if prefix.is_empty() {
            return Err(CacheError::EmptyPrefix);
        }
        let mut inner = self.inner.write();
        inner.bump();
        let removed = inner.remove_prefix(prefix);
        debug!(prefix, removed, "cache prefix delete");
        Ok(removed)
    }

    /// Removes a set of exact keys and prefixes under one lock.
    ///
    /// Either every target is applied or, if any prefix is empty, none is.
    pub fn delete_many<K, P>(&self, keys: &[K], prefixes: &[P]) -> Result<usize>
    where
        K: AsRef<str>,
        P: AsRef<str>,
    {
        if prefixes.iter().any(|p| p.as_ref().is_empty()) {
            return Err(CacheError::EmptyPrefix);
        }
        let mut inner = self.inner.write();
        inner.bump();
        let mut removed = 0;
        for key in keys {
            if inner.remove(key.as_ref()) {
                removed += 1;
            }
        }
        for prefix in prefixes {
            removed += inner.remove_prefix(prefix.as_ref());
        }
        Ok(removed)
    }

    /// Removes every entry and returns how many there were.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.write();
        inner.bump();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.index.clear();
        debug!(removed, "cache cleared");
        removed
    }

    /// Eagerly drops every expired entry and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut inner = self.inner.write();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, ttl))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Stored keys starting with `prefix`, in lexicographic order.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner.read().index.matching(prefix).cloned().collect()
    }
}

impl<V: Clone> TtlStore<V> {
    /// Returns the value of `key` if it is present and not older than the TTL.
    ///
    /// An expired entry is removed by this call.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        {
            let inner = self.inner.read();
            match inner.entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now, self.ttl) => {
                    trace!(key, "cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
            }
        }

        let mut inner = self.inner.write();
        let still_expired = inner
            .entries
            .get(key)
            .map(|entry| entry.is_expired(now, self.ttl));
        match still_expired {
            Some(true) => {
                inner.remove(key);
                trace!(key, "cache entry expired");
                None
            }
            // Overwritten by a concurrent set after our read lock was released
            Some(false) => inner.entries.get(key).map(|entry| entry.value.clone()),
            None => None,
        }
    }
}

impl<V> fmt::Debug for TtlStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TtlStore")
            .field("entries", &inner.entries.len())
            .field("generation", &inner.generation)
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .finish()
    }
}
