//! Ordered key index for prefix invalidation.
//!
//! Keys are kept in a `BTreeSet`, so every key sharing a prefix sits in one
//! contiguous range starting at the prefix itself. Collecting the keys for a
//! prefix costs `O(log n + k)` instead of a scan over the whole store.

use std::collections::BTreeSet;
use std::ops::Bound;

/// Sorted set of the keys currently held by a store.
#[derive(Debug, Default, Clone)]
pub struct PrefixIndex {
    keys: BTreeSet<String>,
}

impl PrefixIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key. Returns `false` if it was already indexed.
    pub fn insert(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return false;
        }
        self.keys.insert(key.to_string())
    }

    /// Removes a key. Returns `false` if it was not indexed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.keys.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Iterates, in order, over every indexed key starting with `prefix`.
    pub fn matching<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> + 'a {
        self.keys
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |key| key.starts_with(prefix))
    }

    /// Removes and returns every key starting with `prefix`.
    pub fn drain_prefix(&mut self, prefix: &str) -> Vec<String> {
        let matched: Vec<String> = self.matching(prefix).cloned().collect();
        for key in &matched {
            self.keys.remove(key);
        }
        matched
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
