//! Single-flight fetch coordination.

use classcache_core::TtlStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(feature = "stats")]
use classcache_core::CacheStats;

/// Fetch shared between the caller that started it and every caller that
/// joined while it was pending.
type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// A pending fetch and the store generation it started under.
struct PendingFetch<V, E> {
    fetch: SharedFetch<V, E>,
    generation: u64,
}

/// How a read was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheGetStatus {
    /// The store held an unexpired value.
    Hit,
    /// Nothing was stored or pending; this call started the fetch.
    Miss,
    /// Nothing was stored but a fetch for the key was already pending; this
    /// call waited for it.
    MissAlreadyLoading,
}

impl CacheGetStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::MissAlreadyLoading => "miss_already_loading",
        }
    }
}

/// Collapses concurrent reads of one key into a single remote fetch.
///
/// At most one fetch per key is pending at any time. The fetch runs in its
/// own Tokio task, so it completes and populates the store even if every
/// caller waiting on it is dropped. Once it settles the task
///
/// 1. stores a successful value, unless the store was invalidated after the
///    fetch started (the value may predate the invalidating write), and
/// 2. removes the pending record, success or failure.
///
/// Failures are handed to every waiter and never stored, so the next read
/// after a failed fetch starts a new one.
///
/// A read only joins a pending fetch that started after the last
/// invalidation. Otherwise it starts a fresh fetch and replaces the pending
/// record, so a read issued after a write never sees pre-write data.
///
/// # Panics
///
/// If the fetch future panics, every caller awaiting it panics as well. The
/// pending record is still removed.
pub struct Coordinator<V, E> {
    store: Arc<TtlStore<V>>,
    pending: Arc<DashMap<String, PendingFetch<V, E>>>,
    #[cfg(feature = "stats")]
    stats: Arc<CacheStats>,
}

impl<V, E> Coordinator<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<TtlStore<V>>) -> Self {
        Self {
            store,
            pending: Arc::new(DashMap::new()),
            #[cfg(feature = "stats")]
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Returns the stored value for `key`, or the result of a fetch shared
    /// with every concurrent caller for the same key.
    ///
    /// `fetch` is only invoked when no value is stored and no fetch started
    /// since the last invalidation is pending. Must be called from within a
    /// Tokio runtime.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.get_or_fetch_with_status(key, fetch).await.0
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), also reporting how the read
    /// was served.
    pub async fn get_or_fetch_with_status<F, Fut>(
        &self,
        key: &str,
        fetch: F,
    ) -> (Result<V, E>, CacheGetStatus)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        if let Some(value) = self.store.get(key) {
            #[cfg(feature = "stats")]
            self.stats.record_hit();
            return (Ok(value), CacheGetStatus::Hit);
        }

        let (fetch, status) = match self.pending.entry(key.to_string()) {
            Entry::Occupied(mut pending) => {
                let generation = self.store.generation();
                if pending.get().generation == generation {
                    (pending.get().fetch.clone(), CacheGetStatus::MissAlreadyLoading)
                } else {
                    // The pending fetch predates an invalidation
                    debug!(key, "superseding pending fetch started before invalidation");
                    let shared = self.start(key, fetch, generation);
                    pending.insert(PendingFetch {
                        fetch: shared.clone(),
                        generation,
                    });
                    (shared, CacheGetStatus::Miss)
                }
            }
            Entry::Vacant(vacant) => {
                // A fetch may have settled between the store check and taking
                // the entry lock.
                if let Some(value) = self.store.get(key) {
                    #[cfg(feature = "stats")]
                    self.stats.record_hit();
                    return (Ok(value), CacheGetStatus::Hit);
                }
                let generation = self.store.generation();
                let shared = self.start(key, fetch, generation);
                vacant.insert(PendingFetch {
                    fetch: shared.clone(),
                    generation,
                });
                (shared, CacheGetStatus::Miss)
            }
        };

        #[cfg(feature = "stats")]
        match status {
            CacheGetStatus::Miss => self.stats.record_miss(),
            _ => self.stats.record_coalesced(),
        }
        debug!(key, status = status.name(), "cache miss");

        (fetch.await, status)
    }

    /// Creates the shared fetch and spawns the task driving it to completion
    /// independently of the callers.
    fn start<F, Fut>(&self, key: &str, fetch: F, generation: u64) -> SharedFetch<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let shared = fetch().boxed().shared();
        let driven = shared.clone();
        let key = key.to_string();
        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(driven.clone()).catch_unwind().await;
            match outcome {
                Ok(Ok(value)) => {
                    if !store.set_if_generation(&key, value, generation) {
                        debug!(key = key.as_str(), "invalidated during fetch, result dropped");
                    }
                }
                Ok(Err(_)) => debug!(key = key.as_str(), "fetch failed, nothing cached"),
                Err(_) => warn!(key = key.as_str(), "fetch panicked, nothing cached"),
            }
            pending.remove_if(&key, |_, current| current.fetch.ptr_eq(&driven));
        });

        shared
    }

    /// Number of keys with a pending fetch.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    pub fn store(&self) -> &Arc<TtlStore<V>> {
        &self.store
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<V, E> fmt::Debug for Coordinator<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("in_flight", &self.pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn coordinator() -> Coordinator<u64, String> {
        Coordinator::new(Arc::new(TtlStore::new(Duration::from_secs(180))))
    }

    #[tokio::test]
    async fn test_hit_after_fetch() {
        let coordinator = coordinator();

        let (value, status) = coordinator
            .get_or_fetch_with_status("user_1", || async { Ok(1) })
            .await;
        assert_eq!(value, Ok(1));
        assert_eq!(status, CacheGetStatus::Miss);

        // The driver task stores the value before dropping the pending record
        while coordinator.in_flight() > 0 {
            tokio::task::yield_now().await;
        }

        let (value, status) = coordinator
            .get_or_fetch_with_status("user_1", || async { Ok(2) })
            .await;
        assert_eq!(value, Ok(1));
        assert_eq!(status, CacheGetStatus::Hit);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();

        let leader = {
            let calls = Arc::clone(&calls);
            coordinator.get_or_fetch_with_status("class_5", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = gate.await;
                Ok(5)
            })
        };
        let follower = {
            let calls = Arc::clone(&calls);
            coordinator.get_or_fetch_with_status("class_5", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(6)
            })
        };

        let releaser = async {
            tokio::task::yield_now().await;
            let _ = release.send(());
        };

        let ((a, a_status), (b, b_status), ()) = tokio::join!(leader, follower, releaser);
        assert_eq!(a, Ok(5));
        assert_eq!(b, Ok(5));
        assert_eq!(a_status, CacheGetStatus::Miss);
        assert_eq!(b_status, CacheGetStatus::MissAlreadyLoading);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_not_cached() {
        let coordinator = coordinator();

        let result = coordinator
            .get_or_fetch("attendance_session_3", || async { Err("offline".to_string()) })
            .await;
        assert_eq!(result, Err("offline".to_string()));

        while coordinator.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.store().get("attendance_session_3"), None);

        let (result, status) = coordinator
            .get_or_fetch_with_status("attendance_session_3", || async { Ok(3) })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(status, CacheGetStatus::Miss);
    }

    #[tokio::test]
    async fn test_read_after_invalidation_skips_older_fetch() {
        let coordinator = coordinator();
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();

        let older = {
            let calls = Arc::clone(&calls);
            coordinator.get_or_fetch_with_status("class_sessions_5", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = gate.await;
                Ok(2)
            })
        };
        let newer = async {
            while !coordinator.is_in_flight("class_sessions_5") {
                tokio::task::yield_now().await;
            }
            coordinator.store().delete("class_sessions_5");
            let calls = Arc::clone(&calls);
            let newer = coordinator
                .get_or_fetch_with_status("class_sessions_5", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(3)
                })
                .await;
            let _ = release.send(());
            newer
        };

        let ((a, a_status), (b, b_status)) = tokio::join!(older, newer);
        assert_eq!(a, Ok(2));
        assert_eq!(a_status, CacheGetStatus::Miss);
        assert_eq!(b, Ok(3));
        assert_eq!(b_status, CacheGetStatus::Miss);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        while coordinator.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.store().get("class_sessions_5"), Some(3));
    }

    #[cfg(feature = "stats")]
    #[tokio::test]
    async fn test_stats_buckets() {
        let coordinator = coordinator();
        coordinator.store().set("users", 9);

        let _ = coordinator.get_or_fetch("users", || async { Ok(0) }).await;
        let _ = coordinator.get_or_fetch("classes", || async { Ok(0) }).await;

        assert_eq!(coordinator.stats().hits(), 1);
        assert_eq!(coordinator.stats().misses(), 1);
        assert_eq!(coordinator.stats().coalesced(), 0);
    }
}
