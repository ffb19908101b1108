//! Read-through, write-invalidate facade.

use crate::coordinator::{CacheGetStatus, Coordinator};
use classcache_core::invalidation::{
    InvalidationPlan, InvalidationRules, MutationContext, MutationKind,
};
use classcache_core::{CacheConfig, CacheableKey, Clock, SystemClock, TtlStore};
use futures::future::join_all;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(feature = "stats")]
use classcache_core::CacheStats;

/// The cache layer placed between UI code and a remote repository.
///
/// Reads go through [`read`](Self::read): a stored value is returned
/// directly, otherwise the supplied fetch runs once per key no matter how
/// many readers ask concurrently. Writes go through [`write`](Self::write):
/// the mutation runs first and only when it succeeds are the views named by
/// the rule table dropped.
///
/// `V` is the cached value type, `E` the error type of fetches.
///
/// # Examples
///
/// ```rust
/// use classcache_async::CacheLayer;
/// use classcache_core::invalidation::{MutationContext, MutationKind};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache: CacheLayer<Vec<u64>, String> = CacheLayer::new();
///
/// let sessions = cache
///     .read("class_sessions_5", || async { Ok(vec![1, 2]) })
///     .await;
/// assert_eq!(sessions, Ok(vec![1, 2]));
///
/// let created: Result<u64, String> = cache
///     .write(
///         MutationKind::CreateSession,
///         MutationContext::new().class(5),
///         async { Ok(3) },
///     )
///     .await;
/// assert_eq!(created, Ok(3));
/// assert_eq!(cache.peek("class_sessions_5"), None);
/// # }
/// ```
pub struct CacheLayer<V, E> {
    store: Arc<TtlStore<V>>,
    coordinator: Coordinator<V, E>,
    rules: InvalidationRules,
    config: CacheConfig,
}

impl<V, E> CacheLayer<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// A layer with the default configuration and the standard rule table.
    pub fn new() -> Self {
        Self::build(CacheConfig::default(), Arc::new(SystemClock))
    }

    /// # Errors
    ///
    /// Fails if `config` does not validate.
    pub fn with_config(config: CacheConfig) -> classcache_core::Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Like [`with_config`](Self::with_config), aging entries with `clock`.
    pub fn with_clock(
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> classcache_core::Result<Self> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(TtlStore::with_clock(config.ttl, clock));
        Self {
            coordinator: Coordinator::new(Arc::clone(&store)),
            store,
            rules: InvalidationRules::standard().clone(),
            config,
        }
    }

    /// Replaces the rule table used by [`write`](Self::write).
    pub fn with_rules(mut self, rules: InvalidationRules) -> Self {
        self.rules = rules;
        self
    }

    /// Returns the cached value for `key` or fetches it.
    ///
    /// Concurrent reads of the same key share one fetch and one outcome. A
    /// failed fetch is returned to every waiter and nothing is stored.
    pub async fn read<K, F, Fut>(&self, key: &K, fetch: F) -> Result<V, E>
    where
        K: CacheableKey + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.coordinator
            .get_or_fetch(&key.to_cache_key(), fetch)
            .await
    }

    pub async fn read_with_status<K, F, Fut>(
        &self,
        key: &K,
        fetch: F,
    ) -> (Result<V, E>, CacheGetStatus)
    where
        K: CacheableKey + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        self.coordinator
            .get_or_fetch_with_status(&key.to_cache_key(), fetch)
            .await
    }

    /// Reads many keys, fetching at most `batch_size` of them concurrently.
    ///
    /// Results come back in the order of `keys`. One failed key does not
    /// affect the others.
    pub async fn read_many<K, F, Fut>(&self, keys: &[K], fetch: F) -> Vec<Result<V, E>>
    where
        K: CacheableKey,
        F: Fn(&str) -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let keys: Vec<String> = keys.iter().map(CacheableKey::to_cache_key).collect();
        let mut results = Vec::with_capacity(keys.len());

        for batch in keys.chunks(self.config.batch_size) {
            let reads = batch
                .iter()
                .map(|key| self.coordinator.get_or_fetch(key, || fetch(key.as_str())));
            results.extend(join_all(reads).await);
        }

        results
    }

    /// Runs `mutation` and, if it succeeds, drops every view the rule for
    /// `kind` names.
    ///
    /// A failed mutation leaves the store untouched and its error is returned
    /// unchanged.
    pub async fn write<T, WE, Fut>(
        &self,
        kind: MutationKind,
        context: MutationContext,
        mutation: Fut,
    ) -> Result<T, WE>
    where
        Fut: Future<Output = Result<T, WE>>,
    {
        self.write_with(kind, context, mutation, |context, _| context).await
    }

    /// Like [`write`](Self::write), letting `refine` add ids found in the
    /// mutation result to `context`, e.g. the class of a session the server
    /// just created.
    pub async fn write_with<T, WE, Fut, R>(
        &self,
        kind: MutationKind,
        context: MutationContext,
        mutation: Fut,
        refine: R,
    ) -> Result<T, WE>
    where
        Fut: Future<Output = Result<T, WE>>,
        R: FnOnce(MutationContext, &T) -> MutationContext,
    {
        let output = match mutation.await {
            Ok(output) => output,
            Err(err) => {
                debug!(mutation = %kind, "mutation failed, cache left untouched");
                return Err(err);
            }
        };

        let context = refine(context, &output);
        self.invalidate_for(kind, &context);
        Ok(output)
    }

    /// Applies the rule for `kind` without running a mutation. Returns the
    /// number of entries removed.
    pub fn invalidate_for(&self, kind: MutationKind, context: &MutationContext) -> usize {
        let plan = self.rules.invalidations_for(kind, context);
        // Rule tables are validated on construction, so plans never carry an
        // empty prefix.
        match self.invalidate_plan(&plan) {
            Ok(removed) => {
                debug!(mutation = %kind, removed, "invalidated after mutation");
                removed
            }
            Err(err) => {
                warn!(mutation = %kind, %err, "invalidation plan rejected");
                0
            }
        }
    }

    /// Removes every key and prefix of `plan` under one lock.
    ///
    /// # Errors
    ///
    /// [`CacheError::EmptyPrefix`](classcache_core::CacheError::EmptyPrefix)
    /// if any prefix is empty; nothing is removed in that case.
    pub fn invalidate_plan(&self, plan: &InvalidationPlan) -> classcache_core::Result<usize> {
        let removed = self.store.delete_many(&plan.exact_keys, &plan.prefixes)?;
        #[cfg(feature = "stats")]
        self.coordinator.stats().record_invalidated(removed);
        Ok(removed)
    }

    /// Drops `key`. Returns whether it was present.
    pub fn invalidate<K: CacheableKey + ?Sized>(&self, key: &K) -> bool {
        let removed = self.store.delete(&key.to_cache_key());
        #[cfg(feature = "stats")]
        self.coordinator.stats().record_invalidated(usize::from(removed));
        removed
    }

    /// Drops every key starting with `prefix`.
    ///
    /// # Errors
    ///
    /// [`CacheError::EmptyPrefix`](classcache_core::CacheError::EmptyPrefix)
    /// for an empty prefix; use [`clear`](Self::clear) to drop everything.
    pub fn invalidate_by_prefix(&self, prefix: &str) -> classcache_core::Result<usize> {
        let removed = self.store.delete_by_prefix(prefix)?;
        #[cfg(feature = "stats")]
        self.coordinator.stats().record_invalidated(removed);
        Ok(removed)
    }

    /// Drops every entry, e.g. on logout.
    pub fn clear(&self) -> usize {
        let removed = self.store.clear();
        info!(removed, "cache cleared");
        #[cfg(feature = "stats")]
        self.coordinator.stats().record_invalidated(removed);
        removed
    }

    /// The stored value for `key`, without fetching.
    pub fn peek<K: CacheableKey + ?Sized>(&self, key: &K) -> Option<V> {
        self.store.get(&key.to_cache_key())
    }

    /// Stores `value` under `key` as if it had just been fetched.
    pub fn prime<K: CacheableKey + ?Sized>(&self, key: &K, value: V) {
        self.store.set(&key.to_cache_key(), value);
    }

    /// Number of keys with a fetch in flight.
    pub fn in_flight(&self) -> usize {
        self.coordinator.in_flight()
    }

    pub fn store(&self) -> &TtlStore<V> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn rules(&self) -> &InvalidationRules {
        &self.rules
    }

    #[cfg(feature = "stats")]
    pub fn stats(&self) -> &CacheStats {
        self.coordinator.stats()
    }
}

impl<V, E> Default for CacheLayer<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for CacheLayer<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLayer")
            .field("config", &self.config)
            .field("entries", &self.store.len())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
