//! # Classcache Async
//!
//! Async read-through cache layer for a remote attendance API.
//!
//! [`CacheLayer`] sits between UI code and a repository client. Reads are
//! served from a TTL store when possible and otherwise fetched once per key,
//! however many readers ask at the same time. Writes run the mutation first
//! and, only when it succeeds, drop the cached views the invalidation rules
//! name for that mutation.
//!
//! ## Features
//!
//! - **Single-flight fetches**: Concurrent misses on one key share a single fetch and its outcome
//! - **Fetches outlive callers**: A dropped reader does not cancel a fetch others may await
//! - **No failure caching**: Errors reach every waiter and the next read retries
//! - **Race-safe population**: A fetch that raced an invalidation does not store its value
//! - **Rule-driven invalidation**: Exact keys and prefixes per mutation kind
//! - **Batched reads**: [`CacheLayer::read_many`] bounds concurrency to `batch_size`
//! - **Statistics**: Hits, misses, coalesced reads and invalidated entries (`stats` feature)
//!
//! ## Quick Start
//!
//! ```rust
//! use classcache_async::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: CacheLayer<String, String> = CacheLayer::new();
//!
//! let class = cache
//!     .read(&ViewKey::Class(5), || async { Ok("Algebra".to_string()) })
//!     .await;
//! assert_eq!(class, Ok("Algebra".to_string()));
//!
//! let _ = cache
//!     .write(MutationKind::UpdateClass, MutationContext::new().class(5), async {
//!         Ok::<_, String>(())
//!     })
//!     .await;
//! assert_eq!(cache.peek(&ViewKey::Class(5)), None);
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! A [`CacheLayer`] is `Send + Sync` and is meant to be shared behind an
//! `Arc`. Reads must run inside a Tokio runtime because fetches are driven by
//! spawned tasks.

mod coordinator;
mod facade;

pub use coordinator::{CacheGetStatus, Coordinator};
pub use facade::CacheLayer;

pub use classcache_core::{
    invalidation, keys, CacheConfig, CacheError, CacheableKey, Clock, InvalidationPlan,
    InvalidationRules, MockClock, MutationContext, MutationKind, SystemClock, TtlStore, ViewKey,
};

#[cfg(feature = "stats")]
pub use classcache_core::CacheStats;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CacheConfig, CacheGetStatus, CacheLayer, CacheableKey, MutationContext, MutationKind,
        ViewKey,
    };

    #[cfg(feature = "stats")]
    pub use crate::CacheStats;
}
