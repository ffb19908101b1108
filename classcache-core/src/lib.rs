//! # Classcache Core
//!
//! Synchronous building blocks of the classcache client-side cache layer.
//!
//! This crate holds everything that does not need an async runtime: the TTL
//! store, its prefix index, the key naming convention and the declarative
//! invalidation rules. Request coalescing and the read-through facade live in
//! `classcache-async`.
//!
//! ## Features
//!
//! - **Lazy TTL Expiry**: Entries older than the TTL are invisible and dropped on read
//! - **Prefix Invalidation**: Ordered key index, so prefix deletes never scan the whole map
//! - **Generation Tracking**: Lets writers detect invalidations that raced their fetch
//! - **Declarative Rules**: A static table maps each mutation to the views it stales
//! - **Injectable Clock**: Deterministic expiry tests through [`MockClock`]
//!
//! ## Module Organization
//!
//! - [`ttl_store`] - Concurrent key-value map with lazy expiry
//! - [`cache_entry`] - Stored value with its insertion instant
//! - [`keys`] - View keys and prefixes of the attendance API
//! - [`invalidation`] - Mutation kinds, contexts and the rule table
//! - [`config`] - TTL and batch size, from code or the environment
//!
//! ## Example
//!
//! ```rust
//! use classcache_core::invalidation::{invalidations_for, MutationContext, MutationKind};
//! use classcache_core::TtlStore;
//! use std::time::Duration;
//!
//! let store = TtlStore::new(Duration::from_secs(180));
//! store.set("class_sessions_5", vec![1, 2, 3]);
//! store.set("dashboard_2024-01-01_2024-01-31", vec![42]);
//! store.set("users", vec![7]);
//!
//! let plan = invalidations_for(MutationKind::CreateSession, &MutationContext::new().class(5));
//! store.delete_many(&plan.exact_keys, &plan.prefixes).unwrap();
//!
//! assert_eq!(store.get("class_sessions_5"), None);
//! assert_eq!(store.get("dashboard_2024-01-01_2024-01-31"), None);
//! assert_eq!(store.get("users"), Some(vec![7]));
//! ```

pub mod cache_entry;
mod clock;
pub mod config;
mod error;
pub mod invalidation;
pub mod keys;
mod prefix_index;
pub mod ttl_store;

#[cfg(feature = "stats")]
mod stats;

pub use cache_entry::CacheEntry;
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{CacheConfig, BATCH_SIZE_ENV, DEFAULT_BATCH_SIZE, DEFAULT_TTL, TTL_ENV};
pub use error::{CacheError, Result};
pub use invalidation::{
    invalidations_for, InvalidationPlan, InvalidationRule, InvalidationRules, MutationContext,
    MutationKind,
};
pub use keys::{CacheableKey, ViewKey};
pub use prefix_index::PrefixIndex;
pub use ttl_store::TtlStore;

#[cfg(feature = "stats")]
pub use stats::CacheStats;
