//! # Classcache
//!
//! A client-side cache layer for a remote attendance API.
//!
//! UI code reads users, classes, sessions, attendance records and dashboards
//! through a [`CacheLayer`] instead of calling the API directly. The layer
//! keeps fetched views for a fixed TTL, merges concurrent requests for the
//! same view into one network call, and drops exactly the views a successful
//! write makes stale.
//!
//! ## Features
//!
//! - **TTL expiry**: Views older than the TTL (180 s by default) are refetched
//! - **Single-flight reads**: One fetch per key, shared by every concurrent reader
//! - **Write-then-invalidate**: Failed writes never touch the cache
//! - **Declarative rules**: One table maps each mutation to its stale views
//! - **Prefix invalidation**: Date-ranged dashboards are cleared by family
//!
//! ## Quick Start
//!
//! ```rust
//! use classcache::{CacheLayer, MutationContext, MutationKind, ViewKey};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache: CacheLayer<Vec<String>, String> = CacheLayer::new();
//!
//! // First read fetches, later reads within the TTL are served locally
//! let roster = cache
//!     .read(&ViewKey::ClassStudents(5), || async {
//!         Ok(vec!["Grace".to_string(), "Linus".to_string()])
//!     })
//!     .await;
//! assert_eq!(roster.map(|r| r.len()), Ok(2));
//!
//! // Removing a student stales the roster of class 5
//! let removed: Result<(), String> = cache
//!     .write(
//!         MutationKind::RemoveStudentFromClass,
//!         MutationContext::new().class(5).student(11),
//!         async { Ok(()) },
//!     )
//!     .await;
//! assert!(removed.is_ok());
//! assert_eq!(cache.peek(&ViewKey::ClassStudents(5)), None);
//! # }
//! ```
//!
//! ## Keys
//!
//! Views are stored under string keys such as `class_5` or
//! `dashboard_2024-01-01_2024-01-31`. [`ViewKey`] spells the standard ones;
//! anything implementing [`CacheableKey`] can be used as a key.

pub use classcache_async::{CacheGetStatus, CacheLayer, Coordinator};
pub use classcache_core::*;

/// Evaluate the standard rules for a mutation given by name
///
/// # Arguments
///
/// * `mutation` - The mutation name, e.g. `"createSession"`
/// * `context` - Ids of the mutated records
///
/// # Returns
///
/// The keys and prefixes the mutation makes stale
///
/// # Errors
///
/// [`CacheError::UnknownMutation`] if `mutation` names no known mutation
///
/// # Examples
///
/// ```rust
/// use classcache::{plan_for, MutationContext};
///
/// let plan = plan_for("updateAttendance", &MutationContext::new().session(12)).unwrap();
/// assert!(plan.covers("attendance_session_12"));
/// assert!(!plan.covers("attendance_session_13"));
///
/// assert!(plan_for("renameClass", &MutationContext::new()).is_err());
/// ```
pub fn plan_for(mutation: &str, context: &MutationContext) -> Result<InvalidationPlan> {
    let kind: MutationKind = mutation.parse()?;
    Ok(invalidations_for(kind, context))
}

/// Invalidate the views of a mutation given by name
///
/// For callers that performed the write themselves and only need the cache
/// brought up to date afterwards.
///
/// # Arguments
///
/// * `cache` - The cache layer to invalidate
/// * `mutation` - The mutation name, e.g. `"deleteClass"`
/// * `context` - Ids of the mutated records
///
/// # Returns
///
/// The number of entries removed
///
/// # Examples
///
/// ```rust
/// use classcache::{invalidate_after, CacheLayer, MutationContext};
///
/// let cache: CacheLayer<u64, String> = CacheLayer::new();
/// cache.prime("class_7", 7);
/// cache.prime("classes", 1);
///
/// let context = MutationContext::new().class(7);
/// let removed = invalidate_after(&cache, "deleteClass", &context).unwrap();
/// assert_eq!(removed, 2);
/// ```
pub fn invalidate_after<V, E>(
    cache: &CacheLayer<V, E>,
    mutation: &str,
    context: &MutationContext,
) -> Result<usize>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let kind: MutationKind = mutation.parse()?;
    Ok(cache.invalidate_for(kind, context))
}
