//! Error types for the cache layer.
//!
//! Only configuration mistakes are errors here. Failures of the remote
//! repository are never converted into a [`CacheError`]; they travel back to
//! the caller in whatever error type the caller's closure produced.

use thiserror::Error;

/// Errors raised by the cache layer itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A prefix invalidation was requested with an empty prefix.
    ///
    /// An empty prefix matches every key, so it would silently clear the
    /// whole store. Use `clear()` when that is what you want.
    #[error("empty prefix rejected for prefix invalidation; use clear() to drop every entry")]
    EmptyPrefix,

    /// A mutation name did not match any known mutation kind.
    #[error("unknown mutation `{0}`")]
    UnknownMutation(String),

    /// A configuration value is out of range or unparsable.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the core crate.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CacheError::UnknownMutation("renameClass".to_string()).to_string(),
            "unknown mutation `renameClass`"
        );
        assert!(CacheError::EmptyPrefix.to_string().contains("clear()"));
        assert_eq!(
            CacheError::InvalidConfig("batch_size must be > 0".to_string()).to_string(),
            "invalid cache configuration: batch_size must be > 0"
        );
    }
}
