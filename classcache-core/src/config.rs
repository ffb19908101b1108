//! Cache layer configuration.

use crate::error::{CacheError, Result};
use std::time::Duration;
use tracing::debug;

/// Time-to-live applied to every entry unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(180);

/// Number of keys fetched concurrently per batch by batched reads.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Environment variable overriding the TTL, in whole seconds.
pub const TTL_ENV: &str = "CLASSCACHE_TTL_SECS";

/// Environment variable overriding the batch size.
pub const BATCH_SIZE_ENV: &str = "CLASSCACHE_BATCH_SIZE";

/// Tunables of a cache layer.
///
/// # Examples
///
/// ```
/// use classcache_core::CacheConfig;
/// use std::time::Duration;
///
/// let config = CacheConfig::default().with_ttl(Duration::from_secs(60));
/// assert_eq!(config.ttl, Duration::from_secs(60));
/// assert_eq!(config.batch_size, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum age of a readable entry.
    pub ttl: Duration,
    /// Concurrency of each batch in batched reads. Must be at least 1.
    pub batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CacheError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds a configuration from the defaults overridden by
    /// `CLASSCACHE_TTL_SECS` and `CLASSCACHE_BATCH_SIZE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(TTL_ENV) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                CacheError::InvalidConfig(format!("{TTL_ENV}={raw:?} is not a number of seconds"))
            })?;
            config.ttl = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(BATCH_SIZE_ENV) {
            config.batch_size = raw.trim().parse().map_err(|_| {
                CacheError::InvalidConfig(format!("{BATCH_SIZE_ENV}={raw:?} is not a count"))
            })?;
        }

        config.validate()?;
        debug!(
            ttl_secs = config.ttl.as_secs(),
            batch_size = config.batch_size,
            "cache config loaded"
        );
        Ok(config)
    }
}
