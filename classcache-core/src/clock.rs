//! Monotonic time sources for TTL checks.

use parking_lot::RwLock;
use std::fmt::Debug;
use std::time::{Duration, Instant};

/// Source of monotonic instants used to stamp and age cache entries.
pub trait Clock: Debug + Send + Sync + 'static {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// A [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually driven [`Clock`] for tests.
///
/// Time only moves when [`MockClock::advance`] is called.
///
/// # Examples
///
/// ```
/// use classcache_core::{Clock, MockClock};
/// use std::time::Duration;
///
/// let clock = MockClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(181));
/// assert_eq!(clock.now() - start, Duration::from_secs(181));
/// ```
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<Instant>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now: RwLock::new(Instant::now()),
        }
    }

    /// Moves the clock forward and returns the new instant.
    pub fn advance(&self, duration: Duration) -> Instant {
        let mut now = self.now.write();
        *now += duration;
        *now
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_is_frozen_until_advanced() {
        let clock = MockClock::new();
        let t0 = clock.now();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(clock.now(), t0);

        let t1 = clock.advance(Duration::from_millis(250));
        assert_eq!(t1 - t0, Duration::from_millis(250));
        assert_eq!(clock.now(), t1);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
