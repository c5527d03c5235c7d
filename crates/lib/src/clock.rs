//! Time provider abstraction
//!
//! Snapshot creation times and control-layer reading timestamps come from a
//! [`Clock`], so tests can pin them while production code reads system time.
//!
//! # Example
//!
//! ```
//! use superscore::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let now = clock.now();
//! assert!(now.timestamp() > 0);
//! ```

use std::fmt::Debug;

use chrono::{DateTime, Utc};

#[cfg(any(test, feature = "testing"))]
use std::sync::{Mutex, PoisonError};

/// A source of wall-clock timestamps.
pub trait Clock: Send + Sync + Debug {
    /// The current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Production clock backed by [`chrono::Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests.
///
/// Time only moves when [`FixedClock::advance`] or [`FixedClock::set`] is
/// called, so every timestamp taken in between is identical.
///
/// ```
/// use chrono::Duration;
/// use superscore::{Clock, FixedClock};
///
/// let clock = FixedClock::default();
/// let t1 = clock.now();
/// assert_eq!(clock.now(), t1);
/// clock.advance(Duration::seconds(5));
/// assert_eq!(clock.now() - t1, Duration::seconds(5));
/// ```
#[cfg(any(test, feature = "testing"))]
pub struct FixedClock {
    at: Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "testing"))]
impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: Mutex::new(at) }
    }

    /// Creates a clock from milliseconds since the Unix epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self::new(DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.at.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

#[cfg(any(test, feature = "testing"))]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Default for FixedClock {
    fn default() -> Self {
        // 2024-01-01 00:00:00 UTC
        Self::from_millis(1_704_067_200_000)
    }
}

#[cfg(any(test, feature = "testing"))]
impl Debug for FixedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedClock")
            .field("at", &*self.at.lock().unwrap_or_else(PoisonError::into_inner))
            .finish()
    }
}
