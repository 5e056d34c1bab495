//! Injectable time source.
//!
//! Every timestamp the store writes, and every expiry it checks, goes
//! through a [`Clock`]. Production uses [`SystemClock`]; tests use
//! [`ManualClock`] to move time forward without sleeping.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// A source of "now".
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// ```rust
/// use std::time::Duration;
/// use rallypoint_room::{Clock, ManualClock};
///
/// let clock = ManualClock::default();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(90));
/// assert_eq!((clock.now() - start).num_seconds(), 90);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = add_duration(*now, by);
    }
}

impl Default for ManualClock {
    /// Starts at a fixed, millisecond-aligned instant so stored and
    /// in-memory timestamps compare equal.
    fn default() -> Self {
        Self::new(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `at + by`, saturating at the largest representable instant.
pub(crate) fn add_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `at - by`, saturating at the smallest representable instant.
pub(crate) fn sub_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| at.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance_moves_time() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::from_millis(1500));
        assert_eq!((clock.now() - start).num_milliseconds(), 1500);
    }

    #[test]
    fn test_manual_clock_set_overrides() {
        let clock = ManualClock::default();
        let later = clock.now() + TimeDelta::hours(2);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_add_duration_saturates() {
        let at = DateTime::<Utc>::MAX_UTC - TimeDelta::seconds(1);
        assert_eq!(add_duration(at, Duration::from_secs(3600)), DateTime::<Utc>::MAX_UTC);
    }
}
