//! Wall-clock time source.
//!
//! The engine never reads the system clock itself. Every timed operation
//! receives `now` from the caller, and all progression is derived from
//! differences between stored timestamps and that value. Hosts pick a
//! [`Clock`] implementation to produce those timestamps.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Milliseconds in one second.
pub const MS_PER_SECOND: u64 = 1_000;

/// Milliseconds in one minute.
pub const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;

/// Milliseconds in one hour.
pub const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;

/// Milliseconds in one day.
pub const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Source of "now" for a host driving the engine.
pub trait Clock {
    /// Current wall-clock time in epoch milliseconds.
    fn now(&self) -> Timestamp;
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as Timestamp)
    }
}

/// A clock that only moves when told to.
///
/// Used by headless runs and tests to simulate arbitrary elapsed time.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }

    /// Jump to an absolute time.
    pub fn set(&self, at: Timestamp) {
        self.now.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.get()
    }
}

/// Whole seconds remaining until `end`, rounded up.
#[must_use]
pub fn remaining_secs(end: Timestamp, now: Timestamp) -> u64 {
    end.saturating_sub(now).div_ceil(MS_PER_SECOND)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        clock.advance(MS_PER_MINUTE);
        assert_eq!(clock.now(), 61_000);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn test_remaining_secs_rounds_up() {
        assert_eq!(remaining_secs(10_001, 0), 11);
        assert_eq!(remaining_secs(10_000, 0), 10);
        assert_eq!(remaining_secs(10, 20), 0);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now() > 1_600_000_000_000);
    }
}
