// src/monitor/clock.rs

//! Clock abstraction for schedule and quiet-hours decisions.
//!
//! The quiet-hours gate is a pure predicate over the clock's local hour,
//! decoupled from recurrence computation, so tests inject a fixed clock.

use chrono::{DateTime, Local, Timelike, Utc};

/// Source of time for the scheduler.
pub trait Clock: Send + Sync {
    /// Current instant, used for recurrence computation.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current local hour of day (0-23), used for the quiet-hours gate.
    fn local_hour(&self) -> u32;
}

/// Wall-clock implementation.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// Whether `hour` falls inside the allowed daily window `[start, end)`.
pub fn within_active_window(hour: u32, start: u32, end: u32) -> bool {
    (start..end).contains(&hour)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        assert!(!within_active_window(5, 6, 22));
        assert!(within_active_window(6, 6, 22));
        assert!(within_active_window(21, 6, 22));
        assert!(!within_active_window(22, 6, 22));
        assert!(!within_active_window(23, 6, 22));
    }

    #[test]
    fn test_system_clock_hour_in_range() {
        assert!(SystemClock.local_hour() < 24);
    }
}
