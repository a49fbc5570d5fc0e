//! Time sources
//!
//! The session never reads ambient time directly. Debounce deadlines and reply
//! deadlines use the monotonic reading; item save stamps use the wall reading.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Monotonic and wall-clock time source
pub trait Clock {
    /// Monotonic reading used for timers
    fn now(&self) -> Instant;

    /// Wall-clock reading used for item timestamps
    fn wall(&self) -> DateTime<Utc>;
}

/// Real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock
///
/// Clones share the same time, so a test can keep one handle and give another
/// to the session.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    elapsed: Rc<Cell<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock frozen at the current instant
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Create a clock whose wall reading starts at `wall_origin`
    pub fn starting_at(wall_origin: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
            elapsed: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move both readings forward
    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    /// Move forward to `offset` past the start, if not already beyond it
    pub fn advance_to(&self, offset: Duration) {
        if offset > self.elapsed.get() {
            self.elapsed.set(offset);
        }
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn wall(&self) -> DateTime<Utc> {
        // Durations far beyond chrono's range never occur under a manual clock
        self.wall_origin + chrono::Duration::from_std(self.elapsed.get()).unwrap_or(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_both_readings() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let w0 = clock.wall();

        clock.advance(Duration::from_millis(250));

        assert_eq!(clock.now() - t0, Duration::from_millis(250));
        assert_eq!((clock.wall() - w0).num_milliseconds(), 250);
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let handle = clock.clone();
        handle.advance(Duration::from_secs(1));
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
    }

    #[test]
    fn test_advance_to_never_goes_backwards() {
        let clock = ManualClock::new();
        clock.advance_to(Duration::from_millis(400));
        clock.advance_to(Duration::from_millis(100));
        assert_eq!(clock.elapsed(), Duration::from_millis(400));
    }
}
