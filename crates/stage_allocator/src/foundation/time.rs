//! Time management utilities
//!
//! Stages stamp their creation time from a [`Clock`]. The default clock
//! measures seconds since it was created; tests substitute a
//! [`SteppedClock`] to get predictable timestamps.

use std::cell::Cell;
use std::time::Instant;

/// Source of monotonic timestamps, in seconds
pub trait Clock {
    /// Current timestamp; never decreases between calls
    fn now(&self) -> f64;
}

/// Wall-clock backed monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Create a clock whose zero is the moment of creation
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Deterministic clock that advances by a fixed step on every read
#[derive(Debug)]
pub struct SteppedClock {
    next: Cell<f64>,
    step: f64,
}

impl SteppedClock {
    /// Create a clock returning `start`, `start + step`, `start + 2 * step`, ...
    pub fn new(start: f64, step: f64) -> Self {
        Self {
            next: Cell::new(start),
            step,
        }
    }
}

impl Clock for SteppedClock {
    fn now(&self) -> f64 {
        let current = self.next.get();
        self.next.set(current + self.step);
        current
    }
}
