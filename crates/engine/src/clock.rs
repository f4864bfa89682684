//! Clock abstraction for deterministic timing.
//!
//! All debounce, delayed-clear, and TTL math in the engine goes through
//! this trait. Production code uses `RealClock`; tests and the scripted
//! smoke scenario drive a `ManualClock` forward by hand.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Clock abstraction for testability.
///
/// The engine is single-threaded, so implementations do not need to be
/// thread-safe.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Real clock using std::time::Instant.
#[derive(Clone, Copy, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock.
///
/// Clones share the same underlying time, so a test can keep one copy and
/// hand another to a service, then call `advance` to move both forward.
#[derive(Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward by the given duration.
    pub fn advance(&self, duration: Duration) {
        self.offset.set(self.offset.get() + duration);
    }

    /// Move the clock forward by the given number of milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }
}
