//! Time source abstraction for the limiters.
//!
//! Every admission decision reads the current instant exactly once. Reading
//! the system clock directly inside the decision path would make the limiter
//! behavior untestable without real sleeps, so the instant is supplied by a
//! [`Clock`] held by each limiter instance.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// Return the current instant.
    fn now(&self) -> Instant;
}

/// Production clock backed by the monotonic system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Used by tests to simulate elapsed time deterministically. Time never moves
/// backwards; `advance` is the only mutation.
pub struct ManualClock {
    current: Mutex<Instant>,
}

impl ManualClock {
    /// Create a clock pinned to the current instant.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut current = self.current.lock();
        *current += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }
}
