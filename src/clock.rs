// Millisecond monotonic timestamps
//
// Timestamps are a wrapping u32 millisecond count. Elapsed time is always
// computed with wrapping subtraction, so a rollover of the counter (every
// ~49.7 days) never produces spurious staleness or false freshness.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// A reading of a monotonic millisecond clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Millis(pub u32);

impl Millis {
    /// Milliseconds from `earlier` to `self`, wraparound-safe
    pub fn since(self, earlier: Millis) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Seconds from `earlier` to `self`
    pub fn seconds_since(self, earlier: Millis) -> f32 {
        self.since(earlier) as f32 / 1000.0
    }
}

/// Source of monotonic time for the control core
pub trait Clock {
    fn now(&self) -> Millis;
}

/// Production clock, milliseconds since construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Millis {
        // Truncation to u32 is the intended wraparound
        Millis(self.origin.elapsed().as_millis() as u32)
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn starting_at(ms: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(ms)),
        }
    }

    pub fn advance(&self, ms: u32) {
        // fetch_add wraps on overflow, like the hardware counter
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        Millis(self.now.load(Ordering::SeqCst))
    }
}
