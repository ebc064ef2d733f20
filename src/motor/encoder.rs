// Quadrature tick counters shared between the tick source and the control loop
//
// The tick source (encoder edge reader thread or simulated plant) only ever
// records edges. The control loop is the only reader and the only resetter,
// and it does both in a single atomic exchange so no edge can slip between
// the read and the reset. A tick source that dies marks its counters as
// faulted so the control loop stops trusting them.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Signed edge count for one wheel
#[derive(Debug, Default)]
pub struct TickCounter {
    ticks: AtomicI32,
    faulted: AtomicBool,
}

impl TickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one rising edge of channel A
    ///
    /// Channel B high means forward rotation, low means reverse, which gives a
    /// signed count without a separate direction flag.
    #[inline]
    pub fn record_edge(&self, phase_b_high: bool) {
        let step = if phase_b_high { 1 } else { -1 };
        self.ticks.fetch_add(step, Ordering::Relaxed);
    }

    /// Read the accumulated count and reset it to zero atomically
    pub fn take(&self) -> i32 {
        self.ticks.swap(0, Ordering::AcqRel)
    }

    /// Drop any accumulated count
    pub fn clear(&self) {
        self.ticks.store(0, Ordering::Release);
    }

    /// Current count without resetting (diagnostics only)
    pub fn peek(&self) -> i32 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Flag that no more edges will arrive; this never clears
    pub fn mark_faulted(&self) {
        self.faulted.store(true, Ordering::Release);
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }
}
