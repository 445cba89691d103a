//! Millisecond clock with embedded-style wraparound.
//!
//! All timers in the detection core are stored as `u32` millisecond
//! stamps and compared with wrapping subtraction, so elapsed-time checks
//! stay correct across the ~49.7 day rollover.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Source of monotonic time and cooperative delays.
pub trait Clock {
    /// Milliseconds since an arbitrary origin. Wraps at `u32::MAX`.
    fn now_ms(&self) -> u32;

    /// Blocks the caller for `duration`.
    fn sleep(&self, duration: Duration);

    /// Milliseconds elapsed since `since`, safe across wraparound.
    fn elapsed_since(&self, since: u32) -> u32 {
        self.now_ms().wrapping_sub(since)
    }
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wraparound.
        self.origin.elapsed().as_millis() as u32
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Hand-driven clock for tests and simulation.
///
/// Clones share the same time source. `sleep` advances time instantly
/// and records the total slept so tests can assert on polling behaviour.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u32>>,
    slept: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock starting at `start_ms`.
    pub fn starting_at(start_ms: u32) -> Self {
        let clock = Self::default();
        clock.now.set(start_ms);
        clock
    }

    /// Moves time forward by `ms`, wrapping like the hardware counter.
    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    /// Total milliseconds spent in [`Clock::sleep`].
    pub fn total_slept_ms(&self) -> u64 {
        self.slept.get()
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        let ms = duration.as_millis().min(u128::from(u32::MAX)) as u32;
        self.advance(ms);
        self.slept.set(self.slept.get() + u64::from(ms));
    }
}
