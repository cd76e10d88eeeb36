//! Exponential backoff for spin loops.
//!
//! Spins with [`core::hint::spin_loop`] for a doubling number of iterations, then falls back to
//! [`std::thread::yield_now`] once contention persists. The thread is never parked.

use std::{cell::Cell, hint::spin_loop};

use crate::cpu;

/// Default step after which spinning turns into yielding.
pub const SPIN_LIMIT: u32 = 6;

/// Default step at which the backoff stops growing.
pub const YIELD_LIMIT: u32 = 10;

/// Largest spin step, `1 << step` must fit in a u32.
pub const MAX_SPIN_LIMIT: u32 = 31;

/// Per-waiter backoff state. Create one per wait loop, it is not meant to be shared.
///
/// ```
/// use spin_flag::{Backoff, SpinFlag};
///
/// let flag = SpinFlag::new();
/// let backoff = Backoff::new();
/// while !flag.try_acquire() {
///     backoff.snooze();
/// }
/// flag.release();
/// ```
pub struct Backoff {
    step: Cell<u32>,
    spin_limit: u32,
    yield_limit: u32,
}

impl Backoff {
    #[inline]
    pub const fn new() -> Self {
        Self::with_limits(SPIN_LIMIT, YIELD_LIMIT)
    }

    /// `spin_limit`: steps spent busy-spinning (step `n` spins `1 << n` times), capped at
    /// [`MAX_SPIN_LIMIT`].
    ///
    /// `yield_limit`: the step count is capped here, [`Backoff::is_completed`] turns true once it
    /// is reached.
    #[inline]
    pub const fn with_limits(spin_limit: u32, yield_limit: u32) -> Self {
        let spin_limit = if spin_limit > MAX_SPIN_LIMIT { MAX_SPIN_LIMIT } else { spin_limit };
        let yield_limit = if yield_limit < spin_limit { spin_limit } else { yield_limit };
        Self { step: Cell::new(0), spin_limit, yield_limit }
    }

    /// Wait once. Spins while still in the spinning phase, yields to the scheduler after it.
    #[inline]
    pub fn snooze(&self) {
        let step = self.step.get();
        if step <= self.spin_limit && cpu::spinning_pays_off() {
            for _ in 0..(1u32 << step) {
                spin_loop();
            }
        } else {
            std::thread::yield_now();
        }
        if step < self.yield_limit {
            self.step.set(step + 1);
        }
    }

    /// True when the backoff has stopped growing, callers may want to log or give up.
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.step.get() >= self.yield_limit
    }

    #[inline]
    pub fn step(&self) -> u32 {
        self.step.get()
    }

    #[inline]
    pub fn spin_limit(&self) -> u32 {
        self.spin_limit
    }

    #[inline]
    pub fn reset(&self) {
        self.step.set(0);
    }

    /// Jump to `step`, e.g. to resume a backoff that was already known to be contended.
    #[inline]
    pub fn reset_to(&self, step: u32) {
        self.step.set(step.min(self.yield_limit));
    }
}

impl Default for Backoff {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
