//! The spin flag itself.
//!
//! A [`SpinFlag`] is an integer cell holding [`UNLOCKED`] or [`LOCKED`], meant to be embedded as a
//! field of whatever structure it guards. Acquiring is a compare-and-swap, releasing is an atomic
//! decrement, and nothing ever parks the calling thread.
//!
//! ```
//! use spin_flag::SpinFlag;
//!
//! static FLAG: SpinFlag = SpinFlag::new();
//!
//! assert!(FLAG.try_acquire());
//! assert!(FLAG.is_locked());
//! assert!(!FLAG.try_acquire());
//! FLAG.release();
//! assert!(FLAG.is_unlocked());
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicI32, Ordering},
    time::{Duration, Instant},
};

use crate::backoff::Backoff;

pub const UNLOCKED: i32 = 0;
pub const LOCKED: i32 = 1;

pub struct SpinFlag(AtomicI32);

impl SpinFlag {
    #[inline]
    pub const fn new() -> Self {
        Self(AtomicI32::new(UNLOCKED))
    }

    /// Single attempt to go from [`UNLOCKED`] to [`LOCKED`].
    ///
    /// Returns true when the caller now holds the flag. On false the cell is untouched.
    #[inline(always)]
    pub fn try_acquire(&self) -> bool {
        self.try_set_state(UNLOCKED, LOCKED)
    }

    /// Spin until the flag is held.
    ///
    /// Never times out. A flag that is never released (or was corrupted by a mismatched
    /// [`release`](Self::release)) keeps the caller spinning forever. Use
    /// [`try_acquire_for`](Self::try_acquire_for) when waiting must be bounded.
    #[inline]
    pub fn acquire(&self) {
        if !self.try_acquire() {
            self.acquire_contended();
        }
    }

    #[cold]
    fn acquire_contended(&self) {
        let backoff = Backoff::new();
        let mut logged = false;
        loop {
            while !self.is_unlocked() {
                backoff.snooze();
                if !logged && backoff.is_completed() {
                    trace!("spin flag {:p} contended, yielding", self);
                    logged = true;
                }
            }
            if self.try_acquire() {
                return;
            }
        }
    }

    /// At most `spins` attempts, backing off between them.
    pub fn try_acquire_spins(&self, spins: usize) -> bool {
        let backoff = Backoff::new();
        for _ in 0..spins {
            if self.try_acquire() {
                return true;
            }
            backoff.snooze();
        }
        debug!("spin flag {:p} not acquired after {} spins", self, spins);
        false
    }

    /// Spin until the flag is held or `timeout` has passed. Always makes at least one attempt.
    ///
    /// A timeout too large to be represented as a deadline waits like [`acquire`](Self::acquire).
    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        if self.try_acquire() {
            return true;
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.acquire_contended();
            return true;
        };
        let backoff = Backoff::new();
        loop {
            if Instant::now() >= deadline {
                debug!("spin flag {:p} not acquired within {:?}", self, timeout);
                return false;
            }
            backoff.snooze();
            if self.try_acquire() {
                return true;
            }
        }
    }

    /// Give the flag up by decrementing the cell.
    ///
    /// The caller must hold the flag. Releasing a flag that is not held is not caught: the cell
    /// goes below [`UNLOCKED`] and stays there, so every later acquire fails. It is logged but
    /// not repaired.
    #[inline]
    pub fn release(&self) {
        let prev = self.0.fetch_sub(1, Ordering::Release);
        if prev != LOCKED {
            self.released_unheld(prev);
        }
    }

    #[cold]
    fn released_unheld(&self, prev: i32) {
        warn!("spin flag {:p} released while not held, state {} -> {}", self, prev, prev.wrapping_sub(1));
    }

    #[inline(always)]
    pub fn is_locked(&self) -> bool {
        self.is_state_expected(LOCKED)
    }

    #[inline(always)]
    pub fn is_unlocked(&self) -> bool {
        self.is_state_expected(UNLOCKED)
    }

    #[inline(always)]
    pub fn is_state_expected(&self, expected: i32) -> bool {
        self.state() == expected
    }

    #[inline(always)]
    pub fn is_state_not_equal_to(&self, forbidden: i32) -> bool {
        self.state() != forbidden
    }

    /// Raw value of the cell. Only [`UNLOCKED`] and [`LOCKED`] appear under correct use.
    #[inline(always)]
    pub fn state(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    /// Compare-and-swap `expected` to `new`, true if the swap happened.
    ///
    /// Nothing stops `new` from being outside [`UNLOCKED`]/[`LOCKED`], keeping the cell legal is
    /// on the caller.
    #[inline(always)]
    pub fn try_set_state(&self, expected: i32, new: i32) -> bool {
        self.0.compare_exchange(expected, new, Ordering::Acquire, Ordering::Relaxed).is_ok()
    }

    /// Acquire and return a guard that releases on drop.
    #[inline]
    pub fn lock(&self) -> SpinFlagGuard<'_> {
        self.acquire();
        SpinFlagGuard { flag: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinFlagGuard<'_>> {
        if self.try_acquire() { Some(SpinFlagGuard { flag: self }) } else { None }
    }

    /// Run `f` while holding the flag. The flag is released even if `f` panics.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock();
        f()
    }
}

impl Default for SpinFlag {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpinFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SpinFlag").field(&self.state()).finish()
    }
}

/// Holds a [`SpinFlag`] and releases it when dropped, on every exit path including unwinding.
#[must_use = "the flag is released as soon as the guard is dropped"]
pub struct SpinFlagGuard<'a> {
    flag: &'a SpinFlag,
}

impl<'a> SpinFlagGuard<'a> {
    #[inline]
    pub fn flag(&self) -> &'a SpinFlag {
        self.flag
    }
}

impl Drop for SpinFlagGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.flag.release();
    }
}
