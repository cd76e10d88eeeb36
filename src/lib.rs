//!
//! A minimal spin flag: an atomic integer cell that serializes a critical section without ever
//! blocking the thread.
//!
//! Only worth it when the critical section is very short, otherwise use a real mutex.
//!

#[macro_use]
extern crate log;

/// Spin loop backoff
pub mod backoff;

/// Cpu detection for the backoff
pub mod cpu;

/// The raw flag and its scoped guard
pub mod flag;

/// Data guarded by a spin flag
pub mod lock;

pub use backoff::Backoff;
pub use flag::{LOCKED, SpinFlag, SpinFlagGuard, UNLOCKED};
pub use lock::{SpinLock, SpinLockGuard};
