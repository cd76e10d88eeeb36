use std::{
    cell::UnsafeCell,
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    time::Duration,
};

use crate::flag::SpinFlag;

/// Data guarded by an embedded [`SpinFlag`].
///
/// ```
/// use spin_flag::SpinLock;
///
/// static COUNTER: SpinLock<u64> = SpinLock::new(0);
///
/// *COUNTER.lock() += 1;
/// assert_eq!(COUNTER.with_lock(|v| *v), 1);
/// ```
pub struct SpinLock<T> {
    flag: SpinFlag,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self { flag: SpinFlag::new(), data: UnsafeCell::new(data) }
    }

    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.flag.acquire();
        self.guard()
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if self.flag.try_acquire() { Some(self.guard()) } else { None }
    }

    #[inline]
    pub fn try_lock_for(&self, timeout: Duration) -> Option<SpinLockGuard<'_, T>> {
        if self.flag.try_acquire_for(timeout) { Some(self.guard()) } else { None }
    }

    /// Caller must hold the flag.
    #[inline(always)]
    fn guard(&self) -> SpinLockGuard<'_, T> {
        SpinLockGuard { lock: self, _marker: PhantomData }
    }

    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut *guard)
    }

    /// Snapshot only, may be stale by the time it is acted on.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.flag.is_locked()
    }

    /// No locking needed, `&mut self` already proves exclusive access.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for SpinLock<T> {
    #[inline]
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock").field("flag", &self.flag).finish_non_exhaustive()
    }
}

/// Exclusive access to the data of a [`SpinLock`], released on drop.
///
/// Sharing the guard shares `&T`, so it is only `Sync` when `T` is:
///
/// ```compile_fail
/// use std::cell::Cell;
/// use spin_flag::SpinLockGuard;
///
/// fn assert_sync<T: Sync>() {}
/// assert_sync::<SpinLockGuard<'static, Cell<i32>>>();
/// ```
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    _marker: PhantomData<&'a mut T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        // the guard exists only while the flag is held
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.flag.release();
    }
}

#[cfg(test)]
mod tests {

    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use super::*;

    #[test]
    fn test_lock_guard() {
        let lock = SpinLock::new(10);
        {
            let mut guard = lock.lock();
            *guard += 5;
            assert_eq!(*guard, 15);
            assert!(lock.is_locked());
            assert!(lock.try_lock().is_none());
        }
        assert!(!lock.is_locked());
        assert_eq!(lock.with_lock(|v| *v), 15);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_lock_for() {
        let lock = SpinLock::new(42);
        let guard = lock.lock();
        assert!(lock.try_lock_for(Duration::from_millis(10)).is_none());
        drop(guard);
        let guard = lock.try_lock_for(Duration::from_millis(10));
        assert_eq!(guard.as_deref(), Some(&42));
    }

    #[test]
    fn test_guard_sync_follows_data() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<SpinLockGuard<'static, u64>>();
        assert_sync::<SpinLockGuard<'static, Vec<u32>>>();
    }

    #[test]
    fn test_try_lock_for_released_while_waiting() {
        let _ = captains_log::recipe::stderr_test_logger(log::Level::Debug).build();
        let lock = SpinLock::new(0u32);
        let guard = lock.lock();
        thread::scope(|s| {
            let waiter = s.spawn(|| {
                let start = Instant::now();
                let got = lock.try_lock_for(Duration::from_secs(5)).map(|mut g| {
                    *g += 1;
                    *g
                });
                (got, start.elapsed())
            });
            thread::sleep(Duration::from_millis(20));
            drop(guard);
            let (got, waited) = waiter.join().unwrap();
            log::info!("waiter got in after {:?}", waited);
            assert_eq!(got, Some(1));
            assert!(waited < Duration::from_secs(5));
        });
        assert!(!lock.is_locked());
        assert_eq!(lock.into_inner(), 1);
    }

    #[test]
    fn test_get_mut_into_inner() {
        let mut lock = SpinLock::<Vec<u32>>::default();
        lock.get_mut().push(1);
        lock.lock().push(2);
        assert_eq!(lock.into_inner(), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_counter() {
        let _ = captains_log::recipe::stderr_test_logger(log::Level::Debug).build();
        let lock = Arc::new(SpinLock::new(0usize));
        let mut th_s = Vec::new();
        for _ in 0..8 {
            let _lock = lock.clone();
            th_s.push(thread::spawn(move || {
                for _ in 0..10_000 {
                    *_lock.lock() += 1;
                }
            }));
        }
        for th in th_s {
            th.join().unwrap();
        }
        assert_eq!(*lock.lock(), 8 * 10_000);
        println!("{:?}", lock);
    }
}
