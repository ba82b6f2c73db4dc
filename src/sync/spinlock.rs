// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Spinlock Implementation
//!
//! Busy-wait mutual exclusion across CPUs. Spinlocks never suspend the
//! caller: they protect the thread table and the sleep queue, which is what
//! suspension itself is built from.
//!
//! Callers protecting kernel structures take an
//! [`IrqGuard`](crate::platform::IrqGuard) first, so the holder cannot be
//! preempted on its own CPU while other CPUs spin.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Bare test-and-set flag with explicit acquire and release
pub struct RawSpinlock {
    locked: AtomicBool,
}

impl RawSpinlock {
    /// Create an unlocked flag
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }

    /// Spin until the flag is taken
    pub fn acquire(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Spin on a plain load to keep the cache line shared
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Release the flag.
    ///
    /// Releasing a flag that is not held is a fatal usage error.
    pub fn release(&self) {
        if !self.locked.swap(false, Ordering::Release) {
            crate::fatal!("spinlock released while not held");
        }
    }

    /// Check if the flag is currently held
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

impl Default for RawSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

/// A spinlock protecting a value
pub struct SpinMutex<T> {
    raw: RawSpinlock,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinMutex<T> {}
unsafe impl<T: Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    /// Create a new spinlock
    pub const fn new(data: T) -> Self {
        Self {
            raw: RawSpinlock::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, spinning until it becomes available
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        self.raw.acquire();
        SpinMutexGuard { mutex: self }
    }

    /// Check if the mutex is currently locked
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

impl<T: Default> Default for SpinMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// RAII guard for a SpinMutex
pub struct SpinMutexGuard<'a, T> {
    mutex: &'a SpinMutex<T>,
}

impl<'a, T> Drop for SpinMutexGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex.raw.release();
    }
}

impl<'a, T> Deref for SpinMutexGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T> DerefMut for SpinMutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

/// Name the sync primitives use for a [`SpinMutex`]
pub type SpinLock<T> = SpinMutex<T>;

/// Guard returned by [`SpinLock::lock`]
pub type SpinLockGuard<'a, T> = SpinMutexGuard<'a, T>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::vec::Vec;

    #[test]
    fn test_spinlock_basic() {
        let mutex = SpinMutex::new(42);
        {
            let mut guard = mutex.lock();
            assert_eq!(*guard, 42);
            *guard = 100;
        }
        assert_eq!(*mutex.lock(), 100);
    }

    #[test]
    fn test_spinlock_is_locked() {
        let mutex = SpinMutex::new(42);
        assert!(!mutex.is_locked());

        {
            let _guard = mutex.lock();
            assert!(mutex.is_locked());
        }

        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_raw_spinlock_acquire_release() {
        let raw = RawSpinlock::new();
        raw.acquire();
        assert!(raw.is_locked());
        raw.release();
        assert!(!raw.is_locked());
    }

    #[test]
    #[should_panic(expected = "spinlock released while not held")]
    fn test_raw_spinlock_release_unheld_is_fatal() {
        RawSpinlock::new().release();
    }

    #[test]
    fn test_spinlock_excludes_across_threads() {
        let counter = Arc::new(SpinMutex::new(0u64));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        let mut guard = counter.lock();
                        let seen = *guard;
                        core::hint::spin_loop();
                        *guard = seen + 1;
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(*counter.lock(), 40_000);
    }
}
