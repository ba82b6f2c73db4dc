// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Condition Variable
//!
//! Mesa semantics: `signal` only makes a waiter runnable, and by the time
//! it re-acquires the lock the predicate may be false again. Callers wait
//! in a loop:
//!
//! ```ignore
//! lock.acquire(kernel);
//! while !ready() {
//!     cond.wait(kernel, &lock);
//! }
//! lock.release(kernel);
//! ```

use crate::kernel::Kernel;
use crate::platform::{IrqGuard, Platform};
use crate::status::{KResult, KStatus};
use crate::sync::lock::Lock;
use crate::sync::sleep_queue::ResourceKey;
use crate::sync::spinlock::{SpinLock, SpinLockGuard};

/// Condition variable paired with a [`Lock`] at wait time
pub struct Condvar {
    /// Set when the registry slot is destroyed, cleared on reuse
    retired: SpinLock<bool>,
}

impl Condvar {
    /// Create a condition variable
    pub const fn new() -> Self {
        Self {
            retired: SpinLock::new(false),
        }
    }

    fn key(&self) -> ResourceKey {
        ResourceKey::of(self)
    }

    /// Release `lock`, sleep until signaled, then re-acquire `lock`.
    ///
    /// Waiting without holding `lock` is fatal.
    pub fn wait<P: Platform>(&self, kernel: &Kernel<P>, lock: &Lock) {
        match self.wait_checked(kernel, lock) {
            Ok(()) => {}
            Err(KStatus::ERR_ACCESS_DENIED) => crate::fatal!(
                "condvar {:#x}: wait by thread {} without holding lock {:#x}",
                self.key().raw(),
                kernel.current(),
                lock.key().raw()
            ),
            Err(status) => crate::fatal!("condvar {:#x}: wait failed with {}", self.key().raw(), status),
        }
    }

    /// [`Condvar::wait`], reporting a missing lock as `ERR_ACCESS_DENIED`
    /// and a destroyed condvar or lock as `ERR_NOT_FOUND`
    pub fn wait_checked<P: Platform>(&self, kernel: &Kernel<P>, lock: &Lock) -> KResult<()> {
        let irq = IrqGuard::new(kernel.platform());
        if !lock.is_held_by_current(kernel) {
            return Err(KStatus::ERR_ACCESS_DENIED);
        }
        let retired = self.retired.lock();
        if *retired {
            return Err(KStatus::ERR_NOT_FOUND);
        }
        kernel.sleep_on(&irq, self.key());
        drop(retired);
        lock.release(kernel);
        kernel.yield_locked(&irq);
        lock.acquire_checked(kernel)
    }

    /// Wake the longest waiter, if any
    pub fn signal<P: Platform>(&self, kernel: &Kernel<P>) {
        kernel.wake_one(self.key());
    }

    /// Wake every waiter
    pub fn broadcast<P: Platform>(&self, kernel: &Kernel<P>) {
        kernel.wake_all(self.key());
    }

    /// Number of threads waiting
    pub fn waiters<P: Platform>(&self, kernel: &Kernel<P>) -> usize {
        kernel.waiter_count(self.key())
    }

    /// Mark the condvar destroyed if nobody waits on it; the caller
    /// releases the registry slot before dropping the returned guard
    pub(crate) fn retire<P: Platform>(
        &self,
        kernel: &Kernel<P>,
    ) -> KResult<SpinLockGuard<'_, bool>> {
        let mut retired = self.retired.lock();
        if *retired {
            return Err(KStatus::ERR_NOT_FOUND);
        }
        if kernel.waiter_count(self.key()) > 0 {
            return Err(KStatus::ERR_BAD_STATE);
        }
        *retired = true;
        Ok(retired)
    }

    pub(crate) fn reset(&self) {
        *self.retired.lock() = false;
    }
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::platform::hosted::Hosted;

    fn kernel() -> Kernel<Hosted> {
        let k = Kernel::new(Hosted::new(), KernelConfig::new()).unwrap();
        k.boot_cpu(0);
        k
    }

    #[test]
    fn test_distinct_condvars_have_distinct_keys() {
        let pair = [Condvar::new(), Condvar::new()];
        assert_ne!(pair[0].key(), pair[1].key());
    }

    #[test]
    fn test_signal_without_waiters_is_noop() {
        let k = kernel();
        let cond = Condvar::new();
        cond.signal(&k);
        cond.broadcast(&k);
        assert_eq!(cond.waiters(&k), 0);
        assert!(k.ready_snapshot().is_empty());
    }

    #[test]
    fn test_wait_checked_requires_lock() {
        let k = kernel();
        let cond = Condvar::new();
        let lock = Lock::new();
        assert_eq!(cond.wait_checked(&k, &lock), Err(KStatus::ERR_ACCESS_DENIED));
    }

    #[test]
    fn test_retired_condvar_rejects_waiters() {
        let k = kernel();
        let cond = Condvar::new();
        let lock = Lock::new();
        drop(cond.retire(&k).unwrap());
        lock.acquire(&k);
        assert_eq!(cond.wait_checked(&k, &lock), Err(KStatus::ERR_NOT_FOUND));
        // The lock is still held after the refused wait
        assert!(lock.is_held_by_current(&k));
        assert_eq!(cond.retire(&k).err(), Some(KStatus::ERR_NOT_FOUND));
        cond.reset();
        assert!(cond.retire(&k).is_ok());
    }

    #[test]
    #[should_panic(expected = "without holding lock")]
    fn test_wait_without_lock_is_fatal() {
        let k = kernel();
        Condvar::new().wait(&k, &Lock::new());
    }
}
