// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Sleeping Lock
//!
//! Mutual exclusion for critical sections that may block. Contenders sleep
//! on the lock's address instead of spinning. A woken contender re-checks
//! the lock before taking it; being woken is not ownership.

use crate::kernel::Kernel;
use crate::platform::{IrqGuard, Platform};
use crate::sched::thread::{ThreadId, NO_THREAD};
use crate::status::{KResult, KStatus};
use crate::sync::sleep_queue::ResourceKey;
use crate::sync::spinlock::{SpinLock, SpinLockGuard};

/// Holder and liveness, guarded together
pub(crate) struct LockState {
    /// Holding thread, `NO_THREAD` when free
    holder: ThreadId,
    /// Set when the registry slot is destroyed, cleared on reuse
    retired: bool,
}

/// Blocking mutual-exclusion lock
pub struct Lock {
    state: SpinLock<LockState>,
}

impl Lock {
    /// Create an unlocked lock
    pub const fn new() -> Self {
        Self {
            state: SpinLock::new(LockState {
                holder: NO_THREAD,
                retired: false,
            }),
        }
    }

    pub(crate) fn key(&self) -> ResourceKey {
        ResourceKey::of(self)
    }

    /// Acquire the lock, sleeping while another thread holds it.
    ///
    /// Acquiring a lock the caller already holds would never return and is
    /// fatal.
    pub fn acquire<P: Platform>(&self, kernel: &Kernel<P>) {
        match self.acquire_checked(kernel) {
            Ok(()) => {}
            Err(KStatus::ERR_BAD_STATE) => crate::fatal!(
                "lock {:#x}: thread {} acquires it twice",
                self.key().raw(),
                kernel.current()
            ),
            Err(status) => crate::fatal!("lock {:#x}: acquire failed with {}", self.key().raw(), status),
        }
    }

    /// Acquire the lock, reporting misuse instead of stopping.
    ///
    /// Fails with `ERR_BAD_STATE` if the caller already holds it and with
    /// `ERR_NOT_FOUND` once the lock has been destroyed.
    pub fn acquire_checked<P: Platform>(&self, kernel: &Kernel<P>) -> KResult<()> {
        let irq = IrqGuard::new(kernel.platform());
        let me = kernel.current_locked(&irq);
        let mut state = self.state.lock();
        if state.holder == me {
            return Err(KStatus::ERR_BAD_STATE);
        }
        loop {
            if state.retired {
                return Err(KStatus::ERR_NOT_FOUND);
            }
            if state.holder == NO_THREAD {
                break;
            }
            kernel.sleep_on(&irq, self.key());
            drop(state);
            kernel.yield_locked(&irq);
            state = self.state.lock();
        }
        state.holder = me;
        Ok(())
    }

    /// Take the lock if it is free
    pub fn try_acquire<P: Platform>(&self, kernel: &Kernel<P>) -> bool {
        let irq = IrqGuard::new(kernel.platform());
        let me = kernel.current_locked(&irq);
        let mut state = self.state.lock();
        if state.retired || state.holder != NO_THREAD {
            return false;
        }
        state.holder = me;
        true
    }

    /// Release the lock and wake the longest waiter.
    ///
    /// Releasing a lock the caller does not hold is fatal.
    pub fn release<P: Platform>(&self, kernel: &Kernel<P>) {
        if self.release_checked(kernel).is_err() {
            crate::fatal!(
                "lock {:#x}: released by thread {} which does not hold it",
                self.key().raw(),
                kernel.current()
            );
        }
    }

    /// Release the lock, reporting misuse as `ERR_ACCESS_DENIED`
    pub fn release_checked<P: Platform>(&self, kernel: &Kernel<P>) -> KResult<()> {
        let irq = IrqGuard::new(kernel.platform());
        let me = kernel.current_locked(&irq);
        let mut state = self.state.lock();
        if state.holder != me {
            return Err(KStatus::ERR_ACCESS_DENIED);
        }
        state.holder = NO_THREAD;
        kernel.wake_one(self.key());
        Ok(())
    }

    /// Whether the calling thread holds the lock
    pub fn is_held_by_current<P: Platform>(&self, kernel: &Kernel<P>) -> bool {
        let irq = IrqGuard::new(kernel.platform());
        let me = kernel.current_locked(&irq);
        self.state.lock().holder == me
    }

    /// Thread holding the lock, if any
    pub fn holder<P: Platform>(&self, kernel: &Kernel<P>) -> Option<ThreadId> {
        let _irq = IrqGuard::new(kernel.platform());
        let holder = self.state.lock().holder;
        (holder != NO_THREAD).then_some(holder)
    }

    /// Mark the lock destroyed if nobody holds or waits for it.
    ///
    /// Returns the held state guard; the caller releases the registry slot
    /// before dropping it.
    pub(crate) fn retire<P: Platform>(
        &self,
        kernel: &Kernel<P>,
    ) -> KResult<SpinLockGuard<'_, LockState>> {
        let mut state = self.state.lock();
        if state.retired {
            return Err(KStatus::ERR_NOT_FOUND);
        }
        if state.holder != NO_THREAD || kernel.waiter_count(self.key()) > 0 {
            return Err(KStatus::ERR_BAD_STATE);
        }
        state.retired = true;
        Ok(state)
    }

    pub(crate) fn reset(&self) {
        let mut state = self.state.lock();
        state.holder = NO_THREAD;
        state.retired = false;
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}
