// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Counting Semaphore
//!
//! Dijkstra P/V over the sleep queue. The count may go negative; a value of
//! `-n` means `n` threads are blocked in `P`. Waiters sleep on the
//! semaphore's own address and `V` wakes them in the order they blocked.
//!
//! `V` never blocks and may be called from interrupt context.

use crate::config::MAX_SEMAPHORES;
use crate::kernel::Kernel;
use crate::platform::{IrqGuard, Platform};
use crate::status::{KResult, KStatus};
use crate::sync::registry::Registry;
use crate::sync::sleep_queue::ResourceKey;
use crate::sync::spinlock::SpinLock;

/// Semaphore registry id
pub type SemId = usize;

/// Semaphore registry
pub type SemaphoreTable = Registry<Semaphore, MAX_SEMAPHORES>;

/// Count and liveness, guarded together
struct SemState {
    value: isize,
    /// Set when the registry slot is destroyed, cleared on reuse
    retired: bool,
}

/// Counting semaphore
pub struct Semaphore {
    state: SpinLock<SemState>,
}

impl Semaphore {
    /// Create a semaphore with `value` initial permits
    pub const fn new(value: isize) -> Self {
        Self {
            state: SpinLock::new(SemState {
                value,
                retired: false,
            }),
        }
    }

    fn key(&self) -> ResourceKey {
        ResourceKey::of(self)
    }

    /// Take a permit, blocking while none is available
    pub fn p<P: Platform>(&self, kernel: &Kernel<P>) {
        if let Err(status) = self.down(kernel) {
            crate::fatal!("semaphore {:#x}: P failed with {}", self.key().raw(), status);
        }
    }

    /// Return a permit, waking the longest waiter if there is one
    pub fn v<P: Platform>(&self, kernel: &Kernel<P>) {
        if let Err(status) = self.up(kernel) {
            crate::fatal!("semaphore {:#x}: V failed with {}", self.key().raw(), status);
        }
    }

    /// Current value; negative values count blocked threads
    pub fn value<P: Platform>(&self, kernel: &Kernel<P>) -> isize {
        let _irq = IrqGuard::new(kernel.platform());
        self.state.lock().value
    }

    fn down<P: Platform>(&self, kernel: &Kernel<P>) -> KResult<()> {
        let irq = IrqGuard::new(kernel.platform());
        let mut state = self.state.lock();
        if state.retired {
            return Err(KStatus::ERR_NOT_FOUND);
        }
        state.value -= 1;
        if state.value < 0 {
            kernel.sleep_on(&irq, self.key());
            drop(state);
            kernel.yield_locked(&irq);
        }
        Ok(())
    }

    fn up<P: Platform>(&self, kernel: &Kernel<P>) -> KResult<()> {
        let _irq = IrqGuard::new(kernel.platform());
        let mut state = self.state.lock();
        if state.retired {
            return Err(KStatus::ERR_NOT_FOUND);
        }
        let old = state.value;
        state.value += 1;
        if old <= 0 {
            kernel.wake_one(self.key());
        }
        Ok(())
    }

    fn reset(&self, value: isize) {
        let mut state = self.state.lock();
        state.value = value;
        state.retired = false;
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}

/// ============================================================================
/// Registry Operations
/// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Create a semaphore with `value` permits.
    ///
    /// Fails with `ERR_INVALID_ARGS` for a negative value and
    /// `ERR_NO_RESOURCES` when the registry is full.
    pub fn sem_create(&self, value: isize) -> KResult<SemId> {
        if value < 0 {
            return Err(KStatus::ERR_INVALID_ARGS);
        }
        let _irq = IrqGuard::new(&self.platform);
        let id = self.semaphores.allocate(|sem| sem.reset(value)).map_err(|err| {
            log::warn!("sem_create: registry full");
            err
        })?;
        log::debug!("semaphore {} created with value {}", id, value);
        Ok(id)
    }

    /// Destroy a semaphore nobody is blocked on
    pub fn sem_destroy(&self, id: SemId) -> KResult<()> {
        let _irq = IrqGuard::new(&self.platform);
        self.semaphores.free(id, |sem| {
            let mut state = sem.state.lock();
            if state.retired {
                return Err(KStatus::ERR_NOT_FOUND);
            }
            if state.value < 0 || self.waiter_count(sem.key()) > 0 {
                return Err(KStatus::ERR_BAD_STATE);
            }
            state.retired = true;
            Ok(state)
        })?;
        log::debug!("semaphore {} destroyed", id);
        Ok(())
    }

    /// P on semaphore `id`
    pub fn sem_p(&self, id: SemId) -> KResult<()> {
        self.semaphores.get(id)?.down(self)
    }

    /// V on semaphore `id`
    pub fn sem_v(&self, id: SemId) -> KResult<()> {
        self.semaphores.get(id)?.up(self)
    }

    /// Value of semaphore `id`
    pub fn sem_value(&self, id: SemId) -> KResult<isize> {
        Ok(self.semaphores.get(id)?.value(self))
    }
}
