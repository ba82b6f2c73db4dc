// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Object Registry
//!
//! Fixed-capacity table of synchronization objects addressed by small
//! integer ids. Objects live in place for the kernel's lifetime, so a
//! freed slot's address stays valid as a sleep-queue key and a stale id
//! can at worst reach a recycled object, never freed memory.
//!
//! Allocation starts after the most recently claimed slot, so a destroyed
//! id is not handed out again straight away.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::status::{KResult, KStatus};

/// Slot holding one object
struct Slot<T> {
    used: AtomicBool,
    object: T,
}

/// Fixed table of `N` objects of type `T`
pub struct Registry<T, const N: usize> {
    slots: [Slot<T>; N],
    /// Where the next allocation starts scanning
    cursor: AtomicUsize,
}

impl<T: Default, const N: usize> Registry<T, N> {
    /// Create a registry with every slot free
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| Slot {
                used: AtomicBool::new(false),
                object: T::default(),
            }),
            cursor: AtomicUsize::new(0),
        }
    }
}

impl<T, const N: usize> Registry<T, N> {
    /// Claim a free slot and prepare its object with `init`.
    ///
    /// Fails with `ERR_NO_RESOURCES` when every slot is in use.
    pub fn allocate(&self, init: impl FnOnce(&T)) -> KResult<usize> {
        let start = self.cursor.load(Ordering::Relaxed);
        for step in 0..N {
            let id = (start + step) % N;
            let slot = &self.slots[id];
            if slot
                .used
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.cursor.store((id + 1) % N, Ordering::Relaxed);
                init(&slot.object);
                return Ok(id);
            }
        }
        Err(KStatus::ERR_NO_RESOURCES)
    }

    /// Object registered under `id`
    pub fn get(&self, id: usize) -> KResult<&T> {
        match self.slots.get(id) {
            Some(slot) if slot.used.load(Ordering::Acquire) => Ok(&slot.object),
            _ => Err(KStatus::ERR_NOT_FOUND),
        }
    }

    /// Free slot `id` if `retire` accepts its object.
    ///
    /// `retire` returns the object's own lock guard with the object marked
    /// dead. The slot is released while that guard is still held, so a
    /// thread racing on the same object either blocks before the check and
    /// makes it fail, or sees the object dead and backs out.
    pub fn free<'a, G>(
        &'a self,
        id: usize,
        retire: impl FnOnce(&'a T) -> KResult<G>,
    ) -> KResult<()> {
        let slot = self.slots.get(id).ok_or(KStatus::ERR_NOT_FOUND)?;
        if !slot.used.load(Ordering::Acquire) {
            return Err(KStatus::ERR_NOT_FOUND);
        }
        let guard = retire(&slot.object)?;
        let released = slot
            .used
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed);
        drop(guard);
        released.map(|_| ()).map_err(|_| KStatus::ERR_NOT_FOUND)
    }
}

impl<T: Default, const N: usize> Default for Registry<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::spinlock::SpinLock;
    use core::sync::atomic::AtomicUsize;

    #[test]
    fn test_allocate_until_full() {
        let registry: Registry<AtomicUsize, 3> = Registry::new();
        for expected in 0..3 {
            assert_eq!(registry.allocate(|_| {}), Ok(expected));
        }
        assert_eq!(registry.allocate(|_| {}), Err(KStatus::ERR_NO_RESOURCES));
    }

    #[test]
    fn test_init_runs_on_claimed_slot() {
        let registry: Registry<AtomicUsize, 2> = Registry::new();
        let id = registry.allocate(|v| v.store(41, Ordering::Relaxed)).unwrap();
        assert_eq!(registry.get(id).unwrap().load(Ordering::Relaxed), 41);
    }

    #[test]
    fn test_free_slot_is_reused() {
        let registry: Registry<AtomicUsize, 2> = Registry::new();
        let a = registry.allocate(|_| {}).unwrap();
        let _b = registry.allocate(|_| {}).unwrap();
        registry.free(a, |_| Ok(())).unwrap();
        assert_eq!(registry.get(a).err(), Some(KStatus::ERR_NOT_FOUND));
        assert_eq!(registry.allocate(|_| {}), Ok(a));
    }

    #[test]
    fn test_allocation_rotates_past_freed_slot() {
        let registry: Registry<AtomicUsize, 3> = Registry::new();
        let a = registry.allocate(|_| {}).unwrap();
        registry.free(a, |_| Ok(())).unwrap();
        assert_eq!(registry.allocate(|_| {}), Ok(1));
        assert_eq!(registry.allocate(|_| {}), Ok(2));
        assert_eq!(registry.allocate(|_| {}), Ok(a));
    }

    #[test]
    fn test_free_respects_check() {
        let registry: Registry<AtomicUsize, 1> = Registry::new();
        let id = registry.allocate(|_| {}).unwrap();
        assert_eq!(
            registry.free(id, |_| Err::<(), _>(KStatus::ERR_BAD_STATE)),
            Err(KStatus::ERR_BAD_STATE)
        );
        assert!(registry.get(id).is_ok());
    }

    #[test]
    fn test_slot_released_while_retire_guard_held() {
        let registry: Registry<SpinLock<u32>, 1> = Registry::new();
        let id = registry.allocate(|v| *v.lock() = 7).unwrap();
        registry.free(id, |object| Ok(object.lock())).unwrap();
        assert!(registry.get(id).is_err());
        assert!(!registry.slots[id].object.is_locked());
    }

    #[test]
    fn test_unknown_ids() {
        let registry: Registry<AtomicUsize, 1> = Registry::new();
        assert_eq!(registry.get(0).err(), Some(KStatus::ERR_NOT_FOUND));
        assert_eq!(registry.get(9).err(), Some(KStatus::ERR_NOT_FOUND));
        assert_eq!(registry.free(0, |_| Ok(())), Err(KStatus::ERR_NOT_FOUND));
    }
}
