// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduler implementation
//!
//! Strict round robin over the thread table's FIFO ready list. Voluntary
//! yields, sleeps, thread exit and timer preemption all converge on
//! [`Kernel::reschedule`], which:
//!
//! 1. disposes of the outgoing thread (reclaim if dying, park if a sleep is
//!    pending, otherwise requeue at the tail)
//! 2. pops the ready-list head, falling back to the CPU's idle thread
//! 3. marks it running on this CPU
//! 4. arms the next preemption with a jittered timeslice
//! 5. switches contexts
//!
//! No spinlock is held across the switch itself. A thread that was just
//! switched out on one CPU may already be picked by another; the picker
//! spins on the thread's `on_cpu` flag until the first CPU has finished
//! saving it.

use core::sync::atomic::Ordering;

use super::state::{ThreadFlags, ThreadState};
use super::table::ThreadTable;
use super::thread::{ThreadId, NO_THREAD};
use crate::kernel::Kernel;
use crate::platform::{IrqGuard, Platform};

/// xorshift64* output multiplier
const XORSHIFT_MUL: u64 = 0x2545_F491_4F6C_DD1D;

/// Why the running thread is leaving the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchCause {
    /// Yield, sleep or exit
    Voluntary,
    /// Timer preemption
    Preempted,
}

impl<P: Platform> Kernel<P> {
    /// Append `tid` to the ready list tail and mark it READY.
    ///
    /// Enqueueing an idle, dead or already queued thread is fatal.
    pub fn add_ready(&self, tid: ThreadId) {
        let _irq = IrqGuard::new(&self.platform);
        self.table.lock().push_ready(tid);
    }

    /// Give up the CPU voluntarily.
    ///
    /// The caller re-enters the ready list at the tail even when nothing
    /// else is runnable, in which case it is picked straight back.
    pub fn yield_now(&self) {
        let irq = IrqGuard::new(&self.platform);
        self.reschedule(&irq, SwitchCause::Voluntary);
    }

    /// Yield with interrupts already disabled.
    ///
    /// This is the second half of a sleep: after [`Kernel::sleep_on`] and
    /// releasing the predicate's lock, the caller yields here and returns
    /// once it has been woken and rescheduled.
    pub fn yield_locked(&self, irq: &IrqGuard<'_, P>) {
        self.reschedule(irq, SwitchCause::Voluntary);
    }

    /// Preemption timer expired on the calling CPU
    pub fn timer_interrupt(&self) {
        let irq = IrqGuard::new(&self.platform);
        self.reschedule(&irq, SwitchCause::Preempted);
    }

    pub(crate) fn reschedule(&self, irq: &IrqGuard<'_, P>, cause: SwitchCause) {
        let cpu = self.platform.cpu_id();
        let cur = self.current_locked(irq);

        let mut table = self.table.lock();
        let dying = Self::put_prev(&mut table, cur);
        let next = table.pop_ready().unwrap_or(Self::idle_thread(cpu));

        table.get_mut(next).state = ThreadState::Running;
        table.get_mut(next).stats.schedule_count += 1;
        self.cpus[cpu].current.store(next, Ordering::Release);

        let contexts = if next == cur {
            None
        } else {
            let stats = &mut table.get_mut(cur).stats;
            match cause {
                SwitchCause::Voluntary => stats.voluntary_switches += 1,
                SwitchCause::Preempted => stats.involuntary_switches += 1,
            }
            match (table.get(cur).context.clone(), table.get(next).context.clone()) {
                (Some(from), Some(to)) => Some((from, to)),
                _ => crate::fatal!("reschedule: thread {} or {} has no context", cur, next),
            }
        };
        drop(table);

        log::trace!("cpu {}: {} -> {} ({:?})", cpu, cur, next, cause);
        self.platform.arm_next_tick(self.next_timeslice());

        let Some((from, to)) = contexts else { return };

        self.cpus[cpu].prev.store(cur, Ordering::Release);
        while self.on_cpu[next].swap(true, Ordering::Acquire) {
            core::hint::spin_loop();
        }

        if dying {
            // SAFETY: interrupts are off, `from` is the calling flow and `to`
            // has just been claimed through its on_cpu flag.
            unsafe { self.platform.exit(&from, &to) }
        }
        // SAFETY: as above; `from` stays owned by its slot while switched out.
        unsafe { self.platform.switch(&from, &to) };
        self.finish_switch();
    }

    /// Dispose of the outgoing thread; returns whether it is dying
    fn put_prev(table: &mut ThreadTable<P>, cur: ThreadId) -> bool {
        let thread = table.get(cur);
        let state = thread.state();
        let pending = thread.flags().contains(ThreadFlags::SLEEP_PENDING);
        let idle = thread.is_idle();

        match state {
            ThreadState::Dying => {
                table.get_mut(cur).retire();
                true
            }
            ThreadState::Running if pending => {
                let thread = table.get_mut(cur);
                thread.flags.remove(ThreadFlags::SLEEP_PENDING);
                thread.state = ThreadState::Sleeping;
                false
            }
            ThreadState::Running if idle => {
                table.get_mut(cur).state = ThreadState::Ready;
                false
            }
            ThreadState::Running => {
                table.push_ready(cur);
                false
            }
            other => crate::fatal!("reschedule: current thread {} is {:?}", cur, other),
        }
    }

    /// Acknowledge the switch that resumed the calling thread, releasing
    /// the thread this CPU switched away from to other CPUs.
    pub(crate) fn finish_switch(&self) {
        let cpu = self.platform.cpu_id();
        let prev = self.cpus[cpu].prev.swap(NO_THREAD, Ordering::AcqRel);
        if prev != NO_THREAD {
            self.on_cpu[prev].store(false, Ordering::Release);
        }
    }

    /// Move a thread just unlinked from the sleep queue back toward running.
    ///
    /// A thread already parked goes to the ready list. One that queued
    /// itself but has not reached its yield yet only loses its pending flag,
    /// so that yield requeues it instead of parking it.
    pub(crate) fn make_runnable(table: &mut ThreadTable<P>, tid: ThreadId) {
        let thread = table.get(tid);
        if thread.state() == ThreadState::Sleeping {
            table.push_ready(tid);
        } else if thread.flags().contains(ThreadFlags::SLEEP_PENDING) {
            table.get_mut(tid).flags.remove(ThreadFlags::SLEEP_PENDING);
        } else {
            crate::fatal!("wake: thread {} in sleep queue but {:?}", tid, thread.state());
        }
    }

    /// Draw the next timeslice from `ticks ± jitter`
    pub(crate) fn next_timeslice(&self) -> u32 {
        let ticks = self.config.timeslice_ticks;
        let jitter = self.config.timeslice_jitter;
        if jitter == 0 {
            return ticks;
        }
        let span = 2 * u64::from(jitter) + 1;
        ticks - jitter + (self.next_random() % span) as u32
    }

    /// xorshift64* step shared by all CPUs
    fn next_random(&self) -> u64 {
        let mut state = self.rng.load(Ordering::Relaxed);
        loop {
            let mut x = state;
            x ^= x >> 12;
            x ^= x << 25;
            x ^= x >> 27;
            match self.rng.compare_exchange_weak(state, x, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return x.wrapping_mul(XORSHIFT_MUL),
                Err(seen) => state = seen,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::platform::hosted::Hosted;

    fn kernel(config: KernelConfig) -> Kernel<Hosted> {
        Kernel::new(Hosted::new(), config).unwrap()
    }

    #[test]
    fn test_timeslice_stays_within_jitter() {
        let k = kernel(KernelConfig::new().with_timeslice(10, 3));
        let mut seen_low = false;
        let mut seen_high = false;
        for _ in 0..2000 {
            let slice = k.next_timeslice();
            assert!((7..=13).contains(&slice), "slice {} out of range", slice);
            seen_low |= slice == 7;
            seen_high |= slice == 13;
        }
        assert!(seen_low && seen_high);
    }

    #[test]
    fn test_timeslice_without_jitter_is_fixed() {
        let k = kernel(KernelConfig::new().with_timeslice(5, 0));
        assert!((0..100).all(|_| k.next_timeslice() == 5));
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let a = kernel(KernelConfig::new().with_seed(42));
        let b = kernel(KernelConfig::new().with_seed(42));
        for _ in 0..32 {
            assert_eq!(a.next_timeslice(), b.next_timeslice());
        }
    }

    #[test]
    fn test_make_runnable_requeues_sleeper() {
        let mut table: ThreadTable<Hosted> = ThreadTable::new();
        table.get_mut(4).state = ThreadState::Sleeping;
        Kernel::<Hosted>::make_runnable(&mut table, 4);
        assert_eq!(table.get(4).state(), ThreadState::Ready);
        assert_eq!(table.pop_ready(), Some(4));
    }

    #[test]
    fn test_make_runnable_cancels_pending_sleep() {
        let mut table: ThreadTable<Hosted> = ThreadTable::new();
        table.get_mut(4).state = ThreadState::Running;
        table.get_mut(4).flags.insert(ThreadFlags::SLEEP_PENDING);
        Kernel::<Hosted>::make_runnable(&mut table, 4);
        assert_eq!(table.get(4).state(), ThreadState::Running);
        assert!(!table.get(4).flags().contains(ThreadFlags::SLEEP_PENDING));
        assert_eq!(table.ready_len(), 0);
    }

    #[test]
    fn test_put_prev_parks_pending_sleeper() {
        let mut table: ThreadTable<Hosted> = ThreadTable::new();
        table.get_mut(6).state = ThreadState::Running;
        table.get_mut(6).flags.insert(ThreadFlags::SLEEP_PENDING);
        assert!(!Kernel::<Hosted>::put_prev(&mut table, 6));
        assert_eq!(table.get(6).state(), ThreadState::Sleeping);
        assert_eq!(table.ready_len(), 0);
    }

    #[test]
    fn test_put_prev_retires_dying_thread() {
        let mut table: ThreadTable<Hosted> = ThreadTable::new();
        table.get_mut(6).state = ThreadState::Dying;
        assert!(Kernel::<Hosted>::put_prev(&mut table, 6));
        assert_eq!(table.get(6).state(), ThreadState::Free);
    }

    #[test]
    fn test_put_prev_never_queues_idle() {
        let mut table: ThreadTable<Hosted> = ThreadTable::new();
        table.get_mut(0).state = ThreadState::Running;
        table.get_mut(0).flags = ThreadFlags::IDLE;
        Kernel::<Hosted>::put_prev(&mut table, 0);
        assert_eq!(table.get(0).state(), ThreadState::Ready);
        assert_eq!(table.ready_len(), 0);
    }
}
