// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Context
//!
//! [`Kernel`] owns every cross-CPU table of the scheduling core: the thread
//! table with its ready list, the sleep queue, the per-CPU current-thread
//! slots and the object registries. Operations take the kernel by reference
//! rather than reaching for globals, so independent instances can coexist
//! (the hosted tests boot one per test).
//!
//! # Lock ordering
//!
//! ```text
//! object lock (semaphore / lock state)  ->  sleep queue  ->  thread table
//! ```
//!
//! Every acquisition happens with local interrupts disabled. No spinlock is
//! ever held across a context switch.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::config::{KernelConfig, MAX_CONDVARS, MAX_CPUS, MAX_LOCKS, MAX_THREADS};
use crate::platform::{IrqGuard, Platform};
use crate::sched::state::{ThreadFlags, ThreadState};
use crate::sched::table::ThreadTable;
use crate::sched::thread::{ThreadId, ThreadStats, NO_THREAD};
use crate::status::KResult;
use crate::sync::condvar::Condvar;
use crate::sync::lock::Lock;
use crate::sync::registry::Registry;
use crate::sync::semaphore::SemaphoreTable;
use crate::sync::sleep_queue::SleepQueue;
use crate::sync::spinlock::SpinLock;

/// ============================================================================
/// Per-CPU State
/// ============================================================================

/// Scheduling state private to one CPU
pub(crate) struct PerCpu {
    /// Thread running on this CPU
    pub(crate) current: AtomicUsize,
    /// Thread this CPU most recently switched away from, until the incoming
    /// thread acknowledges the switch
    pub(crate) prev: AtomicUsize,
    /// Set once `boot_cpu` has run on this CPU
    pub(crate) online: AtomicBool,
}

impl PerCpu {
    const fn new() -> Self {
        Self {
            current: AtomicUsize::new(NO_THREAD),
            prev: AtomicUsize::new(NO_THREAD),
            online: AtomicBool::new(false),
        }
    }
}

/// ============================================================================
/// Kernel
/// ============================================================================

/// Scheduling and synchronization core
pub struct Kernel<P: Platform> {
    pub(crate) platform: P,
    pub(crate) config: KernelConfig,
    /// Thread table and ready list
    pub(crate) table: SpinLock<ThreadTable<P>>,
    /// Sleeping threads by resource
    pub(crate) sleepq: SpinLock<SleepQueue>,
    pub(crate) cpus: [PerCpu; MAX_CPUS],
    /// Set while a thread's context is loaded on some CPU
    pub(crate) on_cpu: [AtomicBool; MAX_THREADS],
    /// Timeslice jitter generator state
    pub(crate) rng: AtomicU64,
    pub(crate) semaphores: SemaphoreTable,
    pub(crate) locks: Registry<Lock, MAX_LOCKS>,
    pub(crate) condvars: Registry<Condvar, MAX_CONDVARS>,
}

impl<P: Platform> Kernel<P> {
    /// Create a kernel context on top of `platform`
    pub fn new(platform: P, config: KernelConfig) -> KResult<Self> {
        config.validate()?;
        const OFF: AtomicBool = AtomicBool::new(false);
        Ok(Self {
            platform,
            config,
            table: SpinLock::new(ThreadTable::new()),
            sleepq: SpinLock::new(SleepQueue::new()),
            cpus: core::array::from_fn(|_| PerCpu::new()),
            on_cpu: [OFF; MAX_THREADS],
            rng: AtomicU64::new(if config.rng_seed == 0 { 1 } else { config.rng_seed }),
            semaphores: SemaphoreTable::new(),
            locks: Registry::new(),
            condvars: Registry::new(),
        })
    }

    /// The platform this kernel runs on
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// The configuration this kernel was built with
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Idle thread of `cpu`
    pub const fn idle_thread(cpu: usize) -> ThreadId {
        cpu
    }

    /// Bring the calling CPU under the scheduler.
    ///
    /// The calling flow becomes `cpu`'s idle thread and keeps running; it
    /// only gets the CPU back when the ready list is empty. Must run exactly
    /// once per CPU before that CPU schedules anything.
    pub fn boot_cpu(&self, cpu: usize) {
        if cpu >= self.config.cpus {
            crate::fatal!("boot_cpu: cpu {} beyond configured {}", cpu, self.config.cpus);
        }
        if self.cpus[cpu].online.swap(true, Ordering::AcqRel) {
            crate::fatal!("boot_cpu: cpu {} booted twice", cpu);
        }
        let context = self.platform.boot_context(cpu);
        let irq = IrqGuard::new(&self.platform);
        let idle = Self::idle_thread(cpu);
        {
            let mut table = self.table.lock();
            let thread = table.get_mut(idle);
            thread.state = ThreadState::Running;
            thread.flags = ThreadFlags::IDLE;
            thread.context = Some(context);
            thread.stats.schedule_count += 1;
        }
        self.on_cpu[idle].store(true, Ordering::Release);
        self.cpus[cpu].current.store(idle, Ordering::Release);
        self.platform.arm_next_tick(self.next_timeslice());
        drop(irq);
        log::info!("cpu {} online, idle thread {}", cpu, idle);
    }

    /// Thread running on the calling CPU, read with interrupts already off
    pub fn current_locked(&self, _irq: &IrqGuard<'_, P>) -> ThreadId {
        let cpu = self.platform.cpu_id();
        let tid = self.cpus[cpu].current.load(Ordering::Acquire);
        if tid == NO_THREAD {
            crate::fatal!("cpu {} has not been booted", cpu);
        }
        tid
    }

    /// Thread running on `cpu`, if it is online
    pub fn current_on(&self, cpu: usize) -> Option<ThreadId> {
        let tid = self.cpus.get(cpu)?.current.load(Ordering::Acquire);
        (tid != NO_THREAD).then_some(tid)
    }

    /// ============================================================================
    /// Introspection
    /// ============================================================================

    /// State of thread `tid`, `None` for an out-of-range id
    pub fn thread_state(&self, tid: ThreadId) -> Option<ThreadState> {
        let _irq = IrqGuard::new(&self.platform);
        self.table.lock().lookup(tid).map(|t| t.state())
    }

    /// Statistics of thread `tid`
    pub fn thread_stats(&self, tid: ThreadId) -> Option<ThreadStats> {
        let _irq = IrqGuard::new(&self.platform);
        self.table.lock().lookup(tid).map(|t| t.stats())
    }

    /// Ready list contents, head first
    pub fn ready_snapshot(&self) -> Vec<ThreadId> {
        let _irq = IrqGuard::new(&self.platform);
        self.table.lock().ready_iter().collect()
    }

    /// Number of threads that are neither free nor idle
    pub fn live_threads(&self) -> usize {
        let _irq = IrqGuard::new(&self.platform);
        self.table
            .lock()
            .iter()
            .filter(|(_, t)| t.state().is_live() && !t.is_idle())
            .count()
    }

    /// Verify the cross-table invariants; any violation is fatal.
    ///
    /// - ready list members are READY, flagged QUEUED, and never idle
    /// - every queued sleeper is SLEEPING or about to sleep
    /// - idle threads are never in the sleep queue
    /// - no thread is current on two CPUs, and currents are RUNNING
    pub fn audit(&self) {
        let _irq = IrqGuard::new(&self.platform);
        let queue = self.sleepq.lock();
        let table = self.table.lock();

        let mut listed = [false; MAX_THREADS];
        for tid in table.ready_iter() {
            let thread = table.get(tid);
            if thread.is_idle() {
                crate::fatal!("audit: idle thread {} on ready list", tid);
            }
            if thread.state() != ThreadState::Ready || !thread.flags().contains(ThreadFlags::QUEUED) {
                crate::fatal!("audit: ready list holds thread {} in {:?}", tid, thread.state());
            }
            listed[tid] = true;
        }

        for (tid, thread) in table.iter() {
            let queued = thread.flags().contains(ThreadFlags::QUEUED);
            if queued != listed[tid] {
                crate::fatal!("audit: thread {} QUEUED flag disagrees with ready list", tid);
            }
            let sleeping = queue.contains(tid);
            if sleeping && listed[tid] {
                crate::fatal!("audit: thread {} both ready and sleeping", tid);
            }
            if sleeping && thread.is_idle() {
                crate::fatal!("audit: idle thread {} in sleep queue", tid);
            }
            if sleeping
                && thread.state() != ThreadState::Sleeping
                && !thread.flags().contains(ThreadFlags::SLEEP_PENDING)
            {
                crate::fatal!("audit: queued sleeper {} is {:?}", tid, thread.state());
            }
            if thread.state() == ThreadState::Sleeping && !sleeping {
                crate::fatal!("audit: sleeping thread {} missing from sleep queue", tid);
            }
        }

        let mut running = [false; MAX_THREADS];
        for cpu in 0..self.config.cpus {
            let Some(tid) = self.current_on(cpu) else { continue };
            if running[tid] {
                crate::fatal!("audit: thread {} current on two cpus", tid);
            }
            running[tid] = true;
            let state = table.get(tid).state();
            if !matches!(state, ThreadState::Running | ThreadState::Dying) {
                crate::fatal!("audit: cpu {} current thread {} is {:?}", cpu, tid, state);
            }
        }
    }
}
