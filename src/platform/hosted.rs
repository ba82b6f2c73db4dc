// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Hosted Platform
//!
//! Runs the scheduling core inside an ordinary process. Every execution
//! context is backed by an OS thread that owns a *baton*; a simulated CPU is
//! whichever OS thread currently holds a baton handed to it for that CPU.
//! `switch` passes the baton to the next context and parks the caller on its
//! own, so exactly one OS thread runs per simulated CPU and blocking
//! primitives really block.
//!
//! The interrupt flag is kept per context, which is what the saved flags
//! register of a real context amounts to. Timer interrupts are not
//! asynchronous here: code delivers one by calling
//! [`Kernel::timer_interrupt`](crate::Kernel::timer_interrupt) at a point of
//! its choosing, and [`Hosted::armed_ticks`] reports what the scheduler last
//! programmed.
//!
//! A context that exits ends its OS thread by unwinding with a private
//! payload, so this backend needs `panic = "unwind"`. Any other panic inside
//! a simulated thread aborts the process, the same way a kernel panic would
//! halt the machine.

use std::boxed::Box;
use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use super::{Platform, ThreadStart};
use crate::config::MAX_CPUS;
use crate::status::{KResult, KStatus};

const NO_CPU: usize = usize::MAX;

std::thread_local! {
    static CPU: Cell<usize> = const { Cell::new(NO_CPU) };
    static IRQ_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Unwind payload that ends an exited context's OS thread
struct ContextExit;

/// Ownership token for one execution context
struct Baton {
    /// CPU the context has been handed, if any
    cpu: Mutex<Option<usize>>,
    resumed: Condvar,
}

impl Baton {
    fn new() -> Self {
        Self {
            cpu: Mutex::new(None),
            resumed: Condvar::new(),
        }
    }

    fn give(&self, cpu: usize) {
        let mut slot = self.cpu.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(cpu);
        self.resumed.notify_one();
    }

    fn take(&self) -> usize {
        let mut slot = self.cpu.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(cpu) = slot.take() {
                return cpu;
            }
            slot = self.resumed.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Execution context handle
#[derive(Clone)]
pub struct HostedContext {
    baton: Arc<Baton>,
}

impl HostedContext {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.baton, &other.baton)
    }
}

/// Simulated multiprocessor
pub struct Hosted {
    armed: [AtomicU32; MAX_CPUS],
    switches: AtomicU64,
}

impl Hosted {
    /// Create a simulated machine
    pub const fn new() -> Self {
        const ZERO: AtomicU32 = AtomicU32::new(0);
        Self {
            armed: [ZERO; MAX_CPUS],
            switches: AtomicU64::new(0),
        }
    }

    /// Tick count the scheduler last armed on `cpu`
    pub fn armed_ticks(&self, cpu: usize) -> u32 {
        self.armed[cpu].load(Ordering::Relaxed)
    }

    /// Number of context switches performed so far
    pub fn switch_count(&self) -> u64 {
        self.switches.load(Ordering::Relaxed)
    }

    fn resume_on(cpu: usize) {
        CPU.with(|c| c.set(cpu));
    }
}

impl Default for Hosted {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for Hosted {
    type Context = HostedContext;

    fn cpu_id(&self) -> usize {
        let cpu = CPU.with(|c| c.get());
        if cpu == NO_CPU {
            panic!("hosted: calling thread is not running on a simulated CPU");
        }
        cpu
    }

    fn irq_save_disable(&self) -> bool {
        IRQ_ENABLED.with(|f| f.replace(false))
    }

    fn irq_restore(&self, was_enabled: bool) {
        IRQ_ENABLED.with(|f| f.set(was_enabled));
    }

    fn irqs_enabled(&self) -> bool {
        IRQ_ENABLED.with(|f| f.get())
    }

    fn arm_next_tick(&self, ticks: u32) {
        self.armed[self.cpu_id()].store(ticks, Ordering::Relaxed);
    }

    fn boot_context(&self, cpu: usize) -> HostedContext {
        Self::resume_on(cpu);
        HostedContext {
            baton: Arc::new(Baton::new()),
        }
    }

    fn new_context(&self, start: ThreadStart<Self>) -> KResult<HostedContext> {
        let baton = Arc::new(Baton::new());
        let waiting = Arc::clone(&baton);
        std::thread::Builder::new()
            .name(std::format!("kthread-{}", start.tid()))
            .spawn(move || {
                let cpu = waiting.take();
                Hosted::resume_on(cpu);
                // Resumed from inside the scheduler, where interrupts are off
                IRQ_ENABLED.with(|f| f.set(false));
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| start.run()));
                if let Err(payload) = outcome {
                    if !payload.is::<ContextExit>() {
                        std::eprintln!("hosted: kernel thread panicked, halting");
                        std::process::abort();
                    }
                }
            })
            .map_err(|_| KStatus::ERR_NO_MEMORY)?;
        Ok(HostedContext { baton })
    }

    unsafe fn switch(&self, from: &HostedContext, to: &HostedContext) {
        if from.same(to) {
            return;
        }
        self.switches.fetch_add(1, Ordering::Relaxed);
        to.baton.give(self.cpu_id());
        let cpu = from.baton.take();
        Self::resume_on(cpu);
    }

    unsafe fn exit(&self, _from: &HostedContext, to: &HostedContext) -> ! {
        self.switches.fetch_add(1, Ordering::Relaxed);
        to.baton.give(self.cpu_id());
        Self::resume_on(NO_CPU);
        std::panic::resume_unwind(Box::new(ContextExit))
    }
}
