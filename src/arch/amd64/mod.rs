// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! AMD64 Platform
//!
//! Bare-metal [`Platform`] for x86-64. The interrupt flag is driven directly
//! through `cli`/`sti`; the pieces that belong to the boot image (the
//! register-switch trampoline, the local APIC timer and the per-CPU id read)
//! are supplied as [`Amd64Hooks`].
//!
//! # Boot
//!
//! ```ignore
//! let kernel = arch::amd64::install(hooks, KernelConfig::new().with_cpus(n))?;
//! kernel.boot_cpu(cpu);           // on every CPU
//! loop { x86_64::instructions::hlt(); }
//! ```
//!
//! The timer interrupt handler calls [`Kernel::timer_interrupt`].

pub mod context;

use x86_64::instructions::interrupts;

pub use context::{Amd64Context, SavedRegisters, KERNEL_STACK_SIZE};

use crate::config::KernelConfig;
use crate::kernel::Kernel;
use crate::platform::{Platform, ThreadStart};
use crate::status::{KResult, KStatus};

/// Machine services provided by the boot image
#[derive(Clone, Copy)]
pub struct Amd64Hooks {
    /// Index of the calling CPU
    pub cpu_id: fn() -> usize,
    /// Program the local timer to fire after `ticks` ticks
    pub arm_timer: fn(u32),
    /// Save callee-saved registers into the first frame, load the second
    pub switch: unsafe extern "C" fn(save: *mut SavedRegisters, load: *const SavedRegisters),
}

/// x86-64 platform
pub struct Amd64 {
    hooks: Amd64Hooks,
}

impl Amd64 {
    /// Create the platform from the boot image's hooks
    pub const fn new(hooks: Amd64Hooks) -> Self {
        Self { hooks }
    }
}

impl Platform for Amd64 {
    type Context = Amd64Context;

    fn cpu_id(&self) -> usize {
        (self.hooks.cpu_id)()
    }

    fn irq_save_disable(&self) -> bool {
        let was_enabled = interrupts::are_enabled();
        interrupts::disable();
        was_enabled
    }

    fn irq_restore(&self, was_enabled: bool) {
        if was_enabled {
            interrupts::enable();
        }
    }

    fn irqs_enabled(&self) -> bool {
        interrupts::are_enabled()
    }

    fn arm_next_tick(&self, ticks: u32) {
        (self.hooks.arm_timer)(ticks)
    }

    fn boot_context(&self, _cpu: usize) -> Amd64Context {
        Amd64Context::boot()
    }

    fn new_context(&self, start: ThreadStart<Self>) -> KResult<Amd64Context> {
        log::trace!("amd64: building context for thread {}", start.tid());
        Amd64Context::for_thread(thread_entry)
    }

    unsafe fn switch(&self, from: &Amd64Context, to: &Amd64Context) {
        (self.hooks.switch)(from.regs(), to.regs());
    }

    unsafe fn exit(&self, from: &Amd64Context, to: &Amd64Context) -> ! {
        (self.hooks.switch)(from.regs(), to.regs());
        crate::fatal!("amd64: exited context resumed")
    }

    fn release_context(&self, ctx: Amd64Context) {
        // SAFETY: the slot is only recycled once its thread is off every CPU
        unsafe { ctx.free() }
    }
}

/// ============================================================================
/// Global Kernel
/// ============================================================================

static KERNEL: spin::Once<Kernel<Amd64>> = spin::Once::new();

/// Create the system's kernel instance.
///
/// Fails with `ERR_BAD_STATE` if one is already installed.
pub fn install(hooks: Amd64Hooks, config: KernelConfig) -> KResult<&'static Kernel<Amd64>> {
    if KERNEL.is_completed() {
        return Err(KStatus::ERR_BAD_STATE);
    }
    KERNEL.try_call_once(|| Kernel::new(Amd64::new(hooks), config))
}

/// The installed kernel, if any
pub fn kernel() -> Option<&'static Kernel<Amd64>> {
    KERNEL.get()
}

/// First instruction of every new thread
extern "C" fn thread_entry() -> ! {
    let Some(kernel) = KERNEL.get() else {
        crate::fatal!("amd64: thread started before install");
    };
    // Interrupts are still off from the switch that got here
    let tid = kernel.current();
    ThreadStart::new(kernel, tid).run()
}
