// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Platform Interface
//!
//! The scheduling core never touches hardware directly. The identity of the
//! calling CPU, the local interrupt flag, the one-shot preemption timer and
//! the register save/restore trampoline all come through the [`Platform`]
//! trait.
//!
//! # Backends
//!
//! - [`hosted`]: std-backed simulation where every execution context is an
//!   OS thread (tests and the `hosted` feature)
//! - [`crate::arch::amd64`]: bare-metal x86_64
//!
//! # Interrupt discipline
//!
//! Code that must run with local interrupts disabled takes an
//! [`IrqGuard`] by reference. The guard is the proof: it can only be
//! obtained by disabling interrupts, and it restores the previous state
//! when dropped.

use core::marker::PhantomData;

use crate::kernel::Kernel;
use crate::sched::ThreadId;
use crate::status::KResult;

#[cfg(any(test, feature = "hosted"))]
pub mod hosted;

/// Services the scheduling core consumes from the machine layer
pub trait Platform: Sized + Send + Sync + 'static {
    /// Handle to one thread's saved machine state.
    ///
    /// Cloning a handle never duplicates the state it refers to.
    type Context: Clone + Send;

    /// Index of the calling CPU
    fn cpu_id(&self) -> usize;

    /// Disable local interrupts, returning whether they were enabled
    fn irq_save_disable(&self) -> bool;

    /// Restore the local interrupt flag saved by `irq_save_disable`
    fn irq_restore(&self, was_enabled: bool);

    /// Whether local interrupts are currently enabled
    fn irqs_enabled(&self) -> bool;

    /// Arm the local preemption timer to fire after `ticks` ticks
    fn arm_next_tick(&self, ticks: u32);

    /// Adopt the calling boot flow as the idle context of `cpu`
    fn boot_context(&self, cpu: usize) -> Self::Context;

    /// Build a context that calls [`ThreadStart::run`] when first resumed
    fn new_context(&self, start: ThreadStart<Self>) -> KResult<Self::Context>;

    /// Save the running state into `from` and resume `to`.
    ///
    /// Returns when something later switches back to `from`.
    ///
    /// # Safety
    ///
    /// Local interrupts must be disabled, `from` must describe the calling
    /// flow of execution and `to` must not be running on any CPU.
    unsafe fn switch(&self, from: &Self::Context, to: &Self::Context);

    /// Resume `to`, abandoning `from` for good.
    ///
    /// # Safety
    ///
    /// Same requirements as [`Platform::switch`]; `from` is never resumed.
    unsafe fn exit(&self, from: &Self::Context, to: &Self::Context) -> !;

    /// Reclaim a context whose thread slot is being recycled
    fn release_context(&self, ctx: Self::Context) {
        drop(ctx);
    }
}

/// ============================================================================
/// Interrupt Guard
/// ============================================================================

/// Token proving local interrupts are disabled on this CPU.
///
/// Not `Send`: the saved flag belongs to the CPU it was read on.
pub struct IrqGuard<'a, P: Platform> {
    platform: &'a P,
    was_enabled: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, P: Platform> IrqGuard<'a, P> {
    /// Disable local interrupts until the guard is dropped
    pub fn new(platform: &'a P) -> Self {
        let was_enabled = platform.irq_save_disable();
        Self {
            platform,
            was_enabled,
            _not_send: PhantomData,
        }
    }

    /// Whether interrupts were enabled before the guard was taken
    pub fn was_enabled(&self) -> bool {
        self.was_enabled
    }
}

impl<'a, P: Platform> Drop for IrqGuard<'a, P> {
    fn drop(&mut self) {
        self.platform.irq_restore(self.was_enabled);
    }
}

/// ============================================================================
/// Thread Start
/// ============================================================================

/// What a freshly built context runs when it is first resumed
pub struct ThreadStart<P: Platform> {
    kernel: &'static Kernel<P>,
    tid: ThreadId,
}

impl<P: Platform> ThreadStart<P> {
    pub(crate) fn new(kernel: &'static Kernel<P>, tid: ThreadId) -> Self {
        Self { kernel, tid }
    }

    /// Thread the context belongs to
    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    /// Enter the thread: finish the incoming switch, run its entry function
    /// and retire it.
    pub fn run(self) -> ! {
        self.kernel.thread_main(self.tid)
    }
}
