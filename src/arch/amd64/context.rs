// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! x86-64 Execution Context
//!
//! A context is the callee-saved register frame the switch trampoline saves
//! into and restores from, plus the kernel stack it runs on. The boot flow
//! of each CPU keeps the stack the bootloader gave it.
//!
//! # Frame layout
//!
//! ```text
//! offset  register
//! 0x00    rbx
//! 0x08    rbp
//! 0x10    r12
//! 0x18    r13
//! 0x20    r14
//! 0x28    r15
//! 0x30    rsp
//! 0x38    rip
//! 0x40    rflags
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::status::{KResult, KStatus};

/// Size of each thread's kernel stack
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

/// RFLAGS bits used when building a frame
pub mod rflags {
    /// Reserved, always set
    pub const RESERVED: u64 = 1 << 1;
    /// Interrupt Enable Flag
    pub const IF: u64 = 1 << 9;
}

/// Callee-saved register frame
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SavedRegisters {
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rsp: u64,
    pub rip: u64,
    pub rflags: u64,
}

impl SavedRegisters {
    /// Frame that enters `entry` on the stack ending at `stack_top`.
    ///
    /// The stack pointer is placed as if `entry` had just been called: 16-byte
    /// aligned minus one return-address slot, which holds 0 so a stray return
    /// faults. Interrupts start disabled, as they are inside the scheduler.
    pub fn for_thread(stack_top: u64, entry: u64) -> Self {
        Self {
            rsp: (stack_top & !0xF) - 8,
            rip: entry,
            rflags: rflags::RESERVED,
            ..Self::default()
        }
    }
}

struct Frame {
    regs: SavedRegisters,
    stack: Option<Box<[u8]>>,
}

/// Handle to a heap-allocated context frame.
///
/// Copies alias the same frame; the thread table slot owns it and hands it
/// back through [`Amd64Context::free`] when the slot is recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amd64Context {
    frame: NonNull<Frame>,
}

// SAFETY: the frame is only touched by the switch trampoline of the CPU
// that owns the thread at that moment.
unsafe impl Send for Amd64Context {}

impl Amd64Context {
    /// Frame for a CPU's boot flow; filled in by its first switch away
    pub fn boot() -> Self {
        Self::from_frame(Frame {
            regs: SavedRegisters::default(),
            stack: None,
        })
    }

    /// Fresh stack and frame that start executing `entry`
    pub fn for_thread(entry: extern "C" fn() -> !) -> KResult<Self> {
        let mut stack = Vec::new();
        stack
            .try_reserve_exact(KERNEL_STACK_SIZE)
            .map_err(|_| KStatus::ERR_NO_MEMORY)?;
        stack.resize(KERNEL_STACK_SIZE, 0u8);
        let stack = stack.into_boxed_slice();

        let top = stack.as_ptr() as u64 + KERNEL_STACK_SIZE as u64;
        Ok(Self::from_frame(Frame {
            regs: SavedRegisters::for_thread(top, entry as *const () as usize as u64),
            stack: Some(stack),
        }))
    }

    fn from_frame(frame: Frame) -> Self {
        Self {
            frame: NonNull::from(Box::leak(Box::new(frame))),
        }
    }

    /// Register frame for the switch trampoline
    pub fn regs(&self) -> *mut SavedRegisters {
        // SAFETY: the frame stays allocated until `free`
        unsafe { core::ptr::addr_of_mut!((*self.frame.as_ptr()).regs) }
    }

    /// Bounds of the context's own stack, `None` for a boot frame
    pub fn stack_range(&self) -> Option<(u64, u64)> {
        // SAFETY: the frame stays allocated until `free`
        let frame = unsafe { self.frame.as_ref() };
        frame.stack.as_ref().map(|s| {
            let base = s.as_ptr() as u64;
            (base, base + s.len() as u64)
        })
    }

    /// Release the frame and its stack.
    ///
    /// # Safety
    ///
    /// No CPU may be executing on this context and no copy of the handle
    /// may be used afterwards.
    pub unsafe fn free(self) {
        drop(Box::from_raw(self.frame.as_ptr()));
    }
}
