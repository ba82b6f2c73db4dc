// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread state
//!
//! Defines the thread lifecycle states and per-thread scheduling flags.
//!
//! ```text
//! FREE -> NONREADY -> READY -> RUNNING -> { READY | SLEEPING | DYING }
//!                       ^                      |          |
//!                       +------- wake ---------+          +-> FREE
//! ```

use bitflags::bitflags;

/// Thread states
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Slot is unused
    Free,
    /// Slot is reserved but not yet schedulable
    NonReady,
    /// Thread is on the ready list (or is an idle thread off-CPU)
    Ready,
    /// Thread is running on some CPU
    Running,
    /// Thread is suspended on a sleep-queue resource
    Sleeping,
    /// Thread has finished and waits for the scheduler to reclaim it
    Dying,
}

impl ThreadState {
    /// Whether the slot holds a thread at all
    pub const fn is_live(&self) -> bool {
        !matches!(self, Self::Free)
    }
}

bitflags! {
    /// Per-thread scheduling flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ThreadFlags: u8 {
        /// Thread is some CPU's idle thread
        const IDLE = 1 << 0;
        /// Thread is queued in the sleep queue and will sleep at its next
        /// reschedule unless a waker clears this first
        const SLEEP_PENDING = 1 << 1;
        /// Thread is on the ready list
        const QUEUED = 1 << 2;
    }
}
