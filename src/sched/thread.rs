// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread representation
//!
//! Defines the thread control block stored in each thread-table slot.

use super::state::{ThreadFlags, ThreadState};
use crate::kernel::Kernel;
use crate::platform::Platform;

/// Thread ID type: index of the thread's slot in the thread table
pub type ThreadId = usize;

/// Link value meaning "no thread"
pub const NO_THREAD: ThreadId = usize::MAX;

/// Thread entry point; receives the kernel handle and the creator's argument
pub type EntryPoint<P> = fn(&'static Kernel<P>, usize);

/// Opaque owning-process identifier, carried but never interpreted here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Owner of kernel-internal threads
    pub const KERNEL: Self = Self(0);
}

/// Thread statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadStats {
    /// Number of times this thread has been scheduled
    pub schedule_count: u64,
    /// Number of voluntary context switches (yield, sleep, finish)
    pub voluntary_switches: u64,
    /// Number of involuntary context switches (timer preemption)
    pub involuntary_switches: u64,
}

/// Thread control block
pub struct Thread<P: Platform> {
    /// Lifecycle state
    pub(crate) state: ThreadState,
    /// Scheduling flags
    pub(crate) flags: ThreadFlags,
    /// Owning process
    pub(crate) owner: ProcessId,
    /// Next thread on the ready list
    pub(crate) next: ThreadId,
    /// Saved execution context; the slot owns it while the thread is off-CPU
    pub(crate) context: Option<P::Context>,
    /// Entry function and argument, consumed when the thread first runs
    pub(crate) entry: Option<(EntryPoint<P>, usize)>,
    /// Statistics
    pub(crate) stats: ThreadStats,
}

impl<P: Platform> Thread<P> {
    /// An unused slot
    pub const fn free() -> Self {
        Self {
            state: ThreadState::Free,
            flags: ThreadFlags::empty(),
            owner: ProcessId::KERNEL,
            next: NO_THREAD,
            context: None,
            entry: None,
            stats: ThreadStats {
                schedule_count: 0,
                voluntary_switches: 0,
                involuntary_switches: 0,
            },
        }
    }

    /// Get the thread state
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Get the thread flags
    pub fn flags(&self) -> ThreadFlags {
        self.flags
    }

    /// Get the owning process
    pub fn owner(&self) -> ProcessId {
        self.owner
    }

    /// Get the thread statistics
    pub fn stats(&self) -> ThreadStats {
        self.stats
    }

    /// Whether this is an idle thread
    pub fn is_idle(&self) -> bool {
        self.flags.contains(ThreadFlags::IDLE)
    }

    /// Free a finished thread's slot.
    ///
    /// The context stays attached: the thread is still executing on it until
    /// its CPU switches away, and it is released when the slot is reused.
    pub(crate) fn retire(&mut self) {
        self.state = ThreadState::Free;
        self.flags = ThreadFlags::empty();
        self.owner = ProcessId::KERNEL;
        self.next = NO_THREAD;
        self.entry = None;
    }

    /// Return the slot to the free state, keeping only the stale context
    /// for the caller to release.
    pub(crate) fn reset(&mut self) -> Option<P::Context> {
        let context = self.context.take();
        *self = Self::free();
        context
    }
}
