// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Table
//!
//! Fixed-capacity array of thread control blocks and the FIFO ready list
//! threaded through it. The ready list is intrusive: each slot's `next`
//! field holds the index of the following ready thread, so no nodes are ever
//! allocated and every link is a bounds-checked index.
//!
//! The table is always accessed under the kernel's table spinlock.

use super::state::{ThreadFlags, ThreadState};
use super::thread::{Thread, ThreadId, NO_THREAD};
use crate::config::MAX_THREADS;
use crate::platform::Platform;

/// Thread table with embedded ready list
pub struct ThreadTable<P: Platform> {
    /// Thread slots (indexed by ThreadId)
    threads: [Thread<P>; MAX_THREADS],
    /// Where the next allocation scan starts
    cursor: usize,
    /// First ready thread
    ready_head: ThreadId,
    /// Last ready thread
    ready_tail: ThreadId,
    /// Number of threads on the ready list
    ready_len: usize,
}

impl<P: Platform> ThreadTable<P> {
    /// Create a table with every slot free
    pub fn new() -> Self {
        Self {
            threads: core::array::from_fn(|_| Thread::free()),
            cursor: 0,
            ready_head: NO_THREAD,
            ready_tail: NO_THREAD,
            ready_len: 0,
        }
    }

    /// Get a thread slot.
    ///
    /// An out-of-range id means a corrupted link or a forged id.
    pub fn get(&self, tid: ThreadId) -> &Thread<P> {
        match self.threads.get(tid) {
            Some(thread) => thread,
            None => crate::fatal!("thread table: tid {} out of range", tid),
        }
    }

    /// Get a thread slot (mutable)
    pub fn get_mut(&mut self, tid: ThreadId) -> &mut Thread<P> {
        match self.threads.get_mut(tid) {
            Some(thread) => thread,
            None => crate::fatal!("thread table: tid {} out of range", tid),
        }
    }

    /// Look up a slot without treating a bad id as corruption
    pub fn lookup(&self, tid: ThreadId) -> Option<&Thread<P>> {
        self.threads.get(tid)
    }

    /// Find a free slot, starting after the most recent allocation.
    ///
    /// Slots below `reserved` belong to idle threads and are never handed
    /// out; `busy` reports slots whose last context has not yet been
    /// switched off its CPU.
    pub fn find_free(&mut self, reserved: usize, busy: impl Fn(ThreadId) -> bool) -> Option<ThreadId> {
        let span = MAX_THREADS - reserved;
        if span == 0 {
            return None;
        }
        let start = self.cursor.max(reserved);
        for step in 0..span {
            let tid = reserved + (start - reserved + step) % span;
            if self.threads[tid].state == ThreadState::Free && !busy(tid) {
                self.cursor = tid + 1;
                if self.cursor >= MAX_THREADS {
                    self.cursor = reserved;
                }
                return Some(tid);
            }
        }
        None
    }

    /// ============================================================================
    /// Ready List
    /// ============================================================================

    /// Append a thread to the tail of the ready list and mark it READY
    pub fn push_ready(&mut self, tid: ThreadId) {
        let thread = self.get_mut(tid);
        if thread.is_idle() {
            crate::fatal!("ready list: idle thread {} enqueued", tid);
        }
        if thread.flags.contains(ThreadFlags::QUEUED) {
            crate::fatal!("ready list: thread {} enqueued twice", tid);
        }
        if !thread.state.is_live() || thread.state == ThreadState::Dying {
            crate::fatal!("ready list: thread {} enqueued in state {:?}", tid, thread.state);
        }
        thread.state = ThreadState::Ready;
        thread.flags.insert(ThreadFlags::QUEUED);
        thread.next = NO_THREAD;

        if self.ready_tail == NO_THREAD {
            self.ready_head = tid;
        } else {
            let tail = self.ready_tail;
            self.get_mut(tail).next = tid;
        }
        self.ready_tail = tid;
        self.ready_len += 1;
    }

    /// Remove the thread at the head of the ready list
    pub fn pop_ready(&mut self) -> Option<ThreadId> {
        let tid = self.ready_head;
        if tid == NO_THREAD {
            return None;
        }
        let thread = self.get_mut(tid);
        let next = thread.next;
        thread.next = NO_THREAD;
        thread.flags.remove(ThreadFlags::QUEUED);

        self.ready_head = next;
        if next == NO_THREAD {
            self.ready_tail = NO_THREAD;
        }
        self.ready_len -= 1;
        Some(tid)
    }

    /// Number of threads on the ready list
    pub fn ready_len(&self) -> usize {
        self.ready_len
    }

    /// Walk the ready list from head to tail
    pub fn ready_iter(&self) -> ReadyIter<'_, P> {
        ReadyIter {
            table: self,
            cursor: self.ready_head,
            remaining: self.ready_len,
        }
    }

    /// Iterate over every slot with its id
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, &Thread<P>)> {
        self.threads.iter().enumerate()
    }

    /// Count slots that hold a thread
    pub fn live_count(&self) -> usize {
        self.threads.iter().filter(|t| t.state.is_live()).count()
    }
}

impl<P: Platform> Default for ThreadTable<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the ready list
pub struct ReadyIter<'a, P: Platform> {
    table: &'a ThreadTable<P>,
    cursor: ThreadId,
    remaining: usize,
}

impl<'a, P: Platform> Iterator for ReadyIter<'a, P> {
    type Item = ThreadId;

    fn next(&mut self) -> Option<ThreadId> {
        if self.cursor == NO_THREAD {
            return None;
        }
        if self.remaining == 0 {
            crate::fatal!("ready list: cycle through thread {}", self.cursor);
        }
        let tid = self.cursor;
        self.cursor = self.table.get(tid).next;
        self.remaining -= 1;
        Some(tid)
    }
}
