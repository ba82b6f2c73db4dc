// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Sleep Queue
//!
//! The one suspension mechanism every blocking primitive is built on. A
//! thread that must wait records an opaque [`ResourceKey`] and is appended
//! to that key's hash bucket; a waker names the same key to move the
//! earliest matching sleeper (or all of them) back to the ready list.
//!
//! # Design
//!
//! - **Fixed buckets**: `SLEEP_BUCKETS` (a prime) chains, bucket =
//!   `key % SLEEP_BUCKETS`
//! - **Intrusive chains**: links are thread ids in a per-thread array, no
//!   node allocation. The arrays live here rather than in the thread table,
//!   so the ready-list `next` link and the sleep link never alias.
//! - **FIFO per key**: sleepers are appended, wakers scan from the head, so
//!   threads on the same resource wake in the order they slept
//! - **Collisions**: distinct keys may share a bucket; matching compares the
//!   stored key exactly. The scan is linear in the bucket length, which is
//!   bounded by the thread table size.
//!
//! # Protocol
//!
//! [`Kernel::sleep_on`] only *queues* the caller and flags it
//! `SLEEP_PENDING`; it does not block. The caller releases whatever lock
//! guards its predicate and then yields, and the scheduler turns the pending
//! flag into `Sleeping`. A waker that gets there first simply clears the
//! flag, so the yield becomes an ordinary requeue and no wakeup is lost.

use crate::config::{MAX_THREADS, SLEEP_BUCKETS};
use crate::kernel::Kernel;
use crate::platform::{IrqGuard, Platform};
use crate::sched::state::{ThreadFlags, ThreadState};
use crate::sched::thread::{ThreadId, NO_THREAD};

/// ============================================================================
/// Resource Keys
/// ============================================================================

/// Identifier of something threads can sleep on.
///
/// Usually the address of the object being waited for. The key is only ever
/// compared and hashed, never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey(usize);

impl ResourceKey {
    /// Key derived from an object's address
    pub fn of<T>(object: &T) -> Self {
        Self(object as *const T as usize)
    }

    /// Key from a raw identifier; zero is reserved for "not sleeping"
    pub const fn from_raw(raw: usize) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Raw identifier
    pub const fn raw(self) -> usize {
        self.0
    }

    /// Bucket this key hashes to
    pub const fn bucket(self) -> usize {
        self.0 % SLEEP_BUCKETS
    }
}

/// ============================================================================
/// Sleep Queue
/// ============================================================================

/// Bucketed chains of sleeping threads
pub struct SleepQueue {
    /// First sleeper in each bucket
    heads: [ThreadId; SLEEP_BUCKETS],
    /// Last sleeper in each bucket
    tails: [ThreadId; SLEEP_BUCKETS],
    /// Chain links (indexed by ThreadId)
    next: [ThreadId; MAX_THREADS],
    /// Key each thread sleeps on, 0 when not queued
    keys: [usize; MAX_THREADS],
    /// Number of queued threads
    len: usize,
}

impl SleepQueue {
    /// Create an empty sleep queue
    pub const fn new() -> Self {
        Self {
            heads: [NO_THREAD; SLEEP_BUCKETS],
            tails: [NO_THREAD; SLEEP_BUCKETS],
            next: [NO_THREAD; MAX_THREADS],
            keys: [0; MAX_THREADS],
            len: 0,
        }
    }

    /// Append `tid` to the chain of `key`'s bucket
    pub fn insert(&mut self, tid: ThreadId, key: ResourceKey) {
        if tid >= MAX_THREADS {
            crate::fatal!("sleep queue: tid {} out of range", tid);
        }
        if self.keys[tid] != 0 {
            crate::fatal!("sleep queue: thread {} already sleeping on {:#x}", tid, self.keys[tid]);
        }
        let bucket = key.bucket();
        self.keys[tid] = key.raw();
        self.next[tid] = NO_THREAD;
        if self.tails[bucket] == NO_THREAD {
            self.heads[bucket] = tid;
        } else {
            self.next[self.tails[bucket]] = tid;
        }
        self.tails[bucket] = tid;
        self.len += 1;
    }

    /// Unlink the earliest sleeper on exactly `key`
    pub fn remove_first(&mut self, key: ResourceKey) -> Option<ThreadId> {
        let bucket = key.bucket();
        let mut prev = NO_THREAD;
        let mut cursor = self.heads[bucket];

        while cursor != NO_THREAD {
            let next = self.next[cursor];
            if self.keys[cursor] == key.raw() {
                if prev == NO_THREAD {
                    self.heads[bucket] = next;
                } else {
                    self.next[prev] = next;
                }
                if self.tails[bucket] == cursor {
                    self.tails[bucket] = prev;
                }
                self.next[cursor] = NO_THREAD;
                self.keys[cursor] = 0;
                self.len -= 1;
                return Some(cursor);
            }
            prev = cursor;
            cursor = next;
        }
        None
    }

    /// Key `tid` is queued on, if any
    pub fn key_of(&self, tid: ThreadId) -> Option<ResourceKey> {
        ResourceKey::from_raw(*self.keys.get(tid)?)
    }

    /// Whether `tid` is queued anywhere
    pub fn contains(&self, tid: ThreadId) -> bool {
        self.key_of(tid).is_some()
    }

    /// Number of threads queued on exactly `key`
    pub fn waiters(&self, key: ResourceKey) -> usize {
        self.chain(key.bucket()).filter(|&tid| self.keys[tid] == key.raw()).count()
    }

    /// Total number of queued threads
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Walk one bucket's chain from head to tail
    pub fn chain(&self, bucket: usize) -> impl Iterator<Item = ThreadId> + '_ {
        let mut cursor = self.heads[bucket];
        let mut budget = MAX_THREADS;
        core::iter::from_fn(move || {
            if cursor == NO_THREAD {
                return None;
            }
            if budget == 0 {
                crate::fatal!("sleep queue: cycle in bucket {}", bucket);
            }
            budget -= 1;
            let tid = cursor;
            cursor = self.next[tid];
            Some(tid)
        })
    }
}

impl Default for SleepQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// ============================================================================
/// Kernel Operations
/// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Queue the calling thread on `key`.
    ///
    /// Does not block: the caller must drop whatever lock protects its
    /// predicate and then [`yield_locked`](Kernel::yield_locked). Calling this
    /// from an idle thread is fatal.
    pub fn sleep_on(&self, irq: &IrqGuard<'_, P>, key: ResourceKey) {
        let me = self.current_locked(irq);
        let mut queue = self.sleepq.lock();
        let mut table = self.table.lock();
        let thread = table.get_mut(me);
        if thread.is_idle() {
            crate::fatal!("sleep_on: idle thread {} cannot sleep", me);
        }
        if thread.state != ThreadState::Running {
            crate::fatal!("sleep_on: thread {} is {:?}, not running", me, thread.state);
        }
        // Flag before the thread becomes visible to wakers
        thread.flags.insert(ThreadFlags::SLEEP_PENDING);
        queue.insert(me, key);
        log::trace!("thread {} sleeps on {:#x}", me, key.raw());
    }

    /// Wake the earliest thread sleeping on `key`.
    ///
    /// Returns the woken thread, or `None` (a no-op) if nothing sleeps on
    /// `key`. Never blocks; safe from interrupt context.
    pub fn wake_one(&self, key: ResourceKey) -> Option<ThreadId> {
        let _irq = IrqGuard::new(&self.platform);
        let mut queue = self.sleepq.lock();
        let tid = queue.remove_first(key)?;
        // Sleep queue stays locked until the thread is runnable
        let mut table = self.table.lock();
        Self::make_runnable(&mut table, tid);
        log::trace!("woke thread {} from {:#x}", tid, key.raw());
        Some(tid)
    }

    /// Wake every thread sleeping on `key`, in the order they slept.
    ///
    /// Returns how many threads were woken.
    pub fn wake_all(&self, key: ResourceKey) -> usize {
        let _irq = IrqGuard::new(&self.platform);
        let mut queue = self.sleepq.lock();
        let mut table = self.table.lock();
        let mut count = 0;
        while let Some(tid) = queue.remove_first(key) {
            Self::make_runnable(&mut table, tid);
            count += 1;
        }
        if count > 0 {
            log::trace!("woke {} threads from {:#x}", count, key.raw());
        }
        count
    }

    /// Key `tid` is sleeping (or about to sleep) on
    pub fn sleeping_on(&self, tid: ThreadId) -> Option<ResourceKey> {
        let _irq = IrqGuard::new(&self.platform);
        self.sleepq.lock().key_of(tid)
    }

    /// Number of threads queued on `key`
    pub fn waiter_count(&self, key: ResourceKey) -> usize {
        let _irq = IrqGuard::new(&self.platform);
        self.sleepq.lock().waiters(key)
    }
}
