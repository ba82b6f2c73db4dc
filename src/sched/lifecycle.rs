// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread lifecycle
//!
//! Creation is split in two: [`Kernel::create`] reserves a slot and builds
//! the thread's context but leaves it NONREADY, and [`Kernel::run`] makes it
//! schedulable. A creator can configure the thread in between.
//!
//! A thread ends by calling [`Kernel::finish`] (directly, or by returning
//! from its entry function). The slot is freed by the scheduler as the
//! thread is switched out for the last time.

use alloc::boxed::Box;

use super::state::ThreadState;
use super::thread::{EntryPoint, ProcessId, ThreadId};
use crate::kernel::Kernel;
use crate::platform::{IrqGuard, Platform, ThreadStart};
use crate::sched::scheduler::SwitchCause;
use crate::status::{KResult, KStatus};
use core::sync::atomic::Ordering;

/// Closure carried through a spawned thread's entry argument
type SpawnFn<P> = Box<dyn FnOnce(&'static Kernel<P>) + Send>;

impl<P: Platform> Kernel<P> {
    /// Create a NONREADY thread that will run `entry(kernel, arg)`.
    ///
    /// The new thread belongs to the caller's owner. Fails with
    /// `ERR_NO_RESOURCES` when the thread table is full.
    pub fn create(&'static self, entry: EntryPoint<P>, arg: usize) -> KResult<ThreadId> {
        self.create_owned(self.current_owner(), entry, arg)
    }

    /// Create a NONREADY thread on behalf of `owner`
    pub fn create_owned(
        &'static self,
        owner: ProcessId,
        entry: EntryPoint<P>,
        arg: usize,
    ) -> KResult<ThreadId> {
        let (tid, stale) = {
            let _irq = IrqGuard::new(&self.platform);
            let mut table = self.table.lock();
            let found = table.find_free(self.config.cpus, |tid| self.on_cpu[tid].load(Ordering::Acquire));
            let Some(tid) = found else {
                log::warn!("create: thread table full ({} live)", table.live_count());
                return Err(KStatus::ERR_NO_RESOURCES);
            };
            let stale = table.get_mut(tid).reset();
            let thread = table.get_mut(tid);
            thread.state = ThreadState::NonReady;
            thread.owner = owner;
            thread.entry = Some((entry, arg));
            (tid, stale)
        };

        if let Some(context) = stale {
            self.platform.release_context(context);
        }

        match self.platform.new_context(ThreadStart::new(self, tid)) {
            Ok(context) => {
                let _irq = IrqGuard::new(&self.platform);
                self.table.lock().get_mut(tid).context = Some(context);
                log::debug!("created thread {} for {:?}", tid, owner);
                Ok(tid)
            }
            Err(err) => {
                let _irq = IrqGuard::new(&self.platform);
                self.table.lock().get_mut(tid).reset();
                log::warn!("create: no context for thread {}: {}", tid, err);
                Err(err)
            }
        }
    }

    /// Create and run a thread executing `f`
    pub fn spawn<F>(&'static self, f: F) -> KResult<ThreadId>
    where
        F: FnOnce(&'static Kernel<P>) + Send + 'static,
    {
        let boxed: Box<SpawnFn<P>> = Box::new(Box::new(f));
        let arg = Box::into_raw(boxed) as usize;
        let tid = match self.create(Self::spawn_entry, arg) {
            Ok(tid) => tid,
            Err(err) => {
                // SAFETY: the thread was never created, so `arg` is still ours
                drop(unsafe { Box::from_raw(arg as *mut SpawnFn<P>) });
                return Err(err);
            }
        };
        self.run(tid)?;
        Ok(tid)
    }

    fn spawn_entry(kernel: &'static Kernel<P>, arg: usize) {
        // SAFETY: `arg` came from `Box::into_raw` in `spawn`, and a thread's
        // entry runs exactly once
        let f = unsafe { Box::from_raw(arg as *mut SpawnFn<P>) };
        f(kernel);
    }

    /// Make a NONREADY thread schedulable
    pub fn run(&self, tid: ThreadId) -> KResult<()> {
        let _irq = IrqGuard::new(&self.platform);
        let mut table = self.table.lock();
        let thread = table.lookup(tid).ok_or(KStatus::ERR_INVALID_ARGS)?;
        if thread.state() != ThreadState::NonReady || thread.context.is_none() {
            return Err(KStatus::ERR_BAD_STATE);
        }
        table.push_ready(tid);
        Ok(())
    }

    /// Thread running on the calling CPU
    pub fn current(&self) -> ThreadId {
        let irq = IrqGuard::new(&self.platform);
        self.current_locked(&irq)
    }

    /// Change the owner of a thread that has not been started yet
    pub fn set_owner(&self, tid: ThreadId, owner: ProcessId) -> KResult<()> {
        let _irq = IrqGuard::new(&self.platform);
        let mut table = self.table.lock();
        let state = table.lookup(tid).ok_or(KStatus::ERR_INVALID_ARGS)?.state();
        if state != ThreadState::NonReady {
            return Err(KStatus::ERR_BAD_STATE);
        }
        table.get_mut(tid).owner = owner;
        Ok(())
    }

    /// Owner of thread `tid`, if the slot holds a thread
    pub fn owner_of(&self, tid: ThreadId) -> Option<ProcessId> {
        let _irq = IrqGuard::new(&self.platform);
        self.table
            .lock()
            .lookup(tid)
            .filter(|t| t.state().is_live())
            .map(|t| t.owner())
    }

    /// End the calling thread. Never returns.
    pub fn finish(&self) -> ! {
        let irq = IrqGuard::new(&self.platform);
        let me = self.current_locked(&irq);
        {
            let mut table = self.table.lock();
            let thread = table.get_mut(me);
            if thread.is_idle() {
                crate::fatal!("finish: idle thread {} cannot exit", me);
            }
            if thread.state != ThreadState::Running {
                crate::fatal!("finish: thread {} is {:?}", me, thread.state);
            }
            thread.state = ThreadState::Dying;
        }
        log::debug!("thread {} finished", me);
        self.reschedule(&irq, SwitchCause::Voluntary);
        crate::fatal!("finish: dying thread {} was resumed", me)
    }

    /// First code a new context runs
    pub(crate) fn thread_main(&'static self, tid: ThreadId) -> ! {
        self.finish_switch();
        let entry = {
            let _irq = IrqGuard::new(&self.platform);
            self.table.lock().get_mut(tid).entry.take()
        };
        let Some((entry, arg)) = entry else {
            crate::fatal!("thread {} started without an entry point", tid);
        };
        self.platform.irq_restore(true);
        entry(self, arg);
        self.finish()
    }

    fn current_owner(&self) -> ProcessId {
        let _irq = IrqGuard::new(&self.platform);
        let Some(tid) = self.current_on(self.platform.cpu_id()) else {
            return ProcessId::KERNEL;
        };
        self.table.lock().get(tid).owner()
    }
}
