// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Testing infrastructure for the hosted kernel
//!
//! The calling test thread is booted as CPU 0's idle thread. Because the
//! idle thread only gets the CPU back when the ready list is empty, a
//! single [`settle`] from the test body runs every other thread until
//! all of them have blocked or finished.
//!
//! # Usage
//! ```ignore
//! let kernel = boot_hosted(KernelConfig::new());
//! let log = Recorder::new();
//! let sink = log.clone();
//! kernel.spawn(move |k| sink.push(k.current()))?;
//! settle(kernel);
//! ```

use std::boxed::Box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::vec::Vec;

use crate::config::KernelConfig;
use crate::kernel::Kernel;
use crate::platform::hosted::Hosted;

/// Install `env_logger` in test mode (once per process)
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Build a hosted kernel and boot the calling thread as CPU 0
pub fn boot_hosted(config: KernelConfig) -> &'static Kernel<Hosted> {
    init_logger();
    let kernel = Kernel::new(Hosted::new(), config).expect("valid test config");
    let kernel: &'static Kernel<Hosted> = Box::leak(Box::new(kernel));
    kernel.boot_cpu(0);
    kernel
}

/// Yield from the idle thread until nothing is runnable
pub fn settle(kernel: &Kernel<Hosted>) {
    for _ in 0..1000 {
        kernel.yield_now();
        if kernel.ready_snapshot().is_empty() {
            return;
        }
    }
    panic!("kernel did not settle");
}

/// Keep scheduling from the idle thread until every thread has finished.
///
/// Unlike [`settle`] this also waits for threads running on other CPUs.
pub fn drain(kernel: &Kernel<Hosted>) {
    for _ in 0..1_000_000 {
        if kernel.live_threads() == 0 {
            return;
        }
        kernel.yield_now();
        std::thread::yield_now();
    }
    panic!("threads still live: {:?}", kernel.ready_snapshot());
}

/// Leak a value to give it the kernel's lifetime
pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// Secondary CPU driven by its own OS thread
pub struct SecondaryCpu {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SecondaryCpu {
    /// Boot `cpu` and keep it scheduling until stopped.
    ///
    /// With `audit` set, the CPU checks the kernel invariants between
    /// every pass through its idle loop.
    pub fn start(kernel: &'static Kernel<Hosted>, cpu: usize, audit: bool) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name(std::format!("cpu-{}", cpu))
            .spawn(move || {
                kernel.boot_cpu(cpu);
                while !running.load(Ordering::Acquire) {
                    kernel.yield_now();
                    if audit {
                        kernel.audit();
                    }
                    std::thread::yield_now();
                }
            })
            .expect("spawn cpu thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop scheduling on this CPU and wait for its idle loop to exit
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().expect("cpu thread panicked");
        }
    }
}

impl Drop for SecondaryCpu {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Shared, clonable event log
pub struct Recorder<T> {
    events: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone> Recorder<T> {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append an event
    pub fn push(&self, event: T) {
        self.events.lock().expect("recorder poisoned").push(event);
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> Vec<T> {
        self.events.lock().expect("recorder poisoned").clone()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.events.lock().expect("recorder poisoned").len()
    }
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<T: Clone> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}
