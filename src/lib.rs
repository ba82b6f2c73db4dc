// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! # rrkernel - Scheduling and Synchronization Core
//!
//! The thread scheduling and blocking-synchronization core of a small SMP
//! teaching kernel:
//!
//! - **Thread table**: fixed-capacity array of thread control blocks
//! - **Ready list**: strict FIFO round robin with jittered timeslices
//! - **Sleep queue**: resource-keyed suspension, FIFO per resource
//! - **Primitives**: spinlock, counting semaphore, lock, condition variable
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── kernel.rs          # Kernel context object, boot, audit
//! ├── platform/          # Platform trait, IrqGuard, hosted simulation
//! ├── arch/amd64/        # Bare-metal x86_64 platform
//! ├── sched/             # Threads, thread table, scheduler, lifecycle
//! ├── sync/              # Spinlock, sleep queue, semaphore, lock, condvar
//! ├── syscall.rs         # Handle-based syscall surface
//! ├── config.rs          # Capacities and tunables
//! └── status.rs          # Status codes and the fatal path
//! ```
//!
//! All state lives in a [`Kernel`] passed by reference, so several
//! instances can coexist. Hardware access (CPU id, interrupt flag, timer,
//! register switch) goes through a [`Platform`].
//!
//! ## Using the Kernel
//!
//! ```ignore
//! use rrkernel::{Kernel, KernelConfig};
//! use rrkernel::platform::hosted::Hosted;
//!
//! let kernel: &'static Kernel<Hosted> =
//!     Box::leak(Box::new(Kernel::new(Hosted::new(), KernelConfig::new())?));
//! kernel.boot_cpu(0);
//! kernel.spawn(|k| log::info!("hello from thread {}", k.current()))?;
//! kernel.yield_now();
//! ```

#![cfg_attr(not(any(test, feature = "hosted")), no_std)]

// Alloc crate for heap allocations
extern crate alloc;

// Status codes and fatal path
pub mod status;

// Capacities and tunables
pub mod config;

// Kernel context object
pub mod kernel;

// Platform interface and backends
pub mod platform;

// Architecture-specific platforms
pub mod arch;

// Scheduler and thread management
pub mod sched;

// Synchronization primitives
pub mod sync;

// System call interface
pub mod syscall;

// Testing infrastructure
#[cfg(test)]
pub mod testing;

// Cross-module scenario tests
#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::KernelConfig;
pub use kernel::Kernel;
pub use platform::{IrqGuard, Platform};
pub use sched::{ProcessId, ThreadId, ThreadState};
pub use status::{KResult, KStatus};
pub use sync::{Condvar, Lock, ResourceKey, Semaphore};
