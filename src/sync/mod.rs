// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Synchronization Primitives
//!
//! # Primitives
//!
//! - **SpinMutex**: busy-wait lock protecting the kernel's own tables
//! - **SleepQueue**: resource-keyed suspension every blocking primitive uses
//! - **Semaphore**: counting semaphore with FIFO wakeup
//! - **Lock**: sleeping mutual-exclusion lock with an owner
//! - **Condvar**: Mesa-style condition variable paired with a `Lock`
//!
//! # Lock ordering
//!
//! ```text
//! Semaphore / Lock / Condvar internal spinlock
//!     -> sleep queue
//!         -> thread table
//! ```
//!
//! Spinlocks are only taken with local interrupts disabled and never
//! suspend; blocking primitives drop their spinlock before yielding.
//! Destroying a registry object marks it retired under its own spinlock
//! and releases the registry slot before that spinlock is dropped.

pub mod spinlock;
pub mod sleep_queue;
pub mod registry;
pub mod semaphore;
pub mod lock;
pub mod condvar;

// Re-exports
pub use spinlock::{SpinMutex, SpinMutexGuard, SpinLock, SpinLockGuard};
pub use sleep_queue::{ResourceKey, SleepQueue};
pub use registry::Registry;
pub use semaphore::{SemId, Semaphore, SemaphoreTable};
pub use lock::Lock;
pub use condvar::Condvar;
