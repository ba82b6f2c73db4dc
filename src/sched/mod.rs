// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduler and thread management
//!
//! Threads live in a fixed table and are scheduled round robin from a
//! FIFO ready list. The operations themselves are methods on
//! [`Kernel`](crate::Kernel).
//!
//! # Example
//! ```ignore
//! let kernel: &'static Kernel<_> = /* booted kernel */;
//! let tid = kernel.create(worker, 7)?;
//! kernel.run(tid)?;
//! kernel.yield_now();
//! ```

pub mod thread;
pub mod state;
pub mod table;
pub mod scheduler;
pub mod lifecycle;

pub use thread::{Thread, ThreadId, ThreadStats, EntryPoint, ProcessId, NO_THREAD};
pub use state::{ThreadState, ThreadFlags};
pub use table::ThreadTable;
