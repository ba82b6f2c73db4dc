// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Kernel Configuration
//!
//! Capacities of the fixed kernel tables are compile-time constants; the
//! scheduler tunables are carried in [`KernelConfig`] and validated when a
//! [`Kernel`](crate::Kernel) is constructed.

use static_assertions::const_assert;

use crate::status::{KResult, KStatus};

/// ============================================================================
/// Table Capacities
/// ============================================================================

/// Number of slots in the thread table (idle threads included)
pub const MAX_THREADS: usize = 32;

/// Maximum number of CPUs the per-CPU tables are sized for
pub const MAX_CPUS: usize = 4;

/// Number of sleep-queue hash buckets (prime)
pub const SLEEP_BUCKETS: usize = 127;

/// Capacity of the semaphore registry
pub const MAX_SEMAPHORES: usize = 128;

/// Capacity of the lock registry
pub const MAX_LOCKS: usize = 64;

/// Capacity of the condition variable registry
pub const MAX_CONDVARS: usize = 64;

/// Nominal timeslice in timer ticks
pub const DEFAULT_TIMESLICE_TICKS: u32 = 750;

/// Maximum deviation from the nominal timeslice
pub const DEFAULT_TIMESLICE_JITTER: u32 = 375;

/// Default seed for the timeslice jitter generator
pub const DEFAULT_RNG_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

const fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

const_assert!(is_prime(SLEEP_BUCKETS));
const_assert!(MAX_CPUS < MAX_THREADS);
const_assert!(MAX_THREADS < u16::MAX as usize);

/// ============================================================================
/// Runtime Configuration
/// ============================================================================

/// Scheduler tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of CPUs that will call `boot_cpu`
    pub cpus: usize,
    /// Nominal timeslice in timer ticks
    pub timeslice_ticks: u32,
    /// Timeslice is drawn uniformly from `ticks ± jitter`
    pub timeslice_jitter: u32,
    /// Seed for the jitter generator (0 is remapped, xorshift has no zero state)
    pub rng_seed: u64,
}

impl KernelConfig {
    /// Uniprocessor defaults
    pub const fn new() -> Self {
        Self {
            cpus: 1,
            timeslice_ticks: DEFAULT_TIMESLICE_TICKS,
            timeslice_jitter: DEFAULT_TIMESLICE_JITTER,
            rng_seed: DEFAULT_RNG_SEED,
        }
    }

    /// Set the number of CPUs
    pub const fn with_cpus(mut self, cpus: usize) -> Self {
        self.cpus = cpus;
        self
    }

    /// Set the nominal timeslice and its jitter
    pub const fn with_timeslice(mut self, ticks: u32, jitter: u32) -> Self {
        self.timeslice_ticks = ticks;
        self.timeslice_jitter = jitter;
        self
    }

    /// Set the jitter generator seed
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Check the configuration against the table capacities
    pub fn validate(&self) -> KResult<()> {
        if self.cpus == 0 || self.cpus > MAX_CPUS {
            return Err(KStatus::ERR_INVALID_ARGS);
        }
        if self.timeslice_ticks == 0 || self.timeslice_jitter >= self.timeslice_ticks {
            return Err(KStatus::ERR_INVALID_ARGS);
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
