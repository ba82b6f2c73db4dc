// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! System Call Surface
//!
//! Handle-based variants of the thread and synchronization operations, as a
//! syscall layer would expose them. Locks and condition variables are
//! addressed through registries of small integer ids; semaphores use the
//! kernel's semaphore registry.
//!
//! Unlike the kernel-internal API, misuse arriving through this surface is
//! reported, not fatal: releasing a lock the caller does not hold or
//! waiting without the paired lock returns an error code.
//!
//! # Error Return Convention
//!
//! ```text
//! Success: return value (positive or zero)
//! Failure: negative KStatus code
//! ```

use crate::kernel::Kernel;
use crate::platform::{IrqGuard, Platform};
use crate::status::{KResult, KStatus};
use crate::sync::lock::Lock;

/// Syscall return type
pub type SyscallRet = isize;

/// Lock registry id
pub type LockId = usize;

/// Condition variable registry id
pub type CondId = usize;

/// Syscall numbers
pub mod number {
    // Threads (0x01-0x0F)
    pub const THREAD_YIELD: u32 = 0x01;
    pub const THREAD_SELF: u32 = 0x02;
    pub const THREAD_EXIT: u32 = 0x03;

    // Semaphores (0x10-0x1F)
    pub const SEM_CREATE: u32 = 0x10;
    pub const SEM_DESTROY: u32 = 0x11;
    pub const SEM_P: u32 = 0x12;
    pub const SEM_V: u32 = 0x13;

    // Locks (0x20-0x2F)
    pub const LOCK_CREATE: u32 = 0x20;
    pub const LOCK_DESTROY: u32 = 0x21;
    pub const LOCK_ACQUIRE: u32 = 0x22;
    pub const LOCK_RELEASE: u32 = 0x23;

    // Condition variables (0x30-0x3F)
    pub const COND_CREATE: u32 = 0x30;
    pub const COND_DESTROY: u32 = 0x31;
    pub const COND_WAIT: u32 = 0x32;
    pub const COND_SIGNAL: u32 = 0x33;
    pub const COND_BROADCAST: u32 = 0x34;
}

/// System call arguments
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SyscallArgs {
    /// Syscall number
    pub number: u32,

    /// Arguments (up to 6)
    pub args: [usize; 6],
}

impl SyscallArgs {
    /// Create new syscall arguments
    pub const fn new(number: u32, args: [usize; 6]) -> Self {
        Self { number, args }
    }

    /// Get argument at index
    pub const fn arg(&self, index: usize) -> usize {
        if index < 6 {
            self.args[index]
        } else {
            0
        }
    }

    /// Get argument as isize
    pub const fn arg_isize(&self, index: usize) -> isize {
        self.arg(index) as isize
    }
}

/// Convert error code to negative return value
#[inline]
pub const fn err_to_ret(err: KStatus) -> SyscallRet {
    -(err as SyscallRet)
}

/// Convert success value to return value
#[inline]
pub const fn ok_to_ret(val: usize) -> SyscallRet {
    val as SyscallRet
}

fn to_ret(result: KResult<usize>) -> SyscallRet {
    match result {
        Ok(val) => ok_to_ret(val),
        Err(err) => err_to_ret(err),
    }
}

/// Decode a syscall return value
pub fn ret_to_result(ret: SyscallRet) -> KResult<usize> {
    if ret >= 0 {
        return Ok(ret as usize);
    }
    match KStatus::from_raw(ret.unsigned_abs() as u32) {
        Some(status) => Err(status),
        None => Err(KStatus::ERR_INVALID_ARGS),
    }
}

impl<P: Platform> Kernel<P> {
    /// ============================================================================
    /// Syscall Dispatcher
    /// ============================================================================

    /// Route a system call to its handler
    pub fn syscall_dispatch(&self, args: SyscallArgs) -> SyscallRet {
        let a0 = args.arg(0);
        let result = match args.number {
            number::THREAD_YIELD => {
                self.yield_now();
                Ok(0)
            }
            number::THREAD_SELF => Ok(self.current()),
            number::THREAD_EXIT => self.finish(),

            number::SEM_CREATE => self.sem_create(args.arg_isize(0)),
            number::SEM_DESTROY => self.sem_destroy(a0).map(|_| 0),
            number::SEM_P => self.sem_p(a0).map(|_| 0),
            number::SEM_V => self.sem_v(a0).map(|_| 0),

            number::LOCK_CREATE => self.sys_lock_create(),
            number::LOCK_DESTROY => self.sys_lock_destroy(a0).map(|_| 0),
            number::LOCK_ACQUIRE => self.sys_lock_acquire(a0).map(|_| 0),
            number::LOCK_RELEASE => self.sys_lock_release(a0).map(|_| 0),

            number::COND_CREATE => self.sys_cond_create(),
            number::COND_DESTROY => self.sys_cond_destroy(a0).map(|_| 0),
            number::COND_WAIT => self.sys_cond_wait(a0, args.arg(1)).map(|_| 0),
            number::COND_SIGNAL => self.sys_cond_signal(a0).map(|_| 0),
            number::COND_BROADCAST => self.sys_cond_broadcast(a0).map(|_| 0),

            unknown => {
                log::warn!("syscall: unknown number {:#x}", unknown);
                Err(KStatus::ERR_INVALID_ARGS)
            }
        };
        to_ret(result)
    }

    /// ============================================================================
    /// Locks
    /// ============================================================================

    /// Create a lock
    pub fn sys_lock_create(&self) -> KResult<LockId> {
        let id = self.locks.allocate(|lock| lock.reset()).map_err(|err| {
            log::warn!("lock_create: registry full");
            err
        })?;
        log::debug!("lock {} created", id);
        Ok(id)
    }

    /// Destroy a lock that is neither held nor waited on
    pub fn sys_lock_destroy(&self, id: LockId) -> KResult<()> {
        let _irq = IrqGuard::new(&self.platform);
        self.locks.free(id, |lock| lock.retire(self))?;
        log::debug!("lock {} destroyed", id);
        Ok(())
    }

    /// Acquire lock `id`; re-acquiring a held lock is `ERR_BAD_STATE`
    pub fn sys_lock_acquire(&self, id: LockId) -> KResult<()> {
        self.locks.get(id)?.acquire_checked(self)
    }

    /// Release lock `id`; the caller must hold it
    pub fn sys_lock_release(&self, id: LockId) -> KResult<()> {
        self.locks.get(id)?.release_checked(self)
    }

    /// ============================================================================
    /// Condition Variables
    /// ============================================================================

    /// Create a condition variable
    pub fn sys_cond_create(&self) -> KResult<CondId> {
        let id = self.condvars.allocate(|cond| cond.reset()).map_err(|err| {
            log::warn!("cond_create: registry full");
            err
        })?;
        log::debug!("condvar {} created", id);
        Ok(id)
    }

    /// Destroy a condition variable nobody waits on
    pub fn sys_cond_destroy(&self, id: CondId) -> KResult<()> {
        let _irq = IrqGuard::new(&self.platform);
        self.condvars.free(id, |cond| cond.retire(self))?;
        log::debug!("condvar {} destroyed", id);
        Ok(())
    }

    /// Wait on condvar `cond` with lock `lock` held
    pub fn sys_cond_wait(&self, cond: CondId, lock: LockId) -> KResult<()> {
        let cond = self.condvars.get(cond)?;
        let lock: &Lock = self.locks.get(lock)?;
        cond.wait_checked(self, lock)
    }

    /// Signal condvar `id`
    pub fn sys_cond_signal(&self, id: CondId) -> KResult<()> {
        self.condvars.get(id)?.signal(self);
        Ok(())
    }

    /// Broadcast condvar `id`
    pub fn sys_cond_broadcast(&self, id: CondId) -> KResult<()> {
        self.condvars.get(id)?.broadcast(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::platform::hosted::Hosted;

    fn kernel() -> Kernel<Hosted> {
        let k = Kernel::new(Hosted::new(), KernelConfig::new()).unwrap();
        k.boot_cpu(0);
        k
    }

    fn call(k: &Kernel<Hosted>, number: u32, a0: usize, a1: usize) -> SyscallRet {
        k.syscall_dispatch(SyscallArgs::new(number, [a0, a1, 0, 0, 0, 0]))
    }

    #[test]
    fn test_error_convention() {
        assert_eq!(err_to_ret(KStatus::ERR_NOT_FOUND), -4);
        assert_eq!(ok_to_ret(9), 9);
        assert_eq!(ret_to_result(-3), Err(KStatus::ERR_NO_RESOURCES));
        assert_eq!(ret_to_result(12), Ok(12));
    }

    #[test]
    fn test_unknown_syscall() {
        let k = kernel();
        assert_eq!(call(&k, 0xFF, 0, 0), err_to_ret(KStatus::ERR_INVALID_ARGS));
    }

    #[test]
    fn test_thread_self_is_idle_on_boot_cpu() {
        let k = kernel();
        assert_eq!(call(&k, number::THREAD_SELF, 0, 0), 0);
        assert_eq!(call(&k, number::THREAD_YIELD, 0, 0), 0);
    }

    #[test]
    fn test_semaphore_syscalls() {
        let k = kernel();
        let sem = call(&k, number::SEM_CREATE, 2, 0);
        assert!(sem >= 0);
        let sem = sem as usize;
        assert_eq!(call(&k, number::SEM_P, sem, 0), 0);
        assert_eq!(call(&k, number::SEM_V, sem, 0), 0);
        assert_eq!(k.sem_value(sem), Ok(2));
        assert_eq!(call(&k, number::SEM_DESTROY, sem, 0), 0);
        assert_eq!(call(&k, number::SEM_P, sem, 0), err_to_ret(KStatus::ERR_NOT_FOUND));
    }

    #[test]
    fn test_lock_misuse_is_reported() {
        let k = kernel();
        let lock = k.sys_lock_create().unwrap();
        assert_eq!(k.sys_lock_release(lock), Err(KStatus::ERR_ACCESS_DENIED));
        k.sys_lock_acquire(lock).unwrap();
        assert_eq!(k.sys_lock_acquire(lock), Err(KStatus::ERR_BAD_STATE));
        assert_eq!(k.sys_lock_destroy(lock), Err(KStatus::ERR_BAD_STATE));
        k.sys_lock_release(lock).unwrap();
        k.sys_lock_destroy(lock).unwrap();
        assert_eq!(k.sys_lock_acquire(lock), Err(KStatus::ERR_NOT_FOUND));
    }

    #[test]
    fn test_cond_wait_without_lock_is_reported() {
        let k = kernel();
        let lock = k.sys_lock_create().unwrap();
        let cond = k.sys_cond_create().unwrap();
        assert_eq!(
            call(&k, number::COND_WAIT, cond, lock),
            err_to_ret(KStatus::ERR_ACCESS_DENIED)
        );
        assert_eq!(call(&k, number::COND_SIGNAL, cond, 0), 0);
        assert_eq!(call(&k, number::COND_BROADCAST, cond, 0), 0);
        assert_eq!(call(&k, number::COND_DESTROY, cond, 0), 0);
        assert_eq!(call(&k, number::COND_SIGNAL, cond, 0), err_to_ret(KStatus::ERR_NOT_FOUND));
    }
}
