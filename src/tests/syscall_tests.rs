// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! System Call Integration Tests
//!
//! Blocking system calls issued from kernel threads through the
//! dispatcher, with the test thread acting as the other party.

use crate::config::KernelConfig;
use crate::kernel::Kernel;
use crate::platform::hosted::Hosted;
use crate::sched::ThreadState;
use crate::status::KStatus;
use crate::syscall::{err_to_ret, number, ret_to_result, SyscallArgs, SyscallRet};
use crate::testing::{boot_hosted, settle, Recorder};

fn call(k: &Kernel<Hosted>, number: u32, a0: usize, a1: usize) -> SyscallRet {
    k.syscall_dispatch(SyscallArgs::new(number, [a0, a1, 0, 0, 0, 0]))
}

/// Test syscall args access methods
#[test]
fn test_syscall_args_access() {
    let args = SyscallArgs::new(0x10, [0x1111, 0x2222, 0x3333, 0x4444, 0x5555, usize::MAX]);

    assert_eq!(args.number, 0x10);
    assert_eq!(args.arg(0), 0x1111);
    assert_eq!(args.arg(4), 0x5555);
    assert_eq!(args.arg_isize(5), -1);

    // Out of bounds should return 0
    assert_eq!(args.arg(6), 0);
    assert_eq!(args.arg(100), 0);
}

/// Test that a negative initial semaphore value is rejected
#[test]
fn test_sem_create_negative() {
    let k = boot_hosted(KernelConfig::new());
    let ret = call(k, number::SEM_CREATE, (-1isize) as usize, 0);
    assert_eq!(ret_to_result(ret), Err(KStatus::ERR_INVALID_ARGS));
}

/// Test that SEM_P blocks the calling thread until SEM_V
#[test]
fn test_sem_p_blocks_until_v() {
    let k = boot_hosted(KernelConfig::new());
    let sem = ret_to_result(call(k, number::SEM_CREATE, 0, 0)).unwrap();
    let log = Recorder::new();
    let sink = log.clone();
    let tid = k
        .spawn(move |k| {
            let ret = call(k, number::SEM_P, sem, 0);
            sink.push(ret);
        })
        .unwrap();

    settle(k);
    assert!(log.snapshot().is_empty());
    assert_eq!(k.thread_state(tid), Some(ThreadState::Sleeping));
    assert_eq!(
        call(k, number::SEM_DESTROY, sem, 0),
        err_to_ret(KStatus::ERR_BAD_STATE)
    );

    assert_eq!(call(k, number::SEM_V, sem, 0), 0);
    settle(k);
    assert_eq!(log.snapshot(), [0]);
    assert_eq!(k.thread_state(tid), Some(ThreadState::Free));
    assert_eq!(call(k, number::SEM_DESTROY, sem, 0), 0);
}

/// Test THREAD_SELF and THREAD_EXIT from a kernel thread
#[test]
fn test_thread_self_and_exit() {
    let k = boot_hosted(KernelConfig::new());
    let log = Recorder::new();
    let sink = log.clone();
    let tid = k
        .spawn(move |k| {
            sink.push(call(k, number::THREAD_SELF, 0, 0));
            call(k, number::THREAD_EXIT, 0, 0);
            sink.push(-1);
        })
        .unwrap();

    settle(k);
    assert_eq!(log.snapshot(), [tid as SyscallRet]);
    assert_eq!(k.thread_state(tid), Some(ThreadState::Free));
}

/// Test lock syscalls contended by two threads
#[test]
fn test_lock_syscalls_between_threads() {
    let k = boot_hosted(KernelConfig::new());
    let lock = ret_to_result(call(k, number::LOCK_CREATE, 0, 0)).unwrap();
    let log = Recorder::new();

    let sink = log.clone();
    k.spawn(move |k| {
        assert_eq!(call(k, number::LOCK_ACQUIRE, lock, 0), 0);
        sink.push("a in");
        call(k, number::THREAD_YIELD, 0, 0);
        sink.push("a out");
        assert_eq!(call(k, number::LOCK_RELEASE, lock, 0), 0);
    })
    .unwrap();

    let sink = log.clone();
    k.spawn(move |k| {
        // Not the holder
        assert_eq!(
            call(k, number::LOCK_RELEASE, lock, 0),
            err_to_ret(KStatus::ERR_ACCESS_DENIED)
        );
        assert_eq!(call(k, number::LOCK_ACQUIRE, lock, 0), 0);
        sink.push("b in");
        assert_eq!(call(k, number::LOCK_RELEASE, lock, 0), 0);
    })
    .unwrap();

    settle(k);
    assert_eq!(log.snapshot(), ["a in", "a out", "b in"]);
    assert_eq!(call(k, number::LOCK_DESTROY, lock, 0), 0);
}

/// Test a condvar handshake driven entirely through syscalls
#[test]
fn test_cond_wait_and_signal_syscalls() {
    let k = boot_hosted(KernelConfig::new());
    let lock = ret_to_result(call(k, number::LOCK_CREATE, 0, 0)).unwrap();
    let cond = ret_to_result(call(k, number::COND_CREATE, 0, 0)).unwrap();
    let log = Recorder::new();

    let sink = log.clone();
    let waiter = k
        .spawn(move |k| {
            assert_eq!(call(k, number::LOCK_ACQUIRE, lock, 0), 0);
            sink.push(call(k, number::COND_WAIT, cond, lock));
            // Still holding the lock after the wait
            sink.push(call(k, number::LOCK_RELEASE, lock, 0));
        })
        .unwrap();

    settle(k);
    assert_eq!(k.thread_state(waiter), Some(ThreadState::Sleeping));
    assert_eq!(
        call(k, number::COND_DESTROY, cond, 0),
        err_to_ret(KStatus::ERR_BAD_STATE)
    );

    assert_eq!(call(k, number::COND_SIGNAL, cond, 0), 0);
    settle(k);
    assert_eq!(log.snapshot(), [0, 0]);
    assert_eq!(call(k, number::COND_DESTROY, cond, 0), 0);
    assert_eq!(call(k, number::LOCK_DESTROY, lock, 0), 0);
}

/// Test that a waiter whose lock was destroyed meanwhile gets ERR_NOT_FOUND
#[test]
fn test_cond_wait_after_lock_destroyed() {
    let k = boot_hosted(KernelConfig::new());
    let lock = ret_to_result(call(k, number::LOCK_CREATE, 0, 0)).unwrap();
    let cond = ret_to_result(call(k, number::COND_CREATE, 0, 0)).unwrap();
    let log = Recorder::new();

    let sink = log.clone();
    let waiter = k
        .spawn(move |k| {
            assert_eq!(call(k, number::LOCK_ACQUIRE, lock, 0), 0);
            sink.push(call(k, number::COND_WAIT, cond, lock));
        })
        .unwrap();

    settle(k);
    assert_eq!(k.thread_state(waiter), Some(ThreadState::Sleeping));
    // Released by the wait and not contended
    assert_eq!(call(k, number::LOCK_DESTROY, lock, 0), 0);

    assert_eq!(call(k, number::COND_SIGNAL, cond, 0), 0);
    settle(k);
    assert_eq!(log.snapshot(), [err_to_ret(KStatus::ERR_NOT_FOUND)]);
    assert_eq!(k.thread_state(waiter), Some(ThreadState::Free));
    assert_eq!(call(k, number::COND_DESTROY, cond, 0), 0);
}

/// Test that destroy refuses a held lock with a sleeping contender
#[test]
fn test_lock_destroy_with_contender() {
    let k = boot_hosted(KernelConfig::new());
    let lock = ret_to_result(call(k, number::LOCK_CREATE, 0, 0)).unwrap();
    let gate = ret_to_result(call(k, number::SEM_CREATE, 0, 0)).unwrap();
    let log = Recorder::new();

    let sink = log.clone();
    let holder = k
        .spawn(move |k| {
            assert_eq!(call(k, number::LOCK_ACQUIRE, lock, 0), 0);
            assert_eq!(call(k, number::SEM_P, gate, 0), 0);
            assert_eq!(call(k, number::LOCK_RELEASE, lock, 0), 0);
            sink.push("holder done");
        })
        .unwrap();
    let sink = log.clone();
    let contender = k
        .spawn(move |k| {
            assert_eq!(call(k, number::LOCK_ACQUIRE, lock, 0), 0);
            sink.push("contender in");
            assert_eq!(call(k, number::LOCK_RELEASE, lock, 0), 0);
        })
        .unwrap();

    settle(k);
    assert_eq!(k.thread_state(holder), Some(ThreadState::Sleeping));
    assert_eq!(k.thread_state(contender), Some(ThreadState::Sleeping));
    assert_eq!(
        call(k, number::LOCK_DESTROY, lock, 0),
        err_to_ret(KStatus::ERR_BAD_STATE)
    );

    assert_eq!(call(k, number::SEM_V, gate, 0), 0);
    settle(k);
    assert_eq!(log.snapshot(), ["holder done", "contender in"]);
    assert_eq!(call(k, number::LOCK_DESTROY, lock, 0), 0);
    assert_eq!(call(k, number::LOCK_ACQUIRE, lock, 0), err_to_ret(KStatus::ERR_NOT_FOUND));
}
