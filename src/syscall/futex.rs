//! `futex` (spec.md §4.6). Wake ordering is FIFO by the serial each waiter
//! was assigned at `FUTEX_WAIT`/`FUTEX_WAIT_BITSET` time, drawn from
//! [`KernelState::next_futex_serial`] — a per-instance counter, not a global
//! one (spec.md §9 Open Question resolution).

use crate::abi::flags::{
    FUTEX_CLOCK_REALTIME, FUTEX_CMP_REQUEUE, FUTEX_PRIVATE_FLAG, FUTEX_WAIT, FUTEX_WAIT_BITSET, FUTEX_WAKE,
    FUTEX_WAKE_BITSET, FUTEX_WAKE_OP,
};
use crate::context::{Pid, RunState, Suspension};
use crate::errno::Errno;
use crate::kernel::KernelState;

use super::{Args, SyscallError, SyscallOutcome};

fn strip_modifiers(op: u32) -> u32 {
    op & !(FUTEX_PRIVATE_FLAG | FUTEX_CLOCK_REALTIME)
}

/// Waiters parked on `addr`, oldest (lowest serial) first.
fn waiters_at(k: &KernelState, addr: u32) -> Vec<(Pid, u32, u64)> {
    let mut out = Vec::new();
    for pid in k.pids() {
        if let Some(ctx) = k.context(pid) {
            if let RunState::Suspended(Suspension::Futex { addr: a, bitset, sleep_serial }) = &ctx.run_state {
                if *a == addr {
                    out.push((pid, *bitset, *sleep_serial));
                }
            }
        }
    }
    out.sort_by_key(|(_, _, serial)| *serial);
    out
}

pub fn sys_futex(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let addr = args[0];
    let op = strip_modifiers(args[1]);
    let val = args[2];
    let val2_or_timeout = args[3];
    let addr2 = args[4];
    let val3 = args[5];

    match op {
        FUTEX_WAIT => futex_wait(k, pid, addr, val, u32::MAX),
        FUTEX_WAIT_BITSET => {
            if val3 == 0 {
                return Err(SyscallError::Errno(Errno::EINVAL));
            }
            futex_wait(k, pid, addr, val, val3)
        }
        FUTEX_WAKE => Ok(SyscallOutcome::Value(futex_wake(k, addr, val, u32::MAX))),
        FUTEX_WAKE_BITSET => {
            if val3 == 0 {
                return Err(SyscallError::Errno(Errno::EINVAL));
            }
            Ok(SyscallOutcome::Value(futex_wake(k, addr, val, val3)))
        }
        FUTEX_CMP_REQUEUE => futex_cmp_requeue(k, addr, val, val2_or_timeout, addr2, val3),
        FUTEX_WAKE_OP => futex_wake_op(k, addr, val, val2_or_timeout, addr2, val3),
        other => Err(SyscallError::Fatal(format!("futex: unsupported op {other}"))),
    }
}

fn futex_wait(k: &mut KernelState, pid: Pid, addr: u32, expected: u32, bitset: u32) -> Result<SyscallOutcome, SyscallError> {
    let current = {
        let ctx = k.context(pid).unwrap();
        ctx.vm.lock().read_u32(addr).map_err(|_| SyscallError::Errno(Errno::EFAULT))?
    };
    if current != expected {
        return Err(SyscallError::Errno(Errno::EAGAIN));
    }
    let serial = k.next_futex_serial();
    let ctx = k.context_mut(pid).unwrap();
    ctx.suspend(Suspension::Futex { addr, bitset, sleep_serial: serial });
    Ok(SyscallOutcome::Suspended)
}

fn futex_wake(k: &mut KernelState, addr: u32, max_wake: u32, bitset: u32) -> i32 {
    let mut woken = 0;
    for (pid, waiter_bitset, _) in waiters_at(k, addr) {
        if woken >= max_wake {
            break;
        }
        if waiter_bitset & bitset == 0 {
            continue;
        }
        let ctx = k.context_mut(pid).unwrap();
        ctx.set_retval(0);
        ctx.resume();
        woken += 1;
    }
    woken as i32
}

fn futex_cmp_requeue(
    k: &mut KernelState,
    addr: u32,
    wake_count: u32,
    requeue_count: u32,
    addr2: u32,
    expected_val: u32,
) -> Result<SyscallOutcome, SyscallError> {
    let current = {
        // Any live context's VM view suffices: CMP_REQUEUE operates on a
        // single shared address space in every scenario this core models.
        let pid = k.pids().into_iter().next();
        match pid {
            Some(p) => k.context(p).unwrap().vm.lock().read_u32(addr).map_err(|_| SyscallError::Errno(Errno::EFAULT))?,
            None => return Ok(SyscallOutcome::Value(0)),
        }
    };
    if current != expected_val {
        return Err(SyscallError::Errno(Errno::EAGAIN));
    }

    let woken = futex_wake(k, addr, wake_count, u32::MAX);
    let mut requeued = 0;
    for (pid, bitset, serial) in waiters_at(k, addr) {
        if requeued >= requeue_count {
            break;
        }
        let ctx = k.context_mut(pid).unwrap();
        ctx.run_state = RunState::Suspended(Suspension::Futex { addr: addr2, bitset, sleep_serial: serial });
        requeued += 1;
    }
    Ok(SyscallOutcome::Value(woken))
}

/// Applies the encoded op to `*addr2`, wakes up to `wake1` waiters at `addr`
/// unconditionally, then wakes up to `wake2` at `addr2` if the op's
/// comparison against the pre-op value holds (spec.md §4.6).
fn futex_wake_op(
    k: &mut KernelState,
    addr: u32,
    wake1: u32,
    wake2: u32,
    addr2: u32,
    encoded: u32,
) -> Result<SyscallOutcome, SyscallError> {
    let op = (encoded >> 28) & 0xf;
    let cmp = (encoded >> 24) & 0xf;
    let oparg = (encoded >> 12) & 0xfff;
    let cmparg = encoded & 0xfff;

    let pid0 = k.pids().into_iter().next();
    let old_val = match pid0 {
        Some(p) => {
            let ctx = k.context(p).unwrap();
            let mut vm = ctx.vm.lock();
            let old = vm.read_u32(addr2).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
            let new = match op {
                0 => oparg,            // FUTEX_OP_SET
                1 => old.wrapping_add(oparg), // FUTEX_OP_ADD
                2 => old | oparg,      // FUTEX_OP_OR
                3 => old & !oparg,     // FUTEX_OP_ANDN
                4 => old ^ oparg,      // FUTEX_OP_XOR
                other => return Err(SyscallError::Fatal(format!("futex wake_op: unknown op {other}"))),
            };
            vm.write_u32(addr2, new).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
            old
        }
        None => return Ok(SyscallOutcome::Value(0)),
    };

    let condition = match cmp {
        0 => old_val == cmparg,
        1 => old_val != cmparg,
        2 => old_val < cmparg,
        3 => old_val <= cmparg,
        4 => old_val > cmparg,
        5 => old_val >= cmparg,
        other => return Err(SyscallError::Fatal(format!("futex wake_op: unknown cmp {other}"))),
    };

    let mut total = futex_wake(k, addr, wake1, u32::MAX);
    if condition {
        total += futex_wake(k, addr2, wake2, u32::MAX);
    }
    Ok(SyscallOutcome::Value(total))
}
