//! Time family (spec.md §4.7). All times are driven off `KernelState::now_us`,
//! the host's step loop being the only thing that advances it — nothing here
//! reads the wall clock directly, so replaying a fixed `now_us` sequence in a
//! test reproduces a scenario exactly.

use crate::abi::flags::{ITIMER_PROF, ITIMER_REAL, ITIMER_VIRTUAL};
use crate::abi::structs::{SimItimerval, SimTimeval, SimTms};
use crate::context::{ItimerWhich, Pid, Suspension};
use crate::errno::Errno;
use crate::kernel::KernelState;

use super::{Args, SyscallError, SyscallOutcome};

pub fn sys_time(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let out_addr = args[0];
    let secs = (k.now_us / 1_000_000) as u32;
    if out_addr != 0 {
        let ctx = k.context_mut(pid).unwrap();
        ctx.vm.lock().write(out_addr, &secs.to_le_bytes()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    Ok(SyscallOutcome::Value(secs as i32))
}

pub fn sys_gettimeofday(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let tv_addr = args[0];
    let tv = SimTimeval::from_micros(k.now_us);
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(tv_addr, &tv.encode()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_nanosleep(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let req_addr = args[0];
    let mut buf = [0u8; 8];
    {
        let ctx = k.context(pid).unwrap();
        ctx.vm.lock().read(req_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    let sec = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let nsec = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let duration_us = sec as u64 * 1_000_000 + nsec as u64 / 1000;
    let wakeup_time_us = k.now_us + duration_us;
    let ctx = k.context_mut(pid).unwrap();
    ctx.suspend(Suspension::NanoSleep { wakeup_time_us });
    Ok(SyscallOutcome::Suspended)
}

fn which_from_id(id: u32) -> Result<ItimerWhich, SyscallError> {
    match id {
        ITIMER_REAL => Ok(ItimerWhich::Real),
        ITIMER_VIRTUAL => Ok(ItimerWhich::Virtual),
        ITIMER_PROF => Ok(ItimerWhich::Prof),
        other => Err(SyscallError::Fatal(format!("itimer: unknown which={other}"))),
    }
}

pub fn sys_setitimer(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let which = which_from_id(args[0])? as usize;
    let new_addr = args[1];
    let old_addr = args[2];

    let ctx = k.context(pid).unwrap();
    let old = ctx.timers[which];
    if old_addr != 0 {
        let packed = SimItimerval {
            interval: SimTimeval::from_micros(old.interval_us),
            value: if old.value_us != 0 { SimTimeval::from_micros(old.value_us - k.now_us.min(old.value_us)) } else { SimTimeval::default() },
        };
        let ctx = k.context_mut(pid).unwrap();
        ctx.vm.lock().write(old_addr, &packed.encode()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }

    let mut buf = [0u8; SimItimerval::SIZE];
    {
        let ctx = k.context(pid).unwrap();
        ctx.vm.lock().read(new_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    let new = SimItimerval::decode(&buf);
    let now = k.now_us;
    let ctx = k.context_mut(pid).unwrap();
    let timer = &mut ctx.timers[which];
    timer.interval_us = new.interval.to_micros();
    timer.value_us = if new.value.to_micros() == 0 { 0 } else { now + new.value.to_micros() };
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_getitimer(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let which = which_from_id(args[0])? as usize;
    let out_addr = args[1];
    let now = k.now_us;
    let ctx = k.context(pid).unwrap();
    let timer = ctx.timers[which];
    let remaining = if timer.value_us > now { timer.value_us - now } else { 0 };
    let packed = SimItimerval { interval: SimTimeval::from_micros(timer.interval_us), value: SimTimeval::from_micros(remaining) };
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(out_addr, &packed.encode()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_clock_getres(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let res_addr = args[1];
    if res_addr == 0 {
        return Ok(SyscallOutcome::Value(0));
    }
    let tv = SimTimeval { tv_sec: 0, tv_usec: 1 };
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(res_addr, &tv.encode()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_times(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let out_addr = args[0];
    let ticks = (k.now_us / 10_000) as u32; // 100 Hz clock tick convention.
    if out_addr != 0 {
        let tms = SimTms { utime: ticks, stime: 0, cutime: 0, cstime: 0 };
        let ctx = k.context_mut(pid).unwrap();
        ctx.vm.lock().write(out_addr, &tms.encode()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    Ok(SyscallOutcome::Value(ticks as i32))
}
