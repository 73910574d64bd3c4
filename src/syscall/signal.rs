//! Signal-related syscalls (spec.md §4.5): action table, procmask, suspend,
//! and the sigreturn trampoline back from a delivered handler.

use crate::abi::flags::{SIG_BLOCK, SIG_SETMASK, SIG_UNBLOCK};
use crate::abi::structs::SimSigaction;
use crate::context::{Pid, Suspension};
use crate::errno::Errno;
use crate::kernel::KernelState;
use crate::signal::{SigAction, SignalFrame};

use super::{Args, SyscallError, SyscallOutcome};

pub fn sys_rt_sigaction(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let sig = args[0];
    let new_addr = args[1];
    let old_addr = args[2];
    if sig == 0 || sig as usize > crate::signal::NSIG {
        return Err(SyscallError::Errno(Errno::EINVAL));
    }
    let idx = (sig - 1) as usize;

    if old_addr != 0 {
        let old = k.context(pid).unwrap().signals.actions[idx];
        let packed = SimSigaction { handler_addr: old.handler_addr, flags: old.flags, restorer: old.restorer, mask: old.mask }.encode();
        let ctx = k.context_mut(pid).unwrap();
        ctx.vm.lock().write(old_addr, &packed).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }

    if new_addr != 0 {
        let mut buf = [0u8; SimSigaction::SIZE];
        {
            let ctx = k.context(pid).unwrap();
            ctx.vm.lock().read(new_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
        }
        let decoded = SimSigaction::decode(&buf);
        let ctx = k.context_mut(pid).unwrap();
        ctx.signals.actions[idx] = SigAction {
            handler_addr: decoded.handler_addr,
            flags: decoded.flags,
            restorer: decoded.restorer,
            mask: decoded.mask,
        };
    }

    Ok(SyscallOutcome::Value(0))
}

pub fn sys_rt_sigprocmask(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let how = args[0] as i32;
    let set_addr = args[1];
    let oldset_addr = args[2];

    let ctx = k.context(pid).unwrap();
    let old_blocked = ctx.signals.blocked;
    if oldset_addr != 0 {
        let ctx = k.context_mut(pid).unwrap();
        ctx.vm.lock().write(oldset_addr, &old_blocked.to_le_bytes()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }

    if set_addr != 0 {
        let mut buf = [0u8; 8];
        {
            let ctx = k.context(pid).unwrap();
            ctx.vm.lock().read(set_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
        }
        let set = u64::from_le_bytes(buf);
        let ctx = k.context_mut(pid).unwrap();
        ctx.signals.blocked = match how {
            SIG_BLOCK => ctx.signals.blocked | set,
            SIG_UNBLOCK => ctx.signals.blocked & !set,
            SIG_SETMASK => set,
            other => return Err(SyscallError::Fatal(format!("rt_sigprocmask: unknown how={other}"))),
        };
    }

    Ok(SyscallOutcome::Value(0))
}

/// `rt_sigsuspend`: replace the mask, block until a signal becomes
/// deliverable, then restore it — the only call in this core allowed to
/// return `EINTR` (spec.md §9 Open Question resolution).
pub fn sys_rt_sigsuspend(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let mask_addr = args[0];
    let mut buf = [0u8; 8];
    {
        let ctx = k.context(pid).unwrap();
        ctx.vm.lock().read(mask_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    let new_mask = u64::from_le_bytes(buf);

    let ctx = k.context_mut(pid).unwrap();
    ctx.signals.backup = ctx.signals.blocked;
    ctx.signals.blocked = new_mask;
    ctx.suspend(Suspension::SigSuspend);
    Ok(SyscallOutcome::Suspended)
}

/// `sigreturn`/`rt_sigreturn`: pop the frame the core pushed at delivery time
/// and restore the pre-handler register state and mask (spec.md §4.5).
/// Writes EAX itself from the restored frame, so the dispatcher must not
/// overwrite it — hence `NoReturn`.
pub fn sys_sigreturn(k: &mut KernelState, pid: Pid) -> Result<SyscallOutcome, SyscallError> {
    let ctx = k.context(pid).unwrap();
    let frame_addr = ctx.regs.esp;
    let mut buf = [0u8; SignalFrame::SIZE as usize];
    ctx.vm.lock().read(frame_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    let frame = SignalFrame::decode(&buf);

    let ctx = k.context_mut(pid).unwrap();
    ctx.regs = frame.saved_regs;
    ctx.signals.blocked = frame.saved_blocked_mask;
    ctx.signals.clear_pending(frame.sig);
    Ok(SyscallOutcome::NoReturn)
}
