//! Syscall dispatch (spec.md §4.1).
//!
//! `dispatch` reads the syscall number and up to six argument registers off a
//! context, routes to the Linux-range or emulator-private handler tables, and
//! writes the result back — unless the context suspended or the call was
//! `sigreturn`, which manage `regs.eax` themselves.

pub mod emulator_private;
pub mod fileio;
pub mod futex;
pub mod misc;
pub mod mmap;
pub mod numbers;
pub mod process;
pub mod signal;
pub mod time;

use log::{error, trace};

use crate::context::Pid;
use crate::errno::Errno;
use crate::fd::HostIo;
use crate::kernel::KernelState;

use numbers::{name_of, LINUX_TABLE_BOUND};

/// Up to six argument registers, in ABI order (ebx, ecx, edx, esi, edi, ebp).
pub type Args = [u32; 6];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Handler completed; value goes into EAX.
    Value(i32),
    /// Context suspended itself; EAX is left alone until it resumes.
    Suspended,
    /// Handler already placed the correct register state itself (`sigreturn`,
    /// `rt_sigreturn`) and the dispatcher must not touch EAX.
    NoReturn,
}

#[derive(Debug)]
pub enum SyscallError {
    /// Maps directly to `-errno` in EAX.
    Errno(Errno),
    /// A call shape this core does not emulate — spec.md §7 "unsupported call
    /// shapes are a hard error, not a silent ENOSYS", surfaced to the host as
    /// a fatal `anyhow` condition rather than folded into a guest-visible
    /// errno.
    Fatal(String),
}

impl From<Errno> for SyscallError {
    fn from(e: Errno) -> Self {
        SyscallError::Errno(e)
    }
}

/// Dispatch the syscall currently loaded in `pid`'s registers. Returns the
/// outcome for the host's scheduler loop (e.g. to know not to advance `eip`
/// past a just-suspended context).
pub fn dispatch(k: &mut KernelState, host: &dyn HostIo, pid: Pid) -> SyscallOutcome {
    let (nr, args) = {
        let ctx = k.context(pid).expect("dispatch called with unknown pid");
        let r = &ctx.regs;
        (r.eax, [r.ebx, r.ecx, r.edx, r.esi, r.edi, r.ebp])
    };

    let name = name_of(nr);
    trace!("pid={pid} syscall {name}({nr}) args={args:?}");
    k.record_syscall(name);

    let result = if nr < LINUX_TABLE_BOUND {
        dispatch_linux(k, host, pid, nr, args)
    } else {
        emulator_private::dispatch(k, host, pid, nr, args)
    };

    match result {
        Ok(outcome) => {
            if let SyscallOutcome::Value(v) = outcome {
                k.context_mut(pid).unwrap().set_retval(v);
            }
            outcome
        }
        Err(SyscallError::Errno(e)) => {
            trace!("pid={pid} syscall {name} -> {e}");
            let retval = e.to_retval();
            k.context_mut(pid).unwrap().set_retval(retval);
            SyscallOutcome::Value(retval)
        }
        Err(SyscallError::Fatal(msg)) => {
            error!("pid={pid} syscall {name} fatal: {msg}");
            k.context_mut(pid).unwrap().set_retval(Errno::ENOSYS.to_retval());
            SyscallOutcome::Value(Errno::ENOSYS.to_retval())
        }
    }
}

fn dispatch_linux(
    k: &mut KernelState,
    host: &dyn HostIo,
    pid: Pid,
    nr: u32,
    args: Args,
) -> Result<SyscallOutcome, SyscallError> {
    use fileio::*;
    use futex::sys_futex;
    use misc::*;
    use mmap::*;
    use numbers::*;
    use process::*;
    use signal::*;
    use time::*;

    match nr {
        SYS_EXIT | SYS_EXIT_GROUP => sys_exit(k, pid, args),
        SYS_FORK | SYS_CLONE => sys_clone(k, pid, args, nr == SYS_FORK),
        SYS_WAITPID => sys_waitpid(k, pid, args),
        SYS_READ => sys_read(k, host, pid, args),
        SYS_WRITE => sys_write(k, host, pid, args),
        SYS_OPEN => sys_open(k, host, pid, args),
        SYS_CLOSE => sys_close(k, host, pid, args),
        SYS_UNLINK => sys_unlink(k, host, pid, args),
        SYS_CHDIR => sys_chdir(k, host, pid, args),
        SYS_TIME => sys_time(k, pid, args),
        SYS_LSEEK => sys_lseek(k, host, pid, args),
        SYS_GETPID => Ok(SyscallOutcome::Value(pid)),
        SYS_GETUID | SYS_GETEUID => Ok(SyscallOutcome::Value(k.context(pid).unwrap().uid as i32)),
        SYS_GETGID | SYS_GETEGID => Ok(SyscallOutcome::Value(0)),
        SYS_ACCESS => sys_access(k, host, pid, args),
        SYS_KILL => sys_kill(k, pid, args),
        SYS_TGKILL => sys_tgkill(k, pid, args),
        SYS_MKDIR => sys_mkdir(k, host, pid, args),
        SYS_RMDIR => sys_rmdir(k, host, pid, args),
        SYS_DUP => sys_dup(k, host, pid, args),
        SYS_PIPE => sys_pipe(k, host, pid, args),
        SYS_TIMES => sys_times(k, pid, args),
        SYS_BRK => sys_brk(k, pid, args),
        SYS_IOCTL => sys_ioctl(k, host, pid, args),
        SYS_FCNTL | SYS_FCNTL64 => sys_fcntl64(k, host, pid, args),
        SYS_SETITIMER => sys_setitimer(k, pid, args),
        SYS_GETITIMER => sys_getitimer(k, pid, args),
        SYS_STAT | SYS_STAT64 => sys_stat64(k, host, pid, args),
        SYS_LSTAT | SYS_LSTAT64 => sys_lstat64(k, host, pid, args),
        SYS_FSTAT | SYS_FSTAT64 => sys_fstat64(k, host, pid, args),
        SYS_UNAME => sys_uname(k, pid, args),
        SYS_SIGRETURN => sys_sigreturn(k, pid),
        SYS_MREMAP => sys_mremap(k, pid, args),
        SYS_POLL => sys_poll(k, host, pid, args),
        SYS_RT_SIGACTION => sys_rt_sigaction(k, pid, args),
        SYS_RT_SIGPROCMASK => sys_rt_sigprocmask(k, pid, args),
        SYS_RT_SIGSUSPEND => sys_rt_sigsuspend(k, pid, args),
        SYS_GETCWD => sys_getcwd(k, host, pid, args),
        SYS_GETRLIMIT => sys_getrlimit(k, pid, args),
        SYS_SETRLIMIT => sys_setrlimit(k, pid, args),
        SYS_MMAP | SYS_MMAP2 => sys_mmap(k, host, pid, args, nr == SYS_MMAP2),
        SYS_TRUNCATE64 => Err(SyscallError::Fatal("truncate64: unsupported".into())),
        SYS_FTRUNCATE64 => sys_ftruncate64(k, host, pid, args),
        SYS_GETDENTS => sys_getdents(k, host, pid, args),
        SYS_GETDENTS64 => sys_getdents64(k, host, pid, args),
        SYS_GETTID => Ok(SyscallOutcome::Value(pid)),
        SYS_SET_THREAD_AREA => sys_set_thread_area(k, pid, args),
        SYS_GET_THREAD_AREA => sys_get_thread_area(k, pid, args),
        SYS_SET_TID_ADDRESS => sys_set_tid_address(k, pid, args),
        SYS_READLINK => sys_readlink(k, host, pid, args),
        SYS_SELECT => sys_select(k, host, pid, args),
        SYS_NANOSLEEP => sys_nanosleep(k, pid, args),
        SYS_MUNMAP => sys_munmap(k, pid, args),
        SYS_MPROTECT => sys_mprotect(k, pid, args),
        SYS_SOCKETCALL => sys_socketcall(k, host, pid, args),
        SYS_WRITEV => sys_writev(k, host, pid, args),
        SYS_GETTIMEOFDAY => sys_gettimeofday(k, pid, args),
        SYS_FUTEX => sys_futex(k, pid, args),
        SYS_CLOCK_GETRES => sys_clock_getres(k, pid, args),
        SYS_UMASK => sys_umask(k, pid, args),
        SYS_MSYNC => Ok(SyscallOutcome::Value(0)),
        SYS_MADVISE => Ok(SyscallOutcome::Value(0)),
        _ => Err(SyscallError::Fatal(format!("unsupported syscall number {nr}"))),
    }
}
