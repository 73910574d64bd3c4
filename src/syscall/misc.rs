//! Everything else: identity, rlimits, filesystem housekeeping, TLS
//! descriptors, and the narrow stream-socket slice of `socketcall`
//! (spec.md §4.2, §4.6 non-futex misc, §9 supplemented surface).

use crate::abi::flags::{RLIMIT_DATA, RLIMIT_NOFILE, RLIMIT_STACK, SOCKETCALL_CONNECT, SOCKETCALL_SOCKET, SOCK_STREAM};
use crate::abi::structs::{SimRlimit, SimUserDesc, SimUtsname};
use crate::context::Pid;
use crate::errno::Errno;
use crate::fd::{FdEntry, FdKind, HostIo};
use crate::kernel::KernelState;
use crate::translate::read_guest_path;

use super::{Args, SyscallError, SyscallOutcome};

pub fn sys_uname(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let out_addr = args[0];
    let packed = SimUtsname::default().encode();
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(out_addr, &packed).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(0))
}

fn rlimit_default(resource: u32) -> SimRlimit {
    match resource {
        RLIMIT_DATA => SimRlimit { cur: 0xffff_ffff, max: 0xffff_ffff },
        RLIMIT_STACK => SimRlimit { cur: 8 * 1024 * 1024, max: 0xffff_ffff },
        RLIMIT_NOFILE => SimRlimit { cur: 1024, max: 1024 },
        _ => SimRlimit { cur: 0xffff_ffff, max: 0xffff_ffff },
    }
}

pub fn sys_getrlimit(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let resource = args[0];
    let out_addr = args[1];
    let packed = rlimit_default(resource).encode();
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(out_addr, &packed).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(0))
}

/// Raising a limit above this core's fixed defaults is rejected rather than
/// silently accepted (spec.md §9): nothing downstream enforces a raised
/// limit, so pretending to honor it would be a lie a real process can act on.
pub fn sys_setrlimit(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let resource = args[0];
    let addr = args[1];
    let mut buf = [0u8; SimRlimit::SIZE];
    {
        let ctx = k.context(pid).unwrap();
        ctx.vm.lock().read(addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    let requested = SimRlimit::decode(&buf);
    let default = rlimit_default(resource);
    if requested.cur > default.cur {
        return Err(SyscallError::Errno(Errno::EPERM));
    }
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_mkdir(k: &mut KernelState, host: &dyn HostIo, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let path = path_arg(k, pid, args[0])?;
    let mode = args[1];
    host.mkdir(&path, mode).map_err(SyscallError::Errno)?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_rmdir(k: &mut KernelState, host: &dyn HostIo, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let path = path_arg(k, pid, args[0])?;
    host.rmdir(&path).map_err(SyscallError::Errno)?;
    Ok(SyscallOutcome::Value(0))
}

fn path_arg(k: &KernelState, pid: Pid, addr: u32) -> Result<String, SyscallError> {
    let ctx = k.context(pid).unwrap();
    let vm = ctx.vm.lock();
    read_guest_path(&*vm, addr, &ctx.cwd, k.config.max_path_size).map_err(SyscallError::Errno)
}

pub fn sys_umask(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let new_mask = args[0] & 0o777;
    let ctx = k.context_mut(pid).unwrap();
    let old = ctx.umask;
    ctx.umask = new_mask;
    Ok(SyscallOutcome::Value(old as i32))
}

pub fn sys_set_thread_area(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let desc_addr = args[0];
    let mut buf = [0u8; SimUserDesc::SIZE];
    {
        let ctx = k.context(pid).unwrap();
        ctx.vm.lock().read(desc_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    let desc = SimUserDesc::decode(&buf);
    let ctx = k.context_mut(pid).unwrap();
    ctx.tls.base = desc.base_addr;
    ctx.tls.limit = desc.limit_bytes();
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_get_thread_area(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let desc_addr = args[0];
    let ctx = k.context(pid).unwrap();
    let desc = SimUserDesc {
        entry_number: 6,
        base_addr: ctx.tls.base,
        limit: ctx.tls.limit,
        seg_32bit: true,
        ..Default::default()
    };
    let mut buf = [0u8; SimUserDesc::SIZE];
    buf[0..4].copy_from_slice(&desc.entry_number.to_le_bytes());
    buf[4..8].copy_from_slice(&desc.base_addr.to_le_bytes());
    buf[8..12].copy_from_slice(&desc.limit.to_le_bytes());
    buf[12..16].copy_from_slice(&1u32.to_le_bytes());
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(desc_addr, &buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_set_tid_address(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let ctx = k.context_mut(pid).unwrap();
    ctx.clear_child_tid = args[0];
    Ok(SyscallOutcome::Value(pid))
}

/// Stream sockets only (spec.md §4.6 Non-goals: datagram and raw sockets are
/// out of scope). Each sub-call's argument block lives at `args[1]` in the
/// guest, per the i386 `socketcall` ABI.
pub fn sys_socketcall(k: &mut KernelState, host: &dyn HostIo, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let call = args[0];
    let argblock_addr = args[1];

    match call {
        SOCKETCALL_SOCKET => {
            let mut buf = [0u8; 12];
            {
                let ctx = k.context(pid).unwrap();
                ctx.vm.lock().read(argblock_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
            }
            let socktype = u32::from_le_bytes(buf[4..8].try_into().unwrap());
            if socktype != SOCK_STREAM {
                return Err(SyscallError::Fatal("socketcall: only SOCK_STREAM is supported".into()));
            }
            let host_fd = host.socket_stream().map_err(SyscallError::Errno)?;
            let ctx = k.context_mut(pid).unwrap();
            let fd = ctx.fd_table.alloc(FdEntry { host_fd, kind: FdKind::Socket, flags: 0, path: "socket:[stream]".into(), virtual_backing_path: None });
            Ok(SyscallOutcome::Value(fd))
        }
        SOCKETCALL_CONNECT => Err(SyscallError::Fatal("socketcall: connect is unsupported".into())),
        other => Err(SyscallError::Fatal(format!("socketcall: unsupported sub-call {other}"))),
    }
}
