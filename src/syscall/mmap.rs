//! mmap/brk family (spec.md §4.3).

use crate::abi::flags::{MMAP_FLAGS, MMAP_PROT};
use crate::context::Pid;
use crate::errno::Errno;
use crate::fd::HostIo;
use crate::kernel::KernelState;
use crate::memory::{MappedHost, Perm};

use super::{Args, SyscallError, SyscallOutcome};

fn perm_from_prot(prot: u32) -> Perm {
    let mut p = Perm::INIT;
    if prot & 0x1 != 0 {
        p |= Perm::READ;
    }
    if prot & 0x2 != 0 {
        p |= Perm::WRITE;
    }
    if prot & 0x4 != 0 {
        p |= Perm::EXEC;
    }
    p
}

/// `mmap`/`mmap2`. `mmap2`'s offset argument is in page units, not bytes
/// (spec.md §6).
pub fn sys_mmap(k: &mut KernelState, host: &dyn HostIo, pid: Pid, args: Args, is_mmap2: bool) -> Result<SyscallOutcome, SyscallError> {
    let addr_hint = args[0];
    let len = args[1];
    let prot = args[2];
    let flags = args[3];
    let guest_fd = args[4] as i32;
    let raw_offset = args[5];

    if len == 0 {
        return Err(SyscallError::Errno(Errno::EINVAL));
    }
    let _ = MMAP_PROT.decompose(prot);
    let _ = MMAP_FLAGS.decompose(flags);

    let page_len = k.config.page_round_up(len);
    let fixed = flags & 0x10 != 0;
    let anonymous = flags & 0x20 != 0;

    let addr = if fixed {
        if !k.config.is_page_aligned(addr_hint) {
            return Err(SyscallError::Errno(Errno::EINVAL));
        }
        addr_hint
    } else {
        let ctx = k.context(pid).unwrap();
        let hint = if addr_hint != 0 { addr_hint } else { k.config.mmap_base };
        ctx.vm
            .lock()
            .find_free(hint, page_len, addr_hint == 0)
            .ok_or(SyscallError::Errno(Errno::ENOMEM))?
    };

    let backing = if anonymous {
        None
    } else {
        let host_fd = k
            .context(pid)
            .unwrap()
            .fd_table
            .get(guest_fd)
            .map_err(|_| SyscallError::Errno(Errno::EBADF))?
            .host_fd;
        let offset = if is_mmap2 { raw_offset as i64 * crate::memory::PAGE_SIZE as i64 } else { raw_offset as i64 };
        Some(MappedHost { host_fd, file_offset: offset })
    };

    let ctx = k.context_mut(pid).unwrap();
    ctx.vm
        .lock()
        .map(addr, page_len, perm_from_prot(prot), backing.clone())
        .map_err(|_| SyscallError::Errno(Errno::ENOMEM))?;

    if let Some(b) = &backing {
        let mut buf = vec![0u8; page_len as usize];
        let n = host.pread(b.host_fd, &mut buf, b.file_offset).unwrap_or(0);
        buf.truncate(n);
        let _ = ctx.vm.lock().write(addr, &buf);
    }

    Ok(SyscallOutcome::Value(addr as i32))
}

pub fn sys_munmap(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let addr = args[0];
    let len = k.config.page_round_up(args[1]);
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm.lock().unmap(addr, len).map_err(|_| SyscallError::Errno(Errno::EINVAL))?;
    Ok(SyscallOutcome::Value(0))
}

pub fn sys_mprotect(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let addr = args[0];
    let len = k.config.page_round_up(args[1]);
    let prot = args[2];
    let ctx = k.context_mut(pid).unwrap();
    ctx.vm
        .lock()
        .protect(addr, len, perm_from_prot(prot))
        .map_err(|_| SyscallError::Errno(Errno::ENOMEM))?;
    Ok(SyscallOutcome::Value(0))
}

/// `mremap` without `MREMAP_MAYMOVE`: grow or shrink in place only (spec.md
/// §4.3 Non-goals — moving mappings is out of scope).
pub fn sys_mremap(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let old_addr = args[0];
    let old_len = k.config.page_round_up(args[1]);
    let new_len = k.config.page_round_up(args[2]);
    let flags = args[3];
    const MREMAP_MAYMOVE: u32 = 1;
    if flags & MREMAP_MAYMOVE != 0 {
        return Err(SyscallError::Fatal("mremap: MREMAP_MAYMOVE is unsupported".into()));
    }

    let ctx = k.context_mut(pid).unwrap();
    let mut vm = ctx.vm.lock();
    let perm = vm.permissions_at(old_addr).ok_or(SyscallError::Errno(Errno::EFAULT))?;
    if new_len > old_len {
        vm.map(old_addr + old_len, new_len - old_len, perm, None)
            .map_err(|_| SyscallError::Errno(Errno::ENOMEM))?;
    } else if new_len < old_len {
        vm.unmap(old_addr + new_len, old_len - new_len)
            .map_err(|_| SyscallError::Errno(Errno::EINVAL))?;
    }
    Ok(SyscallOutcome::Value(old_addr as i32))
}

/// `brk`: grows/shrinks the data segment and returns the new break, or the
/// current one on failure (spec.md §4.3) — never `-errno` on this call, per
/// glibc's expectation.
pub fn sys_brk(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let requested = args[0];
    let config = k.config.clone();
    let ctx = k.context_mut(pid).unwrap();

    if ctx.brk_start == 0 {
        ctx.brk_start = requested;
        ctx.brk_current = requested;
        return Ok(SyscallOutcome::Value(requested as i32));
    }

    if requested == 0 || requested == ctx.brk_current {
        return Ok(SyscallOutcome::Value(ctx.brk_current as i32));
    }

    let old_end = config.page_round_up(ctx.brk_current - ctx.brk_start) + ctx.brk_start;
    let new_end = config.page_round_up(requested - ctx.brk_start) + ctx.brk_start;

    let mut vm = ctx.vm.lock();
    if new_end > old_end {
        if vm.map(old_end, new_end - old_end, Perm::READ | Perm::WRITE, None).is_err() {
            drop(vm);
            return Ok(SyscallOutcome::Value(ctx.brk_current as i32));
        }
    } else if new_end < old_end {
        let _ = vm.unmap(new_end, old_end - new_end);
    }
    drop(vm);
    ctx.brk_current = requested;
    Ok(SyscallOutcome::Value(requested as i32))
}
