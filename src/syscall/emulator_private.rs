//! Emulator-private calls above the Linux table bound (spec.md §4.8).
//!
//! These exist only for the guest-side runtime support library a simulated
//! workload links against, never issued by unmodified Linux binaries.

use crate::context::Pid;
use crate::errno::Errno;
use crate::fd::HostIo;
use crate::kernel::KernelState;

use super::numbers::{SYS_M2S_DISK_IO, SYS_M2S_GET_PID, SYS_M2S_OPENCL, SYS_M2S_SET_INSTRUCTION_SLICE};
use super::{Args, SyscallError, SyscallOutcome};

pub fn dispatch(k: &mut KernelState, _host: &dyn HostIo, pid: Pid, nr: u32, args: Args) -> Result<SyscallOutcome, SyscallError> {
    match nr {
        SYS_M2S_GET_PID => Ok(SyscallOutcome::Value(pid)),
        SYS_M2S_SET_INSTRUCTION_SLICE => {
            let ctx = k.context_mut(pid).unwrap();
            ctx.instruction_slice = args[0] as u64;
            Ok(SyscallOutcome::Value(0))
        }
        SYS_M2S_DISK_IO => disk_io(k, pid, args),
        SYS_M2S_OPENCL => Err(SyscallError::Fatal("m2s_opencl: unsupported in this build".into())),
        other => Err(SyscallError::Fatal(format!("unsupported emulator-private syscall {other}"))),
    }
}

const DISK_READ: u32 = 0;
const DISK_WRITE: u32 = 1;

/// Fixed simulated-time charge for a completed disk transfer (spec.md §4.8
/// "Completion charges a fixed simulated I/O cost to the caller").
const DISK_IO_COST_US: u64 = 1000;

/// A simulated block device: `args = [op, nbytes, guest_addr, block, offset,
/// _]` (spec.md §4.8). Each block is owned by whichever uid last wrote it —
/// reading a block another uid owns is a fatal call shape ("simulated disk
/// block ownership"), not silently served. `offset + nbytes` must fit within
/// one block.
fn disk_io(k: &mut KernelState, pid: Pid, args: Args) -> Result<SyscallOutcome, SyscallError> {
    let op = args[0];
    let nbytes = args[1];
    let guest_addr = args[2];
    let block_no = args[3];
    let offset = args[4];
    let block_size = k.config.disk_block_size;

    if block_no >= k.config.disk_num_blocks {
        return Err(SyscallError::Errno(Errno::EINVAL));
    }
    if offset.checked_add(nbytes).map_or(true, |end| end > block_size) {
        return Err(SyscallError::Errno(Errno::EINVAL));
    }

    let uid = k.context(pid).unwrap().uid;
    let owner_uid = k.disk_block_owner(block_no);
    let (start, end) = (offset as usize, (offset + nbytes) as usize);

    match op {
        DISK_WRITE => {
            let mut buf = vec![0u8; nbytes as usize];
            {
                let ctx = k.context(pid).unwrap();
                ctx.vm.lock().read(guest_addr, &mut buf).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
            }
            let mut block = k.read_disk_block(block_no);
            block[start..end].copy_from_slice(&buf);
            k.write_disk_block(block_no, uid, block);
            k.advance_time(DISK_IO_COST_US);
            Ok(SyscallOutcome::Value(0))
        }
        DISK_READ => {
            if let Some(owner_uid) = owner_uid {
                if owner_uid != uid {
                    return Err(SyscallError::Fatal(format!(
                        "disk_io: block {block_no} is owned by uid {owner_uid}, not {uid}"
                    )));
                }
            }
            let block = k.read_disk_block(block_no);
            let ctx = k.context_mut(pid).unwrap();
            ctx.vm.lock().write(guest_addr, &block[start..end]).map_err(|_| SyscallError::Errno(Errno::EFAULT))?;
            k.advance_time(DISK_IO_COST_US);
            Ok(SyscallOutcome::Value(0))
        }
        other => Err(SyscallError::Fatal(format!("disk_io: unknown op {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;
    use crate::memory::{Perm, SimGuestMemory};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn config() -> EmulatorConfig {
        EmulatorConfig { disk_num_blocks: 4, disk_block_size: 64, ..EmulatorConfig::default() }
    }

    fn new_vm() -> crate::context::SharedVm {
        Arc::new(Mutex::new(SimGuestMemory::new()))
    }

    #[test]
    fn write_then_read_by_same_uid_round_trips_at_offset() {
        let mut k = KernelState::new(config());
        let pid = k.spawn(1000, None, new_vm());
        k.context_mut(pid).unwrap().vm.lock().map(0x9000, 0x1000, Perm::READ | Perm::WRITE, None).unwrap();
        k.context_mut(pid).unwrap().vm.lock().write(0x9000, b"hello").unwrap();

        disk_io(&mut k, pid, [DISK_WRITE, 5, 0x9000, 0, 8, 0]).unwrap();
        disk_io(&mut k, pid, [DISK_READ, 5, 0x9100, 0, 8, 0]).unwrap();

        let mut got = [0u8; 5];
        k.context(pid).unwrap().vm.lock().read(0x9100, &mut got).unwrap();
        assert_eq!(&got, b"hello");
    }

    #[test]
    fn read_by_a_different_uid_than_the_writer_is_fatal() {
        let mut k = KernelState::new(config());
        let writer = k.spawn(1000, None, new_vm());
        let reader = k.spawn(2000, None, new_vm());
        k.context_mut(writer).unwrap().vm.lock().map(0x9000, 0x1000, Perm::READ | Perm::WRITE, None).unwrap();
        k.context_mut(reader).unwrap().vm.lock().map(0x9000, 0x1000, Perm::READ | Perm::WRITE, None).unwrap();

        disk_io(&mut k, writer, [DISK_WRITE, 4, 0x9000, 1, 0, 0]).unwrap();
        let result = disk_io(&mut k, reader, [DISK_READ, 4, 0x9000, 1, 0, 0]);
        assert!(matches!(result, Err(SyscallError::Fatal(_))));
    }

    #[test]
    fn clone_siblings_sharing_a_uid_share_block_access() {
        let mut k = KernelState::new(config());
        let vm = new_vm();
        let parent = k.spawn(1000, None, vm.clone());
        let sibling = k.spawn(1000, Some(parent), vm.clone());
        vm.lock().map(0x9000, 0x1000, Perm::READ | Perm::WRITE, None).unwrap();

        disk_io(&mut k, parent, [DISK_WRITE, 4, 0x9000, 2, 0, 0]).unwrap();
        let result = disk_io(&mut k, sibling, [DISK_READ, 4, 0x9000, 2, 0, 0]);
        assert!(result.is_ok());
    }

    #[test]
    fn offset_plus_nbytes_exceeding_block_size_is_einval() {
        let mut k = KernelState::new(config());
        let pid = k.spawn(1000, None, new_vm());
        k.context_mut(pid).unwrap().vm.lock().map(0x9000, 0x1000, Perm::READ | Perm::WRITE, None).unwrap();
        let result = disk_io(&mut k, pid, [DISK_WRITE, 60, 0x9000, 0, 16, 0]);
        assert!(matches!(result, Err(SyscallError::Errno(e)) if e == Errno::EINVAL));
    }

    #[test]
    fn completion_charges_a_fixed_simulated_io_cost() {
        let mut k = KernelState::new(config());
        let pid = k.spawn(1000, None, new_vm());
        k.context_mut(pid).unwrap().vm.lock().map(0x9000, 0x1000, Perm::READ | Perm::WRITE, None).unwrap();
        let before = k.now_us;
        disk_io(&mut k, pid, [DISK_WRITE, 4, 0x9000, 0, 0, 0]).unwrap();
        assert!(k.now_us > before);
    }
}
