//! End-to-end scenarios exercising the dispatcher across several syscall
//! families at once (spec.md §8 "Concrete scenarios").

use std::sync::Arc;

use parking_lot::Mutex;

use m2s_syscall::abi::flags::{CLONE_MANDATORY, CLONE_SETTLS};
use m2s_syscall::abi::structs::SimUserDesc;
use m2s_syscall::config::EmulatorConfig;
use m2s_syscall::fd::LibcHostIo;
use m2s_syscall::kernel::KernelState;
use m2s_syscall::memory::{GuestMemory, Perm, SimGuestMemory};
use m2s_syscall::syscall::numbers::*;
use m2s_syscall::syscall::{dispatch, SyscallOutcome};

fn new_vm() -> Arc<Mutex<dyn GuestMemory + Send>> {
    Arc::new(Mutex::new(SimGuestMemory::new()))
}

fn set_regs(k: &mut KernelState, pid: i32, eax: u32, args: [u32; 6]) {
    let ctx = k.context_mut(pid).unwrap();
    ctx.regs.eax = eax;
    ctx.regs.ebx = args[0];
    ctx.regs.ecx = args[1];
    ctx.regs.edx = args[2];
    ctx.regs.esi = args[3];
    ctx.regs.edi = args[4];
    ctx.regs.ebp = args[5];
}

#[test]
fn pipe_write_read_wakes_blocked_reader() {
    let mut k = KernelState::new(EmulatorConfig::default());
    let vm = new_vm();
    let a = k.spawn(1000, None, vm);
    vm_map(&k, a, 0x9000, 0x1000);

    let pipe_buf = 0x9000;
    set_regs(&mut k, a, SYS_PIPE, [pipe_buf, 0, 0, 0, 0, 0]);
    dispatch(&mut k, &LibcHostIo, a);
    let mut fds = [0u8; 8];
    k.context(a).unwrap().vm.lock().read(pipe_buf, &mut fds).unwrap();
    let read_fd = i32::from_le_bytes(fds[0..4].try_into().unwrap());
    let write_fd = i32::from_le_bytes(fds[4..8].try_into().unwrap());
    assert_eq!(read_fd, 3);
    assert_eq!(write_fd, 4);

    set_regs(&mut k, a, SYS_CLONE, [CLONE_MANDATORY, 0, 0, 0, 0, 0]);
    let outcome = dispatch(&mut k, &LibcHostIo, a);
    let child = match outcome {
        SyscallOutcome::Value(v) => v,
        other => panic!("expected clone to return child pid, got {other:?}"),
    };

    let read_buf = 0x9100;
    set_regs(&mut k, child, SYS_READ, [read_fd as u32, read_buf, 2, 0, 0, 0]);
    let outcome = dispatch(&mut k, &LibcHostIo, child);
    assert_eq!(outcome, SyscallOutcome::Suspended);
    assert!(k.context(child).unwrap().is_suspended());

    set_regs(&mut k, a, SYS_WRITE, [write_fd as u32, 0x9200, 2, 0, 0, 0]);
    k.context_mut(a).unwrap().vm.lock().write(0x9200, b"hi").unwrap();
    dispatch(&mut k, &LibcHostIo, a);

    k.process_events(&LibcHostIo);
    assert!(!k.context(child).unwrap().is_suspended());

    let outcome = dispatch(&mut k, &LibcHostIo, child);
    assert_eq!(outcome, SyscallOutcome::Value(2));
    let mut got = [0u8; 2];
    k.context(child).unwrap().vm.lock().read(read_buf, &mut got).unwrap();
    assert_eq!(got, [0x68, 0x69]);
}

fn vm_map(k: &KernelState, pid: i32, addr: u32, len: u32) {
    k.context(pid).unwrap().vm.lock().map(addr, len, Perm::READ | Perm::WRITE, None).unwrap();
}

#[test]
fn waitpid_resumes_once_child_exits() {
    let mut k = KernelState::new(EmulatorConfig::default());
    let vm_a = new_vm();
    let a = k.spawn(1000, None, vm_a);
    vm_map(&k, a, 0x9000, 0x1000);

    set_regs(&mut k, a, SYS_FORK, [0; 6]);
    let outcome = dispatch(&mut k, &LibcHostIo, a);
    let child = match outcome {
        SyscallOutcome::Value(v) => v,
        other => panic!("expected fork to return child pid, got {other:?}"),
    };

    let status_addr = 0x9000;
    set_regs(&mut k, a, SYS_WAITPID, [u32::MAX, status_addr, 0, 0, 0, 0]);
    let outcome = dispatch(&mut k, &LibcHostIo, a);
    assert_eq!(outcome, SyscallOutcome::Suspended);

    set_regs(&mut k, child, SYS_EXIT, [7, 0, 0, 0, 0, 0]);
    dispatch(&mut k, &LibcHostIo, child);

    k.process_events(&LibcHostIo);
    assert!(!k.context(a).unwrap().is_suspended());
    assert_eq!(k.context(a).unwrap().regs.eax, child as u32);

    let status = k.context(a).unwrap().vm.lock().read_u32(status_addr).unwrap();
    assert_eq!((status >> 8) & 0xff, 7);
}

#[test]
fn brk_grow_then_shrink_leaves_permission_fault() {
    let mut k = KernelState::new(EmulatorConfig::default());
    let vm = new_vm();
    let a = k.spawn(1000, None, vm);

    set_regs(&mut k, a, SYS_BRK, [0x1000_0000, 0, 0, 0, 0, 0]);
    dispatch(&mut k, &LibcHostIo, a);

    set_regs(&mut k, a, SYS_BRK, [0x1000_1234, 0, 0, 0, 0, 0]);
    let outcome = dispatch(&mut k, &LibcHostIo, a);
    assert_eq!(outcome, SyscallOutcome::Value(0x1000_1234u32 as i32));
    assert!(k.context(a).unwrap().vm.lock().permissions_at(0x1000_0000).is_some());
    assert!(k.context(a).unwrap().vm.lock().permissions_at(0x1000_1000).is_some());

    set_regs(&mut k, a, SYS_BRK, [0x1000_0800, 0, 0, 0, 0, 0]);
    dispatch(&mut k, &LibcHostIo, a);
    let mut buf = [0u8; 1];
    assert!(k.context(a).unwrap().vm.lock().read(0x1000_1000, &mut buf).is_err());
}

#[test]
fn futex_wake_op_applies_op_then_wakes_both_addresses() {
    let mut k = KernelState::new(EmulatorConfig::default());
    let vm = new_vm();
    let a = k.spawn(1000, None, vm.clone());
    let w1 = k.spawn(1000, Some(a), vm.clone());
    let w2 = k.spawn(1000, Some(a), vm.clone());

    vm.lock().map(0x4000, 0x1000, Perm::READ | Perm::WRITE, None).unwrap();
    vm.lock().write_u32(0x4000, 5).unwrap();
    vm.lock().write_u32(0x4004, 5).unwrap();

    set_regs(&mut k, w1, SYS_FUTEX, [0x4000, FUTEX_WAIT, 5, 0, 0, 0]);
    assert_eq!(dispatch(&mut k, &LibcHostIo, w1), SyscallOutcome::Suspended);
    set_regs(&mut k, w2, SYS_FUTEX, [0x4004, FUTEX_WAIT, 5, 0, 0, 0]);
    assert_eq!(dispatch(&mut k, &LibcHostIo, w2), SyscallOutcome::Suspended);

    const FUTEX_OP_ADD: u32 = 1;
    const FUTEX_OP_CMP_GT: u32 = 4;
    let oparg = 3u32;
    let cmparg = 4u32;
    let encoded = (FUTEX_OP_ADD << 28) | (FUTEX_OP_CMP_GT << 24) | ((oparg & 0xfff) << 12) | (cmparg & 0xfff);

    set_regs(&mut k, a, SYS_FUTEX, [0x4000, FUTEX_WAKE_OP, 1, 1, 0x4004, encoded]);
    let outcome = dispatch(&mut k, &LibcHostIo, a);
    assert_eq!(outcome, SyscallOutcome::Value(2));
    assert_eq!(vm.lock().read_u32(0x4004).unwrap(), 8);
    assert!(!k.context(w1).unwrap().is_suspended());
    assert!(!k.context(w2).unwrap().is_suspended());
}

const FUTEX_WAIT: u32 = 0;
const FUTEX_WAKE_OP: u32 = 5;

#[test]
fn mmap_fixed_discards_preexisting_pages() {
    let mut k = KernelState::new(EmulatorConfig::default());
    let vm = new_vm();
    let a = k.spawn(1000, None, vm.clone());
    vm.lock().map(0x2000_0000, 0x2000, Perm::READ | Perm::WRITE, None).unwrap();
    vm.lock().write_u32(0x2000_0000, 0xdead_beef).unwrap();

    const MAP_PRIVATE: u32 = 0x02;
    const MAP_FIXED: u32 = 0x10;
    const MAP_ANONYMOUS: u32 = 0x20;
    let flags = MAP_PRIVATE | MAP_FIXED | MAP_ANONYMOUS;

    set_regs(&mut k, a, SYS_MMAP, [0x2000_0000, 0x2000, 0x3, flags, u32::MAX, 0]);
    let outcome = dispatch(&mut k, &LibcHostIo, a);
    assert_eq!(outcome, SyscallOutcome::Value(0x2000_0000u32 as i32));
    let mut buf = [0u8; 1];
    vm.lock().read(0x2000_0000, &mut buf).unwrap();
    assert_eq!(buf[0], 0);
}

#[test]
fn clone_with_settls_populates_child_tls_and_writes_back_entry_number() {
    let mut k = KernelState::new(EmulatorConfig::default());
    let vm = new_vm();
    let a = k.spawn(1000, None, vm);
    vm_map(&k, a, 0x5000, 0x1000);

    let desc = SimUserDesc {
        entry_number: -1,
        base_addr: 0xdeadc000,
        limit: 1,
        limit_in_pages: true,
        ..Default::default()
    };
    let mut buf = [0u8; SimUserDesc::SIZE];
    buf[0..4].copy_from_slice(&desc.entry_number.to_le_bytes());
    buf[4..8].copy_from_slice(&desc.base_addr.to_le_bytes());
    buf[8..12].copy_from_slice(&desc.limit.to_le_bytes());
    buf[12..16].copy_from_slice(&(1u32 << 4).to_le_bytes());
    k.context_mut(a).unwrap().vm.lock().write(0x5000, &buf).unwrap();

    set_regs(&mut k, a, SYS_CLONE, [CLONE_MANDATORY | CLONE_SETTLS, 0, 0, 0x5000, 0, 0]);
    let outcome = dispatch(&mut k, &LibcHostIo, a);
    let child = match outcome {
        SyscallOutcome::Value(v) => v,
        other => panic!("expected clone to return child pid, got {other:?}"),
    };

    assert_eq!(k.context(child).unwrap().tls.base, 0xdeadc000);
    assert_eq!(k.context(child).unwrap().tls.limit, 0x1000);
    let written_entry = k.context(a).unwrap().vm.lock().read_u32(0x5000).unwrap();
    assert_eq!(written_entry, 6);
}
