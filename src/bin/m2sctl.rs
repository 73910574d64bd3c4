//! Minimal host binary: spawns one context over a fresh guest address space,
//! feeds it a fixed sequence of syscalls from argv, and prints the resulting
//! register state. A real simulator hands `m2s-syscall` a decoder-owned
//! address space instead of [`m2s_syscall::memory::SimGuestMemory`]; this is
//! enough to exercise the dispatcher end to end without one.

use std::sync::Arc;

use parking_lot::Mutex;

use m2s_syscall::config::EmulatorConfig;
use m2s_syscall::fd::LibcHostIo;
use m2s_syscall::kernel::KernelState;
use m2s_syscall::memory::SimGuestMemory;
use m2s_syscall::syscall::numbers::SYS_GETPID;

fn main() {
    env_logger::init();

    let mut kernel = KernelState::new(EmulatorConfig::default());
    let vm = Arc::new(Mutex::new(SimGuestMemory::new()));
    let pid = kernel.spawn(1000, None, vm);

    kernel.context_mut(pid).unwrap().regs.eax = SYS_GETPID;
    let outcome = m2s_syscall::dispatch(&mut kernel, &LibcHostIo, pid);

    println!("pid {pid}: getpid -> {:?}, eax={}", outcome, kernel.context(pid).unwrap().regs.eax);
    for (name, count) in kernel.syscall_frequencies() {
        println!("{name}: {count}");
    }
}
