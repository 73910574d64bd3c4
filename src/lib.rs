//! Linux 2.6 32-bit x86 syscall emulation core for a user-mode functional
//! simulator.
//!
//! This crate does not decode instructions, load ELF binaries, or drive a
//! CPU loop — those live in the host that embeds it. What's here is the
//! layer between "the guest executed an `int 0x80`" and "the guest's
//! registers reflect the result": register/ABI decoding, the file
//! descriptor and signal tables, the guest memory contract, and every
//! syscall handler multi2sim-class emulators need to run an unmodified
//! 32-bit Linux binary.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Host (decoder + CPU loop)                   │
//! └───────────────────────────────┬────────────────────────────────────┘
//!                                  │ int 0x80 / sysenter
//!                                  ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  syscall::dispatch                                                 │
//! │    ├─ syscall::fileio     open/read/write/stat/poll/select/...     │
//! │    ├─ syscall::mmap       mmap/munmap/mprotect/mremap/brk          │
//! │    ├─ syscall::process    clone/fork/exit/waitpid/kill              │
//! │    ├─ syscall::signal     rt_sigaction/rt_sigprocmask/sigreturn     │
//! │    ├─ syscall::futex      WAIT/WAKE/CMP_REQUEUE/WAKE_OP             │
//! │    ├─ syscall::time       gettimeofday/nanosleep/itimers            │
//! │    ├─ syscall::misc       uname/rlimit/TLS/socketcall                │
//! │    └─ syscall::emulator_private   m2s_get_pid/disk_io/...            │
//! └───────────────────────────────┬────────────────────────────────────┘
//!                                  │
//!           ┌──────────────────────┼───────────────────────┐
//!           ▼                      ▼                        ▼
//!   context::Context      memory::GuestMemory        fd::HostIo
//!   (regs, run state,     (the guest address          (the host-facing
//!    fd table, signals)    space contract)              syscall seam)
//! ```
//!
//! [`kernel::KernelState`] owns every [`context::Context`] for one simulator
//! instance. It is plain, owned data passed explicitly to every handler —
//! never a thread-local or process-wide singleton, so nothing here stops two
//! simulator instances from coexisting in one process.

pub mod abi;
pub mod config;
pub mod context;
pub mod errno;
pub mod fd;
pub mod kernel;
pub mod memory;
pub mod signal;
pub mod syscall;
pub mod translate;

pub use config::EmulatorConfig;
pub use context::{Context, Pid};
pub use errno::Errno;
pub use kernel::KernelState;
pub use syscall::{dispatch, SyscallError, SyscallOutcome};
