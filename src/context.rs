//! Execution context — one per emulated process/thread (spec.md §3).
//!
//! This is the value the re-architecture note in spec.md §9 asks for: no ambient
//! "current context" global. Every handler in `syscall::` takes a `&mut Context`
//! (and, where memory is shared, a handle into the owning `KernelState`)
//! explicitly instead of reaching for thread-local or process-wide state.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::fd::FdTable;
use crate::memory::GuestMemory;
use crate::signal::SignalState;

pub type Pid = i32;

/// The guest address space, shared across contexts created with `CLONE_VM`
/// (spec.md §4.4) and exclusively owned otherwise — sharing is expressed by
/// cloning this `Arc`, never by a field on `GuestMemory` itself.
pub type SharedVm = Arc<Mutex<dyn GuestMemory + Send>>;

/// 32-bit x86 register file observed/written at syscall entry/exit (spec.md §6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub eip: u32,
    pub eflags: u32,
}

/// Per-context TLS segment (selector 6, glibc convention).
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsSegment {
    pub base: u32,
    pub limit: u32,
}

/// One interval-timer slot: ITIMER_REAL / ITIMER_VIRTUAL / ITIMER_PROF
/// (spec.md §4.7).
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalTimer {
    /// Simulator time (microseconds) the timer next fires, or 0 if disarmed.
    pub value_us: u64,
    /// Reload interval in microseconds; 0 means one-shot.
    pub interval_us: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItimerWhich {
    #[default]
    Real,
    Virtual,
    Prof,
}

/// Why a context is currently off the run queue. A context can be suspended
/// for exactly one reason at a time (spec.md §3, §8 invariant).
#[derive(Debug, Clone, PartialEq)]
pub enum Suspension {
    Read { guest_fd: i32, events: u16 },
    Write { guest_fd: i32, events: u16 },
    Poll { fds: Vec<(i32, u16)>, timeout_us: Option<u64> },
    WaitPid { pid: i32, options: i32, status_addr: u32 },
    NanoSleep { wakeup_time_us: u64 },
    SigSuspend,
    Futex { addr: u32, bitset: u32, sleep_serial: u64 },
}

/// Status bits, modeled as a single optional tag rather than a bitset: the
/// invariant "at most one suspension reason" is then enforced by the type
/// system instead of by convention.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RunState {
    #[default]
    Running,
    Suspended(Suspension),
    Zombie,
    Finished,
}

#[derive(Clone)]
pub struct Context {
    pub pid: Pid,
    pub uid: u32,
    pub parent: Option<Pid>,
    /// Contexts sharing this group's signal-handler table die together on
    /// `exit_group` (spec.md §4.4).
    pub tgid: Pid,

    pub regs: Registers,

    pub run_state: RunState,

    pub vm: SharedVm,

    pub fd_table: FdTable,
    pub cwd: String,
    pub signals: SignalState,

    pub tls: TlsSegment,

    pub set_child_tid: u32,
    pub clear_child_tid: u32,
    pub robust_list_head: u32,

    pub timers: [IntervalTimer; 3],

    pub brk_start: u32,
    pub brk_current: u32,
    pub umask: u32,

    pub exit_code: i32,
    pub exit_signal: i32,

    /// Scheduling quantum set by the emulator-private `set_instruction_slice`
    /// call (spec.md §4.8); purely advisory to the host's scheduler loop.
    pub instruction_slice: u64,

    /// Children already reaped or still to be reaped for `waitpid` bookkeeping.
    pub zombie_children: VecDeque<Pid>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("pid", &self.pid)
            .field("uid", &self.uid)
            .field("parent", &self.parent)
            .field("tgid", &self.tgid)
            .field("regs", &self.regs)
            .field("run_state", &self.run_state)
            .field("vm", &"<SharedVm>")
            .field("fd_table", &self.fd_table)
            .field("cwd", &self.cwd)
            .field("signals", &self.signals)
            .field("tls", &self.tls)
            .field("set_child_tid", &self.set_child_tid)
            .field("clear_child_tid", &self.clear_child_tid)
            .field("robust_list_head", &self.robust_list_head)
            .field("timers", &self.timers)
            .field("brk_start", &self.brk_start)
            .field("brk_current", &self.brk_current)
            .field("umask", &self.umask)
            .field("exit_code", &self.exit_code)
            .field("exit_signal", &self.exit_signal)
            .field("instruction_slice", &self.instruction_slice)
            .field("zombie_children", &self.zombie_children)
            .finish()
    }
}

impl Context {
    pub fn new(pid: Pid, uid: u32, parent: Option<Pid>, vm: SharedVm) -> Self {
        Self {
            pid,
            uid,
            parent,
            tgid: pid,
            regs: Registers::default(),
            run_state: RunState::Running,
            vm,
            fd_table: FdTable::new(),
            cwd: "/".to_string(),
            signals: SignalState::new(),
            tls: TlsSegment::default(),
            set_child_tid: 0,
            clear_child_tid: 0,
            robust_list_head: 0,
            timers: [IntervalTimer::default(); 3],
            brk_start: 0,
            brk_current: 0,
            umask: 0o022,
            exit_code: 0,
            exit_signal: 0,
            instruction_slice: 0,
            zombie_children: VecDeque::new(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self.run_state, RunState::Suspended(_))
    }

    pub fn suspend(&mut self, reason: Suspension) {
        self.run_state = RunState::Suspended(reason);
    }

    pub fn resume(&mut self) {
        self.run_state = RunState::Running;
    }

    /// Write the syscall return value into EAX, per spec.md §4.1.
    pub fn set_retval(&mut self, v: i32) {
        self.regs.eax = v as u32;
    }
}
