//! Global kernel state and the event-processing tick (spec.md §3 "Global
//! kernel state", §5 "Concurrency & resource model").
//!
//! One `KernelState` per simulator instance, owned by the host rather than
//! reached through a free-standing global — spec.md §9 flags the original's
//! process-wide `futex_sleep_count` as a bug waiting to happen the moment two
//! simulator instances coexist in one process.

use std::collections::HashMap;

use crate::config::EmulatorConfig;
use crate::context::{Context, Pid, RunState, SharedVm, Suspension};
use crate::fd::HostIo;
use crate::signal::SignalFrame;

pub struct KernelState {
    pub config: EmulatorConfig,
    contexts: HashMap<Pid, Context>,
    next_pid: Pid,
    pub now_us: u64,
    futex_sleep_count: u64,
    syscall_freq: HashMap<&'static str, u64>,
    /// Simulated-disk blocks, keyed by block number, each owned by the uid
    /// that last wrote it (spec.md §3 `blockowners`, §4.8).
    disk: HashMap<u32, (u32, Vec<u8>)>,
}

impl KernelState {
    pub fn new(config: EmulatorConfig) -> Self {
        Self {
            config,
            contexts: HashMap::new(),
            next_pid: 1,
            now_us: 0,
            futex_sleep_count: 0,
            syscall_freq: HashMap::new(),
            disk: HashMap::new(),
        }
    }

    pub fn disk_block_owner(&self, block_no: u32) -> Option<u32> {
        self.disk.get(&block_no).map(|(owner_uid, _)| *owner_uid)
    }

    pub fn write_disk_block(&mut self, block_no: u32, owner_uid: u32, data: Vec<u8>) {
        self.disk.insert(block_no, (owner_uid, data));
    }

    pub fn read_disk_block(&self, block_no: u32) -> Vec<u8> {
        self.disk
            .get(&block_no)
            .map(|(_, data)| data.clone())
            .unwrap_or_else(|| vec![0u8; self.config.disk_block_size as usize])
    }

    pub fn spawn(&mut self, uid: u32, parent: Option<Pid>, vm: SharedVm) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        self.contexts.insert(pid, Context::new(pid, uid, parent, vm));
        pid
    }

    pub fn context(&self, pid: Pid) -> Option<&Context> {
        self.contexts.get(&pid)
    }

    pub fn context_mut(&mut self, pid: Pid) -> Option<&mut Context> {
        self.contexts.get_mut(&pid)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.contexts.keys().copied().collect()
    }

    pub fn remove(&mut self, pid: Pid) -> Option<Context> {
        self.contexts.remove(&pid)
    }

    /// Next FIFO serial for a futex waiter (spec.md §4.6, §8 "Futex FIFO").
    pub fn next_futex_serial(&mut self) -> u64 {
        let s = self.futex_sleep_count;
        self.futex_sleep_count += 1;
        s
    }

    pub fn record_syscall(&mut self, name: &'static str) {
        *self.syscall_freq.entry(name).or_insert(0) += 1;
    }

    pub fn syscall_frequencies(&self) -> &HashMap<&'static str, u64> {
        &self.syscall_freq
    }

    pub fn advance_time(&mut self, delta_us: u64) {
        self.now_us += delta_us;
    }

    /// Re-evaluate every suspended context (spec.md §5 "event tick"). Callers
    /// (the host's step loop) invoke this on a timer and after anything that
    /// could make a wakeup predicate true (an fd became readable, a write
    /// landed, a signal was raised, a timer fired). Idempotent: running it
    /// with nothing to wake is a no-op (spec.md §5 ordering guarantee).
    pub fn process_events(&mut self, host: &dyn HostIo) {
        self.reap_timers();
        self.deliver_signals(host);
        let pids = self.pids();
        for pid in pids {
            self.try_wake_one(pid, host);
        }
    }

    /// Write the wait-status word for a reaped zombie and mark it `Finished`
    /// (spec.md §4.4). Shared by the synchronous `waitpid` fast path and the
    /// suspended-wait wakeup path so both agree on the POSIX status encoding:
    /// a signal-terminated child reports the signal number in the low 7 bits
    /// (`WIFSIGNALED`), an `exit`ed child reports its code in the high byte
    /// (`WIFEXITED`).
    pub(crate) fn reap_zombie(&mut self, parent: Pid, child_pid: Pid, status_addr: u32) {
        let (code, sig) = {
            let child = self.contexts.get(&child_pid).unwrap();
            (child.exit_code, child.exit_signal)
        };
        if status_addr != 0 {
            if let Some(parent_ctx) = self.contexts.get(&parent) {
                let status = if sig != 0 { (sig as u32) & 0x7f } else { (code as u32 & 0xff) << 8 };
                let _ = parent_ctx.vm.lock().write_u32(status_addr, status);
            }
        }
        if let Some(c) = self.contexts.get_mut(&child_pid) {
            c.run_state = RunState::Finished;
        }
    }

    /// Deliver every pending∧¬blocked signal on every context, running or
    /// suspended (spec.md §4.5 "Delivery (on event tick)"). Default action
    /// terminates the context; ignore clears the pending bit with no other
    /// effect; a registered handler gets a frame pushed on the guest stack
    /// and EIP redirected to it, which converts any other suspension into a
    /// handler invocation (spec.md §5 "Cancellation").
    fn deliver_signals(&mut self, host: &dyn HostIo) {
        let pids = self.pids();
        for pid in pids {
            loop {
                let sig = match self.contexts.get(&pid) {
                    Some(c) if !matches!(c.run_state, RunState::Zombie | RunState::Finished) => {
                        match c.signals.next_deliverable() {
                            Some(s) => s,
                            None => break,
                        }
                    }
                    _ => break,
                };
                self.deliver_one(pid, sig, host);
            }
        }
    }

    fn deliver_one(&mut self, pid: Pid, sig: u32, host: &dyn HostIo) {
        let action = self.contexts.get(&pid).unwrap().signals.actions[(sig - 1) as usize];

        if action.is_default() {
            let ctx = self.contexts.get_mut(&pid).unwrap();
            ctx.signals.clear_pending(sig);
            ctx.exit_signal = sig as i32;
            ctx.run_state = RunState::Zombie;
            return;
        }
        if action.is_ignore() {
            self.contexts.get_mut(&pid).unwrap().signals.clear_pending(sig);
            return;
        }

        // A signal with a handler installed cancels any host-facing
        // suspension the context was in rather than waiting on it.
        let host_fd_to_cancel = match self.contexts.get(&pid).map(|c| &c.run_state) {
            Some(RunState::Suspended(Suspension::Read { guest_fd, .. }))
            | Some(RunState::Suspended(Suspension::Write { guest_fd, .. })) => {
                self.contexts.get(&pid).unwrap().fd_table.get(*guest_fd).ok().map(|e| e.host_fd)
            }
            _ => None,
        };
        if let Some(host_fd) = host_fd_to_cancel {
            host.cancel_wait(host_fd);
        }

        let ctx = self.contexts.get_mut(&pid).unwrap();
        // sigsuspend's own temporary mask isn't what execution should resume
        // under once the handler returns — that's `backup`, the mask saved
        // before the sigsuspend call (spec.md §4.5).
        let restore_mask = match &ctx.run_state {
            RunState::Suspended(Suspension::SigSuspend) => ctx.signals.backup,
            _ => ctx.signals.blocked,
        };
        let frame = SignalFrame { saved_regs: ctx.regs, saved_blocked_mask: restore_mask, sig };
        let mut buf = [0u8; SignalFrame::SIZE as usize];
        frame.encode(&mut buf);
        let new_esp = ctx.regs.esp.wrapping_sub(SignalFrame::SIZE);

        if ctx.vm.lock().write(new_esp, &buf).is_err() {
            // No guest stack to push the frame onto: fall back to the
            // default action rather than corrupt adjacent memory.
            ctx.signals.clear_pending(sig);
            ctx.exit_signal = sig as i32;
            ctx.run_state = RunState::Zombie;
            return;
        }

        ctx.signals.clear_pending(sig);
        ctx.signals.blocked |= action.mask | (1u64 << (sig - 1));
        ctx.regs.esp = new_esp;
        ctx.regs.eip = action.handler_addr;
        ctx.run_state = RunState::Running;
    }

    fn reap_timers(&mut self) {
        let now = self.now_us;
        for ctx in self.contexts.values_mut() {
            for timer in ctx.timers.iter_mut() {
                if timer.value_us != 0 && timer.value_us <= now {
                    if timer.interval_us != 0 {
                        timer.value_us += timer.interval_us;
                    } else {
                        timer.value_us = 0;
                    }
                }
            }
        }
    }

    fn try_wake_one(&mut self, pid: Pid, host: &dyn HostIo) {
        let reason = match self.contexts.get(&pid) {
            Some(Context { run_state: RunState::Suspended(s), .. }) => s.clone(),
            _ => return,
        };
        match reason {
            Suspension::Read { guest_fd, events } | Suspension::Write { guest_fd, events } => {
                let host_fd = match self.contexts.get(&pid).and_then(|c| c.fd_table.get(guest_fd).ok()) {
                    Some(e) => e.host_fd,
                    None => return,
                };
                if host.poll_ready(host_fd, events as i16).unwrap_or(false) {
                    if let Some(ctx) = self.contexts.get_mut(&pid) {
                        ctx.resume();
                    }
                }
            }
            Suspension::NanoSleep { wakeup_time_us } => {
                if self.now_us >= wakeup_time_us {
                    if let Some(ctx) = self.contexts.get_mut(&pid) {
                        ctx.set_retval(0);
                        ctx.resume();
                    }
                }
            }
            Suspension::WaitPid { pid: want, options, status_addr } => {
                let child = self.find_zombie_child(pid, want);
                if let Some(child_pid) = child {
                    self.reap_zombie(pid, child_pid, status_addr);
                    if let Some(ctx) = self.contexts.get_mut(&pid) {
                        ctx.set_retval(child_pid);
                        ctx.resume();
                    }
                } else if options & crate::abi::flags::WNOHANG != 0 {
                    if let Some(ctx) = self.contexts.get_mut(&pid) {
                        ctx.set_retval(0);
                        ctx.resume();
                    }
                }
            }
            Suspension::SigSuspend => {
                // Resolved by deliver_signals above, which runs before this
                // loop on every tick: a deliverable signal either converts
                // the suspension into a handler invocation or terminates the
                // context, so there's nothing left for this branch to do.
            }
            Suspension::Futex { .. } | Suspension::Poll { .. } => {
                // Woken explicitly by futex wake/requeue or poll-readiness
                // evaluation in their respective handlers, not by this tick.
            }
        }
    }

    pub(crate) fn find_zombie_child(&self, parent: Pid, want: i32) -> Option<Pid> {
        self.contexts
            .values()
            .find(|c| {
                c.parent == Some(parent)
                    && matches!(c.run_state, RunState::Zombie)
                    && (want == -1 || want == c.pid)
            })
            .map(|c| c.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fd::LibcHostIo;
    use crate::memory::SimGuestMemory;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn new_vm() -> SharedVm {
        Arc::new(Mutex::new(SimGuestMemory::new()))
    }

    #[test]
    fn spawn_assigns_distinct_pids() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let a = k.spawn(0, None, new_vm());
        let b = k.spawn(0, None, new_vm());
        assert_ne!(a, b);
    }

    #[test]
    fn futex_serial_is_monotonic() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let a = k.next_futex_serial();
        let b = k.next_futex_serial();
        assert!(b > a);
    }

    #[test]
    fn nanosleep_wakes_once_deadline_passes() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let pid = k.spawn(0, None, new_vm());
        k.context_mut(pid).unwrap().suspend(Suspension::NanoSleep { wakeup_time_us: 1000 });
        k.advance_time(500);
        k.process_events(&LibcHostIo);
        assert!(k.context(pid).unwrap().is_suspended());
        k.advance_time(600);
        k.process_events(&LibcHostIo);
        assert!(!k.context(pid).unwrap().is_suspended());
    }

    #[test]
    fn event_tick_is_idempotent_with_nothing_to_wake() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let pid = k.spawn(0, None, new_vm());
        k.process_events(&LibcHostIo);
        k.process_events(&LibcHostIo);
        assert!(!k.context(pid).unwrap().is_suspended());
    }

    #[test]
    fn default_action_signal_terminates_a_running_context() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let pid = k.spawn(0, None, new_vm());
        k.context_mut(pid).unwrap().signals.raise(9);
        k.process_events(&LibcHostIo);
        assert!(matches!(k.context(pid).unwrap().run_state, RunState::Zombie));
        assert_eq!(k.context(pid).unwrap().exit_signal, 9);
    }

    #[test]
    fn ignore_action_clears_pending_without_terminating_or_redirecting() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let pid = k.spawn(0, None, new_vm());
        {
            let ctx = k.context_mut(pid).unwrap();
            ctx.signals.actions[12].handler_addr = 1; // SIG_IGN
            ctx.signals.raise(13);
        }
        k.process_events(&LibcHostIo);
        let ctx = k.context(pid).unwrap();
        assert!(matches!(ctx.run_state, RunState::Running));
        assert!(!ctx.signals.is_deliverable(13));
    }

    #[test]
    fn handler_action_pushes_frame_and_redirects_eip() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let pid = k.spawn(0, None, new_vm());
        k.context_mut(pid).unwrap().vm.lock().map(0x7000, 0x1000, crate::memory::Perm::READ | crate::memory::Perm::WRITE, None).unwrap();
        {
            let ctx = k.context_mut(pid).unwrap();
            ctx.regs.esp = 0x7800;
            ctx.regs.eip = 0x1000;
            ctx.signals.actions[4].handler_addr = 0x5000_0000;
            ctx.signals.raise(5);
        }
        k.process_events(&LibcHostIo);
        let ctx = k.context(pid).unwrap();
        assert!(matches!(ctx.run_state, RunState::Running));
        assert_eq!(ctx.regs.eip, 0x5000_0000);
        assert_eq!(ctx.regs.esp, 0x7800 - crate::signal::SignalFrame::SIZE);
        assert!(ctx.signals.blocked & (1 << 4) != 0);
        assert!(!ctx.signals.is_deliverable(5));
    }

    #[test]
    fn waitpid_synchronous_fast_path_reaps_an_existing_zombie() {
        let mut k = KernelState::new(EmulatorConfig::default());
        let parent = k.spawn(0, None, new_vm());
        let child = k.spawn(0, Some(parent), new_vm());
        k.context_mut(child).unwrap().exit_code = 3;
        k.context_mut(child).unwrap().run_state = RunState::Zombie;
        k.reap_zombie(parent, child, 0);
        assert!(matches!(k.context(child).unwrap().run_state, RunState::Finished));
    }
}
