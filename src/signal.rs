//! Per-context signal state (spec.md §3 "Signal state", §4.5).

pub const NSIG: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct SigAction {
    pub handler_addr: u32,
    pub flags: u32,
    pub restorer: u32,
    pub mask: u64,
}

/// `handler_addr` sentinels mirroring glibc's `SIG_DFL` (0) / `SIG_IGN` (1).
impl SigAction {
    pub fn is_default(&self) -> bool {
        self.handler_addr == 0
    }

    pub fn is_ignore(&self) -> bool {
        self.handler_addr == 1
    }
}

#[derive(Debug, Clone)]
pub struct SignalState {
    pub blocked: u64,
    pub pending: u64,
    /// Saved mask for `sigsuspend`/`sigreturn` (spec.md §3 invariant: after
    /// sigsuspend completes, blocked == backup).
    pub backup: u64,
    pub actions: [SigAction; NSIG],
}

impl SignalState {
    pub fn new() -> Self {
        Self { blocked: 0, pending: 0, backup: 0, actions: [SigAction::default(); NSIG] }
    }

    pub fn is_deliverable(&self, sig: u32) -> bool {
        let bit = 1u64 << (sig - 1);
        self.pending & bit != 0 && self.blocked & bit == 0
    }

    pub fn raise(&mut self, sig: u32) {
        self.pending |= 1u64 << (sig - 1);
    }

    pub fn clear_pending(&mut self, sig: u32) {
        self.pending &= !(1u64 << (sig - 1));
    }

    /// Next deliverable signal number, lowest first, or `None`.
    pub fn next_deliverable(&self) -> Option<u32> {
        for sig in 1..=64u32 {
            if self.is_deliverable(sig) {
                return Some(sig);
            }
        }
        None
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Layout of the frame the core pushes onto the guest stack before invoking a
/// handler, consumed by `sigreturn`/`rt_sigreturn` to unwind (spec.md §9
/// "Signal delivery requiring guest-stack frame manipulation").
#[derive(Debug, Clone, Copy)]
pub struct SignalFrame {
    pub saved_regs: crate::context::Registers,
    pub saved_blocked_mask: u64,
    pub sig: u32,
}

impl SignalFrame {
    /// Packed on-stack size: 10 saved registers (40 bytes) + mask (8) + sig (4).
    pub const SIZE: u32 = 10 * 4 + 8 + 4;

    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= Self::SIZE as usize);
        let r = &self.saved_regs;
        let words = [r.eax, r.ebx, r.ecx, r.edx, r.esi, r.edi, r.ebp, r.esp, r.eip, r.eflags];
        for (i, w) in words.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
        }
        buf[40..48].copy_from_slice(&self.saved_blocked_mask.to_le_bytes());
        buf[48..52].copy_from_slice(&self.sig.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        debug_assert!(buf.len() >= Self::SIZE as usize);
        let w = |i: usize| u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
        let regs = crate::context::Registers {
            eax: w(0), ebx: w(1), ecx: w(2), edx: w(3), esi: w(4),
            edi: w(5), ebp: w(6), esp: w(7), eip: w(8), eflags: w(9),
        };
        let saved_blocked_mask = u64::from_le_bytes(buf[40..48].try_into().unwrap());
        let sig = u32::from_le_bytes(buf[48..52].try_into().unwrap());
        Self { saved_regs: regs, saved_blocked_mask, sig }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigprocmask_block_then_unblock_roundtrip() {
        let mut s = SignalState::new();
        let initial = s.blocked;
        s.blocked |= 1 << 4;
        s.blocked &= !(1 << 4);
        assert_eq!(s.blocked, initial);
    }

    #[test]
    fn deliverable_requires_pending_and_unblocked() {
        let mut s = SignalState::new();
        s.raise(5);
        assert!(s.is_deliverable(5));
        s.blocked |= 1 << 4;
        assert!(!s.is_deliverable(5));
    }

    #[test]
    fn signal_frame_roundtrip() {
        let regs = crate::context::Registers { eax: 1, ebx: 2, ecx: 3, edx: 4, esi: 5, edi: 6, ebp: 7, esp: 8, eip: 9, eflags: 10 };
        let frame = SignalFrame { saved_regs: regs, saved_blocked_mask: 0xdead_beef, sig: 17 };
        let mut buf = [0u8; SignalFrame::SIZE as usize];
        frame.encode(&mut buf);
        let decoded = SignalFrame::decode(&buf);
        assert_eq!(decoded.saved_regs, regs);
        assert_eq!(decoded.saved_blocked_mask, 0xdead_beef);
        assert_eq!(decoded.sig, 17);
    }
}
