//! Named flag/enum tables (spec.md §4.1 "Flag/enum maps").
//!
//! Each table is an ordered list of `(name, value)` pairs — pure data, per
//! spec.md §9. `decompose` renders a bitmask as the names of its set bits (for
//! tracing); `lookup` finds the name of an exact enum value.

pub struct FlagTable(pub &'static [(&'static str, u32)]);

impl FlagTable {
    /// Render a bitmask as `"A|B|C"`, falling back to the hex leftover if any
    /// bits are unrecognized.
    pub fn decompose(&self, mask: u32) -> String {
        let mut names = Vec::new();
        let mut remaining = mask;
        for &(name, val) in self.0 {
            if val != 0 && (remaining & val) == val {
                names.push(name);
                remaining &= !val;
            }
        }
        if remaining != 0 {
            names.push(Box::leak(format!("{remaining:#x}", remaining = remaining).into_boxed_str()));
        }
        if names.is_empty() {
            "0".to_string()
        } else {
            names.join("|")
        }
    }

    pub fn lookup(&self, value: u32) -> Option<&'static str> {
        self.0.iter().find(|&&(_, v)| v == value).map(|&(n, _)| n)
    }
}

/// `open(2)` flags (low bits are the access mode, not independent bits — kept
/// here anyway since `decompose` is for debug output, not validation).
pub const OPEN_FLAGS: FlagTable = FlagTable(&[
    ("O_WRONLY", 0o1),
    ("O_RDWR", 0o2),
    ("O_CREAT", 0o100),
    ("O_EXCL", 0o200),
    ("O_NOCTTY", 0o400),
    ("O_TRUNC", 0o1000),
    ("O_APPEND", 0o2000),
    ("O_NONBLOCK", 0o4000),
    ("O_DIRECTORY", 0o200000),
    ("O_CLOEXEC", 0o2000000),
]);

pub const MMAP_PROT: FlagTable = FlagTable(&[
    ("PROT_READ", 0x1),
    ("PROT_WRITE", 0x2),
    ("PROT_EXEC", 0x4),
]);

pub const MMAP_FLAGS: FlagTable = FlagTable(&[
    ("MAP_SHARED", 0x01),
    ("MAP_PRIVATE", 0x02),
    ("MAP_FIXED", 0x10),
    ("MAP_ANONYMOUS", 0x20),
    ("MAP_GROWSDOWN", 0x100),
    ("MAP_MAYMOVE", 0x1),
]);

/// `clone(2)` flags. `MANDATORY` is the subset spec.md's GLOSSARY calls out as
/// required on every clone request this core accepts.
pub const CLONE_VM: u32 = 0x0000_0100;
pub const CLONE_FS: u32 = 0x0000_0200;
pub const CLONE_FILES: u32 = 0x0000_0400;
pub const CLONE_SIGHAND: u32 = 0x0000_0800;
pub const CLONE_THREAD: u32 = 0x0001_0000;
pub const CLONE_SETTLS: u32 = 0x0008_0000;
pub const CLONE_PARENT_SETTID: u32 = 0x0010_0000;
pub const CLONE_CHILD_CLEARTID: u32 = 0x0020_0000;
pub const CLONE_CHILD_SETTID: u32 = 0x0100_0000;

pub const CLONE_MANDATORY: u32 = CLONE_VM | CLONE_FS | CLONE_FILES | CLONE_SIGHAND;

pub const CLONE_SUPPORTED: u32 = CLONE_MANDATORY
    | CLONE_THREAD
    | CLONE_SETTLS
    | CLONE_PARENT_SETTID
    | CLONE_CHILD_CLEARTID
    | CLONE_CHILD_SETTID;

pub const CLONE_FLAGS: FlagTable = FlagTable(&[
    ("CLONE_VM", CLONE_VM),
    ("CLONE_FS", CLONE_FS),
    ("CLONE_FILES", CLONE_FILES),
    ("CLONE_SIGHAND", CLONE_SIGHAND),
    ("CLONE_THREAD", CLONE_THREAD),
    ("CLONE_SETTLS", CLONE_SETTLS),
    ("CLONE_PARENT_SETTID", CLONE_PARENT_SETTID),
    ("CLONE_CHILD_CLEARTID", CLONE_CHILD_CLEARTID),
    ("CLONE_CHILD_SETTID", CLONE_CHILD_SETTID),
]);

/// Futex `op` command nibble plus the two modifier bits (spec.md §4.6).
pub const FUTEX_WAIT: u32 = 0;
pub const FUTEX_WAKE: u32 = 1;
pub const FUTEX_CMP_REQUEUE: u32 = 4;
pub const FUTEX_WAKE_OP: u32 = 5;
pub const FUTEX_WAIT_BITSET: u32 = 9;
pub const FUTEX_WAKE_BITSET: u32 = 10;
pub const FUTEX_PRIVATE_FLAG: u32 = 128;
pub const FUTEX_CLOCK_REALTIME: u32 = 256;

pub const FUTEX_CMDS: FlagTable = FlagTable(&[
    ("FUTEX_WAIT", FUTEX_WAIT),
    ("FUTEX_WAKE", FUTEX_WAKE),
    ("FUTEX_CMP_REQUEUE", FUTEX_CMP_REQUEUE),
    ("FUTEX_WAKE_OP", FUTEX_WAKE_OP),
    ("FUTEX_WAIT_BITSET", FUTEX_WAIT_BITSET),
    ("FUTEX_WAKE_BITSET", FUTEX_WAKE_BITSET),
]);

pub const F_GETFD: i32 = 1;
pub const F_SETFD: i32 = 2;
pub const F_GETFL: i32 = 3;
pub const F_SETFL: i32 = 4;

pub const FCNTL_CMDS: FlagTable = FlagTable(&[
    ("F_GETFD", F_GETFD as u32),
    ("F_SETFD", F_SETFD as u32),
    ("F_GETFL", F_GETFL as u32),
    ("F_SETFL", F_SETFL as u32),
]);

pub const SIG_BLOCK: i32 = 0;
pub const SIG_UNBLOCK: i32 = 1;
pub const SIG_SETMASK: i32 = 2;

pub const SIGMASK_OPS: FlagTable = FlagTable(&[
    ("SIG_BLOCK", SIG_BLOCK as u32),
    ("SIG_UNBLOCK", SIG_UNBLOCK as u32),
    ("SIG_SETMASK", SIG_SETMASK as u32),
]);

pub const POLLIN: u16 = 0x0001;
pub const POLLOUT: u16 = 0x0004;
pub const POLLERR: u16 = 0x0008;
pub const POLLHUP: u16 = 0x0010;

pub const POLL_EVENTS: FlagTable = FlagTable(&[
    ("POLLIN", POLLIN as u32),
    ("POLLOUT", POLLOUT as u32),
    ("POLLERR", POLLERR as u32),
    ("POLLHUP", POLLHUP as u32),
]);

pub const WNOHANG: i32 = 1;
pub const WUNTRACED: i32 = 2;

pub const WAITPID_OPTIONS: FlagTable = FlagTable(&[
    ("WNOHANG", WNOHANG as u32),
    ("WUNTRACED", WUNTRACED as u32),
]);

pub const RLIMIT_DATA: u32 = 2;
pub const RLIMIT_STACK: u32 = 3;
pub const RLIMIT_NOFILE: u32 = 7;

pub const RLIMIT_RESOURCES: FlagTable = FlagTable(&[
    ("RLIMIT_DATA", RLIMIT_DATA),
    ("RLIMIT_STACK", RLIMIT_STACK),
    ("RLIMIT_NOFILE", RLIMIT_NOFILE),
]);

pub const AF_UNIX: u32 = 1;
pub const AF_INET: u32 = 2;
pub const SOCK_STREAM: u32 = 1;

pub const SOCKETCALL_SOCKET: u32 = 1;
pub const SOCKETCALL_CONNECT: u32 = 3;
pub const SOCKETCALL_SEND: u32 = 9;
pub const SOCKETCALL_RECV: u32 = 10;

pub const SOCKET_FAMILY: FlagTable = FlagTable(&[("AF_UNIX", AF_UNIX), ("AF_INET", AF_INET)]);
pub const SOCKET_TYPE: FlagTable = FlagTable(&[("SOCK_STREAM", SOCK_STREAM)]);
pub const SOCKETCALL_OPS: FlagTable = FlagTable(&[
    ("SYS_SOCKET", SOCKETCALL_SOCKET),
    ("SYS_CONNECT", SOCKETCALL_CONNECT),
    ("SYS_SEND", SOCKETCALL_SEND),
    ("SYS_RECV", SOCKETCALL_RECV),
]);

pub const ITIMER_REAL: u32 = 0;
pub const ITIMER_VIRTUAL: u32 = 1;
pub const ITIMER_PROF: u32 = 2;

pub const ITIMER_KIND: FlagTable = FlagTable(&[
    ("ITIMER_REAL", ITIMER_REAL),
    ("ITIMER_VIRTUAL", ITIMER_VIRTUAL),
    ("ITIMER_PROF", ITIMER_PROF),
]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose_mmap_flags() {
        let s = MMAP_FLAGS.decompose(0x02 | 0x20);
        assert!(s.contains("MAP_PRIVATE"));
        assert!(s.contains("MAP_ANONYMOUS"));
    }

    #[test]
    fn lookup_exact_value() {
        assert_eq!(FUTEX_CMDS.lookup(FUTEX_WAKE_OP), Some("FUTEX_WAKE_OP"));
        assert_eq!(FUTEX_CMDS.lookup(999), None);
    }

    #[test]
    fn clone_mandatory_is_subset_of_supported() {
        assert_eq!(CLONE_MANDATORY & CLONE_SUPPORTED, CLONE_MANDATORY);
    }
}
