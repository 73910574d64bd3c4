//! Linux i386 syscall numbers this core understands, plus the emulator's own
//! private range above the Linux table bound (spec.md §4.1, §6).

pub const LINUX_TABLE_BOUND: u32 = 512;

pub const SYS_EXIT: u32 = 1;
pub const SYS_FORK: u32 = 2;
pub const SYS_READ: u32 = 3;
pub const SYS_WRITE: u32 = 4;
pub const SYS_OPEN: u32 = 5;
pub const SYS_CLOSE: u32 = 6;
pub const SYS_WAITPID: u32 = 7;
pub const SYS_UNLINK: u32 = 10;
pub const SYS_CHDIR: u32 = 12;
pub const SYS_TIME: u32 = 13;
pub const SYS_LSEEK: u32 = 19;
pub const SYS_GETPID: u32 = 20;
pub const SYS_GETUID: u32 = 24;
pub const SYS_ACCESS: u32 = 33;
pub const SYS_KILL: u32 = 37;
pub const SYS_MKDIR: u32 = 39;
pub const SYS_RMDIR: u32 = 40;
pub const SYS_DUP: u32 = 41;
pub const SYS_PIPE: u32 = 42;
pub const SYS_TIMES: u32 = 43;
pub const SYS_BRK: u32 = 45;
pub const SYS_GETGID: u32 = 47;
pub const SYS_GETEUID: u32 = 49;
pub const SYS_GETEGID: u32 = 50;
pub const SYS_IOCTL: u32 = 54;
pub const SYS_FCNTL: u32 = 55;
pub const SYS_SETITIMER: u32 = 104;
pub const SYS_GETITIMER: u32 = 105;
pub const SYS_STAT: u32 = 106;
pub const SYS_LSTAT: u32 = 107;
pub const SYS_FSTAT: u32 = 108;
pub const SYS_UNAME: u32 = 122;
pub const SYS_SIGRETURN: u32 = 119;
pub const SYS_CLONE: u32 = 120;
pub const SYS_MREMAP: u32 = 163;
pub const SYS_POLL: u32 = 168;
pub const SYS_RT_SIGACTION: u32 = 174;
pub const SYS_RT_SIGPROCMASK: u32 = 175;
pub const SYS_RT_SIGSUSPEND: u32 = 179;
pub const SYS_GETCWD: u32 = 183;
pub const SYS_GETRLIMIT: u32 = 191;
pub const SYS_MMAP2: u32 = 192;
pub const SYS_TRUNCATE64: u32 = 193;
pub const SYS_FTRUNCATE64: u32 = 194;
pub const SYS_STAT64: u32 = 195;
pub const SYS_LSTAT64: u32 = 196;
pub const SYS_FSTAT64: u32 = 197;
pub const SYS_GETDENTS64: u32 = 220;
pub const SYS_FCNTL64: u32 = 221;
pub const SYS_GETTID: u32 = 224;
pub const SYS_READAHEAD: u32 = 225;
pub const SYS_SET_THREAD_AREA: u32 = 243;
pub const SYS_GET_THREAD_AREA: u32 = 244;
pub const SYS_EXIT_GROUP: u32 = 252;
pub const SYS_SET_TID_ADDRESS: u32 = 258;
pub const SYS_READLINK: u32 = 85;
pub const SYS_SELECT: u32 = 142;
pub const SYS_NANOSLEEP: u32 = 162;
pub const SYS_MMAP: u32 = 90;
pub const SYS_MUNMAP: u32 = 91;
pub const SYS_MPROTECT: u32 = 125;
pub const SYS_SOCKETCALL: u32 = 102;
pub const SYS_WRITEV: u32 = 146;
pub const SYS_GETDENTS: u32 = 141;
pub const SYS_TGKILL: u32 = 270;
pub const SYS_GETTIMEOFDAY: u32 = 78;
pub const SYS_FUTEX: u32 = 240;
pub const SYS_SETRLIMIT: u32 = 75;
pub const SYS_CLOCK_GETRES: u32 = 266;
pub const SYS_UMASK: u32 = 60;
pub const SYS_MSYNC: u32 = 144;
pub const SYS_MADVISE: u32 = 219;

/// Emulator-private calls, occupying codes at/above the Linux table bound
/// (spec.md §4.8, §6).
pub const SYS_M2S_GET_PID: u32 = LINUX_TABLE_BOUND;
pub const SYS_M2S_SET_INSTRUCTION_SLICE: u32 = LINUX_TABLE_BOUND + 1;
pub const SYS_M2S_DISK_IO: u32 = LINUX_TABLE_BOUND + 2;
pub const SYS_M2S_OPENCL: u32 = LINUX_TABLE_BOUND + 3;

pub fn name_of(nr: u32) -> &'static str {
    match nr {
        SYS_EXIT => "exit",
        SYS_FORK => "fork",
        SYS_READ => "read",
        SYS_WRITE => "write",
        SYS_OPEN => "open",
        SYS_CLOSE => "close",
        SYS_WAITPID => "waitpid",
        SYS_UNLINK => "unlink",
        SYS_CHDIR => "chdir",
        SYS_TIME => "time",
        SYS_LSEEK => "lseek",
        SYS_GETPID => "getpid",
        SYS_GETUID => "getuid",
        SYS_ACCESS => "access",
        SYS_KILL => "kill",
        SYS_MKDIR => "mkdir",
        SYS_RMDIR => "rmdir",
        SYS_DUP => "dup",
        SYS_PIPE => "pipe",
        SYS_TIMES => "times",
        SYS_BRK => "brk",
        SYS_GETGID => "getgid",
        SYS_GETEUID => "geteuid",
        SYS_GETEGID => "getegid",
        SYS_IOCTL => "ioctl",
        SYS_FCNTL => "fcntl",
        SYS_SETITIMER => "setitimer",
        SYS_GETITIMER => "getitimer",
        SYS_STAT => "stat",
        SYS_LSTAT => "lstat",
        SYS_FSTAT => "fstat",
        SYS_UNAME => "uname",
        SYS_SIGRETURN => "sigreturn",
        SYS_CLONE => "clone",
        SYS_MREMAP => "mremap",
        SYS_POLL => "poll",
        SYS_RT_SIGACTION => "rt_sigaction",
        SYS_RT_SIGPROCMASK => "rt_sigprocmask",
        SYS_RT_SIGSUSPEND => "rt_sigsuspend",
        SYS_GETCWD => "getcwd",
        SYS_GETRLIMIT => "getrlimit",
        SYS_MMAP2 => "mmap2",
        SYS_TRUNCATE64 => "truncate64",
        SYS_FTRUNCATE64 => "ftruncate64",
        SYS_STAT64 => "stat64",
        SYS_LSTAT64 => "lstat64",
        SYS_FSTAT64 => "fstat64",
        SYS_GETDENTS64 => "getdents64",
        SYS_FCNTL64 => "fcntl64",
        SYS_GETTID => "gettid",
        SYS_SET_THREAD_AREA => "set_thread_area",
        SYS_GET_THREAD_AREA => "get_thread_area",
        SYS_EXIT_GROUP => "exit_group",
        SYS_SET_TID_ADDRESS => "set_tid_address",
        SYS_READLINK => "readlink",
        SYS_SELECT => "select",
        SYS_NANOSLEEP => "nanosleep",
        SYS_MMAP => "mmap",
        SYS_MUNMAP => "munmap",
        SYS_MPROTECT => "mprotect",
        SYS_SOCKETCALL => "socketcall",
        SYS_WRITEV => "writev",
        SYS_GETDENTS => "getdents",
        SYS_TGKILL => "tgkill",
        SYS_GETTIMEOFDAY => "gettimeofday",
        SYS_FUTEX => "futex",
        SYS_SETRLIMIT => "setrlimit",
        SYS_CLOCK_GETRES => "clock_getres",
        SYS_UMASK => "umask",
        SYS_MSYNC => "msync",
        SYS_MADVISE => "madvise",
        SYS_M2S_GET_PID => "m2s_get_pid",
        SYS_M2S_SET_INSTRUCTION_SLICE => "m2s_set_instruction_slice",
        SYS_M2S_DISK_IO => "m2s_disk_io",
        SYS_M2S_OPENCL => "m2s_opencl",
        _ => "unknown",
    }
}
