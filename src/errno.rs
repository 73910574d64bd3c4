//! Linux errno values used by the syscall core.
//!
//! The guest ABI reports errors as small negative integers in EAX. `Errno`
//! carries the positive magnitude (as `libc` and `/usr/include/asm-generic/errno.h`
//! define it) and converts to the negative on-the-wire value at the last moment.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(pub i32);

impl Errno {
    pub const EPERM: Errno = Errno(1);
    pub const ENOENT: Errno = Errno(2);
    pub const ESRCH: Errno = Errno(3);
    pub const EINTR: Errno = Errno(4);
    pub const EIO: Errno = Errno(5);
    pub const EBADF: Errno = Errno(9);
    pub const EAGAIN: Errno = Errno(11);
    pub const EWOULDBLOCK: Errno = Errno(11);
    pub const ENOMEM: Errno = Errno(12);
    pub const EACCES: Errno = Errno(13);
    pub const EFAULT: Errno = Errno(14);
    pub const EEXIST: Errno = Errno(17);
    pub const ENOTDIR: Errno = Errno(20);
    pub const EISDIR: Errno = Errno(21);
    pub const EINVAL: Errno = Errno(22);
    pub const ENFILE: Errno = Errno(23);
    pub const EMFILE: Errno = Errno(24);
    pub const ESPIPE: Errno = Errno(29);
    pub const ERANGE: Errno = Errno(34);
    pub const ENOSYS: Errno = Errno(38);
    pub const ENOTEMPTY: Errno = Errno(39);

    /// The value the dispatcher writes into EAX: `-errno`.
    pub fn to_retval(self) -> i32 {
        -self.0
    }

    /// Translate the current host `errno` (as read right after a `-1` returning
    /// libc call) into our `Errno`. Host and guest errno numbers coincide for
    /// every value this core actually surfaces, which is why multi2sim-style
    /// emulators get away with a direct copy instead of a translation table.
    pub fn from_host() -> Errno {
        Errno(std::io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO))
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errno {}", self.0)
    }
}

impl std::error::Error for Errno {}
