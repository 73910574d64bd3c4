//! File-descriptor table service (spec.md §3, §6 "Fd conventions").
//!
//! Bridges the guest fd namespace to the host's. `HostIo` is the seam: handlers
//! in `syscall::fileio` talk to `&dyn HostIo` rather than calling `libc`
//! directly, so tests can swap in a fake without touching real descriptors.

use std::collections::HashMap;

use thiserror::Error;

use crate::errno::Errno;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdKind {
    Regular,
    Pipe,
    Socket,
    /// A host temporary file standing in for a synthetic `/proc` entry,
    /// deleted on close (spec.md §4.2 `open`, GLOSSARY "Virtual file").
    Virtual,
}

#[derive(Debug, Clone)]
pub struct FdEntry {
    pub host_fd: i32,
    pub kind: FdKind,
    pub flags: i32,
    pub path: String,
    /// Set only for `Virtual` entries: the temp file to unlink on close.
    pub virtual_backing_path: Option<String>,
}

#[derive(Debug, Error)]
pub enum FdError {
    #[error("bad file descriptor")]
    Bad,
}

impl From<FdError> for Errno {
    fn from(_: FdError) -> Self {
        Errno::EBADF
    }
}

/// Per-context table, shareable across contexts created with `CLONE_FILES`
/// (spec.md §4.4). Sharing is expressed by cloning the `Arc` the context holds,
/// not by this type; `FdTable` itself is the plain table.
#[derive(Debug, Clone, Default)]
pub struct FdTable {
    entries: HashMap<i32, FdEntry>,
}

impl FdTable {
    pub fn new() -> Self {
        let mut t = Self { entries: HashMap::new() };
        t.entries.insert(0, FdEntry { host_fd: 0, kind: FdKind::Regular, flags: libc::O_RDONLY, path: "/dev/stdin".into(), virtual_backing_path: None });
        t.entries.insert(1, FdEntry { host_fd: 1, kind: FdKind::Regular, flags: libc::O_WRONLY, path: "/dev/stdout".into(), virtual_backing_path: None });
        t.entries.insert(2, FdEntry { host_fd: 2, kind: FdKind::Regular, flags: libc::O_WRONLY, path: "/dev/stderr".into(), virtual_backing_path: None });
        t
    }

    pub fn get(&self, guest_fd: i32) -> Result<&FdEntry, FdError> {
        self.entries.get(&guest_fd).ok_or(FdError::Bad)
    }

    pub fn get_mut(&mut self, guest_fd: i32) -> Result<&mut FdEntry, FdError> {
        self.entries.get_mut(&guest_fd).ok_or(FdError::Bad)
    }

    /// Allocate the lowest-numbered unused guest fd, matching POSIX `open`
    /// semantics (and the `dup`/`pipe`/`socket` paths that reuse it).
    pub fn alloc(&mut self, entry: FdEntry) -> i32 {
        let mut fd = 0;
        while self.entries.contains_key(&fd) {
            fd += 1;
        }
        self.entries.insert(fd, entry);
        fd
    }

    pub fn insert_at(&mut self, guest_fd: i32, entry: FdEntry) {
        self.entries.insert(guest_fd, entry);
    }

    /// Free a table entry. Returns the entry so the caller can decide whether
    /// to close the host fd / delete a virtual backing file — stdio fds
    /// (host_fd <= 2) are never actually closed (spec.md §3 invariant).
    pub fn free(&mut self, guest_fd: i32) -> Result<FdEntry, FdError> {
        self.entries.remove(&guest_fd).ok_or(FdError::Bad)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&i32, &FdEntry)> {
        self.entries.iter()
    }
}

/// Hook for interrupting a pending host-level wait on behalf of a context
/// whose state just changed from under it — e.g. a signal delivered to a
/// context blocked in `read`/`write`/`poll` (spec.md §5's
/// `host_thread_suspend_cancel`). This core's host-facing operations are
/// non-blocking polls rather than real blocking waits, so the default
/// implementation has nothing to cancel; a host binding real blocking I/O
/// threads would override it.
pub trait HostWaitCanceller {
    fn cancel_wait(&self, host_fd: i32) {
        let _ = host_fd;
    }
}

/// The host-facing I/O seam (spec.md §6's external fd-table contract plus the
/// actual syscalls the file-descriptor handlers issue).
pub trait HostIo: HostWaitCanceller {
    fn open(&self, path: &str, flags: i32, mode: u32) -> Result<i32, Errno>;
    fn close(&self, fd: i32) -> Result<(), Errno>;
    fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno>;
    fn pread(&self, fd: i32, buf: &mut [u8], offset: i64) -> Result<usize, Errno>;
    fn write(&self, fd: i32, buf: &[u8]) -> Result<usize, Errno>;
    fn lseek(&self, fd: i32, offset: i64, whence: i32) -> Result<i64, Errno>;
    fn ftruncate(&self, fd: i32, len: i64) -> Result<(), Errno>;
    fn dup(&self, fd: i32) -> Result<i32, Errno>;
    fn pipe(&self) -> Result<(i32, i32), Errno>;
    fn fcntl_get(&self, fd: i32, cmd: i32) -> Result<i32, Errno>;
    fn fcntl_set(&self, fd: i32, cmd: i32, arg: i32) -> Result<i32, Errno>;
    fn ioctl(&self, fd: i32, cmd: u32, argp: *mut libc::c_void) -> Result<i32, Errno>;
    /// Returns `true` when at least one of `events` is ready without blocking.
    fn poll_ready(&self, fd: i32, events: i16) -> Result<bool, Errno>;
    fn fstat(&self, fd: i32) -> Result<libc::stat, Errno>;
    fn stat(&self, path: &str) -> Result<libc::stat, Errno>;
    fn lstat(&self, path: &str) -> Result<libc::stat, Errno>;
    fn getdents64(&self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno>;
    fn mkstemp(&self, prefix: &str) -> Result<(i32, String), Errno>;
    fn unlink(&self, path: &str) -> Result<(), Errno>;
    fn mkdir(&self, path: &str, mode: u32) -> Result<(), Errno>;
    fn rmdir(&self, path: &str) -> Result<(), Errno>;
    /// A connected-less `AF_UNIX`/`SOCK_STREAM` endpoint (spec.md §4.6
    /// Non-goals: only stream sockets are emulated).
    fn socket_stream(&self) -> Result<i32, Errno>;
}

/// Direct-to-`libc` implementation, the one `m2sctl` (and any real host binary)
/// wires up. Every method is a thin, errno-checked wrapper.
pub struct LibcHostIo;

impl HostWaitCanceller for LibcHostIo {}

fn cvt(rc: i32) -> Result<i32, Errno> {
    if rc < 0 {
        Err(Errno::from_host())
    } else {
        Ok(rc)
    }
}

fn cvt_isize(rc: isize) -> Result<usize, Errno> {
    if rc < 0 {
        Err(Errno::from_host())
    } else {
        Ok(rc as usize)
    }
}

impl HostIo for LibcHostIo {
    fn open(&self, path: &str, flags: i32, mode: u32) -> Result<i32, Errno> {
        let c = std::ffi::CString::new(path).map_err(|_| Errno::EINVAL)?;
        cvt(unsafe { libc::open(c.as_ptr(), flags, mode) })
    }

    fn close(&self, fd: i32) -> Result<(), Errno> {
        cvt(unsafe { libc::close(fd) }).map(|_| ())
    }

    fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        cvt_isize(unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) })
    }

    fn write(&self, fd: i32, buf: &[u8]) -> Result<usize, Errno> {
        cvt_isize(unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) })
    }

    fn pread(&self, fd: i32, buf: &mut [u8], offset: i64) -> Result<usize, Errno> {
        cvt_isize(unsafe { libc::pread(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), offset) })
    }

    fn lseek(&self, fd: i32, offset: i64, whence: i32) -> Result<i64, Errno> {
        let r = unsafe { libc::lseek(fd, offset, whence) };
        if r < 0 {
            Err(Errno::from_host())
        } else {
            Ok(r)
        }
    }

    fn ftruncate(&self, fd: i32, len: i64) -> Result<(), Errno> {
        cvt(unsafe { libc::ftruncate(fd, len) }).map(|_| ())
    }

    fn dup(&self, fd: i32) -> Result<i32, Errno> {
        cvt(unsafe { libc::dup(fd) })
    }

    fn pipe(&self) -> Result<(i32, i32), Errno> {
        let mut fds = [0i32; 2];
        cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        Ok((fds[0], fds[1]))
    }

    fn fcntl_get(&self, fd: i32, cmd: i32) -> Result<i32, Errno> {
        cvt(unsafe { libc::fcntl(fd, cmd) })
    }

    fn fcntl_set(&self, fd: i32, cmd: i32, arg: i32) -> Result<i32, Errno> {
        cvt(unsafe { libc::fcntl(fd, cmd, arg) })
    }

    fn ioctl(&self, fd: i32, cmd: u32, argp: *mut libc::c_void) -> Result<i32, Errno> {
        cvt(unsafe { libc::ioctl(fd, cmd as _, argp) })
    }

    fn poll_ready(&self, fd: i32, events: i16) -> Result<bool, Errno> {
        let mut pfd = libc::pollfd { fd, events, revents: 0 };
        let r = unsafe { libc::poll(&mut pfd as *mut _, 1, 0) };
        if r < 0 {
            return Err(Errno::from_host());
        }
        Ok(pfd.revents & events != 0)
    }

    fn fstat(&self, fd: i32) -> Result<libc::stat, Errno> {
        unsafe {
            let mut st: libc::stat = std::mem::zeroed();
            cvt(libc::fstat(fd, &mut st))?;
            Ok(st)
        }
    }

    fn stat(&self, path: &str) -> Result<libc::stat, Errno> {
        let c = std::ffi::CString::new(path).map_err(|_| Errno::EINVAL)?;
        unsafe {
            let mut st: libc::stat = std::mem::zeroed();
            cvt(libc::stat(c.as_ptr(), &mut st))?;
            Ok(st)
        }
    }

    fn lstat(&self, path: &str) -> Result<libc::stat, Errno> {
        let c = std::ffi::CString::new(path).map_err(|_| Errno::EINVAL)?;
        unsafe {
            let mut st: libc::stat = std::mem::zeroed();
            cvt(libc::lstat(c.as_ptr(), &mut st))?;
            Ok(st)
        }
    }

    fn getdents64(&self, fd: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        cvt_isize(unsafe { libc::syscall(libc::SYS_getdents64, fd, buf.as_mut_ptr(), buf.len()) as isize })
    }

    fn mkstemp(&self, prefix: &str) -> Result<(i32, String), Errno> {
        let mut template = format!("{prefix}XXXXXX\0").into_bytes();
        let fd = unsafe { libc::mkstemp(template.as_mut_ptr() as *mut libc::c_char) };
        if fd < 0 {
            return Err(Errno::from_host());
        }
        template.pop();
        let path = String::from_utf8_lossy(&template).into_owned();
        Ok((fd, path))
    }

    fn unlink(&self, path: &str) -> Result<(), Errno> {
        let c = std::ffi::CString::new(path).map_err(|_| Errno::EINVAL)?;
        cvt(unsafe { libc::unlink(c.as_ptr()) }).map(|_| ())
    }

    fn mkdir(&self, path: &str, mode: u32) -> Result<(), Errno> {
        let c = std::ffi::CString::new(path).map_err(|_| Errno::EINVAL)?;
        cvt(unsafe { libc::mkdir(c.as_ptr(), mode) }).map(|_| ())
    }

    fn rmdir(&self, path: &str) -> Result<(), Errno> {
        let c = std::ffi::CString::new(path).map_err(|_| Errno::EINVAL)?;
        cvt(unsafe { libc::rmdir(c.as_ptr()) }).map(|_| ())
    }

    fn socket_stream(&self) -> Result<i32, Errno> {
        cvt(unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_fds_present_and_distinct() {
        let t = FdTable::new();
        assert_eq!(t.get(0).unwrap().host_fd, 0);
        assert_eq!(t.get(1).unwrap().host_fd, 1);
        assert_eq!(t.get(2).unwrap().host_fd, 2);
    }

    #[test]
    fn alloc_reuses_freed_slots_lowest_first() {
        let mut t = FdTable::new();
        let a = t.alloc(FdEntry { host_fd: 10, kind: FdKind::Regular, flags: 0, path: "a".into(), virtual_backing_path: None });
        let b = t.alloc(FdEntry { host_fd: 11, kind: FdKind::Regular, flags: 0, path: "b".into(), virtual_backing_path: None });
        assert_eq!(a, 3);
        assert_eq!(b, 4);
        t.free(a).unwrap();
        let c = t.alloc(FdEntry { host_fd: 12, kind: FdKind::Regular, flags: 0, path: "c".into(), virtual_backing_path: None });
        assert_eq!(c, 3);
    }

    #[test]
    fn unknown_fd_is_ebadf() {
        let t = FdTable::new();
        assert!(matches!(t.get(99), Err(FdError::Bad)));
    }
}
