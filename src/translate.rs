//! Guest↔host translation helpers that don't belong to a single syscall
//! family: path resolution, fd-set bitmaps for `select` (spec.md §4.2/§6).

use crate::errno::Errno;
use crate::memory::GuestMemory;

/// Resolve a guest path argument against the context's working directory.
/// Absolute paths pass through unchanged. Bounded by `max_path_size`
/// (spec.md §6); exceeding it is a fatal overflow there, surfaced here as
/// `Err` for the caller to turn into a `Fatal` dispatch outcome.
pub fn resolve_path(cwd: &str, raw: &str, max_path_size: usize) -> Result<String, Errno> {
    let resolved = if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), raw)
    };
    if resolved.len() > max_path_size {
        return Err(Errno::ERANGE);
    }
    Ok(resolved)
}

pub fn read_guest_path(mem: &dyn GuestMemory, addr: u32, cwd: &str, max_path_size: usize) -> Result<String, Errno> {
    let bytes = mem.read_string(addr, max_path_size).map_err(|_| Errno::EFAULT)?;
    let raw = String::from_utf8_lossy(&bytes).into_owned();
    resolve_path(cwd, &raw, max_path_size)
}

/// `fd_set` is a bitmap of `FD_SETSIZE` (1024) bits, 32 bits per word on this
/// ABI. Used by `select`/`_newselect` (spec.md §4.2, §5).
pub fn fdset_read(mem: &dyn GuestMemory, addr: u32, nfds: i32) -> Result<Vec<bool>, Errno> {
    let nwords = ((nfds.max(0) as usize) + 31) / 32;
    let mut bits = vec![false; nfds.max(0) as usize];
    for w in 0..nwords {
        let word = mem.read_u32(addr + (w * 4) as u32).map_err(|_| Errno::EFAULT)?;
        for b in 0..32 {
            let fd = w * 32 + b;
            if fd < bits.len() {
                bits[fd] = (word >> b) & 1 != 0;
            }
        }
    }
    Ok(bits)
}

pub fn fdset_write(mem: &mut dyn GuestMemory, addr: u32, bits: &[bool]) -> Result<(), Errno> {
    let nwords = (bits.len() + 31) / 32;
    for w in 0..nwords {
        let mut word = 0u32;
        for b in 0..32 {
            let fd = w * 32 + b;
            if fd < bits.len() && bits[fd] {
                word |= 1 << b;
            }
        }
        mem.write_u32(addr + (w * 4) as u32, word).map_err(|_| Errno::EFAULT)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Perm, SimGuestMemory};

    #[test]
    fn relative_path_resolves_against_cwd() {
        assert_eq!(resolve_path("/home/user", "foo.txt", 4096).unwrap(), "/home/user/foo.txt");
    }

    #[test]
    fn absolute_path_passes_through() {
        assert_eq!(resolve_path("/home/user", "/etc/passwd", 4096).unwrap(), "/etc/passwd");
    }

    #[test]
    fn overlong_path_is_erange() {
        let long = "a".repeat(10);
        assert_eq!(resolve_path("/", &long, 5), Err(Errno::ERANGE));
    }

    #[test]
    fn fdset_roundtrip() {
        let mut mem = SimGuestMemory::new();
        mem.map(0x3000, 0x1000, Perm::READ | Perm::WRITE, None).unwrap();
        fdset_write(&mut mem, 0x3000, &[true, false, true, false, true]).unwrap();
        let bits = fdset_read(&mem, 0x3000, 5).unwrap();
        assert_eq!(bits, vec![true, false, true, false, true]);
    }
}
