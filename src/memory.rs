//! Guest virtual memory contract.
//!
//! The instruction decoder/interpreter, the ELF loader and the page-table-backed
//! address space itself are external collaborators (spec.md §1) — this crate only
//! requires that *some* implementation exists that can read/write byte ranges,
//! map/unmap/protect pages, and search for free spans. [`GuestMemory`] is that
//! contract. [`SimGuestMemory`] is a page-map-backed implementation used by tests
//! and by the `m2sctl` demo binary in place of a real decoder-owned address space.

use std::collections::HashMap;

use thiserror::Error;

pub const PAGE_SIZE: u32 = 0x1000;
pub const PAGE_SHIFT: u32 = 12;

bitflags::bitflags! {
    /// Per-page permission bits (spec.md §3 "Guest memory").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perm: u8 {
        const INIT  = 0b0000;
        const READ  = 0b0001;
        const WRITE = 0b0010;
        const EXEC  = 0b0100;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemError {
    #[error("unmapped page at {0:#x}")]
    Unmapped(u32),
    #[error("permission fault at {addr:#x}: need {needed:?}, have {have:?}")]
    PermissionFault { addr: u32, needed: Perm, have: Perm },
    #[error("string exceeded cap of {0} bytes")]
    StringTooLong(usize),
    #[error("no free span of {len:#x} bytes found below hint {hint:#x}")]
    NoFreeSpan { hint: u32, len: u32 },
    #[error("address {0:#x} is not page-aligned")]
    Unaligned(u32),
}

/// A host pointer/fd pair backing a guest mapping, registered so that reads and
/// writes to a host-backed range can be satisfied directly against the host
/// mapping rather than a private copy (spec.md §4.3 `do_mmap`).
#[derive(Debug, Clone)]
pub struct MappedHost {
    pub host_fd: i32,
    pub file_offset: i64,
}

#[derive(Debug, Clone)]
struct Page {
    perm: Perm,
    data: Box<[u8; PAGE_SIZE as usize]>,
    backing: Option<MappedHost>,
}

impl Page {
    fn new(perm: Perm) -> Self {
        Self { perm, data: Box::new([0u8; PAGE_SIZE as usize]), backing: None }
    }
}

/// Contract required of a guest address space by the syscall core.
pub trait GuestMemory {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemError>;
    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), MemError>;

    /// Read a NUL-terminated string, failing if it exceeds `max` bytes
    /// (spec.md §6 path-length bound).
    fn read_string(&self, addr: u32, max: usize) -> Result<Vec<u8>, MemError>;
    fn write_string(&mut self, addr: u32, s: &[u8]) -> Result<(), MemError>;

    fn zero(&mut self, addr: u32, len: u32) -> Result<(), MemError>;
    fn copy(&mut self, dst: u32, src: u32, len: u32) -> Result<(), MemError>;

    fn map(&mut self, addr: u32, len: u32, perm: Perm, host_backed: Option<MappedHost>) -> Result<(), MemError>;
    fn unmap(&mut self, addr: u32, len: u32) -> Result<(), MemError>;
    fn protect(&mut self, addr: u32, len: u32, perm: Perm) -> Result<(), MemError>;

    /// Search for `len` free (unmapped) bytes at-or-below `hint`, scanning
    /// downward a page at a time (spec.md §4.3 mmap placement policy).
    fn find_free(&self, hint: u32, len: u32, search_down: bool) -> Option<u32>;

    fn permissions_at(&self, addr: u32) -> Option<Perm>;

    fn read_u32(&self, addr: u32) -> Result<u32, MemError> {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u32(&mut self, addr: u32, v: u32) -> Result<(), MemError> {
        self.write(addr, &v.to_le_bytes())
    }
}

/// Page-map backed guest address space, good enough to drive the core end to
/// end without a real decoder/loader attached.
#[derive(Debug, Default)]
pub struct SimGuestMemory {
    pages: HashMap<u32, Page>,
}

impl SimGuestMemory {
    pub fn new() -> Self {
        Self { pages: HashMap::new() }
    }

    fn page_of(addr: u32) -> u32 {
        addr & !(PAGE_SIZE - 1)
    }

    fn check_range(&self, addr: u32, len: u32, need: Perm) -> Result<(), MemError> {
        if len == 0 {
            return Ok(());
        }
        let mut a = Self::page_of(addr);
        let end = addr.saturating_add(len);
        while a < end {
            match self.pages.get(&a) {
                None => return Err(MemError::Unmapped(a)),
                Some(p) if !p.perm.contains(need) && need != Perm::INIT => {
                    return Err(MemError::PermissionFault { addr: a, needed: need, have: p.perm });
                }
                _ => {}
            }
            a = a.wrapping_add(PAGE_SIZE);
        }
        Ok(())
    }
}

impl GuestMemory for SimGuestMemory {
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemError> {
        self.check_range(addr, buf.len() as u32, Perm::READ)?;
        for (i, b) in buf.iter_mut().enumerate() {
            let a = addr.wrapping_add(i as u32);
            let page = self.pages.get(&Self::page_of(a)).ok_or(MemError::Unmapped(a))?;
            *b = page.data[(a & (PAGE_SIZE - 1)) as usize];
        }
        Ok(())
    }

    fn write(&mut self, addr: u32, buf: &[u8]) -> Result<(), MemError> {
        self.check_range(addr, buf.len() as u32, Perm::WRITE)?;
        for (i, &b) in buf.iter().enumerate() {
            let a = addr.wrapping_add(i as u32);
            let page = self.pages.get_mut(&Self::page_of(a)).ok_or(MemError::Unmapped(a))?;
            page.data[(a & (PAGE_SIZE - 1)) as usize] = b;
        }
        Ok(())
    }

    fn read_string(&self, addr: u32, max: usize) -> Result<Vec<u8>, MemError> {
        let mut out = Vec::new();
        let mut a = addr;
        loop {
            if out.len() >= max {
                return Err(MemError::StringTooLong(max));
            }
            let mut b = [0u8; 1];
            self.read(a, &mut b)?;
            if b[0] == 0 {
                break;
            }
            out.push(b[0]);
            a = a.wrapping_add(1);
        }
        Ok(out)
    }

    fn write_string(&mut self, addr: u32, s: &[u8]) -> Result<(), MemError> {
        self.write(addr, s)?;
        self.write(addr.wrapping_add(s.len() as u32), &[0u8])
    }

    fn zero(&mut self, addr: u32, len: u32) -> Result<(), MemError> {
        let zeros = vec![0u8; len as usize];
        self.write(addr, &zeros)
    }

    fn copy(&mut self, dst: u32, src: u32, len: u32) -> Result<(), MemError> {
        let mut buf = vec![0u8; len as usize];
        self.read(src, &mut buf)?;
        self.write(dst, &buf)
    }

    fn map(&mut self, addr: u32, len: u32, perm: Perm, host_backed: Option<MappedHost>) -> Result<(), MemError> {
        if addr & (PAGE_SIZE - 1) != 0 {
            return Err(MemError::Unaligned(addr));
        }
        let mut a = Self::page_of(addr);
        let end = addr.saturating_add(len);
        while a < end {
            let mut page = Page::new(perm);
            page.backing = host_backed.clone();
            self.pages.insert(a, page);
            a = a.wrapping_add(PAGE_SIZE);
        }
        Ok(())
    }

    fn unmap(&mut self, addr: u32, len: u32) -> Result<(), MemError> {
        let mut a = Self::page_of(addr);
        let end = addr.saturating_add(len);
        while a < end {
            self.pages.remove(&a);
            a = a.wrapping_add(PAGE_SIZE);
        }
        Ok(())
    }

    fn protect(&mut self, addr: u32, len: u32, perm: Perm) -> Result<(), MemError> {
        let mut a = Self::page_of(addr);
        let end = addr.saturating_add(len);
        while a < end {
            let page = self.pages.get_mut(&a).ok_or(MemError::Unmapped(a))?;
            page.perm = perm;
            a = a.wrapping_add(PAGE_SIZE);
        }
        Ok(())
    }

    fn find_free(&self, hint: u32, len: u32, search_down: bool) -> Option<u32> {
        let npages = (len + PAGE_SIZE - 1) / PAGE_SIZE;
        let step = PAGE_SIZE;
        let mut candidate = Self::page_of(hint);
        loop {
            let mut free = true;
            for i in 0..npages {
                if self.pages.contains_key(&candidate.wrapping_add(i * step)) {
                    free = false;
                    break;
                }
            }
            if free {
                return Some(candidate);
            }
            if search_down {
                if candidate < step * npages {
                    return None;
                }
                candidate -= step;
            } else {
                let (next, overflow) = candidate.overflowing_add(step);
                if overflow {
                    return None;
                }
                candidate = next;
            }
        }
    }

    fn permissions_at(&self, addr: u32) -> Option<Perm> {
        self.pages.get(&Self::page_of(addr)).map(|p| p.perm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_then_read_write_roundtrip() {
        let mut m = SimGuestMemory::new();
        m.map(0x1000, 0x1000, Perm::READ | Perm::WRITE, None).unwrap();
        m.write(0x1004, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        m.read(0x1004, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn unmapped_read_faults() {
        let m = SimGuestMemory::new();
        let mut buf = [0u8; 4];
        assert!(matches!(m.read(0x5000, &mut buf), Err(MemError::Unmapped(_))));
    }

    #[test]
    fn protect_enforces_permission() {
        let mut m = SimGuestMemory::new();
        m.map(0x2000, 0x1000, Perm::READ, None).unwrap();
        assert!(m.write(0x2000, &[9]).is_err());
        m.protect(0x2000, 0x1000, Perm::READ | Perm::WRITE).unwrap();
        assert!(m.write(0x2000, &[9]).is_ok());
    }

    #[test]
    fn find_free_searches_downward() {
        let mut m = SimGuestMemory::new();
        m.map(0xb7fb0000, 0x1000, Perm::READ, None).unwrap();
        let addr = m.find_free(0xb7fb0000, 0x1000, true).unwrap();
        assert_eq!(addr, 0xb7faf000);
    }

    #[test]
    fn brk_style_grow_then_shrink_leaves_permission_fault() {
        let mut m = SimGuestMemory::new();
        m.map(0x1000_0000, 0x2000, Perm::READ | Perm::WRITE, None).unwrap();
        m.unmap(0x1000_1000, 0x1000).unwrap();
        let mut buf = [0u8; 1];
        assert!(matches!(m.read(0x1000_1000, &mut buf), Err(MemError::Unmapped(_))));
    }
}
