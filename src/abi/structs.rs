//! Packed 32-bit Linux ABI structures (spec.md §6).
//!
//! Every structure here is encoded/decoded by hand at fixed byte offsets
//! rather than derived from a `#[repr(C)]` struct, per spec.md §9: host
//! alignment and padding must never leak into the guest-visible layout.

fn put_u32(buf: &mut [u8], off: usize, v: u32) {
    buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
}
fn put_u64(buf: &mut [u8], off: usize, v: u64) {
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}
fn put_u16(buf: &mut [u8], off: usize, v: u16) {
    buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
}
fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}
fn get_u64(buf: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}
fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes(buf[off..off + 2].try_into().unwrap())
}

/// `struct stat64` as the 32-bit Linux ABI lays it out (spec.md §6): 96 bytes.
#[derive(Debug, Clone, Default)]
pub struct SimStat64 {
    pub dev: u64,
    pub ino_legacy: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u32,
    pub blocks: u64,
    pub atime: u32,
    pub atime_nsec: u32,
    pub mtime: u32,
    pub mtime_nsec: u32,
    pub ctime: u32,
    pub ctime_nsec: u32,
    pub ino: u64,
}

impl SimStat64 {
    pub const SIZE: usize = 96;

    pub fn from_host(st: &libc::stat) -> Self {
        Self {
            dev: st.st_dev as u64,
            ino_legacy: st.st_ino as u32,
            mode: st.st_mode as u32,
            nlink: st.st_nlink as u32,
            uid: st.st_uid,
            gid: st.st_gid,
            rdev: st.st_rdev as u64,
            size: st.st_size as u64,
            blksize: st.st_blksize as u32,
            blocks: st.st_blocks as u64,
            atime: st.st_atime as u32,
            atime_nsec: st.st_atime_nsec as u32,
            mtime: st.st_mtime as u32,
            mtime_nsec: st.st_mtime_nsec as u32,
            ctime: st.st_ctime as u32,
            ctime_nsec: st.st_ctime_nsec as u32,
            ino: st.st_ino as u64,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut b = [0u8; Self::SIZE];
        put_u64(&mut b, 0, self.dev);
        // pad1 at 8..12
        put_u32(&mut b, 12, self.ino_legacy);
        put_u32(&mut b, 16, self.mode);
        put_u32(&mut b, 20, self.nlink);
        put_u32(&mut b, 24, self.uid);
        put_u32(&mut b, 28, self.gid);
        put_u64(&mut b, 32, self.rdev);
        // pad2 at 40..44
        put_u64(&mut b, 44, self.size);
        put_u32(&mut b, 52, self.blksize);
        put_u64(&mut b, 56, self.blocks);
        put_u32(&mut b, 64, self.atime);
        put_u32(&mut b, 68, self.atime_nsec);
        put_u32(&mut b, 72, self.mtime);
        put_u32(&mut b, 76, self.mtime_nsec);
        put_u32(&mut b, 80, self.ctime);
        put_u32(&mut b, 84, self.ctime_nsec);
        put_u64(&mut b, 88, self.ino);
        b
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimTimeval {
    pub tv_sec: u32,
    pub tv_usec: u32,
}

impl SimTimeval {
    pub const SIZE: usize = 8;

    pub fn encode(&self) -> [u8; 8] {
        let mut b = [0u8; 8];
        put_u32(&mut b, 0, self.tv_sec);
        put_u32(&mut b, 4, self.tv_usec);
        b
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self { tv_sec: get_u32(buf, 0), tv_usec: get_u32(buf, 4) }
    }

    pub fn from_micros(us: u64) -> Self {
        Self { tv_sec: (us / 1_000_000) as u32, tv_usec: (us % 1_000_000) as u32 }
    }

    pub fn to_micros(&self) -> u64 {
        self.tv_sec as u64 * 1_000_000 + self.tv_usec as u64
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimItimerval {
    pub interval: SimTimeval,
    pub value: SimTimeval,
}

impl SimItimerval {
    pub const SIZE: usize = 16;

    pub fn encode(&self) -> [u8; 16] {
        let mut b = [0u8; 16];
        b[0..8].copy_from_slice(&self.interval.encode());
        b[8..16].copy_from_slice(&self.value.encode());
        b
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self { interval: SimTimeval::decode(&buf[0..8]), value: SimTimeval::decode(&buf[8..16]) }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimTms {
    pub utime: u32,
    pub stime: u32,
    pub cutime: u32,
    pub cstime: u32,
}

impl SimTms {
    pub const SIZE: usize = 16;

    pub fn encode(&self) -> [u8; 16] {
        let mut b = [0u8; 16];
        put_u32(&mut b, 0, self.utime);
        put_u32(&mut b, 4, self.stime);
        put_u32(&mut b, 8, self.cutime);
        put_u32(&mut b, 12, self.cstime);
        b
    }
}

/// 18 `u32` fields (spec.md §6): only the handful glibc callers actually read
/// (`ru_utime`, `ru_stime`) carry real data; the rest stay zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimRusage {
    pub utime: SimTimeval,
    pub stime: SimTimeval,
    pub rest: [u32; 14],
}

impl SimRusage {
    pub const SIZE: usize = 72;

    pub fn encode(&self) -> [u8; 72] {
        let mut b = [0u8; 72];
        b[0..8].copy_from_slice(&self.utime.encode());
        b[8..16].copy_from_slice(&self.stime.encode());
        for (i, v) in self.rest.iter().enumerate() {
            put_u32(&mut b, 16 + i * 4, *v);
        }
        b
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimRlimit {
    pub cur: u32,
    pub max: u32,
}

impl SimRlimit {
    pub const SIZE: usize = 8;

    pub fn encode(&self) -> [u8; 8] {
        let mut b = [0u8; 8];
        put_u32(&mut b, 0, self.cur);
        put_u32(&mut b, 4, self.max);
        b
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self { cur: get_u32(buf, 0), max: get_u32(buf, 4) }
    }
}

fn encode_fixed_str(buf: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(buf.len() - 1);
    buf[..n].copy_from_slice(&bytes[..n]);
}

/// 6 fields x 65 bytes = 390 (spec.md §6). Defaults match what a multi2sim-era
/// emulator advertises so glibc's `uname` path doesn't special-case us.
#[derive(Debug, Clone)]
pub struct SimUtsname {
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub domainname: String,
}

impl Default for SimUtsname {
    fn default() -> Self {
        Self {
            sysname: "Linux".into(),
            nodename: "multi2sim".into(),
            release: "2.6.18-6-686".into(),
            version: "#1 SMP m2s-syscall build".into(),
            machine: "i686".into(),
            domainname: "".into(),
        }
    }
}

impl SimUtsname {
    pub const FIELD_SIZE: usize = 65;
    pub const SIZE: usize = Self::FIELD_SIZE * 6;

    pub fn encode(&self) -> Vec<u8> {
        let mut b = vec![0u8; Self::SIZE];
        for (i, field) in [&self.sysname, &self.nodename, &self.release, &self.version, &self.machine, &self.domainname]
            .iter()
            .enumerate()
        {
            encode_fixed_str(&mut b[i * Self::FIELD_SIZE..(i + 1) * Self::FIELD_SIZE], field);
        }
        b
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimUtimbuf {
    pub actime: u32,
    pub modtime: u32,
}

impl SimUtimbuf {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &[u8]) -> Self {
        Self { actime: get_u32(buf, 0), modtime: get_u32(buf, 4) }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimPollfd {
    pub fd: i32,
    pub events: u16,
    pub revents: u16,
}

impl SimPollfd {
    pub const SIZE: usize = 8;

    pub fn encode(&self) -> [u8; 8] {
        let mut b = [0u8; 8];
        put_u32(&mut b, 0, self.fd as u32);
        put_u16(&mut b, 4, self.events);
        put_u16(&mut b, 6, self.revents);
        b
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self { fd: get_u32(buf, 0) as i32, events: get_u16(buf, 4), revents: get_u16(buf, 6) }
    }
}

/// `struct linux_dirent`, padded so each record is a multiple of 4 bytes and
/// carries the file type in the trailing byte (spec.md §4.2 `getdents`).
pub struct SimLinuxDirent {
    pub d_ino: u32,
    pub d_off: u32,
    pub name: Vec<u8>,
    pub file_type: u8,
}

impl SimLinuxDirent {
    pub fn encoded_len(&self) -> usize {
        // ino(4) off(4) reclen(2) name(n+1 incl NUL) type(1), padded to 4.
        let raw = 4 + 4 + 2 + self.name.len() + 1 + 1;
        (raw + 3) & !3
    }

    pub fn encode(&self) -> Vec<u8> {
        let reclen = self.encoded_len();
        let mut b = vec![0u8; reclen];
        put_u32(&mut b, 0, self.d_ino);
        put_u32(&mut b, 4, self.d_off);
        put_u16(&mut b, 8, reclen as u16);
        let name_off = 10;
        b[name_off..name_off + self.name.len()].copy_from_slice(&self.name);
        b[reclen - 1] = self.file_type;
        b
    }
}

/// `struct linux_dirent64`, padded to a multiple of 8 (spec.md §4.2
/// `getdents64`).
pub struct SimLinuxDirent64 {
    pub d_ino: u64,
    pub d_off: u64,
    pub name: Vec<u8>,
    pub file_type: u8,
}

impl SimLinuxDirent64 {
    pub fn encoded_len(&self) -> usize {
        let raw = 8 + 8 + 2 + 1 + self.name.len() + 1;
        (raw + 7) & !7
    }

    pub fn encode(&self) -> Vec<u8> {
        let reclen = self.encoded_len();
        let mut b = vec![0u8; reclen];
        put_u64(&mut b, 0, self.d_ino);
        put_u64(&mut b, 8, self.d_off);
        put_u16(&mut b, 16, reclen as u16);
        b[18] = self.file_type;
        let name_off = 19;
        b[name_off..name_off + self.name.len()].copy_from_slice(&self.name);
        b
    }
}

/// `struct user_desc` used by `set_thread_area`/`clone(CLONE_SETTLS)`
/// (spec.md §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct SimUserDesc {
    pub entry_number: i32,
    pub base_addr: u32,
    pub limit: u32,
    pub seg_32bit: bool,
    pub contents: u8,
    pub read_exec_only: bool,
    pub limit_in_pages: bool,
    pub seg_not_present: bool,
    pub useable: bool,
}

impl SimUserDesc {
    pub const SIZE: usize = 16;

    pub fn decode(buf: &[u8]) -> Self {
        let entry_number = get_u32(buf, 0) as i32;
        let base_addr = get_u32(buf, 4);
        let limit = get_u32(buf, 8);
        let bits = get_u32(buf, 12);
        Self {
            entry_number,
            base_addr,
            limit,
            seg_32bit: bits & 1 != 0,
            contents: ((bits >> 1) & 0b11) as u8,
            read_exec_only: (bits >> 3) & 1 != 0,
            limit_in_pages: (bits >> 4) & 1 != 0,
            seg_not_present: (bits >> 5) & 1 != 0,
            useable: (bits >> 6) & 1 != 0,
        }
    }

    /// Resolved byte limit: `limit` is in 4 KiB pages when `limit_in_pages`.
    pub fn limit_bytes(&self) -> u32 {
        if self.limit_in_pages {
            self.limit.saturating_mul(crate::memory::PAGE_SIZE)
        } else {
            self.limit
        }
    }
}

/// `struct sigaction` as exchanged with the guest via `rt_sigaction`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimSigaction {
    pub handler_addr: u32,
    pub flags: u32,
    pub restorer: u32,
    pub mask: u64,
}

impl SimSigaction {
    pub const SIZE: usize = 20;

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            handler_addr: get_u32(buf, 0),
            flags: get_u32(buf, 4),
            restorer: get_u32(buf, 8),
            mask: get_u64(buf, 12),
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut b = [0u8; Self::SIZE];
        put_u32(&mut b, 0, self.handler_addr);
        put_u32(&mut b, 4, self.flags);
        put_u32(&mut b, 8, self.restorer);
        put_u64(&mut b, 12, self.mask);
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeval_micros_roundtrip() {
        let tv = SimTimeval::from_micros(1_500_250);
        assert_eq!(tv.tv_sec, 1);
        assert_eq!(tv.tv_usec, 500_250);
        assert_eq!(tv.to_micros(), 1_500_250);
    }

    #[test]
    fn stat64_is_96_bytes() {
        let st = SimStat64::default();
        assert_eq!(st.encode().len(), 96);
    }

    #[test]
    fn utsname_is_390_bytes_with_defaults() {
        let u = SimUtsname::default();
        let enc = u.encode();
        assert_eq!(enc.len(), 390);
        assert_eq!(&enc[0..5], b"Linux");
    }

    #[test]
    fn dirent64_padded_to_multiple_of_8() {
        let d = SimLinuxDirent64 { d_ino: 2, d_off: 0, name: b"foo".to_vec(), file_type: 4 };
        assert_eq!(d.encoded_len() % 8, 0);
    }

    #[test]
    fn dirent_padded_to_multiple_of_4() {
        let d = SimLinuxDirent { d_ino: 2, d_off: 0, name: b"bar".to_vec(), file_type: 4 };
        assert_eq!(d.encoded_len() % 4, 0);
    }

    #[test]
    fn user_desc_limit_in_pages_converts_to_bytes() {
        let buf_bits: u32 = 1 << 4; // limit_in_pages
        let mut raw = [0u8; 16];
        raw[0..4].copy_from_slice(&(-1i32).to_le_bytes());
        raw[4..8].copy_from_slice(&0xdeadc000u32.to_le_bytes());
        raw[8..12].copy_from_slice(&1u32.to_le_bytes());
        raw[12..16].copy_from_slice(&buf_bits.to_le_bytes());
        let d = SimUserDesc::decode(&raw);
        assert!(d.limit_in_pages);
        assert_eq!(d.limit_bytes(), 0x1000);
        assert_eq!(d.base_addr, 0xdeadc000);
    }

    #[test]
    fn sigaction_roundtrip() {
        let a = SimSigaction { handler_addr: 0x1000, flags: 4, restorer: 0x2000, mask: 0xff };
        let enc = a.encode();
        let dec = SimSigaction::decode(&enc);
        assert_eq!(dec.handler_addr, a.handler_addr);
        assert_eq!(dec.mask, a.mask);
    }
}
