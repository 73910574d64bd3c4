//! Linux 2.6 32-bit x86 ABI surface: flag tables and packed wire structures.
//!
//! spec.md §9 calls for these as pure data (`decompose`/`lookup` over ordered
//! `(name, value)` pairs) and for byte-exact structure codecs that do not rely
//! on host struct layout. Both live here, split across `flags` and `structs`.

pub mod flags;
pub mod structs;

/// Compile-time assertions that host `PROT_*`/`MAP_*` constants the core
/// assumes match the guest ABI encoding, per spec.md §4.3 and §9 "Bit-exact ABI
/// compatibility checks". If these ever fail to hold on a host, `do_mmap`'s
/// flag translation is silently wrong rather than loudly wrong.
const _: () = {
    assert!(libc::PROT_READ == 0x1);
    assert!(libc::PROT_WRITE == 0x2);
    assert!(libc::PROT_EXEC == 0x4);
};
