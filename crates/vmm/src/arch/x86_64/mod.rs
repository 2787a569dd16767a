//! x86_64 architecture-specific implementation.
//!
//! This module provides the hardware constants for x86_64 with 4-level paging: address
//! validation, the user/kernel layout and the encoding of page table flags.

mod flags;

pub use flags::PageFlags;

/// Maximum number of bits in a physical address on x86_64.
/// This is typically 52 bits on modern CPUs, but we use 48 as a conservative default.
pub const MAX_PHYSICAL_BITS: usize = 48;

/// Default page size in bytes (4 KiB).
pub const PAGE_SIZE: usize = 4096;

/// First usable user address. The zero page is never mapped.
pub const USER_SPACE_START: usize = PAGE_SIZE;

/// End (exclusive) of the lower canonical half, minus a guard page.
pub const USER_SPACE_END: usize = 0x0000_7FFF_FFFF_F000;

/// First kernel address in the higher half.
pub const KERNEL_SPACE_START: usize = 0xFFFF_8000_0000_0000;

/// End (exclusive) of the kernel half, minus a guard page.
pub const KERNEL_SPACE_END: usize = 0xFFFF_FFFF_FFFF_F000;

/// Validates a physical address for x86_64.
///
/// Physical addresses must not exceed the maximum physical address width.
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    let max_addr = (1usize << MAX_PHYSICAL_BITS) - 1;
    addr <= max_addr
}

/// Validates a virtual address for x86_64.
///
/// Virtual addresses must be canonical (bits 47-63 must be sign-extended from bit 47).
#[inline]
pub const fn validate_virtual(addr: usize) -> bool {
    canonicalize_virtual(addr) == addr
}

/// Canonicalizes a virtual address for x86_64.
///
/// This sign-extends bit 47 to bits 48-63.
#[inline]
pub const fn canonicalize_virtual(addr: usize) -> usize {
    if (addr & (1 << 47)) != 0 {
        addr | 0xFFFF_0000_0000_0000
    } else {
        addr & 0x0000_FFFF_FFFF_FFFF
    }
}
