//! Software emulation of the architecture layer for testing and development.
//!
//! The software-emulated architecture is a "scale model" of x86_64:
//! - 16-bit addresses (vs 48-bit on x86_64)
//! - 4-bit page offset (16-byte pages, vs 12-bit/4KB on x86_64)
//! - the lower half (`0x0000..0x8000`) belongs to user space, the sign-extended upper half
//!   to the kernel
//!
//! Small pages keep address-space tests cheap while still exercising every alignment and
//! boundary rule of the real layout.

mod flags;

pub use flags::PageFlags;

/// Maximum number of bits in a physical address for software emulation.
pub const MAX_PHYSICAL_BITS: usize = 16;

/// Page size in bytes (16 bytes = 2^4).
pub const PAGE_SIZE: usize = 16;

/// First usable user address. Page zero stays unmapped to catch null dereferences.
pub const USER_SPACE_START: usize = PAGE_SIZE;

/// End (exclusive) of the user half. The last page is left out so the bound stays canonical.
pub const USER_SPACE_END: usize = 0x8000 - PAGE_SIZE;

/// First kernel address (sign-extended bit 15).
pub const KERNEL_SPACE_START: usize = 0xFFFF_FFFF_FFFF_8000;

/// End (exclusive) of the kernel half.
pub const KERNEL_SPACE_END: usize = 0xFFFF_FFFF_FFFF_FFF0;

/// Validates a physical address for software emulation.
///
/// Physical addresses must fit within 16 bits.
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    addr <= 0xFFFF
}

/// Validates a virtual address for software emulation.
///
/// Virtual addresses must be canonical (bits 16-63 must be sign-extended from bit 15).
#[inline]
pub const fn validate_virtual(addr: usize) -> bool {
    canonicalize_virtual(addr) == addr
}

/// Canonicalizes a virtual address for software emulation.
///
/// This sign-extends bit 15 to bits 16-63.
#[inline]
pub const fn canonicalize_virtual(addr: usize) -> usize {
    if (addr & 0x8000) != 0 {
        addr | 0xFFFF_FFFF_FFFF_0000
    } else {
        addr & 0xFFFF
    }
}
