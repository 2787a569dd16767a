//! Interface to the physical-mapping layer.
//!
//! The physical-mapping layer turns virtual-to-physical bindings into whatever the hardware
//! walks. An [`AddressSpace`](crate::AddressSpace) owns exactly one implementation and only
//! mutates it while holding exclusive access to the map.

use crate::{MapFlags, PhysicalAddress, Protection, Result, VirtualAddress};

/// An installed translation for a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    /// The physical address the queried virtual address translates to.
    pub address: PhysicalAddress,
    /// The access rights of the translation.
    pub protection: Protection,
    /// Additional attributes of the translation.
    pub flags: MapFlags,
}

/// The page-table side of an address space.
pub trait PhysicalMap: Send + Sync {
    /// Maps the page at `vaddr` to the frame at `paddr`, replacing any previous translation.
    ///
    /// Both addresses must be page-aligned.
    fn install(
        &mut self,
        vaddr: VirtualAddress,
        paddr: PhysicalAddress,
        prot: Protection,
        flags: MapFlags,
    ) -> Result<()>;

    /// Removes every translation in `[vaddr, vaddr + len)`.
    ///
    /// `vaddr` and `len` must be page-aligned. Pages without a translation are skipped.
    fn remove(&mut self, vaddr: VirtualAddress, len: usize);

    /// Returns the translation of `vaddr`, if one is installed.
    fn translate(&self, vaddr: VirtualAddress) -> Option<Translation>;
}
