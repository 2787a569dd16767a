//! Page table entry flags for x86_64 architecture.

use x86_64::structures::paging::PageTableFlags;

use crate::{MapFlags, Protection};

/// Page table entry flags for x86_64.
///
/// This wraps the x86_64 crate's page table entry flags and translates between them and the
/// architecture-independent [`Protection`] and [`MapFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFlags(PageTableFlags);

impl Default for PageFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl PageFlags {
    /// Creates empty page flags (page not present).
    pub const fn empty() -> Self {
        Self(PageTableFlags::empty())
    }

    /// Builds the leaf flags for a translation with the given protection and attributes.
    pub fn for_mapping(prot: Protection, attributes: MapFlags) -> Self {
        let mut flags = PageTableFlags::PRESENT;
        flags.set(PageTableFlags::WRITABLE, prot.contains(Protection::WRITE));
        flags.set(
            PageTableFlags::NO_EXECUTE,
            !prot.contains(Protection::EXECUTE),
        );
        flags.set(
            PageTableFlags::USER_ACCESSIBLE,
            attributes.contains(MapFlags::USER),
        );
        if attributes.contains(MapFlags::NO_CACHE) {
            flags |= PageTableFlags::NO_CACHE | PageTableFlags::WRITE_THROUGH;
        }
        Self(flags)
    }

    /// Returns whether the present bit is set.
    pub fn is_present(self) -> bool {
        self.0.contains(PageTableFlags::PRESENT)
    }

    /// Returns the access rights these flags grant.
    pub fn protection(self) -> Protection {
        if !self.is_present() {
            return Protection::empty();
        }

        let mut prot = Protection::READ;
        prot.set(Protection::WRITE, self.0.contains(PageTableFlags::WRITABLE));
        prot.set(
            Protection::EXECUTE,
            !self.0.contains(PageTableFlags::NO_EXECUTE),
        );
        prot
    }

    /// Returns the mapping attributes encoded in these flags.
    pub fn attributes(self) -> MapFlags {
        let mut attributes = MapFlags::empty();
        attributes.set(
            MapFlags::USER,
            self.0.contains(PageTableFlags::USER_ACCESSIBLE),
        );
        attributes.set(
            MapFlags::NO_CACHE,
            self.0.contains(PageTableFlags::NO_CACHE),
        );
        attributes
    }
}
