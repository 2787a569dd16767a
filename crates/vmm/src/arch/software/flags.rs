//! Page table entry flags for software emulation.

use bitflags::bitflags;

use crate::{MapFlags, Protection};

bitflags! {
    /// Page table entry flags for software emulation.
    ///
    /// The bit layout mirrors the low bits of an x86_64 entry so that protection handling
    /// behaves the same under test as on hardware: a present entry is always readable, write
    /// access needs `WRITABLE` and execution is allowed unless `NO_EXECUTE` is set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PageFlags: usize {
        /// Present bit.
        const PRESENT = 1 << 0;
        /// Writable bit.
        const WRITABLE = 1 << 1;
        /// User-accessible bit.
        const USER = 1 << 2;
        /// No-execute bit.
        const NO_EXECUTE = 1 << 3;
        /// Caching disabled (device memory).
        const NO_CACHE = 1 << 4;
    }
}

impl PageFlags {
    /// Builds the leaf flags for a translation with the given protection and attributes.
    pub fn for_mapping(prot: Protection, attributes: MapFlags) -> Self {
        let mut flags = Self::PRESENT;
        flags.set(Self::WRITABLE, prot.contains(Protection::WRITE));
        flags.set(Self::NO_EXECUTE, !prot.contains(Protection::EXECUTE));
        flags.set(Self::USER, attributes.contains(MapFlags::USER));
        flags.set(Self::NO_CACHE, attributes.contains(MapFlags::NO_CACHE));
        flags
    }

    /// Returns whether the present bit is set.
    pub fn is_present(self) -> bool {
        self.contains(Self::PRESENT)
    }

    /// Returns the access rights these flags grant.
    pub fn protection(self) -> Protection {
        if !self.is_present() {
            return Protection::empty();
        }

        let mut prot = Protection::READ;
        prot.set(Protection::WRITE, self.contains(Self::WRITABLE));
        prot.set(Protection::EXECUTE, !self.contains(Self::NO_EXECUTE));
        prot
    }

    /// Returns the mapping attributes encoded in these flags.
    pub fn attributes(self) -> MapFlags {
        let mut attributes = MapFlags::empty();
        attributes.set(MapFlags::USER, self.contains(Self::USER));
        attributes.set(MapFlags::NO_CACHE, self.contains(Self::NO_CACHE));
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_is_not_writable_or_executable() {
        let flags = PageFlags::for_mapping(Protection::READ, MapFlags::empty());
        assert!(flags.is_present());
        assert!(!flags.contains(PageFlags::WRITABLE));
        assert!(flags.contains(PageFlags::NO_EXECUTE));
        assert_eq!(flags.protection(), Protection::READ);
    }

    #[test]
    fn full_protection_round_trips() {
        let flags = PageFlags::for_mapping(Protection::all(), MapFlags::USER);
        assert_eq!(flags.protection(), Protection::all());
        assert_eq!(flags.attributes(), MapFlags::USER);
    }

    #[test]
    fn empty_flags_grant_nothing() {
        assert_eq!(PageFlags::empty().protection(), Protection::empty());
    }
}
