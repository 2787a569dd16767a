//! Architecture-independent page directory.
//!
//! This module provides the `PageDirectory` type, the reference [`PhysicalMap`]: it records
//! one entry per mapped page, encoded with the active architecture's page flags. The
//! software-emulated kernel and the test suite run on it directly.

use alloc::collections::BTreeMap;

use crate::{
    MapFlags, PhysicalAddress, PhysicalMap, Protection, Result, Translation, VirtualAddress,
    arch::{self, PageFlags},
};

/// A single leaf entry: the mapped frame and its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageEntry {
    frame: PhysicalAddress,
    flags: PageFlags,
}

/// A page table manager keyed by virtual page number.
#[derive(Default)]
pub struct PageDirectory {
    entries: BTreeMap<usize, PageEntry>,
}

impl PageDirectory {
    /// Creates a page directory with no translations.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the number of pages with an installed translation.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no translation is installed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn page_number(vaddr: VirtualAddress) -> usize {
        vaddr.as_usize() / arch::PAGE_SIZE
    }
}

impl PhysicalMap for PageDirectory {
    /// # Panics
    ///
    /// Panics if either address is not page-aligned.
    fn install(
        &mut self,
        vaddr: VirtualAddress,
        paddr: PhysicalAddress,
        prot: Protection,
        flags: MapFlags,
    ) -> Result<()> {
        assert!(
            vaddr.is_page_aligned(),
            "virtual address must be page-aligned"
        );
        assert!(
            paddr.is_page_aligned(),
            "physical address must be page-aligned"
        );

        let entry = PageEntry {
            frame: paddr,
            flags: PageFlags::for_mapping(prot, flags),
        };
        self.entries.insert(Self::page_number(vaddr), entry);
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `vaddr` or `len` is not page-aligned.
    fn remove(&mut self, vaddr: VirtualAddress, len: usize) {
        assert!(
            vaddr.is_page_aligned(),
            "virtual address must be page-aligned"
        );
        assert!(len % arch::PAGE_SIZE == 0, "length must be page-aligned");

        let first = Self::page_number(vaddr);
        let end = first + len / arch::PAGE_SIZE;

        // Carve [first, end) out of the map in two splits instead of walking every page.
        let mut removed = self.entries.split_off(&first);
        let mut after = removed.split_off(&end);
        self.entries.append(&mut after);

        if !removed.is_empty() {
            log::trace!("removed {} translations at {}", removed.len(), vaddr);
        }
    }

    fn translate(&self, vaddr: VirtualAddress) -> Option<Translation> {
        let entry = self.entries.get(&Self::page_number(vaddr))?;
        if !entry.flags.is_present() {
            return None;
        }

        Some(Translation {
            address: entry.frame + vaddr.page_offset(),
            protection: entry.flags.protection(),
            flags: entry.flags.attributes(),
        })
    }
}
