//! Mapping records.
//!
//! A mapping is a contiguous virtual range `[start, end)` with one protection, bound to a
//! backing object starting at `offset`. The record holds a strong reference to its object for
//! as long as it exists; physical pages are materialized lazily by the fault path.

use core::fmt;
use core::ops::Range;

use crate::object::{ObjectRef, same_object};
use crate::{Protection, VirtualAddress};

/// A mapping record of an address space.
pub(crate) struct Mapping {
    start: VirtualAddress,
    end: VirtualAddress,
    prot: Protection,
    object: ObjectRef,
    offset: usize,
}

impl Mapping {
    /// Creates a record for `[start, end)`, taking ownership of one object reference.
    pub(crate) fn new(
        start: VirtualAddress,
        end: VirtualAddress,
        prot: Protection,
        object: ObjectRef,
        offset: usize,
    ) -> Self {
        debug_assert!(start < end, "mapping must not be empty");
        Self {
            start,
            end,
            prot,
            object,
            offset,
        }
    }

    pub(crate) fn start(&self) -> VirtualAddress {
        self.start
    }

    pub(crate) fn end(&self) -> VirtualAddress {
        self.end
    }

    pub(crate) fn size(&self) -> usize {
        self.end - self.start
    }

    pub(crate) fn protection(&self) -> Protection {
        self.prot
    }

    pub(crate) fn set_protection(&mut self, prot: Protection) {
        self.prot = prot;
    }

    pub(crate) fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    /// Returns true if `vaddr` falls inside this mapping.
    pub(crate) fn contains(&self, vaddr: VirtualAddress) -> bool {
        self.start <= vaddr && vaddr < self.end
    }

    /// Returns true if this mapping intersects `[start, end)`.
    pub(crate) fn overlaps(&self, start: VirtualAddress, end: VirtualAddress) -> bool {
        self.start < end && start < self.end
    }

    /// Returns the offset into the object that corresponds to `vaddr`.
    pub(crate) fn object_offset(&self, vaddr: VirtualAddress) -> usize {
        debug_assert!(self.contains(vaddr));
        self.offset + (vaddr - self.start)
    }

    /// Splits the mapping at `at`.
    ///
    /// `self` keeps `[start, at)` and the returned record covers `[at, end)`, sharing the
    /// object through a new reference.
    pub(crate) fn split_off(&mut self, at: VirtualAddress) -> Mapping {
        assert!(
            self.start < at && at < self.end,
            "split point must be strictly inside the mapping"
        );

        let tail = Mapping {
            start: at,
            end: self.end,
            prot: self.prot,
            object: self.object.clone(),
            offset: self.offset + (at - self.start),
        };
        self.end = at;
        tail
    }

    /// Drops the part of the mapping below `new_start`, advancing the object offset.
    pub(crate) fn trim_front(&mut self, new_start: VirtualAddress) {
        assert!(self.start < new_start && new_start < self.end);
        self.offset += new_start - self.start;
        self.start = new_start;
    }

    /// Drops the part of the mapping at and above `new_end`.
    pub(crate) fn trim_back(&mut self, new_end: VirtualAddress) {
        assert!(self.start < new_end && new_end < self.end);
        self.end = new_end;
    }

    /// Returns true if a record for `[start, end)` with the given object, offset and
    /// protection would continue this mapping without a seam.
    pub(crate) fn continues_into(
        &self,
        start: VirtualAddress,
        object: &ObjectRef,
        offset: usize,
        prot: Protection,
    ) -> bool {
        self.end == start
            && self.prot == prot
            && same_object(&self.object, object)
            && self.offset.checked_add(self.size()) == Some(offset)
    }

    /// Extends the mapping up to `new_end`.
    pub(crate) fn extend_to(&mut self, new_end: VirtualAddress) {
        debug_assert!(new_end > self.end);
        self.end = new_end;
    }

    /// Extends the mapping down to `new_start`, moving the object offset back with it.
    pub(crate) fn extend_down_to(&mut self, new_start: VirtualAddress) {
        debug_assert!(new_start < self.start);
        self.offset -= self.start - new_start;
        self.start = new_start;
    }

    pub(crate) fn info(&self) -> MappingInfo {
        MappingInfo {
            start: self.start,
            end: self.end,
            protection: self.prot,
            offset: self.offset,
        }
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("prot", &self.prot)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

/// A snapshot of one mapping, as returned by [`AddressSpace::mappings`](crate::AddressSpace::mappings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingInfo {
    /// First address of the mapping.
    pub start: VirtualAddress,
    /// End (exclusive) of the mapping.
    pub end: VirtualAddress,
    /// Access rights.
    pub protection: Protection,
    /// Offset into the backing object at `start`.
    pub offset: usize,
}

impl MappingInfo {
    /// Returns the mapped range.
    pub fn range(&self) -> Range<VirtualAddress> {
        self.start..self.end
    }

    /// Returns the size of the mapping in bytes.
    pub fn size(&self) -> usize {
        self.end - self.start
    }
}
