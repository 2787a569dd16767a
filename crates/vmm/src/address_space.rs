//! Address space management.
//!
//! An [`AddressSpace`] is the architecture-independent description of a virtual address
//! space, belonging to the kernel or to a process. It owns an ordered, non-overlapping set of
//! mapping records over a bounded range `[vmin, vmax)` and the physical map that backs it,
//! and it resolves faulting addresses into (object, offset, protection) triples.
//!
//! # Locking
//!
//! The mapping list, the mapped size and the physical map sit behind one `spin::RwLock`.
//! Lookups take it shared; every mutation takes it exclusively for its whole duration, so a
//! lookup never observes a half-applied split. Re-entering the same address space from a
//! thread that already holds its lock deadlocks. Callers that need two address spaces at
//! once must lock the one at the lower address first.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use crate::list::{List, NodeId};
use crate::mapping::{Mapping, MappingInfo};
use crate::object::{ObjectRef, same_object};
use crate::{
    FaultType, MapFlags, PageDirectory, PhysicalAddress, PhysicalMap, Protection, Result,
    Translation, VirtualAddress, VmError, arch::PAGE_SIZE,
};

/// The outcome of a successful [`AddressSpace::lookup`].
#[derive(Clone)]
pub struct Resolution {
    /// The backing object of the mapping. The caller holds its own reference.
    pub object: ObjectRef,
    /// Offset into the object corresponding to the looked-up address.
    pub offset: usize,
    /// Protection of the mapping.
    pub protection: Protection,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("offset", &self.offset)
            .field("protection", &self.protection)
            .finish_non_exhaustive()
    }
}

/// An address space is an architecture-independent representation of a virtual address space.
///
/// Address spaces are handed out as `Arc<AddressSpace>`: the `Arc` is the reference count,
/// [`AddressSpace::reference`] takes a reference and [`AddressSpace::destroy`] drops one.
/// When the last reference goes away every mapping is released and the physical map is
/// disposed.
pub struct AddressSpace<P: PhysicalMap = PageDirectory> {
    start: VirtualAddress,
    end: VirtualAddress,
    inner: spin::RwLock<Inner<P>>,
}

struct Inner<P> {
    /// Mapping records sorted by start address.
    mappings: List<Mapping>,
    /// Sum of the sizes of all mappings.
    size: usize,
    pmap: P,
}

impl<P: PhysicalMap> AddressSpace<P> {
    /// Creates an empty address space over `[vmin, vmax)` backed by `pmap`.
    ///
    /// Fails with [`VmError::InvalidArgument`] if the range is empty, not page-aligned or
    /// spans the non-canonical hole between the two halves.
    pub fn create(pmap: P, vmin: VirtualAddress, vmax: VirtualAddress) -> Result<Arc<Self>> {
        if vmin >= vmax || !vmin.is_page_aligned() || !vmax.is_page_aligned() {
            return Err(VmError::InvalidArgument);
        }
        let last = VirtualAddress::try_new(vmax.as_usize() - 1);
        if !last.is_some_and(|last| last.is_higher_half() == vmin.is_higher_half()) {
            return Err(VmError::InvalidArgument);
        }

        log::debug!("created address space [{}, {})", vmin, vmax);
        Ok(Arc::new(Self {
            start: vmin,
            end: vmax,
            inner: spin::RwLock::new(Inner {
                mappings: List::new(),
                size: 0,
                pmap,
            }),
        }))
    }

    /// Takes another reference to the address space.
    pub fn reference(this: &Arc<Self>) -> Arc<Self> {
        Arc::clone(this)
    }

    /// Drops a reference to the address space.
    ///
    /// Returns true if this was the last reference and the address space was torn down.
    pub fn destroy(this: Arc<Self>) -> bool {
        Arc::into_inner(this).is_some()
    }

    /// Returns the range of addresses this address space may map.
    pub fn bounds(&self) -> Range<VirtualAddress> {
        self.start..self.end
    }

    /// Returns the total size of all mappings in bytes.
    pub fn size(&self) -> usize {
        self.inner.read().size
    }

    /// Returns the number of mapping records.
    pub fn mapping_count(&self) -> usize {
        self.inner.read().mappings.len()
    }

    /// Returns true if `vaddr` is covered by a mapping.
    pub fn contains(&self, vaddr: VirtualAddress) -> bool {
        self.inner.read().find(vaddr).is_some()
    }

    /// Returns a snapshot of all mappings in address order.
    pub fn mappings(&self) -> Vec<MappingInfo> {
        let inner = self.inner.read();
        inner.mappings.iter().map(|(_, m)| m.info()).collect()
    }

    /// Returns the translation the physical map currently holds for `vaddr`.
    pub fn translate(&self, vaddr: VirtualAddress) -> Option<Translation> {
        self.inner.read().pmap.translate(vaddr)
    }

    /// Maps `size` bytes of `object`, starting at `offset`, at exactly `vaddr`.
    ///
    /// `vaddr`, `size` and `offset` must be page-aligned and the range must lie inside the
    /// address space. Fails with [`VmError::Overlap`] without changing anything if the range
    /// collides with an existing mapping.
    pub fn enter_at(
        &self,
        vaddr: VirtualAddress,
        size: usize,
        object: &ObjectRef,
        offset: usize,
        prot: Protection,
    ) -> Result<()> {
        let end = self.check_range(vaddr, size)?;
        check_offset(offset, size)?;

        let mut inner = self.inner.write();
        inner
            .insert(vaddr, end, object, offset, prot)
            .inspect_err(|e| log::warn!("enter at {} ({:#x} bytes) failed: {}", vaddr, size, e))?;

        log::debug!(
            "entered [{}, {}) {:?} at offset {:#x}",
            vaddr,
            end,
            prot,
            offset
        );
        Ok(())
    }

    /// Maps `size` bytes of `object`, starting at `offset`, at the first free range that fits.
    ///
    /// Returns the chosen address, or [`VmError::OutOfSpace`] if no gap is large enough.
    pub fn enter(
        &self,
        size: usize,
        object: &ObjectRef,
        offset: usize,
        prot: Protection,
    ) -> Result<VirtualAddress> {
        if size == 0 || size % PAGE_SIZE != 0 {
            return Err(VmError::InvalidArgument);
        }
        check_offset(offset, size)?;

        let mut inner = self.inner.write();
        let vaddr = inner
            .find_gap(self.start, self.end, size)
            .ok_or(VmError::OutOfSpace)?;
        let end = vaddr + size;
        inner.insert(vaddr, end, object, offset, prot)?;

        log::debug!(
            "entered [{}, {}) {:?} at offset {:#x}",
            vaddr,
            end,
            prot,
            offset
        );
        Ok(vaddr)
    }

    /// Unmaps `[start, end)`.
    ///
    /// Mappings partially covered are trimmed, a mapping strictly containing the range is
    /// split in two. Live translations in the range are removed from the physical map.
    /// Removing a range with no mappings succeeds.
    pub fn remove(&self, start: VirtualAddress, end: VirtualAddress) -> Result<()> {
        self.check_bounds(start, end)?;

        let mut inner = self.inner.write();
        // A split inserts at most one record.
        inner
            .mappings
            .try_reserve(1)
            .map_err(|_| VmError::ResourceExhausted)?;
        let removed = inner.unmap(start, end);

        log::debug!(
            "removed [{}, {}): {:#x} bytes unmapped",
            start,
            end,
            removed
        );
        Ok(())
    }

    /// Changes the protection of `[start, end)` to `prot`.
    ///
    /// The whole range must be covered by mappings, otherwise the call fails with
    /// [`VmError::NoMapping`] and nothing changes. Mappings crossing the range boundaries are
    /// split. When the new protection takes rights away, live translations of the affected
    /// pages are removed so the next access faults and re-resolves; widening is picked up
    /// lazily by the next fault.
    pub fn protect(
        &self,
        start: VirtualAddress,
        end: VirtualAddress,
        prot: Protection,
    ) -> Result<()> {
        self.check_bounds(start, end)?;

        let mut inner = self.inner.write();
        if !inner.covers(start, end) {
            log::warn!(
                "protect [{}, {}) on a range that is not fully mapped",
                start,
                end
            );
            return Err(VmError::NoMapping);
        }
        // One split at each boundary.
        inner
            .mappings
            .try_reserve(2)
            .map_err(|_| VmError::ResourceExhausted)?;
        inner.reprotect(start, end, prot);

        log::debug!("protected [{}, {}) as {:?}", start, end, prot);
        Ok(())
    }

    /// Resolves `vaddr` for an access of kind `fault`.
    ///
    /// Returns the backing object, the offset within it that corresponds to `vaddr` and the
    /// mapping's protection.
    pub fn lookup(&self, vaddr: VirtualAddress, fault: FaultType) -> Result<Resolution> {
        let inner = self.inner.read();
        let mapping = inner.find(vaddr).ok_or(VmError::NoMapping)?;
        if !mapping.protection().permits(fault) {
            return Err(VmError::ProtectionViolation);
        }

        Ok(Resolution {
            object: mapping.object().clone(),
            offset: mapping.object_offset(vaddr),
            protection: mapping.protection(),
        })
    }

    /// Handles a page fault at `vaddr`.
    ///
    /// Looks the address up, asks the backing object for the page and installs the
    /// translation with the mapping's protection. The object is consulted without holding
    /// the address space lock; if the mapping changed in the meantime the fault starts over.
    /// Returns the physical address `vaddr` now translates to.
    pub fn fault(&self, vaddr: VirtualAddress, fault: FaultType) -> Result<PhysicalAddress> {
        let page = vaddr.align_down(PAGE_SIZE);

        loop {
            let resolution = self.lookup(page, fault)?;
            let frame = resolution
                .object
                .resolve_page(resolution.offset)
                .ok_or(VmError::ResourceExhausted)?;

            let mut inner = self.inner.write();
            let unchanged = inner.find(page).is_some_and(|m| {
                same_object(m.object(), &resolution.object)
                    && m.object_offset(page) == resolution.offset
                    && m.protection() == resolution.protection
            });
            if !unchanged {
                drop(inner);
                log::trace!("mapping at {} changed while faulting, retrying", page);
                continue;
            }

            let mut flags = resolution.object.map_flags();
            if page.is_user() {
                flags |= MapFlags::USER;
            }
            inner
                .pmap
                .install(page, frame, resolution.protection, flags)?;

            log::trace!("{:?} fault at {} resolved to {}", fault, vaddr, frame);
            return Ok(frame + vaddr.page_offset());
        }
    }

    /// Installs translations for every page of `[start, end)` up front.
    ///
    /// The range must be fully mapped and readable. Used for ranges that must never fault,
    /// such as device windows set up at boot.
    pub fn populate(&self, start: VirtualAddress, end: VirtualAddress) -> Result<()> {
        self.check_bounds(start, end)?;
        if !self.inner.read().covers(start, end) {
            return Err(VmError::NoMapping);
        }

        let mut page = start;
        while page < end {
            self.fault(page, FaultType::Read)?;
            page = page + PAGE_SIZE;
        }
        Ok(())
    }

    /// Validates `[start, start + size)` against the alignment rules and the bounds, returning
    /// the end of the range.
    fn check_range(&self, start: VirtualAddress, size: usize) -> Result<VirtualAddress> {
        if size == 0 || size % PAGE_SIZE != 0 || !start.is_page_aligned() {
            return Err(VmError::InvalidArgument);
        }
        let end = start.checked_add(size).ok_or(VmError::InvalidArgument)?;
        if start < self.start || end > self.end {
            return Err(VmError::InvalidArgument);
        }
        Ok(end)
    }

    fn check_bounds(&self, start: VirtualAddress, end: VirtualAddress) -> Result<()> {
        if start >= end {
            return Err(VmError::InvalidArgument);
        }
        self.check_range(start, end - start).map(|_| ())
    }
}

fn check_offset(offset: usize, size: usize) -> Result<()> {
    if offset % PAGE_SIZE != 0 || offset.checked_add(size).is_none() {
        return Err(VmError::InvalidArgument);
    }
    Ok(())
}

impl<P: PhysicalMap> Inner<P> {
    /// Returns the mapping containing `vaddr`.
    fn find(&self, vaddr: VirtualAddress) -> Option<&Mapping> {
        self.mappings
            .iter()
            .map(|(_, m)| m)
            .take_while(|m| m.start() <= vaddr)
            .find(|m| m.contains(vaddr))
    }

    /// Returns the node after which a mapping for `[start, end)` belongs, or
    /// [`VmError::Overlap`] if the range collides with a mapping.
    fn predecessor(&self, start: VirtualAddress, end: VirtualAddress) -> Result<Option<NodeId>> {
        let mut prev = None;
        for (id, mapping) in self.mappings.iter() {
            if mapping.overlaps(start, end) {
                return Err(VmError::Overlap);
            }
            if mapping.start() >= end {
                break;
            }
            prev = Some(id);
        }
        Ok(prev)
    }

    /// First-fit search for `size` free bytes between `lo` and `hi`.
    fn find_gap(
        &self,
        lo: VirtualAddress,
        hi: VirtualAddress,
        size: usize,
    ) -> Option<VirtualAddress> {
        let mut cursor = lo;
        for (_, mapping) in self.mappings.iter() {
            if mapping.start() - cursor >= size {
                return Some(cursor);
            }
            cursor = mapping.end();
        }
        (hi - cursor >= size).then_some(cursor)
    }

    /// Returns true if every address of `[start, end)` is mapped.
    fn covers(&self, start: VirtualAddress, end: VirtualAddress) -> bool {
        let mut covered = start;
        for (_, mapping) in self.mappings.iter() {
            if mapping.end() <= covered {
                continue;
            }
            if mapping.start() > covered {
                return false;
            }
            covered = mapping.end();
            if covered >= end {
                return true;
            }
        }
        false
    }

    /// Links a record for `[start, end)` into the list, coalescing with a neighbor that it
    /// continues seamlessly.
    fn insert(
        &mut self,
        start: VirtualAddress,
        end: VirtualAddress,
        object: &ObjectRef,
        offset: usize,
        prot: Protection,
    ) -> Result<()> {
        let prev = self.predecessor(start, end)?;
        let next = match prev {
            Some(prev) => self.mappings.next(prev),
            None => self.mappings.first(),
        };

        let candidate = Mapping::new(start, end, prot, object.clone(), offset);
        let joins_prev =
            prev.is_some_and(|id| self.mappings[id].continues_into(start, object, offset, prot));
        let joins_next = next.is_some_and(|id| {
            let next = &self.mappings[id];
            candidate.continues_into(
                next.start(),
                next.object(),
                next.offset(),
                next.protection(),
            )
        });

        match (prev, next) {
            (Some(prev), Some(next)) if joins_prev && joins_next => {
                let tail = self.mappings.remove(next);
                self.mappings[prev].extend_to(tail.end());
            }
            (Some(prev), _) if joins_prev => self.mappings[prev].extend_to(end),
            (_, Some(next)) if joins_next => self.mappings[next].extend_down_to(start),
            _ => {
                self.mappings
                    .try_reserve(1)
                    .map_err(|_| VmError::ResourceExhausted)?;
                self.mappings.insert_after(prev, candidate);
            }
        }

        self.size += end - start;
        Ok(())
    }

    /// Unmaps `[start, end)` and returns the number of bytes that were mapped there.
    ///
    /// The caller must have reserved room for one extra record.
    fn unmap(&mut self, start: VirtualAddress, end: VirtualAddress) -> usize {
        let mut removed = 0;
        let mut cursor = self.mappings.first();

        while let Some(id) = cursor {
            cursor = self.mappings.next(id);
            let mapping = &mut self.mappings[id];
            if mapping.end() <= start {
                continue;
            }
            if mapping.start() >= end {
                break;
            }

            removed += mapping.end().min(end) - mapping.start().max(start);
            match (mapping.start() < start, end < mapping.end()) {
                (false, false) => {
                    self.mappings.remove(id);
                }
                (false, true) => mapping.trim_front(end),
                (true, false) => mapping.trim_back(start),
                (true, true) => {
                    let mut tail = mapping.split_off(start);
                    tail.trim_front(end);
                    self.mappings.insert_after(Some(id), tail);
                    break;
                }
            }
        }

        if removed > 0 {
            self.size -= removed;
            self.pmap.remove(start, end - start);
        }
        removed
    }

    /// Sets the protection of the fully-mapped range `[start, end)`.
    ///
    /// The caller must have reserved room for two extra records.
    fn reprotect(&mut self, start: VirtualAddress, end: VirtualAddress, prot: Protection) {
        let mut cursor = self.mappings.first();

        while let Some(id) = cursor {
            let mapping = &mut self.mappings[id];
            if mapping.end() <= start {
                cursor = self.mappings.next(id);
                continue;
            }
            if mapping.start() >= end {
                break;
            }

            if mapping.start() < start {
                // Leave the head alone and continue with the part inside the range.
                let tail = mapping.split_off(start);
                cursor = Some(self.mappings.insert_after(Some(id), tail));
                continue;
            }
            if end < mapping.end() {
                let tail = mapping.split_off(end);
                self.mappings.insert_after(Some(id), tail);
            }

            let mapping = &mut self.mappings[id];
            let old = mapping.protection();
            mapping.set_protection(prot);
            if old.is_narrowed_by(prot) {
                self.pmap.remove(mapping.start(), mapping.size());
            }
            cursor = self.mappings.next(id);
        }
    }
}

impl<P: PhysicalMap> Drop for AddressSpace<P> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let count = inner.mappings.len();
        while let Some(first) = inner.mappings.first() {
            let mapping = inner.mappings.remove(first);
            inner.pmap.remove(mapping.start(), mapping.size());
        }
        inner.size = 0;

        log::debug!(
            "destroyed address space [{}, {}), released {} mappings",
            self.start,
            self.end,
            count
        );
    }
}
