//! Backing objects.
//!
//! A backing object supplies the physical pages behind a mapping: anonymous memory, a file
//! cache, or a device window. The address-space map only needs two things from it, the page
//! for a given offset and the attributes its translations must carry. Objects are shared
//! between mappings and address spaces through [`ObjectRef`]; cloning the `Arc` takes a
//! reference and dropping it releases one.

use alloc::sync::Arc;

use crate::{MapFlags, PhysicalAddress, arch};

/// A source of pages for mappings.
pub trait VmObject: Send + Sync {
    /// Returns the physical page backing the page-aligned `offset`.
    ///
    /// Returns `None` if the object cannot supply a page for this offset.
    fn resolve_page(&self, offset: usize) -> Option<PhysicalAddress>;

    /// Attributes every translation of this object must carry.
    fn map_flags(&self) -> MapFlags {
        MapFlags::empty()
    }
}

/// A counted reference to a backing object.
pub type ObjectRef = Arc<dyn VmObject>;

/// Returns true if `a` and `b` refer to the same object.
#[inline]
pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    core::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// A contiguous range of physical memory, typically device registers.
///
/// Offsets translate linearly onto the physical range and every translation is uncached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceObject {
    base: PhysicalAddress,
    size: usize,
}

impl DeviceObject {
    /// Creates a device object covering `[base, base + size)`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not page-aligned.
    pub const fn new(base: PhysicalAddress, size: usize) -> Self {
        assert!(base.is_page_aligned(), "device base must be page-aligned");
        Self { base, size }
    }

    /// Returns the physical base address.
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// Returns the size of the window in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }
}

impl VmObject for DeviceObject {
    fn resolve_page(&self, offset: usize) -> Option<PhysicalAddress> {
        debug_assert!(offset % arch::PAGE_SIZE == 0, "offset must be page-aligned");
        if offset >= self.size {
            return None;
        }
        self.base.checked_add(offset)
    }

    fn map_flags(&self) -> MapFlags {
        MapFlags::NO_CACHE
    }
}
