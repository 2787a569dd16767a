//! Boot-time setup of the kernel address space.
//!
//! The kernel address space is created once, early during boot, over the upper half of the
//! virtual address space. Device windows the kernel needs before anything can fault (the
//! framebuffer, the local APIC) are mapped and wired in at the same time.

use alloc::sync::Arc;

use crate::{
    AddressSpace, DeviceObject, ObjectRef, PageDirectory, PhysicalAddress, Protection, Result,
    VirtualAddress, VmError, arch,
};

static KERNEL_SPACE: spin::Once<Arc<AddressSpace>> = spin::Once::new();

/// A range of device memory to map into the kernel address space at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceWindow {
    /// Where the window appears in the kernel address space.
    pub vaddr: VirtualAddress,
    /// Physical base of the device memory.
    pub base: PhysicalAddress,
    /// Size of the window in bytes.
    pub size: usize,
    /// Access rights of the window.
    pub prot: Protection,
}

/// Creates the kernel address space and maps `windows` into it.
///
/// Every window is backed by an uncached [`DeviceObject`] and has its translations
/// installed immediately. A window whose physical base is not page-aligned fails with
/// [`VmError::InvalidArgument`].
///
/// # Panics
///
/// Panics if the kernel address space has already been initialized.
pub fn init_kernel_space(
    pmap: PageDirectory,
    windows: &[DeviceWindow],
) -> Result<&'static Arc<AddressSpace>> {
    assert!(
        !KERNEL_SPACE.is_completed(),
        "kernel address space initialized twice"
    );

    let space = AddressSpace::create(
        pmap,
        VirtualAddress::new(arch::KERNEL_SPACE_START),
        VirtualAddress::new(arch::KERNEL_SPACE_END),
    )?;

    for window in windows {
        if !window.base.is_page_aligned() {
            log::warn!(
                "device window at {} has a misaligned base {}",
                window.vaddr,
                window.base
            );
            return Err(VmError::InvalidArgument);
        }
        let object: ObjectRef = Arc::new(DeviceObject::new(window.base, window.size));
        space.enter_at(window.vaddr, window.size, &object, 0, window.prot)?;
        space.populate(window.vaddr, window.vaddr + window.size)?;
        log::debug!(
            "device window {} -> [{}, {})",
            window.base,
            window.vaddr,
            window.vaddr + window.size
        );
    }

    let mut installed = false;
    let kernel_space = KERNEL_SPACE.call_once(|| {
        installed = true;
        space
    });
    assert!(installed, "kernel address space initialized twice");

    log::info!(
        "kernel address space ready: {} device windows, {:#x} bytes mapped",
        windows.len(),
        kernel_space.size()
    );
    Ok(kernel_space)
}

/// Returns the kernel address space.
///
/// # Panics
///
/// Panics if [`init_kernel_space`] has not run yet.
pub fn kernel_space() -> &'static Arc<AddressSpace> {
    match KERNEL_SPACE.get() {
        Some(space) => space,
        None => panic!("kernel address space is not initialized"),
    }
}

/// Returns the kernel address space, or `None` before [`init_kernel_space`] has run.
pub fn try_kernel_space() -> Option<&'static Arc<AddressSpace>> {
    KERNEL_SPACE.get()
}

/// Creates an empty address space covering the user half, for a new process.
pub fn create_user_space(pmap: PageDirectory) -> Result<Arc<AddressSpace>> {
    AddressSpace::create(
        pmap,
        VirtualAddress::new(arch::USER_SPACE_START),
        VirtualAddress::new(arch::USER_SPACE_END),
    )
}
