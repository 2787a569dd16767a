#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]

//! # Polaris Virtual Memory Manager (VMM)
//!
//! The Polaris Virtual Memory Manager (VMM) keeps track of what is mapped where in each
//! virtual address space of the Polaris operating system kernel. It provides:
//!
//! - Address spaces: ordered, non-overlapping mappings of backing objects, with lookup for
//!   the page-fault path.
//! - A scheduler-aware shared/exclusive lock with writer upgrade.
//! - Creation of the kernel address space at boot.
//! - Software emulation for testing in non-kernel environments.

extern crate alloc;

mod address;
mod address_space;
mod arch;
mod bootstrap;
mod error;
pub mod list;
mod mapping;
mod object;
mod page_directory;
mod physical_map;
mod protection;
pub mod sync;

pub use address::{PhysicalAddress, VirtualAddress};
pub use address_space::{AddressSpace, Resolution};
pub use bootstrap::{
    DeviceWindow, create_user_space, init_kernel_space, kernel_space, try_kernel_space,
};
pub use error::{Result, VmError};
pub use mapping::MappingInfo;
pub use object::{DeviceObject, ObjectRef, VmObject, same_object};
pub use page_directory::PageDirectory;
pub use physical_map::{PhysicalMap, Translation};
pub use protection::{FaultType, MapFlags, Protection};

pub use arch::{
    KERNEL_SPACE_END, KERNEL_SPACE_START, PAGE_SIZE, PageFlags, USER_SPACE_END, USER_SPACE_START,
};
