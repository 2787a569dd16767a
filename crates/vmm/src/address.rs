//! Address types for physical and virtual memory management.
//!
//! This module provides architecture-independent wrappers around physical and virtual
//! addresses. Constructors validate against the active architecture; the `checked_*`
//! helpers let range arithmetic fail softly instead of panicking on bad caller input.

use core::fmt;
use core::ops::{Add, Sub};

use crate::arch;

/// Macro to define common address type functionality.
///
/// This macro generates the structure and methods shared by physical and virtual
/// addresses. `$validate` is the architecture check applied to every constructed value.
macro_rules! impl_address_common {
    ($name:ident, $validate:path, $message:literal, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new address.
            ///
            /// # Panics
            ///
            #[doc = concat!("Panics if the address is invalid for the architecture (\"", $message, "\").")]
            #[inline]
            pub const fn new(addr: usize) -> Self {
                assert!($validate(addr), $message);
                Self(addr)
            }

            /// Creates a new address, returning `None` if it is invalid for the architecture.
            #[inline]
            pub const fn try_new(addr: usize) -> Option<Self> {
                if $validate(addr) {
                    Some(Self(addr))
                } else {
                    None
                }
            }

            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Checks if the address is aligned to the architecture page size.
            #[inline]
            pub const fn is_page_aligned(self) -> bool {
                self.is_aligned(arch::PAGE_SIZE)
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self(self.0 & !(align - 1))
            }

            /// Returns the offset of this address within its page.
            #[inline]
            pub const fn page_offset(self) -> usize {
                self.0 & (arch::PAGE_SIZE - 1)
            }

            /// Adds `rhs` bytes, returning `None` on overflow or if the result is invalid.
            #[inline]
            pub const fn checked_add(self, rhs: usize) -> Option<Self> {
                match self.0.checked_add(rhs) {
                    Some(addr) => Self::try_new(addr),
                    None => None,
                }
            }
        }

        impl fmt::Pointer for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:p}", self.0 as *const u8)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(addr: usize) -> Self {
                Self::new(addr)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self::new(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    arch::validate_physical,
    "physical address exceeds maximum width",
    "A physical memory address.\n\n\
     Physical addresses are what the physical-mapping layer installs behind a virtual page\n\
     and what backing objects hand out when a fault is resolved."
);

impl_address_common!(
    VirtualAddress,
    arch::validate_virtual,
    "address is not canonical",
    "A virtual memory address.\n\n\
     Virtual addresses are always canonical for the active architecture. Mapping bounds,\n\
     fault addresses and address-space limits are all expressed with this type."
);

impl VirtualAddress {
    /// Returns true if this address lies in the user half of the address space.
    #[inline]
    pub const fn is_user(self) -> bool {
        arch::is_user_address(self.0)
    }

    /// Returns true if this address lies in the sign-extended upper half.
    ///
    /// Two canonical addresses in the same half have only canonical addresses between them.
    #[inline]
    pub const fn is_higher_half(self) -> bool {
        (self.0 as isize) < 0
    }
}
