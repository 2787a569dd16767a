//! Architecture-specific constants and page flags.
//!
//! This module conditionally imports either the hardware implementation or the software
//! emulation based on the target architecture and features.

// Use x86_64 hardware implementation when we're on x86_64 and not testing or emulating.
// NOTE: We DO include the module even during tests so that rust-analyzer can see it.
#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(all(target_arch = "x86_64", not(test), not(feature = "software-emulation")))]
pub use self::x86_64::*;

// Use software emulation ONLY when:
// - Running tests, OR
// - software-emulation feature is explicitly enabled
#[cfg(any(test, feature = "software-emulation"))]
mod software;
#[cfg(any(test, feature = "software-emulation"))]
pub use software::*;

/// Returns true if `addr` lies in the lower (user) half of the address space.
#[inline]
pub const fn is_user_address(addr: usize) -> bool {
    addr < USER_SPACE_END
}
