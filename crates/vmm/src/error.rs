//! Errors reported by address-space operations.

use core::fmt;

/// Errors that can occur while manipulating an address space.
///
/// All of these are recoverable and describe a problem with the request, never with the
/// state of the address space itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// Misaligned address, size or offset, zero length, or a range outside the map bounds.
    InvalidArgument,
    /// The target range collides with an existing mapping.
    Overlap,
    /// No gap in the map is large enough for the requested size.
    OutOfSpace,
    /// The address or range is not (entirely) covered by mappings.
    NoMapping,
    /// The mapping does not allow the requested kind of access.
    ProtectionViolation,
    /// Memory for a new mapping record or a backing page could not be obtained.
    ResourceExhausted,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            VmError::InvalidArgument => "invalid argument",
            VmError::Overlap => "range overlaps an existing mapping",
            VmError::OutOfSpace => "no free range large enough",
            VmError::NoMapping => "address is not mapped",
            VmError::ProtectionViolation => "access not permitted by mapping protection",
            VmError::ResourceExhausted => "out of memory",
        };
        f.write_str(message)
    }
}

impl core::error::Error for VmError {}

/// Result type for address-space operations.
pub type Result<T> = core::result::Result<T, VmError>;
