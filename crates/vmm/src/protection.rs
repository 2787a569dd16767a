//! Access rights of mappings and the kinds of access that fault.

use bitflags::bitflags;

bitflags! {
    /// The access rights of a mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: u8 {
        /// Readable.
        const READ = 1 << 0;
        /// Writable.
        const WRITE = 1 << 1;
        /// Executable.
        const EXECUTE = 1 << 2;
    }
}

impl Protection {
    /// Read and write, the protection of ordinary data mappings.
    pub const DEFAULT: Self = Self::READ.union(Self::WRITE);

    /// Returns true if an access of kind `fault` is allowed.
    #[inline]
    pub fn permits(self, fault: FaultType) -> bool {
        self.contains(fault.required())
    }

    /// Returns true if moving from `self` to `new` takes away at least one right.
    ///
    /// Live translations must be invalidated when protection narrows, since the hardware
    /// would otherwise keep granting the old rights until the entry is evicted.
    #[inline]
    pub fn is_narrowed_by(self, new: Protection) -> bool {
        !new.contains(self)
    }
}

impl Default for Protection {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The kind of access that triggered a page fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// A load.
    Read,
    /// A store.
    Write,
    /// An instruction fetch.
    Execute,
}

impl FaultType {
    /// Returns the right a mapping must grant for this access to succeed.
    #[inline]
    pub const fn required(self) -> Protection {
        match self {
            FaultType::Read => Protection::READ,
            FaultType::Write => Protection::WRITE,
            FaultType::Execute => Protection::EXECUTE,
        }
    }
}

bitflags! {
    /// Attributes of a translation beyond its access rights.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MapFlags: u8 {
        /// Accessible from user mode.
        const USER = 1 << 0;
        /// Caching disabled, used for device memory.
        const NO_CACHE = 1 << 1;
    }
}
