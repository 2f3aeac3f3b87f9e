//! Memory subsystem: block abstraction, RAM/ROM blocks, and the global bus.

/// Byte-addressed memory block implementations.
pub mod block;
/// Global physical address-space bus and region map.
pub mod bus;

pub use block::{MemoryBlock, RamBlock, RomBlock};
pub use bus::{MappedRegionInfo, MemoryBus, REGION_SIZE_GRANULARITY, REGION_START_ALIGNMENT};

use thiserror::Error;

/// Byte order applied to one multi-byte bus access.
///
/// Always explicit per access, never inferred from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ByteOrder {
    /// Most-significant byte at the lowest address.
    BigEndian,
    /// Least-significant byte at the lowest address.
    LittleEndian,
}

/// Fault signaled by a memory access, converted by a core into an
/// architectural trap rather than an emulator failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MemoryAccessError {
    /// No mapped region owns the address, or the access ran past the owning
    /// region's end.
    #[error("address {addr:#018x} is outside every mapped region")]
    OutOfRange {
        /// Faulting physical address.
        addr: u64,
    },
    /// The owning region refused the access (store to read-only memory).
    #[error("access to address {addr:#018x} denied")]
    AccessDenied {
        /// Faulting physical address.
        addr: u64,
    },
    /// A core-imposed alignment constraint was violated.
    #[error("misaligned access at address {addr:#018x}")]
    Misaligned {
        /// Faulting logical address.
        addr: u64,
    },
}

impl MemoryAccessError {
    /// Faulting address carried by any variant.
    #[must_use]
    pub const fn addr(self) -> u64 {
        match self {
            Self::OutOfRange { addr } | Self::AccessDenied { addr } | Self::Misaligned { addr } => {
                addr
            }
        }
    }
}

/// Validation failure raised while building the region map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MemoryMapError {
    /// Region size is zero.
    #[error("region at {start:#018x} has zero size")]
    ZeroSize {
        /// Requested start address.
        start: u64,
    },
    /// Region start is not aligned to [`REGION_START_ALIGNMENT`].
    #[error("region start {start:#018x} is not 8-byte aligned")]
    UnalignedStart {
        /// Requested start address.
        start: u64,
    },
    /// Region size is not a multiple of [`REGION_SIZE_GRANULARITY`].
    #[error("region size {size:#x} is not a multiple of 4096")]
    SizeNotGranular {
        /// Requested size in bytes.
        size: u64,
    },
    /// Region end would pass the top of the address space.
    #[error("region at {start:#018x} of size {size:#x} wraps the address space")]
    AddressWrap {
        /// Requested start address.
        start: u64,
        /// Requested size in bytes.
        size: u64,
    },
    /// Region intersects an already mapped region.
    #[error("region at {start:#018x} overlaps the region at {existing_start:#018x}")]
    Overlap {
        /// Requested start address.
        start: u64,
        /// Start of the previously mapped region it collides with.
        existing_start: u64,
    },
}
