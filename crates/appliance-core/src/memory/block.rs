//! Byte-addressed memory block implementations backing bus regions.

use std::io::Read;

/// Contiguous byte-addressed storage owned by one memory component.
///
/// Offsets are always region-relative; the bus performs all range checking
/// before delegating, so implementations may index directly.
pub trait MemoryBlock: Send {
    /// Size of the block in bytes.
    fn size(&self) -> u64;

    /// Returns `true` when stores to this block must be denied.
    fn is_read_only(&self) -> bool;

    /// Reads the byte at `offset`. The caller guarantees `offset < size()`.
    fn load_byte(&self, offset: u64) -> u8;

    /// Writes the byte at `offset`. The caller guarantees `offset < size()`
    /// and that the block is not read-only.
    fn store_byte(&mut self, offset: u64, value: u8);
}

/// Zero-initialized read/write memory block.
#[derive(Debug, Clone)]
pub struct RamBlock {
    bytes: Box<[u8]>,
}

impl RamBlock {
    /// Allocates a zeroed RAM block of `size` bytes.
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            bytes: vec![0; usize::try_from(size).unwrap_or(usize::MAX)].into_boxed_slice(),
        }
    }
}

impl MemoryBlock for RamBlock {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn load_byte(&self, offset: u64) -> u8 {
        self.bytes[usize::try_from(offset).unwrap_or(usize::MAX)]
    }

    fn store_byte(&mut self, offset: u64, value: u8) {
        self.bytes[usize::try_from(offset).unwrap_or(usize::MAX)] = value;
    }
}

/// Read-only memory block whose content is loaded from an external stream.
#[derive(Debug, Clone)]
pub struct RomBlock {
    bytes: Box<[u8]>,
}

impl RomBlock {
    /// Allocates a zeroed ROM image of `size` bytes.
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            bytes: vec![0; usize::try_from(size).unwrap_or(usize::MAX)].into_boxed_slice(),
        }
    }

    /// Fills the image from `reader`, up to the configured size.
    ///
    /// Returns the number of bytes copied. Content shorter than the block
    /// leaves the tail zeroed; content longer than the block is truncated at
    /// the block size.
    ///
    /// # Errors
    ///
    /// Propagates any read failure from `reader`. Callers treat a failure as
    /// a fatal initialization error for the owning component, never as a
    /// silently zero-filled image.
    pub fn load_content<R: Read>(&mut self, reader: &mut R) -> std::io::Result<u64> {
        let mut filled = 0_usize;
        while filled < self.bytes.len() {
            let read = reader.read(&mut self.bytes[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        Ok(filled as u64)
    }
}

impl MemoryBlock for RomBlock {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn load_byte(&self, offset: u64) -> u8 {
        self.bytes[usize::try_from(offset).unwrap_or(usize::MAX)]
    }

    fn store_byte(&mut self, _offset: u64, _value: u8) {
        unreachable!("bus denies stores to read-only blocks before delegating");
    }
}
