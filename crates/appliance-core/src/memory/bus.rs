//! Global physical address-space bus with a dynamic, non-overlapping region map.

use super::block::MemoryBlock;
use super::{ByteOrder, MemoryAccessError, MemoryMapError};

/// Required start-address alignment for mapped regions.
pub const REGION_START_ALIGNMENT: u64 = 8;

/// Required size granularity for mapped regions.
pub const REGION_SIZE_GRANULARITY: u64 = 4096;

/// Read-only description of one mapped region, for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MappedRegionInfo {
    /// First address owned by the region.
    pub start: u64,
    /// Region size in bytes.
    pub size: u64,
    /// Whether stores to the region are denied.
    pub read_only: bool,
}

struct MappedRegion {
    start: u64,
    size: u64,
    block: Box<dyn MemoryBlock>,
}

impl MappedRegion {
    const fn last(&self) -> u64 {
        // Non-zero size is validated at map time.
        self.start + (self.size - 1)
    }
}

/// The appliance's single global physical address space.
///
/// Regions are kept sorted by start address and never overlap; address
/// resolution is a binary search over the sorted set. The bus itself imposes
/// no alignment on accesses; alignment, where required, is enforced by the
/// calling core.
#[derive(Default)]
pub struct MemoryBus {
    regions: Vec<MappedRegion>,
}

impl MemoryBus {
    /// Creates a bus with no mapped regions.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Maps `block` at `start`, claiming `[start, start + block.size())`.
    ///
    /// # Errors
    ///
    /// Returns a [`MemoryMapError`] when the geometry is invalid or the span
    /// overlaps an existing region. On failure the bus is left unchanged.
    pub fn map_block(
        &mut self,
        start: u64,
        block: Box<dyn MemoryBlock>,
    ) -> Result<(), MemoryMapError> {
        let size = block.size();
        if size == 0 {
            return Err(MemoryMapError::ZeroSize { start });
        }
        if start % REGION_START_ALIGNMENT != 0 {
            return Err(MemoryMapError::UnalignedStart { start });
        }
        if size % REGION_SIZE_GRANULARITY != 0 {
            return Err(MemoryMapError::SizeNotGranular { size });
        }
        if start.checked_add(size - 1).is_none() {
            return Err(MemoryMapError::AddressWrap { start, size });
        }

        let last = start + (size - 1);
        for existing in &self.regions {
            if start <= existing.last() && existing.start <= last {
                return Err(MemoryMapError::Overlap {
                    start,
                    existing_start: existing.start,
                });
            }
        }

        let insert_at = self.regions.partition_point(|region| region.start < start);
        self.regions
            .insert(insert_at, MappedRegion { start, size, block });
        Ok(())
    }

    /// Describes every mapped region in ascending address order.
    #[must_use]
    pub fn regions(&self) -> Vec<MappedRegionInfo> {
        self.regions
            .iter()
            .map(|region| MappedRegionInfo {
                start: region.start,
                size: region.size,
                read_only: region.block.is_read_only(),
            })
            .collect()
    }

    /// Index of the region owning `addr`, requiring `len` bytes of headroom.
    fn resolve(&self, addr: u64, len: u64) -> Result<usize, MemoryAccessError> {
        let candidate = self.regions.partition_point(|region| region.start <= addr);
        if candidate == 0 {
            return Err(MemoryAccessError::OutOfRange { addr });
        }
        let region = &self.regions[candidate - 1];
        if addr > region.last() {
            return Err(MemoryAccessError::OutOfRange { addr });
        }
        // The whole access must fit inside the owning region.
        let end = addr
            .checked_add(len - 1)
            .ok_or(MemoryAccessError::OutOfRange { addr })?;
        if end > region.last() {
            return Err(MemoryAccessError::OutOfRange { addr: region.last() + 1 });
        }
        Ok(candidate - 1)
    }

    /// Loads one byte.
    ///
    /// # Errors
    ///
    /// [`MemoryAccessError::OutOfRange`] when no region owns `addr`.
    pub fn load_byte(&self, addr: u64) -> Result<u8, MemoryAccessError> {
        let index = self.resolve(addr, 1)?;
        let region = &self.regions[index];
        Ok(region.block.load_byte(addr - region.start))
    }

    /// Stores one byte.
    ///
    /// # Errors
    ///
    /// [`MemoryAccessError::OutOfRange`] when no region owns `addr`;
    /// [`MemoryAccessError::AccessDenied`] for read-only regions, leaving the
    /// content unchanged.
    pub fn store_byte(&mut self, addr: u64, value: u8) -> Result<(), MemoryAccessError> {
        let index = self.resolve(addr, 1)?;
        let region = &mut self.regions[index];
        if region.block.is_read_only() {
            return Err(MemoryAccessError::AccessDenied { addr });
        }
        region.block.store_byte(addr - region.start, value);
        Ok(())
    }

    fn load_multi(&self, addr: u64, len: u64, order: ByteOrder) -> Result<u64, MemoryAccessError> {
        let index = self.resolve(addr, len)?;
        let region = &self.regions[index];
        let base = addr - region.start;
        let mut value = 0_u64;
        for i in 0..len {
            let byte = u64::from(region.block.load_byte(base + i));
            value = match order {
                ByteOrder::BigEndian => (value << 8) | byte,
                ByteOrder::LittleEndian => value | (byte << (8 * i)),
            };
        }
        Ok(value)
    }

    fn store_multi(
        &mut self,
        addr: u64,
        len: u64,
        value: u64,
        order: ByteOrder,
    ) -> Result<(), MemoryAccessError> {
        let index = self.resolve(addr, len)?;
        let region = &mut self.regions[index];
        if region.block.is_read_only() {
            return Err(MemoryAccessError::AccessDenied { addr });
        }
        let base = addr - region.start;
        for i in 0..len {
            let shift = match order {
                ByteOrder::BigEndian => 8 * (len - 1 - i),
                ByteOrder::LittleEndian => 8 * i,
            };
            #[allow(clippy::cast_possible_truncation)]
            let byte = (value >> shift) as u8;
            region.block.store_byte(base + i, byte);
        }
        Ok(())
    }

    /// Loads a 16-bit half-word in the given byte order.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::load_byte`]; the whole access must fit in one region.
    pub fn load_half_word(&self, addr: u64, order: ByteOrder) -> Result<u16, MemoryAccessError> {
        #[allow(clippy::cast_possible_truncation)]
        Ok(self.load_multi(addr, 2, order)? as u16)
    }

    /// Loads a 32-bit word in the given byte order.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::load_byte`]; the whole access must fit in one region.
    pub fn load_word(&self, addr: u64, order: ByteOrder) -> Result<u32, MemoryAccessError> {
        #[allow(clippy::cast_possible_truncation)]
        Ok(self.load_multi(addr, 4, order)? as u32)
    }

    /// Loads a 64-bit long-word in the given byte order.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::load_byte`]; the whole access must fit in one region.
    pub fn load_long_word(&self, addr: u64, order: ByteOrder) -> Result<u64, MemoryAccessError> {
        self.load_multi(addr, 8, order)
    }

    /// Stores a 16-bit half-word in the given byte order.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::store_byte`]; the whole access must fit in one region.
    pub fn store_half_word(
        &mut self,
        addr: u64,
        value: u16,
        order: ByteOrder,
    ) -> Result<(), MemoryAccessError> {
        self.store_multi(addr, 2, u64::from(value), order)
    }

    /// Stores a 32-bit word in the given byte order.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::store_byte`]; the whole access must fit in one region.
    pub fn store_word(
        &mut self,
        addr: u64,
        value: u32,
        order: ByteOrder,
    ) -> Result<(), MemoryAccessError> {
        self.store_multi(addr, 4, u64::from(value), order)
    }

    /// Stores a 64-bit long-word in the given byte order.
    ///
    /// # Errors
    ///
    /// See [`MemoryBus::store_byte`]; the whole access must fit in one region.
    pub fn store_long_word(
        &mut self,
        addr: u64,
        value: u64,
        order: ByteOrder,
    ) -> Result<(), MemoryAccessError> {
        self.store_multi(addr, 8, value, order)
    }
}

#[cfg(test)]
mod tests {
    use super::super::block::{RamBlock, RomBlock};
    use super::super::{ByteOrder, MemoryAccessError, MemoryMapError};
    use super::{MemoryBus, REGION_SIZE_GRANULARITY};

    fn bus_with_ram(start: u64, size: u64) -> MemoryBus {
        let mut bus = MemoryBus::new();
        bus.map_block(start, Box::new(RamBlock::new(size)))
            .expect("valid region geometry");
        bus
    }

    #[test]
    fn overlapping_region_is_rejected_and_bus_is_unchanged() {
        let mut bus = bus_with_ram(0x0000, 8192);
        let before = bus.regions();
        let result = bus.map_block(0x1000, Box::new(RamBlock::new(4096)));
        assert_eq!(
            result,
            Err(MemoryMapError::Overlap {
                start: 0x1000,
                existing_start: 0x0000
            })
        );
        assert_eq!(bus.regions(), before);
    }

    #[test]
    fn geometry_violations_are_rejected() {
        let mut bus = MemoryBus::new();
        assert_eq!(
            bus.map_block(0x0004, Box::new(RamBlock::new(4096))),
            Err(MemoryMapError::UnalignedStart { start: 0x0004 })
        );
        assert_eq!(
            bus.map_block(0x0000, Box::new(RamBlock::new(100))),
            Err(MemoryMapError::SizeNotGranular { size: 100 })
        );
        assert_eq!(
            bus.map_block(
                u64::MAX - (REGION_SIZE_GRANULARITY / 2),
                Box::new(RamBlock::new(REGION_SIZE_GRANULARITY))
            ),
            Err(MemoryMapError::UnalignedStart {
                start: u64::MAX - (REGION_SIZE_GRANULARITY / 2)
            })
        );
        assert_eq!(
            bus.map_block(
                u64::MAX - 4095,
                Box::new(RamBlock::new(2 * REGION_SIZE_GRANULARITY))
            ),
            Err(MemoryMapError::AddressWrap {
                start: u64::MAX - 4095,
                size: 2 * REGION_SIZE_GRANULARITY
            })
        );
    }

    #[test]
    fn every_address_in_a_region_resolves_with_the_correct_offset() {
        let mut bus = MemoryBus::new();
        bus.map_block(0x0000, Box::new(RamBlock::new(4096)))
            .expect("valid region");
        bus.map_block(0x10000, Box::new(RamBlock::new(4096)))
            .expect("valid region");

        bus.store_byte(0x10000 + 7, 0x42).expect("in range");
        assert_eq!(bus.load_byte(0x10000 + 7), Ok(0x42));
        assert_eq!(bus.load_byte(0x0007), Ok(0x00));
        assert_eq!(
            bus.load_byte(0x2000),
            Err(MemoryAccessError::OutOfRange { addr: 0x2000 })
        );
    }

    #[test]
    fn store_to_read_only_region_is_denied_and_content_unchanged() {
        let mut bus = MemoryBus::new();
        let mut rom = RomBlock::new(4096);
        rom.load_content(&mut [0xA5_u8; 4].as_slice())
            .expect("in-memory read cannot fail");
        bus.map_block(0x8000, Box::new(rom)).expect("valid region");

        assert_eq!(
            bus.store_byte(0x8000, 0xFF),
            Err(MemoryAccessError::AccessDenied { addr: 0x8000 })
        );
        assert_eq!(
            bus.store_half_word(0x8002, 0xBEEF, ByteOrder::BigEndian),
            Err(MemoryAccessError::AccessDenied { addr: 0x8002 })
        );
        assert_eq!(bus.load_byte(0x8000), Ok(0xA5));
        assert_eq!(bus.load_byte(0x8002), Ok(0xA5));
    }

    #[test]
    fn big_endian_layout_puts_most_significant_byte_first() {
        let mut bus = bus_with_ram(0x0000, 4096);
        bus.store_word(0x0010, 0x1122_3344, ByteOrder::BigEndian)
            .expect("in range");
        assert_eq!(bus.load_byte(0x0010), Ok(0x11));
        assert_eq!(bus.load_byte(0x0013), Ok(0x44));
        assert_eq!(
            bus.load_word(0x0010, ByteOrder::BigEndian),
            Ok(0x1122_3344)
        );
        assert_eq!(
            bus.load_word(0x0010, ByteOrder::LittleEndian),
            Ok(0x4433_2211)
        );
    }

    #[test]
    fn little_endian_layout_puts_least_significant_byte_first() {
        let mut bus = bus_with_ram(0x0000, 4096);
        bus.store_long_word(0x0020, 0x0102_0304_0506_0708, ByteOrder::LittleEndian)
            .expect("in range");
        assert_eq!(bus.load_byte(0x0020), Ok(0x08));
        assert_eq!(bus.load_byte(0x0027), Ok(0x01));
        assert_eq!(
            bus.load_long_word(0x0020, ByteOrder::LittleEndian),
            Ok(0x0102_0304_0506_0708)
        );
    }

    #[test]
    fn access_straddling_a_region_end_is_out_of_range() {
        let bus = bus_with_ram(0x0000, 4096);
        assert_eq!(
            bus.load_word(4094, ByteOrder::BigEndian),
            Err(MemoryAccessError::OutOfRange { addr: 4096 })
        );
    }

    #[test]
    fn unaligned_multi_byte_access_is_permitted_by_the_bus() {
        let mut bus = bus_with_ram(0x0000, 4096);
        bus.store_half_word(0x0011, 0xCAFE, ByteOrder::BigEndian)
            .expect("bus imposes no alignment");
        assert_eq!(
            bus.load_half_word(0x0011, ByteOrder::BigEndian),
            Ok(0xCAFE)
        );
    }
}
