//! Per-core memory management unit.
//!
//! Translates logical addresses to physical ones before every bus access.
//! With no features enabled the mapping is the identity; protected memory
//! adds base/limit relocation; virtual memory adds a page-granular map.
//! Translation failures surface as [`MemoryAccessError`]s that the core
//! converts into architectural faults.

use std::collections::HashMap;

use crate::memory::MemoryAccessError;

use super::features::CoreFeatures;

/// Translation page size in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// Per-core address translation unit.
#[derive(Debug, Clone, Default)]
pub struct Mmu {
    features: CoreFeatures,
    relocation_base: u64,
    limit: Option<u64>,
    page_map: HashMap<u64, u64>,
}

impl Mmu {
    /// Creates an MMU with the given (normalized) feature set.
    #[must_use]
    pub fn new(features: CoreFeatures) -> Self {
        Self {
            features: features.normalized(),
            ..Self::default()
        }
    }

    /// Active feature set.
    #[must_use]
    pub const fn features(&self) -> CoreFeatures {
        self.features
    }

    /// Replaces the feature set, applying normalization.
    pub fn set_features(&mut self, features: CoreFeatures) {
        self.features = features.normalized();
    }

    /// Configures protected-memory relocation: logical addresses below
    /// `limit` map to `base + logical`.
    pub fn set_relocation(&mut self, base: u64, limit: u64) {
        self.relocation_base = base;
        self.limit = Some(limit);
    }

    /// Maps logical page `page` to physical frame `frame` for virtual
    /// memory translation.
    pub fn map_page(&mut self, page: u64, frame: u64) {
        self.page_map.insert(page, frame);
    }

    /// Removes a page mapping.
    pub fn unmap_page(&mut self, page: u64) {
        self.page_map.remove(&page);
    }

    /// Translates a logical address to a physical one.
    ///
    /// # Errors
    ///
    /// [`MemoryAccessError::AccessDenied`] outside the protected-memory
    /// limit; [`MemoryAccessError::OutOfRange`] for an unmapped virtual page
    /// or a relocation that passes the top of the address space.
    pub fn translate(&self, logical: u64) -> Result<u64, MemoryAccessError> {
        if self.features.contains(CoreFeatures::VIRTUAL_MEMORY) {
            let page = logical / PAGE_SIZE;
            let offset = logical % PAGE_SIZE;
            let frame = self
                .page_map
                .get(&page)
                .ok_or(MemoryAccessError::OutOfRange { addr: logical })?;
            return frame
                .checked_mul(PAGE_SIZE)
                .and_then(|base| base.checked_add(offset))
                .ok_or(MemoryAccessError::OutOfRange { addr: logical });
        }
        if self.features.contains(CoreFeatures::PROTECTED_MEMORY) {
            if let Some(limit) = self.limit {
                if logical >= limit {
                    return Err(MemoryAccessError::AccessDenied { addr: logical });
                }
            }
            return self
                .relocation_base
                .checked_add(logical)
                .ok_or(MemoryAccessError::OutOfRange { addr: logical });
        }
        Ok(logical)
    }
}

#[cfg(test)]
mod tests {
    use super::super::features::CoreFeatures;
    use super::{Mmu, PAGE_SIZE};
    use crate::memory::MemoryAccessError;

    #[test]
    fn identity_translation_without_features() {
        let mmu = Mmu::new(CoreFeatures::empty());
        assert_eq!(mmu.translate(0x1234), Ok(0x1234));
    }

    #[test]
    fn protected_memory_relocates_and_enforces_the_limit() {
        let mut mmu = Mmu::new(CoreFeatures::PROTECTED_MEMORY);
        mmu.set_relocation(0x10000, 0x1000);
        assert_eq!(mmu.translate(0x0FFF), Ok(0x10FFF));
        assert_eq!(
            mmu.translate(0x1000),
            Err(MemoryAccessError::AccessDenied { addr: 0x1000 })
        );
    }

    #[test]
    fn virtual_memory_translates_mapped_pages_and_faults_on_unmapped() {
        let mut mmu = Mmu::new(CoreFeatures::VIRTUAL_MEMORY);
        mmu.map_page(2, 7);
        assert_eq!(mmu.translate(2 * PAGE_SIZE + 5), Ok(7 * PAGE_SIZE + 5));
        assert_eq!(
            mmu.translate(3 * PAGE_SIZE),
            Err(MemoryAccessError::OutOfRange {
                addr: 3 * PAGE_SIZE
            })
        );
        mmu.unmap_page(2);
        assert!(mmu.translate(2 * PAGE_SIZE).is_err());
    }

    #[test]
    fn enabling_virtual_memory_disables_protected_memory() {
        let mmu = Mmu::new(CoreFeatures::PROTECTED_MEMORY | CoreFeatures::VIRTUAL_MEMORY);
        assert_eq!(mmu.features(), CoreFeatures::VIRTUAL_MEMORY);
    }
}
