//! Optional architectural capability mask for processor cores.

use bitflags::bitflags;

bitflags! {
    /// Base-ISA extension set a core implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CoreFeatures: u32 {
        /// Base/limit protected-memory relocation.
        const PROTECTED_MEMORY = 1 << 0;
        /// Page-granular virtual memory.
        const VIRTUAL_MEMORY = 1 << 1;
    }
}

impl Default for CoreFeatures {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl CoreFeatures {
    /// Architecture-declared default feature set.
    pub const DEFAULT: Self = Self::PROTECTED_MEMORY;

    /// Applies the normalization rules: protected memory and virtual memory
    /// are mutually exclusive, and enabling virtual memory silently clears
    /// protected memory.
    #[must_use]
    pub const fn normalized(self) -> Self {
        if self.contains(Self::VIRTUAL_MEMORY) {
            self.difference(Self::PROTECTED_MEMORY)
        } else {
            self
        }
    }
}
