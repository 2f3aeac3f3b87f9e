//! Component, bus, and processor fabric for the virtual appliance emulator.
//!
//! An appliance is a configured set of components (processors, memory units,
//! devices) joined by a global memory bus and an interrupt-routing I/O bus,
//! all advanced by per-component clock ticks.

/// Measurement value types with unit conversion and saturating arithmetic.
pub mod units;
pub use units::{
    ClockFrequency, FrequencyUnit, MemorySize, MemorySizeUnit, TimeInterval, TimeUnit,
    UnitParseError,
};

/// Component model: lifecycle, capabilities, registry, appliance driver.
pub mod component;
pub use component::{
    ActiveComponent, ApplianceConfigError, ApplianceResources, ApplianceType, Architecture,
    Capabilities, ClockedComponent, Component, ComponentCategory, ComponentId, ComponentRegistry,
    ComponentState, ComponentType, LifecycleError, LifecycleTracker, RamComponentType,
    RegistryError, RomComponentType, VirtualAppliance,
};

/// Memory subsystem: blocks, the global bus, and fault taxonomy.
pub mod memory;
pub use memory::{
    ByteOrder, MappedRegionInfo, MemoryAccessError, MemoryBlock, MemoryBus, MemoryMapError,
    RamBlock, RomBlock, REGION_SIZE_GRANULARITY, REGION_START_ALIGNMENT,
};

/// I/O subsystem: interrupt ports and the bus-wide ready queue.
pub mod io;
pub use io::{IoBus, IoBusError, IoInterrupt, IoPort};

/// Processor model: feature mask, MMU, cores, processor component.
pub mod processor;
pub use processor::{
    CoreConfig, CoreFeatures, CoreRunState, CoreStepOutcome, ExecuteOutcome, ExecutionContext,
    InstructionSet, Mmu, Processor, ProcessorCore, INSTRUCTION_BYTES, PAGE_SIZE,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
