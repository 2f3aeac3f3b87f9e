//! Processor model: feature mask, MMU, cores, and the clocked processor
//! component.

/// Per-core execution state machine and step loop.
pub mod core;
/// Base-ISA extension mask.
pub mod features;
/// Per-core address translation.
pub mod mmu;

pub use self::core::{
    CoreConfig, CoreRunState, CoreStepOutcome, ExecuteOutcome, ExecutionContext, InstructionSet,
    ProcessorCore, INSTRUCTION_BYTES,
};
pub use features::CoreFeatures;
pub use mmu::{Mmu, PAGE_SIZE};

use crate::component::{
    ApplianceConfigError, ApplianceResources, Capabilities, ClockedComponent, Component,
    ComponentState, LifecycleError, LifecycleTracker,
};

/// Clocked processor component owning one or more execution cores.
pub struct Processor {
    name: String,
    lifecycle: LifecycleTracker,
    cores: Vec<ProcessorCore>,
}

impl Processor {
    /// Creates a processor with the given cores.
    #[must_use]
    pub fn new(name: impl Into<String>, cores: Vec<ProcessorCore>) -> Self {
        Self {
            name: name.into(),
            lifecycle: LifecycleTracker::default(),
            cores,
        }
    }

    /// Number of cores.
    #[must_use]
    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Core accessor.
    #[must_use]
    pub fn core(&self, index: usize) -> Option<&ProcessorCore> {
        self.cores.get(index)
    }

    /// Mutable core accessor.
    pub fn core_mut(&mut self, index: usize) -> Option<&mut ProcessorCore> {
        self.cores.get_mut(index)
    }
}

impl Component for Processor {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState {
        self.lifecycle.state()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CLOCKED
    }

    fn initialize(
        &mut self,
        _resources: &mut ApplianceResources,
    ) -> Result<(), ApplianceConfigError> {
        self.lifecycle.advance(ComponentState::Initialized)?;
        for core in &mut self.cores {
            core.reset();
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), LifecycleError> {
        self.lifecycle.advance(ComponentState::Running)
    }

    fn stop(&mut self) -> Result<(), LifecycleError> {
        self.lifecycle.advance(ComponentState::Stopped)
    }

    fn deinitialize(&mut self) -> Result<(), LifecycleError> {
        self.lifecycle.advance(ComponentState::Deinitialized)
    }

    fn as_clocked(&mut self) -> Option<&mut dyn ClockedComponent> {
        Some(self)
    }
}

impl ClockedComponent for Processor {
    fn tick(&mut self, resources: &mut ApplianceResources) {
        for core in &mut self.cores {
            core.step(&mut resources.memory, &resources.io);
        }
    }
}
