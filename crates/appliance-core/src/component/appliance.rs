//! Appliance driver: owns components and buses, drives the global clock.

use std::sync::Arc;

use crate::io::IoBus;
use crate::memory::MemoryBus;
use crate::units::ClockFrequency;

use super::{
    ApplianceConfigError, ApplianceType, Architecture, Capabilities, Component, ComponentState,
    ComponentType, LifecycleError, LifecycleTracker,
};

/// Shared bus fabric handed to components during initialization and ticks.
pub struct ApplianceResources {
    /// Global physical address space.
    pub memory: MemoryBus,
    /// Interrupt-routing bus.
    pub io: Arc<IoBus>,
}

/// Identifier of a component within one appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(usize);

/// A configured virtual machine or remote-terminal instance.
///
/// The appliance exclusively owns its components; teardown deinitializes
/// every component before dropping it, so a component is never destroyed
/// while attached and live.
pub struct VirtualAppliance {
    name: String,
    kind: ApplianceType,
    architecture: Architecture,
    clock: ClockFrequency,
    lifecycle: LifecycleTracker,
    resources: ApplianceResources,
    components: Vec<Box<dyn Component>>,
    cycles: u64,
}

impl VirtualAppliance {
    /// Creates an empty appliance with the given identity and global clock.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ApplianceType,
        architecture: Architecture,
        clock: ClockFrequency,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            architecture,
            clock,
            lifecycle: LifecycleTracker::default(),
            resources: ApplianceResources {
                memory: MemoryBus::new(),
                io: IoBus::new(),
            },
            components: Vec::new(),
            cycles: 0,
        }
    }

    /// Appliance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appliance kind.
    #[must_use]
    pub const fn kind(&self) -> ApplianceType {
        self.kind
    }

    /// Target architecture.
    #[must_use]
    pub const fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Global clock frequency.
    #[must_use]
    pub const fn clock(&self) -> ClockFrequency {
        self.clock
    }

    /// Lifecycle state of the appliance as a whole.
    #[must_use]
    pub const fn state(&self) -> ComponentState {
        self.lifecycle.state()
    }

    /// Clock cycles executed so far.
    #[must_use]
    pub const fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Bus fabric, for status queries and host-driven device access.
    #[must_use]
    pub const fn resources(&self) -> &ApplianceResources {
        &self.resources
    }

    /// Instantiates a component of `component_type` and attaches it.
    ///
    /// # Errors
    ///
    /// [`ApplianceConfigError`] when the type is incompatible with the
    /// appliance's architecture or kind; the appliance is left unchanged.
    pub fn instantiate(
        &mut self,
        component_type: &dyn ComponentType,
    ) -> Result<ComponentId, ApplianceConfigError> {
        if !component_type.is_compatible_with_architecture(self.architecture) {
            return Err(ApplianceConfigError::IncompatibleArchitecture {
                mnemonic: component_type.mnemonic(),
                architecture: self.architecture,
            });
        }
        if !component_type.is_compatible_with_appliance_type(self.kind) {
            return Err(ApplianceConfigError::IncompatibleApplianceType {
                mnemonic: component_type.mnemonic(),
                kind: self.kind,
            });
        }
        let id = ComponentId(self.components.len());
        self.components.push(component_type.create_component());
        Ok(id)
    }

    /// Attaches an already constructed component.
    ///
    /// Used by callers that configure components directly instead of going
    /// through a stock type descriptor; compatibility is the caller's
    /// responsibility in that case.
    pub fn attach(&mut self, component: Box<dyn Component>) -> ComponentId {
        let id = ComponentId(self.components.len());
        self.components.push(component);
        id
    }

    /// Component accessor.
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<&dyn Component> {
        self.components.get(id.0).map(AsRef::as_ref)
    }

    /// Initializes every component in attach order.
    ///
    /// # Errors
    ///
    /// The first [`ApplianceConfigError`] aborts construction; earlier
    /// components stay initialized and must be torn down by the caller.
    pub fn initialize(&mut self) -> Result<(), ApplianceConfigError> {
        self.lifecycle.advance(ComponentState::Initialized)?;
        for component in &mut self.components {
            component.initialize(&mut self.resources)?;
        }
        Ok(())
    }

    /// Starts every component, then begins counting cycles.
    ///
    /// # Errors
    ///
    /// [`LifecycleError`] when the appliance or a component is not in a
    /// startable state.
    pub fn start(&mut self) -> Result<(), LifecycleError> {
        self.lifecycle.advance(ComponentState::Running)?;
        for component in &mut self.components {
            component.start()?;
            if let Some(active) = component.as_active() {
                active.start_activity();
            }
        }
        Ok(())
    }

    /// Stops every component.
    ///
    /// # Errors
    ///
    /// [`LifecycleError`] when not running.
    pub fn stop(&mut self) -> Result<(), LifecycleError> {
        self.lifecycle.advance(ComponentState::Stopped)?;
        for component in &mut self.components {
            if let Some(active) = component.as_active() {
                active.stop_activity();
            }
            component.stop()?;
        }
        Ok(())
    }

    /// Deinitializes every component, making the appliance ready to drop.
    ///
    /// # Errors
    ///
    /// [`LifecycleError`] when still running.
    pub fn deinitialize(&mut self) -> Result<(), LifecycleError> {
        self.lifecycle.advance(ComponentState::Deinitialized)?;
        for component in &mut self.components {
            component.deinitialize()?;
        }
        Ok(())
    }

    /// Advances the global clock by one cycle, ticking every clocked
    /// component in attach order.
    pub fn tick(&mut self) {
        if self.lifecycle.state() != ComponentState::Running {
            return;
        }
        self.cycles = self.cycles.wrapping_add(1);
        for component in &mut self.components {
            if component.capabilities().contains(Capabilities::CLOCKED) {
                if let Some(clocked) = component.as_clocked() {
                    clocked.tick(&mut self.resources);
                }
            }
        }
    }
}
