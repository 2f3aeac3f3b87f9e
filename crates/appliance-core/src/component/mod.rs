//! Component model: lifecycle state machine, capability set, and type
//! descriptors.

/// Appliance driver owning components and buses.
pub mod appliance;
/// Process-wide component-type registry.
pub mod registry;
/// Stock memory component types (RAM, ROM).
pub mod stock;

pub use appliance::{ApplianceResources, ComponentId, VirtualAppliance};
pub use registry::{ComponentRegistry, RegistryError};
pub use stock::{RamComponentType, RomComponentType};

use std::io;

use bitflags::bitflags;
use thiserror::Error;

use crate::memory::MemoryMapError;
use crate::io::IoBusError;

/// Lifecycle state of a component (and of the appliance itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ComponentState {
    /// Constructed but not yet initialized.
    #[default]
    Constructed,
    /// Resources acquired, ready to run.
    Initialized,
    /// Actively participating in the clock loop.
    Running,
    /// Stopped after running; may be restarted or torn down.
    Stopped,
    /// Resources released; terminal state.
    Deinitialized,
}

impl ComponentState {
    /// Returns `true` when a transition from `self` to `next` is legal.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Constructed, Self::Initialized)
                | (Self::Initialized, Self::Running | Self::Deinitialized)
                | (Self::Running, Self::Stopped)
                | (Self::Stopped, Self::Running | Self::Deinitialized)
        )
    }
}

/// Illegal lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("illegal lifecycle transition {from:?} -> {to:?}")]
pub struct LifecycleError {
    /// State the component was in.
    pub from: ComponentState,
    /// State the caller requested.
    pub to: ComponentState,
}

/// Embeddable lifecycle tracker enforcing the component state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleTracker {
    state: ComponentState,
}

impl LifecycleTracker {
    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ComponentState {
        self.state
    }

    /// Advances to `next`.
    ///
    /// # Errors
    ///
    /// [`LifecycleError`] when the transition is not part of the state
    /// machine; the tracked state is left unchanged.
    pub fn advance(&mut self, next: ComponentState) -> Result<(), LifecycleError> {
        if self.state.can_transition_to(next) {
            self.state = next;
            Ok(())
        } else {
            Err(LifecycleError {
                from: self.state,
                to: next,
            })
        }
    }
}

bitflags! {
    /// Capabilities a component declares; the appliance driver dispatches by
    /// capability, never by concrete type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Receives one `tick` per global clock cycle.
        const CLOCKED = 1 << 0;
        /// Runs activity of its own (device thread) between start and stop.
        const ACTIVE = 1 << 1;
    }
}

/// Target guest architecture, compared by stable key rather than identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Architecture {
    /// The 64-bit Aster appliance architecture.
    Aster64,
}

impl Architecture {
    /// Stable mnemonic for this architecture.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Aster64 => "aster64",
        }
    }
}

/// Kind of configured appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ApplianceType {
    /// A full virtual machine.
    Machine,
    /// A remote-terminal instance.
    RemoteTerminal,
}

/// Broad component classification used by configuration surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ComponentCategory {
    /// Instruction-executing components.
    Processor,
    /// Memory units.
    Memory,
    /// Address/interrupt fabric.
    Bus,
    /// Peripheral devices.
    Device,
}

/// Configuration or validation failure detected while building an appliance.
#[derive(Debug, Error)]
pub enum ApplianceConfigError {
    /// Component type does not support the appliance's architecture.
    #[error("component {mnemonic:?} is not compatible with architecture {architecture:?}")]
    IncompatibleArchitecture {
        /// Offending component-type mnemonic.
        mnemonic: &'static str,
        /// Target architecture.
        architecture: Architecture,
    },
    /// Component type does not support the appliance kind.
    #[error("component {mnemonic:?} is not compatible with appliance type {kind:?}")]
    IncompatibleApplianceType {
        /// Offending component-type mnemonic.
        mnemonic: &'static str,
        /// Appliance kind.
        kind: ApplianceType,
    },
    /// Memory-region mapping failed validation.
    #[error("memory map rejected: {0}")]
    Memory(#[from] MemoryMapError),
    /// I/O port attachment failed.
    #[error("i/o bus rejected port: {0}")]
    Io(#[from] IoBusError),
    /// A component's external content source could not be read.
    #[error("failed to load content for component {component:?}")]
    ContentLoad {
        /// Component name.
        component: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A lifecycle operation was requested out of order.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Clocked capability: advanced once per global clock cycle.
pub trait ClockedComponent {
    /// Performs one clock cycle of work against the appliance's buses.
    fn tick(&mut self, resources: &mut ApplianceResources);
}

/// Active capability: owns background activity between start and stop.
pub trait ActiveComponent {
    /// Begins background activity.
    fn start_activity(&mut self);
    /// Ends background activity; must not return while activity is pending.
    fn stop_activity(&mut self);
}

/// One hardware/software unit of the appliance with a managed lifecycle.
///
/// A component is "free" only before attach and after detach; the owning
/// appliance deinitializes every component before dropping it.
pub trait Component: Send {
    /// Instance name, unique within the owning appliance.
    fn name(&self) -> &str;

    /// Current lifecycle state.
    fn state(&self) -> ComponentState;

    /// Declared capability set, consistent with the accessor methods.
    fn capabilities(&self) -> Capabilities;

    /// Acquires resources: maps memory, attaches ports.
    ///
    /// # Errors
    ///
    /// Any [`ApplianceConfigError`] aborts appliance construction.
    fn initialize(&mut self, resources: &mut ApplianceResources)
        -> Result<(), ApplianceConfigError>;

    /// Enters the running state.
    ///
    /// # Errors
    ///
    /// [`LifecycleError`] when not initialized or stopped.
    fn start(&mut self) -> Result<(), LifecycleError>;

    /// Leaves the running state.
    ///
    /// # Errors
    ///
    /// [`LifecycleError`] when not running.
    fn stop(&mut self) -> Result<(), LifecycleError>;

    /// Releases resources; terminal.
    ///
    /// # Errors
    ///
    /// [`LifecycleError`] when still running.
    fn deinitialize(&mut self) -> Result<(), LifecycleError>;

    /// Clocked capability accessor.
    fn as_clocked(&mut self) -> Option<&mut dyn ClockedComponent> {
        None
    }

    /// Active capability accessor.
    fn as_active(&mut self) -> Option<&mut dyn ActiveComponent> {
        None
    }
}

/// Stock factory/descriptor for a component type.
///
/// Types are globally unique by mnemonic and must be registered in a
/// [`ComponentRegistry`] before instantiation.
pub trait ComponentType: Send + Sync {
    /// Globally unique mnemonic.
    fn mnemonic(&self) -> &'static str;

    /// Human-readable display name.
    fn display_name(&self) -> &'static str;

    /// Broad classification.
    fn category(&self) -> ComponentCategory;

    /// Whether components of this type run on `architecture`.
    fn is_compatible_with_architecture(&self, architecture: Architecture) -> bool;

    /// Whether components of this type belong in appliances of `kind`.
    fn is_compatible_with_appliance_type(&self, kind: ApplianceType) -> bool;

    /// Creates a fresh component in the `Constructed` state.
    fn create_component(&self) -> Box<dyn Component>;
}
