//! Stock memory component types: RAM and ROM units.

use std::fs::File;
use std::path::PathBuf;

use crate::memory::{RamBlock, RomBlock};
use crate::units::{MemorySize, MemorySizeUnit};

use super::appliance::ApplianceResources;
use super::{
    ApplianceConfigError, ApplianceType, Architecture, Capabilities, Component, ComponentCategory,
    ComponentState, ComponentType, LifecycleError, LifecycleTracker,
};

/// Stock type descriptor for RAM units.
///
/// The descriptor carries the geometry preset stamped onto every component it
/// creates.
#[derive(Debug, Clone)]
pub struct RamComponentType {
    start: u64,
    size: MemorySize,
}

impl RamComponentType {
    /// RAM preset mapped at `start` with the given size.
    #[must_use]
    pub const fn new(start: u64, size: MemorySize) -> Self {
        Self { start, size }
    }
}

impl Default for RamComponentType {
    /// 64 MB at address zero, the reference configuration.
    fn default() -> Self {
        Self::new(0, MemorySize::new(64, MemorySizeUnit::MB))
    }
}

impl ComponentType for RamComponentType {
    fn mnemonic(&self) -> &'static str {
        "ram"
    }

    fn display_name(&self) -> &'static str {
        "RAM unit"
    }

    fn category(&self) -> ComponentCategory {
        ComponentCategory::Memory
    }

    fn is_compatible_with_architecture(&self, architecture: Architecture) -> bool {
        matches!(architecture, Architecture::Aster64)
    }

    fn is_compatible_with_appliance_type(&self, kind: ApplianceType) -> bool {
        matches!(kind, ApplianceType::Machine)
    }

    fn create_component(&self) -> Box<dyn Component> {
        Box::new(RamComponent {
            name: format!("ram@{:#x}", self.start),
            lifecycle: LifecycleTracker::default(),
            start: self.start,
            size: self.size,
        })
    }
}

struct RamComponent {
    name: String,
    lifecycle: LifecycleTracker,
    start: u64,
    size: MemorySize,
}

impl Component for RamComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState {
        self.lifecycle.state()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn initialize(
        &mut self,
        resources: &mut ApplianceResources,
    ) -> Result<(), ApplianceConfigError> {
        self.lifecycle.advance(ComponentState::Initialized)?;
        resources
            .memory
            .map_block(self.start, Box::new(RamBlock::new(self.size.bytes())))?;
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
}

/// Stock type descriptor for ROM units loaded from an external content file.
#[derive(Debug, Clone)]
pub struct RomComponentType {
    start: u64,
    size: MemorySize,
    content_path: PathBuf,
}

impl RomComponentType {
    /// ROM preset mapped at `start`, filled from `content_path` at
    /// initialize time.
    #[must_use]
    pub fn new(start: u64, size: MemorySize, content_path: PathBuf) -> Self {
        Self {
            start,
            size,
            content_path,
        }
    }
}

impl ComponentType for RomComponentType {
    fn mnemonic(&self) -> &'static str {
        "rom"
    }

    fn display_name(&self) -> &'static str {
        "ROM unit"
    }

    fn category(&self) -> ComponentCategory {
        ComponentCategory::Memory
    }

    fn is_compatible_with_architecture(&self, architecture: Architecture) -> bool {
        matches!(architecture, Architecture::Aster64)
    }

    fn is_compatible_with_appliance_type(&self, kind: ApplianceType) -> bool {
        matches!(kind, ApplianceType::Machine)
    }

    fn create_component(&self) -> Box<dyn Component> {
        Box::new(RomComponent {
            name: format!("rom@{:#x}", self.start),
            lifecycle: LifecycleTracker::default(),
            start: self.start,
            size: self.size,
            content_path: self.content_path.clone(),
        })
    }
}

struct RomComponent {
    name: String,
    lifecycle: LifecycleTracker,
    start: u64,
    size: MemorySize,
    content_path: PathBuf,
}

impl Component for RomComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState {
        self.lifecycle.state()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn initialize(
        &mut self,
        resources: &mut ApplianceResources,
    ) -> Result<(), ApplianceConfigError> {
        self.lifecycle.advance(ComponentState::Initialized)?;
        let mut block = RomBlock::new(self.size.bytes());
        // A missing or unreadable content file is fatal for the appliance,
        // never a silently zero-filled image.
        let mut file =
            File::open(&self.content_path).map_err(|source| ApplianceConfigError::ContentLoad {
                component: self.name.clone(),
                source,
            })?;
        block
            .load_content(&mut file)
            .map_err(|source| ApplianceConfigError::ContentLoad {
                component: self.name.clone(),
                source,
            })?;
        resources.memory.map_block(self.start, Box::new(block))?;
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
}
