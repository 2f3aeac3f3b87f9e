//! Process-wide component-type registry.
//!
//! Constructed once at startup and passed by reference to consumers; there is
//! no free-standing global state. Registration is keyed by mnemonic:
//! re-registering the same type object is idempotent, while a different type
//! under an existing mnemonic is a conflict.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::ComponentType;

/// Registration conflict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A different component type already owns the mnemonic.
    #[error("mnemonic {0:?} is already registered to a different component type")]
    MnemonicConflict(String),
}

/// Mnemonic-keyed registry of stock component types.
#[derive(Default)]
pub struct ComponentRegistry {
    types: HashMap<&'static str, Arc<dyn ComponentType>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `component_type` under its mnemonic.
    ///
    /// # Errors
    ///
    /// [`RegistryError::MnemonicConflict`] when the mnemonic is taken by a
    /// different type object. Re-registering the same object succeeds.
    pub fn register(&mut self, component_type: Arc<dyn ComponentType>) -> Result<(), RegistryError> {
        let mnemonic = component_type.mnemonic();
        if let Some(existing) = self.types.get(mnemonic) {
            if Arc::ptr_eq(existing, &component_type) {
                return Ok(());
            }
            return Err(RegistryError::MnemonicConflict(mnemonic.to_owned()));
        }
        self.types.insert(mnemonic, component_type);
        Ok(())
    }

    /// Resolves a registered type by mnemonic.
    #[must_use]
    pub fn lookup(&self, mnemonic: &str) -> Option<&Arc<dyn ComponentType>> {
        self.types.get(mnemonic)
    }

    /// All registered mnemonics, unordered.
    pub fn mnemonics(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::stock::RamComponentType;
    use super::{ComponentRegistry, RegistryError};

    #[test]
    fn re_registering_the_same_type_object_is_idempotent() {
        let mut registry = ComponentRegistry::new();
        let ram = Arc::new(RamComponentType::default());
        registry.register(ram.clone()).expect("fresh mnemonic");
        registry.register(ram.clone()).expect("same object is idempotent");
        assert!(registry.lookup("ram").is_some());
    }

    #[test]
    fn conflicting_re_register_is_rejected() {
        let mut registry = ComponentRegistry::new();
        registry
            .register(Arc::new(RamComponentType::default()))
            .expect("fresh mnemonic");
        let error = registry
            .register(Arc::new(RamComponentType::default()))
            .expect_err("distinct object under same mnemonic");
        assert_eq!(error, RegistryError::MnemonicConflict("ram".to_owned()));
    }

    #[test]
    fn lookup_by_unknown_mnemonic_returns_none() {
        let registry = ComponentRegistry::new();
        assert!(registry.lookup("rom").is_none());
    }
}
