use std::collections::HashMap;

use crate::error::RegistryError;
use crate::interface::PluginInterface;

/// The contract every plugin implements. `run` is the plugin's entire life:
/// it is expected to loop on [`PluginInterface::recv`] until it observes the
/// shutdown sentinel or runs out of its own work, then return.
pub trait Plugin: Send {
    fn run(&mut self, interface: &PluginInterface) -> anyhow::Result<()>;
}

type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Explicit registration point mapping plugin names to factories.
///
/// One name resolves to at most one implementation: registering a second
/// factory under the same name is rejected outright rather than silently
/// picking whichever one happened to come first.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P, F>(&mut self, name: &str, factory: F) -> Result<(), RegistryError>
    where
        P: Plugin + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.factories
            .insert(name.to_string(), Box::new(move || Box::new(factory())));
        Ok(())
    }

    /// Construct a fresh instance of the named plugin, if one is registered.
    pub fn resolve(&self, name: &str) -> Option<Box<dyn Plugin>> {
        self.factories.get(name).map(|factory| factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Plugin for Noop {
        fn run(&mut self, _interface: &PluginInterface) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn resolve_returns_a_fresh_instance() {
        let mut registry = PluginRegistry::new();
        registry.register("noop", || Noop).unwrap();
        assert!(registry.resolve("noop").is_some());
        assert!(registry.resolve("other").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register("noop", || Noop).unwrap();
        let err = registry.register("noop", || Noop).unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("noop".into()));
    }
}
