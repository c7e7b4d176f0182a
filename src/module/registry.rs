//! In-process module registry.
//!
//! Modules registered here are resolved before anything on disk.

use std::collections::HashMap;
use std::fmt;

use crate::value::Scope;

/// Parameterless factory producing a module's export table.
pub type ModuleFactory = fn() -> Scope;

/// Statically registered modules, keyed by name.
#[derive(Clone)]
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register (or replace) a module.
    pub fn register(&mut self, name: impl Into<String>, factory: ModuleFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build the named module's scope. The scope is named after the lookup key.
    pub fn instantiate(&self, name: &str) -> Option<Scope> {
        let factory = self.factories.get(name)?;
        let mut scope = factory();
        scope.name = name.to_string();
        Some(scope)
    }
}

/// The registry shipped with the crate: `math`.
impl Default for ModuleRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("math", super::math::scope);
        registry
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ModuleRegistry").field("modules", &names).finish()
    }
}
