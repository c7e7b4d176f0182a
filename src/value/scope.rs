//! First-class namespaces.
//!
//! A Scope is produced by a scope block (from the running closure's export
//! table) or by a native module factory.

use indexmap::IndexMap;

use crate::value::{no_member, Object, Value};

/// A named export table.
#[derive(Debug, Clone)]
pub struct Scope {
    pub name: String,
    pub exports: IndexMap<String, Value>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exports: IndexMap::new(),
        }
    }

    /// Builder-style export, used by module factories.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.exports.insert(name.to_string(), value.into());
        self
    }
}

impl Object for Scope {
    fn type_name(&self) -> &'static str {
        "Scope"
    }

    fn inspect(&self) -> String {
        format!("Scope[{}]", self.name)
    }

    fn get_member(&self, name: &str) -> Value {
        self.exports
            .get(name)
            .cloned()
            .unwrap_or_else(|| no_member(name))
    }

    fn equals(&self, other: &Value) -> bool {
        let Value::Scope(other) = other else {
            return false;
        };
        self.name == other.name
            && self.exports.len() == other.exports.len()
            && self
                .exports
                .iter()
                .all(|(k, v)| other.exports.get(k).is_some_and(|o| v.equals(o)))
    }
}
