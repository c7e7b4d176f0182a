//! Bytecode chunk: the compiled output of one compile unit.
//!
//! A chunk is also the on-disk artifact. It encodes to MessagePack; module
//! scopes in the constant pool are stored by name and rebuilt from a
//! [`ModuleRegistry`] when decoding.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ArtifactError, BriskError};
use crate::module::ModuleRegistry;
use crate::value::{CompiledFunction, Object, Value};

/// Instructions of the top-level program plus the constant pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub instructions: Vec<u8>,
    pub constants: Vec<Value>,
}

/// Serializable form of a constant-pool entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Constant {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    Str(String),
    Bytes(Vec<u8>),
    Function(CompiledFunction),
    Module(String),
}

#[derive(Serialize, Deserialize)]
struct Artifact {
    instructions: Vec<u8>,
    constants: Vec<Constant>,
}

impl Chunk {
    pub fn new(instructions: Vec<u8>, constants: Vec<Value>) -> Self {
        Self {
            instructions,
            constants,
        }
    }

    /// Encode to MessagePack.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        let constants = self
            .constants
            .iter()
            .map(to_constant)
            .collect::<Result<Vec<_>, _>>()?;
        let artifact = Artifact {
            instructions: self.instructions.clone(),
            constants,
        };
        Ok(rmp_serde::to_vec(&artifact)?)
    }

    /// Decode from MessagePack, rebuilding module scopes from `registry`.
    pub fn from_bytes(bytes: &[u8], registry: &ModuleRegistry) -> Result<Self, ArtifactError> {
        let artifact: Artifact = rmp_serde::from_slice(bytes)?;
        let constants = artifact
            .constants
            .into_iter()
            .map(|c| from_constant(c, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(artifact.instructions, constants))
    }

    pub fn save(&self, path: &Path) -> Result<(), BriskError> {
        let bytes = self.to_bytes()?;
        fs::write(path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "chunk saved");
        Ok(())
    }

    pub fn load(path: &Path, registry: &ModuleRegistry) -> Result<Self, BriskError> {
        let bytes = fs::read(path)?;
        let chunk = Self::from_bytes(&bytes, registry)?;
        debug!(
            path = %path.display(),
            constants = chunk.constants.len(),
            "chunk loaded"
        );
        Ok(chunk)
    }
}

fn to_constant(value: &Value) -> Result<Constant, ArtifactError> {
    let constant = match value {
        Value::Integer(n) => Constant::Integer(*n),
        Value::Float(n) => Constant::Float(*n),
        Value::Boolean(b) => Constant::Boolean(*b),
        Value::Null => Constant::Null,
        Value::Str(s) => Constant::Str(s.as_str().to_string()),
        Value::Bytes(b) => Constant::Bytes(b.as_slice().to_vec()),
        Value::Function(f) => Constant::Function(f.as_ref().clone()),
        Value::Scope(scope) => Constant::Module(scope.name.clone()),
        other => return Err(ArtifactError::Unsupported(other.type_name())),
    };
    Ok(constant)
}

fn from_constant(constant: Constant, registry: &ModuleRegistry) -> Result<Value, ArtifactError> {
    let value = match constant {
        Constant::Integer(n) => Value::Integer(n),
        Constant::Float(n) => Value::Float(n),
        Constant::Boolean(b) => Value::Boolean(b),
        Constant::Null => Value::Null,
        Constant::Str(s) => Value::string(s),
        Constant::Bytes(b) => Value::bytes(b),
        Constant::Function(f) => Value::Function(Rc::new(f)),
        Constant::Module(name) => match registry.instantiate(&name) {
            Some(scope) => Value::Scope(Rc::new(scope)),
            None => return Err(ArtifactError::UnknownModule(name)),
        },
    };
    Ok(value)
}
