//! Callable values: compiled functions, closures, builtins and bound
//! member functions.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::value::{Object, Value};

/// A function body compiled to bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub instructions: Vec<u8>,
    /// Slots reserved above the frame base, parameters included
    pub num_locals: usize,
    pub num_parameters: usize,
    /// Scope blocks carry their scope name
    pub name: Option<String>,
}

impl CompiledFunction {
    pub fn new(instructions: Vec<u8>, num_locals: usize, num_parameters: usize) -> Self {
        Self {
            instructions,
            num_locals,
            num_parameters,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Object for CompiledFunction {
    fn type_name(&self) -> &'static str {
        "CompiledFunction"
    }

    fn inspect(&self) -> String {
        format!("CompiledFunction[{}]", self.name.as_deref().unwrap_or("fn"))
    }

    fn equals(&self, other: &Value) -> bool {
        matches!(other, Value::Function(f) if f.as_ref() == self)
    }
}

/// A compiled function plus its captured values and export table.
#[derive(Debug)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: RefCell<Vec<Value>>,
    pub exports: RefCell<IndexMap<String, Value>>,
}

impl Closure {
    pub fn new(function: Rc<CompiledFunction>, free: Vec<Value>) -> Self {
        Self {
            function,
            free: RefCell::new(free),
            exports: RefCell::new(IndexMap::new()),
        }
    }
}

impl Object for Closure {
    fn type_name(&self) -> &'static str {
        "Closure"
    }

    fn inspect(&self) -> String {
        format!(
            "Closure[{}, free={}]",
            self.function.name.as_deref().unwrap_or("fn"),
            self.free.borrow().len()
        )
    }

    fn display(&self) -> String {
        match &self.function.name {
            Some(name) => format!("closure {}", name),
            None => "closure".to_string(),
        }
    }

    fn equals(&self, other: &Value) -> bool {
        matches!(other, Value::Closure(c) if std::ptr::eq(c.as_ref(), self))
    }
}

/// Handle a native function uses to call back into compiled code.
pub trait Caller {
    fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value, RuntimeError>;
}

/// Signature of builtin functions. Null is returned for "no result".
pub type BuiltinFn = fn(&mut dyn Caller, &[Value]) -> Value;

/// A native function.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Builtin {
    pub const fn new(name: &'static str, func: BuiltinFn) -> Self {
        Self { name, func }
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

impl Object for Builtin {
    fn type_name(&self) -> &'static str {
        "Builtin"
    }

    fn inspect(&self) -> String {
        "builtin function".to_string()
    }

    fn equals(&self, other: &Value) -> bool {
        matches!(other, Value::Builtin(b) if b.name == self.name)
    }
}

/// Signature of member functions: receiver, arguments.
pub type MemberFn = fn(&Value, &[Value]) -> Value;

/// A method bound to its receiver, e.g. `"abc".upper`.
pub struct MemberFunction {
    pub receiver: Value,
    pub name: &'static str,
    pub func: MemberFn,
}

impl MemberFunction {
    pub fn bind(receiver: Value, name: &'static str, func: MemberFn) -> Value {
        Value::Member(Rc::new(Self {
            receiver,
            name,
            func,
        }))
    }

    pub fn invoke(&self, args: &[Value]) -> Value {
        (self.func)(&self.receiver, args)
    }
}

impl fmt::Debug for MemberFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberFunction({}.{})", self.receiver.type_name(), self.name)
    }
}

impl Object for MemberFunction {
    fn type_name(&self) -> &'static str {
        "MemberFunction"
    }

    fn inspect(&self) -> String {
        "member function".to_string()
    }

    fn equals(&self, other: &Value) -> bool {
        matches!(other, Value::Member(m) if std::ptr::eq(m.as_ref(), self))
    }
}
