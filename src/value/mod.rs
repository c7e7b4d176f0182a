//! Runtime values and the capability contract they share.
//!
//! # Architecture
//!
//! - `Value`: the tagged variant the compiler and VM pass around
//! - `Object`: the capability contract, implemented once per variant payload
//! - `number`, `string`, `collections`, `function`, `scope`: the payloads
//! - `builtins`: the fixed builtin table addressed by global index
//!
//! Aggregates share ownership through `Rc` and are freed when the last
//! handle drops. Reference cycles (an array stored inside itself, or a
//! closure capturing a hash that holds it) are never freed. Rendering and
//! comparison stop at a cycle instead of recursing into it.

pub mod builtins;
pub mod collections;
pub mod function;
pub mod number;
pub mod scope;
pub mod string;

use std::fmt;
use std::rc::Rc;

use crate::ast::BinaryOp;

pub use builtins::{lookup_builtin, BUILTINS};
pub use collections::{Array, Hash};
pub use function::{Builtin, BuiltinFn, Caller, Closure, CompiledFunction, MemberFn, MemberFunction};
pub use number::Null;
pub use scope::Scope;
pub use string::{Bytes, Str};

/// The capability contract every runtime value satisfies.
///
/// Domain errors (bad operand kinds, missing members) are returned as
/// [`Value::Error`], never raised.
pub trait Object {
    /// Type tag, e.g. `Integer`.
    fn type_name(&self) -> &'static str;

    /// Machine-oriented rendering: strings are quoted.
    fn inspect(&self) -> String;

    /// Human-oriented rendering.
    fn display(&self) -> String {
        self.inspect()
    }

    fn get_member(&self, name: &str) -> Value {
        no_member(name)
    }

    fn set_member(&self, name: &str, _value: Value) -> Value {
        no_member(name)
    }

    /// Apply `self op other`.
    fn infix_operation(&self, op: BinaryOp, other: &Value) -> Value {
        match op {
            BinaryOp::Equal => Value::Boolean(self.equals(other)),
            BinaryOp::NotEqual => Value::Boolean(!self.equals(other)),
            _ => type_mismatch(self.type_name(), op, other),
        }
    }

    /// Structural equality.
    fn equals(&self, other: &Value) -> bool;

    /// Key used when this value indexes a hash. `None` if unhashable.
    fn hash_key(&self) -> Option<HashKey> {
        None
    }

    /// Host-side representation, when one exists.
    fn native(&self) -> Option<Native> {
        None
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    Str(Str),
    Bytes(Bytes),
    Array(Array),
    Hash(Hash),
    Error(ErrorValue),
    Function(Rc<CompiledFunction>),
    Builtin(Builtin),
    Member(Rc<MemberFunction>),
    Closure(Rc<Closure>),
    Scope(Rc<Scope>),
}

/// Hash keys for hashable values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
}

/// Host representation of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Native {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Array(Vec<Native>),
    Hash(Vec<(Native, Native)>),
}

/// An error carried as data.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue(Rc<str>);

impl ErrorValue {
    pub fn new(message: impl Into<Rc<str>>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl Object for ErrorValue {
    fn type_name(&self) -> &'static str {
        "Error"
    }

    fn inspect(&self) -> String {
        format!("ERROR: {}", self.0)
    }

    fn display(&self) -> String {
        self.0.to_string()
    }

    fn equals(&self, other: &Value) -> bool {
        matches!(other, Value::Error(e) if e == self)
    }
}

macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Value::Integer($inner) => $body,
            Value::Float($inner) => $body,
            Value::Boolean($inner) => $body,
            Value::Null => {
                let $inner = &Null;
                $body
            }
            Value::Str($inner) => $body,
            Value::Bytes($inner) => $body,
            Value::Array($inner) => $body,
            Value::Hash($inner) => $body,
            Value::Error($inner) => $body,
            Value::Function($inner) => $body,
            Value::Builtin($inner) => $body,
            Value::Member($inner) => $body,
            Value::Closure($inner) => $body,
            Value::Scope($inner) => $body,
        }
    };
}

impl Object for Value {
    fn type_name(&self) -> &'static str {
        dispatch!(self, v => v.type_name())
    }

    fn inspect(&self) -> String {
        dispatch!(self, v => v.inspect())
    }

    fn display(&self) -> String {
        dispatch!(self, v => v.display())
    }

    fn get_member(&self, name: &str) -> Value {
        dispatch!(self, v => v.get_member(name))
    }

    fn set_member(&self, name: &str, value: Value) -> Value {
        dispatch!(self, v => v.set_member(name, value))
    }

    fn infix_operation(&self, op: BinaryOp, other: &Value) -> Value {
        dispatch!(self, v => v.infix_operation(op, other))
    }

    fn equals(&self, other: &Value) -> bool {
        dispatch!(self, v => v.equals(other))
    }

    fn hash_key(&self) -> Option<HashKey> {
        dispatch!(self, v => v.hash_key())
    }

    fn native(&self) -> Option<Native> {
        dispatch!(self, v => v.native())
    }
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::Str(Str::new(s))
    }

    pub fn bytes(b: impl Into<Rc<[u8]>>) -> Self {
        Value::Bytes(Bytes::new(b))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Array::new(elements))
    }

    pub fn error(message: impl Into<Rc<str>>) -> Self {
        Value::Error(ErrorValue::new(message))
    }

    /// `false` and Null are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Null => false,
            _ => true,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Equality used for constant-pool deduplication: same kind and
    /// structurally equal. Floats compare bitwise so `0.0` and `-0.0`
    /// stay distinct.
    pub fn same_constant(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self.type_name() == other.type_name() && self.equals(other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.same_constant(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Value::array(elements)
    }
}

pub(crate) fn no_member(name: &str) -> Value {
    Value::error(format!("No member named [{}]", name))
}

pub(crate) fn type_mismatch(left: &str, op: BinaryOp, right: &Value) -> Value {
    Value::error(format!(
        "type mismatch: {} {} {}",
        left,
        op,
        right.type_name()
    ))
}

pub(crate) fn unknown_operator(left: &str, op: BinaryOp, right: &Value) -> Value {
    Value::error(format!(
        "unknown operator: {} {} {}",
        left,
        op,
        right.type_name()
    ))
}

pub(crate) fn wrong_arguments(got: usize, want: usize) -> Value {
    Value::error(format!(
        "wrong number of arguments. got={}, want={}",
        got, want
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truthiness() {
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::string("").is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::error("boom").is_truthy());
    }

    #[test]
    fn test_error_values_are_data() {
        let err = Value::Integer(1).infix_operation(BinaryOp::Add, &Value::string("a"));
        assert!(err.is_error());
        assert_eq!(err.display(), "type mismatch: Integer + String");
        assert_eq!(err.inspect(), "ERROR: type mismatch: Integer + String");
        assert_eq!(err.type_name(), "Error");
    }

    #[test]
    fn test_missing_member_is_error_value() {
        let result = Value::Integer(3).get_member("length");
        assert_eq!(result.display(), "No member named [length]");
        let result = Value::Boolean(true).set_member("x", Value::Null);
        assert!(result.is_error());
    }

    #[test]
    fn test_same_constant_respects_kind() {
        assert!(Value::Integer(1).equals(&Value::Float(1.0)));
        assert!(!Value::Integer(1).same_constant(&Value::Float(1.0)));
        assert!(!Value::Float(0.0).same_constant(&Value::Float(-0.0)));
        assert!(Value::string("a").same_constant(&Value::string("a")));
    }

    #[test]
    fn test_default_equality_operators() {
        let t = Value::Boolean(true);
        assert_eq!(
            t.infix_operation(BinaryOp::Equal, &Value::Boolean(true))
                .display(),
            "true"
        );
        assert_eq!(
            Value::Null
                .infix_operation(BinaryOp::NotEqual, &Value::Null)
                .display(),
            "false"
        );
        assert!(t
            .infix_operation(BinaryOp::Add, &Value::Boolean(false))
            .is_error());
    }
}
