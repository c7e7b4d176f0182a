//! String and Bytes values.

use std::rc::Rc;

use crate::ast::BinaryOp;
use crate::value::{
    no_member, type_mismatch, unknown_operator, HashKey, MemberFunction, Native, Object, Value,
};

/// An immutable UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Str(Rc<str>);

impl Str {
    pub fn new(s: impl Into<Rc<str>>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Object for Str {
    fn type_name(&self) -> &'static str {
        "String"
    }

    fn inspect(&self) -> String {
        format!("{:?}", self.as_str())
    }

    fn display(&self) -> String {
        self.0.to_string()
    }

    fn get_member(&self, name: &str) -> Value {
        let receiver = Value::Str(self.clone());
        match name {
            "length" => Value::Integer(self.len() as i64),
            "sub" => MemberFunction::bind(receiver, "sub", string_sub),
            "upper" => MemberFunction::bind(receiver, "upper", string_upper),
            "lower" => MemberFunction::bind(receiver, "lower", string_lower),
            "replace" => MemberFunction::bind(receiver, "replace", string_replace),
            _ => no_member(name),
        }
    }

    fn infix_operation(&self, op: BinaryOp, other: &Value) -> Value {
        let right = match other {
            Value::Str(s) => s.as_str(),
            _ => {
                return match op {
                    BinaryOp::Add => Value::error(format!(
                        "Could not concat string with type [{}]",
                        other.type_name()
                    )),
                    BinaryOp::Equal => Value::Boolean(false),
                    BinaryOp::NotEqual => Value::Boolean(true),
                    _ => type_mismatch(self.type_name(), op, other),
                };
            }
        };
        let left = self.as_str();
        match op {
            BinaryOp::Add => Value::string(format!("{}{}", left, right)),
            BinaryOp::Equal => Value::Boolean(left == right),
            BinaryOp::NotEqual => Value::Boolean(left != right),
            BinaryOp::Less => Value::Boolean(left < right),
            BinaryOp::LessEqual => Value::Boolean(left <= right),
            BinaryOp::Greater => Value::Boolean(left > right),
            BinaryOp::GreaterEqual => Value::Boolean(left >= right),
            _ => unknown_operator(self.type_name(), op, other),
        }
    }

    fn equals(&self, other: &Value) -> bool {
        matches!(other, Value::Str(s) if s == self)
    }

    fn hash_key(&self) -> Option<HashKey> {
        Some(HashKey::Str(self.0.clone()))
    }

    fn native(&self) -> Option<Native> {
        Some(Native::Str(self.0.to_string()))
    }
}

fn receiver_str(receiver: &Value) -> &str {
    match receiver {
        Value::Str(s) => s.as_str(),
        _ => "",
    }
}

/// Resolve `sub(start)` / `sub(start, end)` arguments against `len`.
fn sub_range(args: &[Value], len: usize) -> Option<(usize, usize)> {
    let bound = |v: &Value| match v {
        Value::Integer(n) if *n >= 0 && (*n as usize) <= len => Some(*n as usize),
        _ => None,
    };
    match args {
        [] => Some((0, len)),
        [start] => Some((bound(start)?, len)),
        [start, end] => {
            let (start, end) = (bound(start)?, bound(end)?);
            (start <= end).then_some((start, end))
        }
        _ => None,
    }
}

fn string_sub(receiver: &Value, args: &[Value]) -> Value {
    let s = receiver_str(receiver);
    match sub_range(args, s.chars().count()) {
        Some((start, end)) => Value::string(s.chars().skip(start).take(end - start).collect::<String>()),
        None => Value::error("Could not execute sub-string operation. Invalid arguments!"),
    }
}

fn string_upper(receiver: &Value, _args: &[Value]) -> Value {
    Value::string(receiver_str(receiver).to_uppercase())
}

fn string_lower(receiver: &Value, _args: &[Value]) -> Value {
    Value::string(receiver_str(receiver).to_lowercase())
}

fn string_replace(receiver: &Value, args: &[Value]) -> Value {
    match args {
        [Value::Str(search), Value::Str(replace)] => Value::string(
            receiver_str(receiver).replace(search.as_str(), replace.as_str()),
        ),
        _ => Value::error("Could not execute string replace operation. Invalid arguments!"),
    }
}

/// An immutable byte string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytes(Rc<[u8]>);

impl Bytes {
    pub fn new(b: impl Into<Rc<[u8]>>) -> Self {
        Self(b.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Object for Bytes {
    fn type_name(&self) -> &'static str {
        "Bytes"
    }

    fn inspect(&self) -> String {
        format!("b{:?}", String::from_utf8_lossy(&self.0))
    }

    fn display(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    fn get_member(&self, name: &str) -> Value {
        let receiver = Value::Bytes(self.clone());
        match name {
            "length" => Value::Integer(self.len() as i64),
            "sub" => MemberFunction::bind(receiver, "sub", bytes_sub),
            "starts_with" => MemberFunction::bind(receiver, "starts_with", bytes_starts_with),
            "ends_with" => MemberFunction::bind(receiver, "ends_with", bytes_ends_with),
            _ => no_member(name),
        }
    }

    fn infix_operation(&self, op: BinaryOp, other: &Value) -> Value {
        let right = match other {
            Value::Bytes(b) => b.as_slice(),
            _ => {
                return match op {
                    BinaryOp::Equal => Value::Boolean(false),
                    BinaryOp::NotEqual => Value::Boolean(true),
                    _ => type_mismatch(self.type_name(), op, other),
                };
            }
        };
        let left = self.as_slice();
        match op {
            BinaryOp::Add => Value::bytes([left, right].concat()),
            BinaryOp::Equal => Value::Boolean(left == right),
            BinaryOp::NotEqual => Value::Boolean(left != right),
            BinaryOp::Less => Value::Boolean(left < right),
            BinaryOp::LessEqual => Value::Boolean(left <= right),
            BinaryOp::Greater => Value::Boolean(left > right),
            BinaryOp::GreaterEqual => Value::Boolean(left >= right),
            _ => unknown_operator(self.type_name(), op, other),
        }
    }

    fn equals(&self, other: &Value) -> bool {
        matches!(other, Value::Bytes(b) if b == self)
    }

    fn hash_key(&self) -> Option<HashKey> {
        Some(HashKey::Bytes(self.0.clone()))
    }

    fn native(&self) -> Option<Native> {
        Some(Native::Bytes(self.0.to_vec()))
    }
}

fn receiver_bytes(receiver: &Value) -> &[u8] {
    match receiver {
        Value::Bytes(b) => b.as_slice(),
        _ => &[],
    }
}

/// Bytes or String argument as raw bytes.
fn byte_argument(value: &Value) -> Option<&[u8]> {
    match value {
        Value::Bytes(b) => Some(b.as_slice()),
        Value::Str(s) => Some(s.as_str().as_bytes()),
        _ => None,
    }
}

fn bytes_sub(receiver: &Value, args: &[Value]) -> Value {
    let b = receiver_bytes(receiver);
    match sub_range(args, b.len()) {
        Some((start, end)) => Value::bytes(&b[start..end]),
        None => Value::error("Could not execute sub-string operation. Invalid arguments!"),
    }
}

fn bytes_starts_with(receiver: &Value, args: &[Value]) -> Value {
    match args {
        [prefix] => match byte_argument(prefix) {
            Some(prefix) => Value::Boolean(receiver_bytes(receiver).starts_with(prefix)),
            None => Value::error("Invalid argument for starts_with"),
        },
        _ => Value::error("Invalid argument for starts_with"),
    }
}

fn bytes_ends_with(receiver: &Value, args: &[Value]) -> Value {
    match args {
        [suffix] => match byte_argument(suffix) {
            Some(suffix) => Value::Boolean(receiver_bytes(receiver).ends_with(suffix)),
            None => Value::error("Invalid argument for ends_with"),
        },
        _ => Value::error("Invalid argument for ends_with"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call_member(receiver: &Value, name: &str, args: &[Value]) -> Value {
        match receiver.get_member(name) {
            Value::Member(member) => member.invoke(args),
            other => panic!("expected member function, got {}", other.inspect()),
        }
    }

    #[test]
    fn test_string_concat_and_compare() {
        let a = Value::string("foo");
        let b = Value::string("bar");
        assert_eq!(a.infix_operation(BinaryOp::Add, &b).display(), "foobar");
        assert_eq!(a.infix_operation(BinaryOp::Greater, &b).display(), "true");
        assert_eq!(
            a.infix_operation(BinaryOp::Add, &Value::Integer(1)).display(),
            "Could not concat string with type [Integer]"
        );
        assert!(a.infix_operation(BinaryOp::Multiply, &b).is_error());
    }

    #[test]
    fn test_display_and_inspect_differ() {
        let s = Value::string("hi");
        assert_eq!(s.display(), "hi");
        assert_eq!(s.inspect(), "\"hi\"");
    }

    #[test]
    fn test_string_members() {
        let s = Value::string("Hello");
        assert_eq!(s.get_member("length").display(), "5");
        assert_eq!(call_member(&s, "upper", &[]).display(), "HELLO");
        assert_eq!(call_member(&s, "lower", &[]).display(), "hello");
        assert_eq!(
            call_member(&s, "sub", &[Value::Integer(1), Value::Integer(3)]).display(),
            "el"
        );
        assert_eq!(call_member(&s, "sub", &[Value::Integer(2)]).display(), "llo");
        assert!(call_member(&s, "sub", &[Value::Integer(9)]).is_error());
        assert_eq!(
            call_member(&s, "replace", &[Value::string("l"), Value::string("L")]).display(),
            "HeLLo"
        );
        assert!(s.get_member("nope").is_error());
    }

    #[test]
    fn test_bytes_members() {
        let b = Value::bytes(b"abcdef".to_vec());
        assert_eq!(b.get_member("length").display(), "6");
        assert_eq!(
            call_member(&b, "starts_with", &[Value::string("abc")]).display(),
            "true"
        );
        assert_eq!(
            call_member(&b, "ends_with", &[Value::bytes(b"xyz".to_vec())]).display(),
            "false"
        );
        assert_eq!(
            call_member(&b, "sub", &[Value::Integer(4)]).inspect(),
            "b\"ef\""
        );
    }

    #[test]
    fn test_hash_keys() {
        assert_eq!(
            Value::string("k").hash_key(),
            Some(HashKey::Str(Rc::from("k")))
        );
        assert!(Value::bytes(b"k".to_vec()).hash_key().is_some());
        assert_ne!(Value::string("k").hash_key(), Value::bytes(b"k".to_vec()).hash_key());
    }
}
