//! Integer, Float, Boolean and Null.
//!
//! Mixed Integer/Float arithmetic promotes to Float; only Integer op Integer
//! stays Integer.

use crate::ast::BinaryOp;
use crate::value::{type_mismatch, HashKey, Native, Object, Value};

/// Payload marker for [`Value::Null`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Null;

impl Object for i64 {
    fn type_name(&self) -> &'static str {
        "Integer"
    }

    fn inspect(&self) -> String {
        self.to_string()
    }

    fn infix_operation(&self, op: BinaryOp, other: &Value) -> Value {
        match other {
            Value::Integer(right) => integer_op(*self, op, *right),
            Value::Float(right) => float_op(*self as f64, op, *right),
            _ => match op {
                BinaryOp::Equal => Value::Boolean(false),
                BinaryOp::NotEqual => Value::Boolean(true),
                _ => type_mismatch(self.type_name(), op, other),
            },
        }
    }

    fn equals(&self, other: &Value) -> bool {
        match other {
            Value::Integer(n) => self == n,
            Value::Float(n) => *self as f64 == *n,
            _ => false,
        }
    }

    fn hash_key(&self) -> Option<HashKey> {
        Some(HashKey::Integer(*self))
    }

    fn native(&self) -> Option<Native> {
        Some(Native::Integer(*self))
    }
}

impl Object for f64 {
    fn type_name(&self) -> &'static str {
        "Float"
    }

    fn inspect(&self) -> String {
        format!("{:.6}", self)
    }

    fn infix_operation(&self, op: BinaryOp, other: &Value) -> Value {
        match other {
            Value::Integer(right) => float_op(*self, op, *right as f64),
            Value::Float(right) => float_op(*self, op, *right),
            _ => match op {
                BinaryOp::Equal => Value::Boolean(false),
                BinaryOp::NotEqual => Value::Boolean(true),
                _ => type_mismatch(self.type_name(), op, other),
            },
        }
    }

    fn equals(&self, other: &Value) -> bool {
        match other {
            Value::Float(n) => self == n,
            Value::Integer(n) => *self == *n as f64,
            _ => false,
        }
    }

    fn native(&self) -> Option<Native> {
        Some(Native::Float(*self))
    }
}

impl Object for bool {
    fn type_name(&self) -> &'static str {
        "Boolean"
    }

    fn inspect(&self) -> String {
        self.to_string()
    }

    fn equals(&self, other: &Value) -> bool {
        matches!(other, Value::Boolean(b) if b == self)
    }

    fn hash_key(&self) -> Option<HashKey> {
        Some(HashKey::Boolean(*self))
    }

    fn native(&self) -> Option<Native> {
        Some(Native::Boolean(*self))
    }
}

impl Object for Null {
    fn type_name(&self) -> &'static str {
        "Null"
    }

    fn inspect(&self) -> String {
        "null".to_string()
    }

    fn equals(&self, other: &Value) -> bool {
        matches!(other, Value::Null)
    }

    fn native(&self) -> Option<Native> {
        Some(Native::Null)
    }
}

fn integer_op(left: i64, op: BinaryOp, right: i64) -> Value {
    match op {
        BinaryOp::Add => Value::Integer(left.wrapping_add(right)),
        BinaryOp::Subtract => Value::Integer(left.wrapping_sub(right)),
        BinaryOp::Multiply => Value::Integer(left.wrapping_mul(right)),
        BinaryOp::Divide if right == 0 => Value::error("division by zero"),
        BinaryOp::Divide => Value::Integer(left.wrapping_div(right)),
        BinaryOp::Modulo if right == 0 => Value::error("division by zero"),
        BinaryOp::Modulo => Value::Integer(left.wrapping_rem(right)),
        BinaryOp::Equal => Value::Boolean(left == right),
        BinaryOp::NotEqual => Value::Boolean(left != right),
        BinaryOp::Less => Value::Boolean(left < right),
        BinaryOp::LessEqual => Value::Boolean(left <= right),
        BinaryOp::Greater => Value::Boolean(left > right),
        BinaryOp::GreaterEqual => Value::Boolean(left >= right),
    }
}

fn float_op(left: f64, op: BinaryOp, right: f64) -> Value {
    match op {
        BinaryOp::Add => Value::Float(left + right),
        BinaryOp::Subtract => Value::Float(left - right),
        BinaryOp::Multiply => Value::Float(left * right),
        BinaryOp::Divide => Value::Float(left / right),
        BinaryOp::Modulo => Value::Float(left % right),
        BinaryOp::Equal => Value::Boolean(left == right),
        BinaryOp::NotEqual => Value::Boolean(left != right),
        BinaryOp::Less => Value::Boolean(left < right),
        BinaryOp::LessEqual => Value::Boolean(left <= right),
        BinaryOp::Greater => Value::Boolean(left > right),
        BinaryOp::GreaterEqual => Value::Boolean(left >= right),
    }
}
