//! The `math` module.

use std::f64::consts;

use crate::value::{wrong_arguments, Builtin, Caller, Object, Scope, Value};

pub fn scope() -> Scope {
    Scope::new("math")
        .with("PI", consts::PI)
        .with("E", consts::E)
        .with("sin", Value::Builtin(Builtin::new("sin", math_sin)))
        .with("cos", Value::Builtin(Builtin::new("cos", math_cos)))
        .with("sqrt", Value::Builtin(Builtin::new("sqrt", math_sqrt)))
        .with("abs", Value::Builtin(Builtin::new("abs", math_abs)))
}

fn float_argument(name: &str, args: &[Value]) -> Result<f64, Value> {
    match args {
        [Value::Float(n)] => Ok(*n),
        [Value::Integer(n)] => Ok(*n as f64),
        [other] => Err(Value::error(format!(
            "argument to \"{}\" must be numeric, got {}",
            name,
            other.type_name()
        ))),
        _ => Err(wrong_arguments(args.len(), 1)),
    }
}

fn math_sin(_: &mut dyn Caller, args: &[Value]) -> Value {
    float_argument("sin", args).map_or_else(|e| e, |n| Value::Float(n.sin()))
}

fn math_cos(_: &mut dyn Caller, args: &[Value]) -> Value {
    float_argument("cos", args).map_or_else(|e| e, |n| Value::Float(n.cos()))
}

fn math_sqrt(_: &mut dyn Caller, args: &[Value]) -> Value {
    float_argument("sqrt", args).map_or_else(|e| e, |n| Value::Float(n.sqrt()))
}

/// Integers stay integers.
fn math_abs(_: &mut dyn Caller, args: &[Value]) -> Value {
    match args {
        [Value::Integer(n)] => Value::Integer(n.wrapping_abs()),
        _ => float_argument("abs", args).map_or_else(|e| e, |n| Value::Float(n.abs())),
    }
}
