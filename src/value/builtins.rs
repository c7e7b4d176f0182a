//! Builtin functions, addressed by their index in [`BUILTINS`].
//!
//! The order of the table is part of the bytecode format: `GetBuiltin`
//! operands index into it.

use crate::value::{wrong_arguments, Array, Builtin, Caller, Object, Value};

pub static BUILTINS: [Builtin; 9] = [
    Builtin::new("len", builtin_len),
    Builtin::new("puts", builtin_puts),
    Builtin::new("first", builtin_first),
    Builtin::new("last", builtin_last),
    Builtin::new("rest", builtin_rest),
    Builtin::new("push", builtin_push),
    Builtin::new("int", builtin_int),
    Builtin::new("float", builtin_float),
    Builtin::new("string", builtin_string),
];

/// Find a builtin and its index by name.
pub fn lookup_builtin(name: &str) -> Option<(usize, Builtin)> {
    BUILTINS
        .iter()
        .enumerate()
        .find(|(_, b)| b.name == name)
        .map(|(i, b)| (i, *b))
}

fn unsupported(name: &str, arg: &Value) -> Value {
    Value::error(format!(
        "argument to \"{}\" not supported, got {}",
        name,
        arg.type_name()
    ))
}

fn expect_array<'a>(name: &str, arg: &'a Value) -> Result<&'a Array, Value> {
    match arg {
        Value::Array(array) => Ok(array),
        other => Err(Value::error(format!(
            "argument to \"{}\" must be Array, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn builtin_len(_: &mut dyn Caller, args: &[Value]) -> Value {
    let [arg] = args else {
        return wrong_arguments(args.len(), 1);
    };
    match arg {
        Value::Array(a) => Value::Integer(a.len() as i64),
        Value::Str(s) => Value::Integer(s.len() as i64),
        Value::Bytes(b) => Value::Integer(b.len() as i64),
        Value::Hash(h) => Value::Integer(h.len() as i64),
        other => unsupported("len", other),
    }
}

fn builtin_puts(_: &mut dyn Caller, args: &[Value]) -> Value {
    for arg in args {
        println!("{}", arg.display());
    }
    Value::Null
}

fn builtin_first(_: &mut dyn Caller, args: &[Value]) -> Value {
    let [arg] = args else {
        return wrong_arguments(args.len(), 1);
    };
    match expect_array("first", arg) {
        Ok(array) => array.borrow().first().cloned().unwrap_or(Value::Null),
        Err(err) => err,
    }
}

fn builtin_last(_: &mut dyn Caller, args: &[Value]) -> Value {
    let [arg] = args else {
        return wrong_arguments(args.len(), 1);
    };
    match expect_array("last", arg) {
        Ok(array) => array.borrow().last().cloned().unwrap_or(Value::Null),
        Err(err) => err,
    }
}

fn builtin_rest(_: &mut dyn Caller, args: &[Value]) -> Value {
    let [arg] = args else {
        return wrong_arguments(args.len(), 1);
    };
    match expect_array("rest", arg) {
        Ok(array) => {
            let elements = array.borrow();
            if elements.is_empty() {
                Value::Null
            } else {
                Value::array(elements[1..].to_vec())
            }
        }
        Err(err) => err,
    }
}

/// Returns a new array; the argument is left untouched.
fn builtin_push(_: &mut dyn Caller, args: &[Value]) -> Value {
    let [arg, item] = args else {
        return wrong_arguments(args.len(), 2);
    };
    match expect_array("push", arg) {
        Ok(array) => {
            let mut elements = array.borrow().clone();
            elements.push(item.clone());
            Value::array(elements)
        }
        Err(err) => err,
    }
}

fn builtin_int(_: &mut dyn Caller, args: &[Value]) -> Value {
    let [arg] = args else {
        return wrong_arguments(args.len(), 1);
    };
    match arg {
        Value::Integer(n) => Value::Integer(*n),
        Value::Float(n) => Value::Integer(*n as i64),
        Value::Str(s) => s
            .as_str()
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::error("Conversion to int failed!")),
        other => unsupported("int", other),
    }
}

fn builtin_float(_: &mut dyn Caller, args: &[Value]) -> Value {
    let [arg] = args else {
        return wrong_arguments(args.len(), 1);
    };
    match arg {
        Value::Integer(n) => Value::Float(*n as f64),
        Value::Float(n) => Value::Float(*n),
        Value::Str(s) => s
            .as_str()
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::error("Conversion to float failed!")),
        other => unsupported("float", other),
    }
}

fn builtin_string(_: &mut dyn Caller, args: &[Value]) -> Value {
    let [arg] = args else {
        return wrong_arguments(args.len(), 1);
    };
    Value::string(arg.display())
}
