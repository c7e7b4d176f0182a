//! Array and Hash values.
//!
//! Both are shared, mutable aggregates: copies of a value alias the same
//! storage, so index and member assignment are visible through every copy.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::thread::LocalKey;

use indexmap::IndexMap;

use crate::ast::BinaryOp;
use crate::value::{no_member, type_mismatch, HashKey, Native, Object, Value};

/// Insertion-ordered hash storage: key -> (original key, value).
pub type HashPairs = IndexMap<HashKey, (Value, Value), ahash::RandomState>;

thread_local! {
    /// Aggregates on the current render or conversion path.
    static VISITING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    /// Aggregate pairs currently being compared.
    static COMPARING: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` with `key` marked active. `None` if `key` is already active,
/// which means the aggregate contains itself.
fn unless_active<K, T>(
    active: &'static LocalKey<RefCell<Vec<K>>>,
    key: K,
    f: impl FnOnce() -> T,
) -> Option<T>
where
    K: PartialEq + Copy + 'static,
{
    let entered = active.with(|keys| {
        let mut keys = keys.borrow_mut();
        if keys.contains(&key) {
            return false;
        }
        keys.push(key);
        true
    });
    if !entered {
        return None;
    }
    let result = f();
    active.with(|keys| keys.borrow_mut().pop());
    Some(result)
}

/// A growable array.
#[derive(Debug, Clone)]
pub struct Array(Rc<RefCell<Vec<Value>>>);

impl Array {
    pub fn new(elements: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(elements)))
    }

    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl Object for Array {
    fn type_name(&self) -> &'static str {
        "Array"
    }

    fn inspect(&self) -> String {
        unless_active(&VISITING, self.addr(), || {
            let elements: Vec<String> = self.borrow().iter().map(|e| e.inspect()).collect();
            format!("[{}]", elements.join(", "))
        })
        .unwrap_or_else(|| "[...]".to_string())
    }

    fn get_member(&self, name: &str) -> Value {
        match name {
            "length" => Value::Integer(self.len() as i64),
            _ => no_member(name),
        }
    }

    fn infix_operation(&self, op: BinaryOp, other: &Value) -> Value {
        match (op, other) {
            (BinaryOp::Add, Value::Array(right)) => {
                let mut elements = self.borrow().clone();
                elements.extend(right.borrow().iter().cloned());
                Value::array(elements)
            }
            (BinaryOp::Equal, _) => Value::Boolean(self.equals(other)),
            (BinaryOp::NotEqual, _) => Value::Boolean(!self.equals(other)),
            _ => type_mismatch(self.type_name(), op, other),
        }
    }

    fn equals(&self, other: &Value) -> bool {
        let Value::Array(other) = other else {
            return false;
        };
        if self.ptr_eq(other) {
            return true;
        }
        // a pair met again inside its own comparison is assumed equal
        unless_active(&COMPARING, (self.addr(), other.addr()), || {
            let (left, right) = (self.borrow(), other.borrow());
            left.len() == right.len() && left.iter().zip(right.iter()).all(|(a, b)| a.equals(b))
        })
        .unwrap_or(true)
    }

    fn native(&self) -> Option<Native> {
        unless_active(&VISITING, self.addr(), || {
            self.borrow()
                .iter()
                .map(|e| e.native())
                .collect::<Option<Vec<_>>>()
                .map(Native::Array)
        })
        .flatten()
    }
}

/// A hash map keyed by hashable values.
#[derive(Debug, Clone)]
pub struct Hash(Rc<RefCell<HashPairs>>);

impl Hash {
    pub fn new(pairs: HashPairs) -> Self {
        Self(Rc::new(RefCell::new(pairs)))
    }

    /// Build a hash, failing with the type name of the first unhashable key.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Value, Value)>,
    ) -> Result<Self, &'static str> {
        let mut map = HashPairs::default();
        for (key, value) in pairs {
            let hashed = key.hash_key().ok_or_else(|| key.type_name())?;
            map.insert(hashed, (key, value));
        }
        Ok(Self::new(map))
    }

    pub fn get(&self, key: &HashKey) -> Option<Value> {
        self.0.borrow().get(key).map(|(_, value)| value.clone())
    }

    pub fn insert(&self, key: Value, value: Value) -> Result<(), &'static str> {
        let hashed = key.hash_key().ok_or_else(|| key.type_name())?;
        self.0.borrow_mut().insert(hashed, (key, value));
        Ok(())
    }

    pub fn borrow(&self) -> Ref<'_, HashPairs> {
        self.0.borrow()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl Object for Hash {
    fn type_name(&self) -> &'static str {
        "Hash"
    }

    fn inspect(&self) -> String {
        unless_active(&VISITING, self.addr(), || {
            let pairs: Vec<String> = self
                .borrow()
                .values()
                .map(|(k, v)| format!("{}: {}", k.inspect(), v.inspect()))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        })
        .unwrap_or_else(|| "{...}".to_string())
    }

    fn get_member(&self, name: &str) -> Value {
        if name == "length" {
            return Value::Integer(self.len() as i64);
        }
        self.get(&HashKey::Str(Rc::from(name)))
            .unwrap_or_else(|| no_member(name))
    }

    fn set_member(&self, name: &str, value: Value) -> Value {
        self.0.borrow_mut().insert(
            HashKey::Str(Rc::from(name)),
            (Value::string(name), value.clone()),
        );
        value
    }

    fn equals(&self, other: &Value) -> bool {
        let Value::Hash(other) = other else {
            return false;
        };
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        unless_active(&COMPARING, (self.addr(), other.addr()), || {
            let (left, right) = (self.borrow(), other.borrow());
            left.len() == right.len()
                && left.iter().all(|(key, (_, value))| {
                    right
                        .get(key)
                        .is_some_and(|(_, other_value)| value.equals(other_value))
                })
        })
        .unwrap_or(true)
    }

    fn native(&self) -> Option<Native> {
        unless_active(&VISITING, self.addr(), || {
            self.borrow()
                .values()
                .map(|(k, v)| Some((k.native()?, v.native()?)))
                .collect::<Option<Vec<_>>>()
                .map(Native::Hash)
        })
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_array_concat_and_equality() {
        let a = Value::array(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::array(vec![Value::Integer(3)]);
        let joined = a.infix_operation(BinaryOp::Add, &b);
        assert_eq!(joined.inspect(), "[1, 2, 3]");
        assert!(joined.equals(&Value::array(vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3)
        ])));
        assert!(!a.equals(&b));
        assert_eq!(a.get_member("length").display(), "2");
    }

    #[test]
    fn test_aliasing() {
        let a = Array::new(vec![Value::Integer(1)]);
        let alias = Value::Array(a.clone());
        a.borrow_mut().push(Value::Integer(2));
        assert_eq!(alias.inspect(), "[1, 2]");
    }

    #[test]
    fn test_hash_members_and_order() {
        let hash = Hash::from_pairs(vec![
            (Value::string("b"), Value::Integer(2)),
            (Value::string("a"), Value::Integer(1)),
        ])
        .unwrap();
        let value = Value::Hash(hash.clone());
        assert_eq!(value.inspect(), "{\"b\": 2, \"a\": 1}");
        assert_eq!(value.get_member("a").display(), "1");
        assert_eq!(value.get_member("length").display(), "2");
        assert!(value.get_member("zzz").is_error());

        value.set_member("c", Value::Boolean(true));
        assert_eq!(hash.get(&HashKey::Str(Rc::from("c"))).unwrap().display(), "true");
    }

    #[test]
    fn test_unhashable_key() {
        let result = Hash::from_pairs(vec![(Value::array(vec![]), Value::Null)]);
        assert_eq!(result.err(), Some("Array"));
    }

    #[test]
    fn test_hash_equality_ignores_order() {
        let a = Hash::from_pairs(vec![
            (Value::Integer(1), Value::string("x")),
            (Value::Integer(2), Value::string("y")),
        ])
        .unwrap();
        let b = Hash::from_pairs(vec![
            (Value::Integer(2), Value::string("y")),
            (Value::Integer(1), Value::string("x")),
        ])
        .unwrap();
        assert!(Value::Hash(a).equals(&Value::Hash(b)));
    }

    #[test]
    fn test_native_conversion() {
        let value = Value::array(vec![Value::Integer(1), Value::string("a")]);
        assert_eq!(
            value.native(),
            Some(Native::Array(vec![Native::Integer(1), Native::Str("a".into())]))
        );
        let closure_like = Value::array(vec![Value::error("x")]);
        assert_eq!(closure_like.native(), None);
    }

    fn self_referential_array() -> Array {
        let array = Array::new(vec![Value::Integer(0)]);
        array.borrow_mut()[0] = Value::Array(array.clone());
        array
    }

    #[test]
    fn test_cyclic_array() {
        let a = self_referential_array();
        let b = self_referential_array();
        assert_eq!(Value::Array(a.clone()).inspect(), "[[...]]");
        assert!(Value::Array(a.clone()).equals(&Value::Array(b)));
        assert_eq!(Value::Array(a.clone()).native(), None);

        // the guard is released once rendering finishes
        let outer = Value::array(vec![Value::Array(a.clone()), Value::Array(a)]);
        assert_eq!(outer.inspect(), "[[[...]], [[...]]]");
    }

    #[test]
    fn test_cyclic_hash() {
        let hash = Hash::from_pairs(vec![(Value::string("self"), Value::Null)]).unwrap();
        let value = Value::Hash(hash.clone());
        value.set_member("self", value.clone());
        assert_eq!(value.inspect(), "{\"self\": {...}}");

        let other = Hash::from_pairs(vec![(Value::string("self"), Value::Null)]).unwrap();
        let other = Value::Hash(other);
        other.set_member("self", other.clone());
        assert!(value.equals(&other));

        other.set_member("extra", Value::Integer(1));
        assert!(!value.equals(&other));
    }
}
