//! The data-interchange value universe (SPEC_FULL.md §3 "Value universe").
//!
//! `Value` is the subset of the sandbox's value universe that can cross a
//! serialization boundary: state snapshots, rendered diffs, event payloads,
//! and message content all bottom out in `Value`. Runtime-only values that
//! cannot be serialized — user functions, closures, bound host objects,
//! module capability tokens — live in `agex-dsl`'s `RuntimeValue`, which
//! embeds this type for its data-bearing cases and converts to/from it at
//! the state-commit boundary.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Any data value that can be read or written in the sandbox and persisted
/// to state. The three mutable container kinds (`list`, `set`, `dict`) use
/// `Rc<RefCell<_>>` so that two bindings to "the same list" alias the way
/// Python references do: `let x = state.get("x"); x.append(4);` mutates
/// the one backing allocation, which is exactly what makes the versioned
/// store's mutation detection (SPEC_FULL.md §4.3) observable. `tuple` and
/// `bytes` are immutable in Python and need no such aliasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Rc<Vec<u8>>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Set(Rc<RefCell<ValueSet>>),
    Dict(Rc<RefCell<ValueMap>>),
}

/// An insertion-order-preserving set of values, matching Python `set`
/// iteration behavior closely enough for rendering and equality checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueSet(pub IndexSet<OrderedValue>);

/// An insertion-order-preserving map, matching Python `dict` semantics
/// (iteration order is insertion order, not sorted).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueMap(pub IndexMap<OrderedValue, Value>);

/// A wrapper giving `Value` the `Eq`/`Hash`/`Ord` needed to live inside a
/// set or as a dict key. Floats use bit-pattern equality (Python requires
/// hashable keys to be consistently comparable; NaN keys are pathological
/// in both languages and are accepted as "equal to itself by bit pattern"
/// here rather than rejected outright).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedValue(pub Value);

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        values_equal(&self.0, &other.0)
    }
}
impl Eq for OrderedValue {}

impl std::hash::Hash for OrderedValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn hash_value<H: std::hash::Hasher>(v: &Value, state: &mut H) {
    use std::hash::Hash;
    match v {
        Value::None => 0u8.hash(state),
        Value::Bool(b) => (1u8, b).hash(state),
        Value::Int(i) => (2u8, i).hash(state),
        Value::Float(f) => (3u8, f.to_bits()).hash(state),
        Value::Str(s) => (4u8, s).hash(state),
        Value::Bytes(b) => (5u8, b.as_slice()).hash(state),
        Value::Tuple(items) => {
            6u8.hash(state);
            for i in items.iter() {
                hash_value(i, state);
            }
        }
        // List/Set/Dict are unhashable in Python; hashing them here only
        // happens if a caller mistakenly tries to use one as a dict key,
        // which is rejected earlier by the evaluator's type checks. Fall
        // back to a constant bucket rather than panicking.
        Value::List(_) | Value::Set(_) | Value::Dict(_) => 7u8.hash(state),
    }
}

/// Structural equality over the value universe. Aliased containers (two
/// `Rc`s pointing at the one allocation) compare equal by content, same as
/// two distinct Python lists with equal elements.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => *x as f64 == *y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| values_equal(a, b))
        }
        (Value::Set(x), Value::Set(y)) => x.borrow().0 == y.borrow().0,
        (Value::Dict(x), Value::Dict(y)) => x.borrow().0 == y.borrow().0,
        _ => false,
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn set(items: ValueSet) -> Self {
        Value::Set(Rc::new(RefCell::new(items)))
    }

    pub fn dict(items: ValueMap) -> Self {
        Value::Dict(Rc::new(RefCell::new(items)))
    }

    pub fn bytes(b: Vec<u8>) -> Self {
        Value::Bytes(Rc::new(b))
    }

    /// A structural clone that shares no `Rc` allocations with `self`
    /// (Python's deep-copy semantics, used when state hands inputs to a
    /// fresh task invocation).
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::None => Value::None,
            Value::Bool(b) => Value::Bool(*b),
            Value::Int(i) => Value::Int(*i),
            Value::Float(f) => Value::Float(*f),
            Value::Str(s) => Value::Str(s.clone()),
            Value::Bytes(b) => Value::Bytes(Rc::new((**b).clone())),
            Value::Tuple(items) => Value::tuple(items.iter().map(Value::deep_clone).collect()),
            Value::List(items) => Value::list(items.borrow().iter().map(Value::deep_clone).collect()),
            Value::Set(s) => {
                let cloned: IndexSet<OrderedValue> = s
                    .borrow()
                    .0
                    .iter()
                    .map(|v| OrderedValue(v.0.deep_clone()))
                    .collect();
                Value::set(ValueSet(cloned))
            }
            Value::Dict(d) => {
                let cloned: IndexMap<OrderedValue, Value> = d
                    .borrow()
                    .0
                    .iter()
                    .map(|(k, v)| (OrderedValue(k.0.deep_clone()), v.deep_clone()))
                    .collect();
                Value::dict(ValueMap(cloned))
            }
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Tuple(l) => !l.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Set(s) => !s.borrow().0.is_empty(),
            Value::Dict(d) => !d.borrow().0.is_empty(),
        }
    }

    /// Converts an arbitrary `serde_json::Value` into our value universe,
    /// the bridge a task's typed `In`/`Out` round-trips through on its way
    /// into `inputs` or out of `task_success(v)` (SPEC_FULL.md §4.5
    /// "Pre-invocation"). JSON has no tuple/set/bytes kind, so those three
    /// always arrive back out as `list`/`list`/`str` respectively — fine
    /// for inputs (the agent only ever needs to read them), and callers
    /// validating a task's `Out` type deserialize from `to_json()` which
    /// only produces what `serde_json` itself can already represent.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::list(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut out = IndexMap::new();
                for (k, v) in map {
                    out.insert(OrderedValue(Value::Str(k)), Value::from_json(v));
                }
                Value::dict(ValueMap(out))
            }
        }
    }

    /// The inverse of [`Value::from_json`]. Dict keys that aren't strings
    /// are rendered with `Display` (JSON object keys are always strings).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
            Value::Tuple(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::List(items) => serde_json::Value::Array(items.borrow().iter().map(Value::to_json).collect()),
            Value::Set(s) => serde_json::Value::Array(s.borrow().0.iter().map(|v| v.0.to_json()).collect()),
            Value::Dict(d) => {
                let mut map = serde_json::Map::new();
                for (k, v) in d.borrow().0.iter() {
                    map.insert(k.0.to_string(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Value::List(items) => {
                write!(f, "[")?;
                write_items(f, &items.borrow())?;
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Set(s) => {
                let s = s.borrow();
                if s.0.is_empty() {
                    return write!(f, "set()");
                }
                write!(f, "{{")?;
                for (i, v) in s.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v.0)?;
                }
                write!(f, "}}")
            }
            Value::Dict(d) => {
                let d = d.borrow();
                write!(f, "{{")?;
                for (i, (k, v)) in d.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k.0, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_float_compare_by_numeric_value() {
        assert!(values_equal(&Value::Int(3), &Value::Float(3.0)));
    }

    #[test]
    fn list_equality_is_structural() {
        let a = Value::list(vec![Value::Int(1), Value::Str("x".into())]);
        let b = Value::list(vec![Value::Int(1), Value::Str("x".into())]);
        assert!(values_equal(&a, &b));
    }

    #[test]
    fn empty_containers_are_falsy() {
        assert!(!Value::list(vec![]).is_truthy());
        assert!(Value::list(vec![Value::None]).is_truthy());
    }

    #[test]
    fn display_matches_python_repr_shape() {
        let t = Value::tuple(vec![Value::Int(1)]);
        assert_eq!(t.to_string(), "(1,)");
    }

    #[test]
    fn cloning_a_list_value_aliases_the_same_allocation() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = a.clone();
        if let Value::List(items) = &b {
            items.borrow_mut().push(Value::Int(2));
        }
        assert!(values_equal(&a, &b));
        if let Value::List(items) = &a {
            assert_eq!(items.borrow().len(), 2);
        }
    }

    #[test]
    fn deep_clone_does_not_alias() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = a.deep_clone();
        if let Value::List(items) = &b {
            items.borrow_mut().push(Value::Int(2));
        }
        assert!(!values_equal(&a, &b));
    }

    #[test]
    fn value_round_trips_through_bincode() {
        let v = Value::dict(ValueMap(
            [(OrderedValue(Value::Str("k".into())), Value::Int(7))]
                .into_iter()
                .collect(),
        ));
        let bytes = bincode::serialize(&v).unwrap();
        let back: Value = bincode::deserialize(&bytes).unwrap();
        assert!(values_equal(&v, &back));
    }
}
