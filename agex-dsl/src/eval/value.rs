//! The evaluator's own value universe.
//!
//! `agex_core::Value` is the serializable subset; this module adds the
//! runtime-only cases (user functions, classes, live host capability
//! tokens) the docstring on `agex_core::value` points at, and gives every
//! container its own evaluator-native shape so expression evaluation never
//! has to juggle two list representations. Values read out of a `State`
//! convert `Value -> RuntimeValue` on the way in (`from_value`) and back
//! (`to_value`) at commit time; see `env::RootFrame` for where that split
//! actually happens.

use crate::ast::{Params, Stmt};
use crate::eval::env::Env;
use crate::eval::signals::Signal;
use agex_core::Value;
use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone)]
pub enum RuntimeValue {
    Data(Value),
    Complex(f64, f64),
    Range(RangeValue),
    List(Rc<RefCell<Vec<RuntimeValue>>>),
    Tuple(Rc<Vec<RuntimeValue>>),
    Dict(Rc<RefCell<IndexMap<RuntimeKey, RuntimeValue>>>),
    Set(Rc<RefCell<IndexSet<RuntimeKey>>>),
    Function(Rc<UserFunction>),
    Native(Rc<NativeFunction>),
    Class(Rc<ClassDef>),
    Instance(Rc<Instance>),
    BoundMethod(Rc<Instance>, Rc<UserFunction>),
    /// A capability token standing in for a registered host module value
    /// (e.g. `import pkg as m` binds `m` to `Module("pkg")`).
    Module(String),
    /// A capability token for a registered live host instance value.
    HostInstance(String),
    /// The safe placeholder `type(x)` returns: carries the type's name only,
    /// with no reflective surface (no `__bases__`, `__dict__`, `mro()`...).
    TypeRef(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        if self.step == 0 {
            return 0;
        }
        if self.step > 0 {
            if self.stop <= self.start {
                0
            } else {
                ((self.stop - self.start) + self.step - 1) as usize / self.step as usize
            }
        } else if self.stop >= self.start {
            0
        } else {
            ((self.start - self.stop) + (-self.step) - 1) as usize / (-self.step) as usize
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let (start, stop, step) = (self.start, self.stop, self.step);
        let n = self.len();
        (0..n).map(move |i| start + step * i as i64)
    }

    pub fn nth(&self, i: i64) -> Option<i64> {
        let n = self.len() as i64;
        let idx = if i < 0 { i + n } else { i };
        if idx < 0 || idx >= n {
            None
        } else {
            Some(self.start + self.step * idx)
        }
    }
}

/// A `def`/`lambda` closure: parameters and body from the AST, the defining
/// scope chain (captured by `Rc`-clone, giving late binding for free
/// variables without a separate static free-variable pass), and the source
/// slice for rendering in the system message.
pub struct UserFunction {
    pub name: String,
    pub params: Params,
    pub body: Rc<Vec<Stmt>>,
    pub closure: Env,
    pub source: String,
    pub is_lambda: bool,
    /// The fingerprint of the agent whose policy this function was defined
    /// under, so a sub-agent task invocation bound to this function can
    /// re-acquire its policy after the function value crosses a call
    /// boundary.
    pub owner_fingerprint: Option<agex_core::Fingerprint>,
    /// Present only for functions decorated `@agent.task(...)`: the
    /// sub-agent loop this call should drive instead of running as a plain
    /// function.
    pub task_marker: Option<TaskMarker>,
}

#[derive(Debug, Clone)]
pub struct TaskMarker {
    pub state_arg: Option<String>,
}

pub type NativeFn = Rc<
    dyn Fn(
        &[RuntimeValue],
        &IndexMap<String, RuntimeValue>,
        agex_core::Span,
        &mut crate::eval::EvalCtx,
    ) -> Result<RuntimeValue, Signal>,
>;

pub struct NativeFunction {
    pub name: String,
    pub call: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub default: Option<crate::ast::Expr>,
}

/// A `@dataclass`-flat user class: ordered fields with optional defaults,
/// and the method table. No inheritance — the parser already rejects base
/// classes, so this never needs an MRO.
pub struct ClassDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub methods: IndexMap<String, Rc<UserFunction>>,
    pub closure: Env,
}

pub struct Instance {
    pub class: Rc<ClassDef>,
    pub fields: RefCell<IndexMap<String, RuntimeValue>>,
}

/// A dict-key / set-element wrapper mirroring `agex_core::OrderedValue`,
/// extended over the runtime universe. Containers are unhashable (as in
/// Python) and fall back to a constant bucket rather than panicking.
#[derive(Clone)]
pub struct RuntimeKey(pub RuntimeValue);

impl PartialEq for RuntimeKey {
    fn eq(&self, other: &Self) -> bool {
        runtime_values_equal(&self.0, &other.0)
    }
}
impl Eq for RuntimeKey {}

impl std::hash::Hash for RuntimeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        hash_runtime_value(&self.0, state);
    }
}

fn hash_runtime_value<H: std::hash::Hasher>(v: &RuntimeValue, state: &mut H) {
    use std::hash::Hash;
    match v {
        RuntimeValue::Data(d) => {
            0u8.hash(state);
            hash_data(d, state);
        }
        RuntimeValue::Complex(re, im) => (1u8, re.to_bits(), im.to_bits()).hash(state),
        RuntimeValue::Range(r) => (2u8, r.start, r.stop, r.step).hash(state),
        RuntimeValue::Tuple(items) => {
            3u8.hash(state);
            for i in items.iter() {
                hash_runtime_value(i, state);
            }
        }
        RuntimeValue::Module(name) => (4u8, name).hash(state),
        RuntimeValue::HostInstance(name) => (5u8, name).hash(state),
        RuntimeValue::TypeRef(name) => (6u8, name).hash(state),
        _ => 7u8.hash(state),
    }
}

fn hash_data<H: std::hash::Hasher>(v: &Value, state: &mut H) {
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
                hash_data(i, state);
            }
        }
        _ => 7u8.hash(state),
    }
}

pub fn runtime_values_equal(a: &RuntimeValue, b: &RuntimeValue) -> bool {
    use RuntimeValue::*;
    match (a, b) {
        (Data(x), Data(y)) => agex_core::values_equal(x, y),
        (Complex(ar, ai), Complex(br, bi)) => ar == br && ai == bi,
        (Range(x), Range(y)) => x == y,
        (Tuple(x), Tuple(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| runtime_values_equal(a, b))
        }
        (List(x), List(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(a, b)| runtime_values_equal(a, b))
        }
        (Set(x), Set(y)) => x.borrow().len() == y.borrow().len() && x.borrow().iter().all(|k| y.borrow().contains(k)),
        (Dict(x), Dict(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).map(|v2| runtime_values_equal(v, v2)).unwrap_or(false))
        }
        (Module(x), Module(y)) => x == y,
        (HostInstance(x), HostInstance(y)) => x == y,
        (TypeRef(x), TypeRef(y)) => x == y,
        (Instance(x), Instance(y)) => Rc::ptr_eq(x, y),
        (Function(x), Function(y)) => Rc::ptr_eq(x, y),
        (Class(x), Class(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

impl RuntimeValue {
    pub fn none() -> Self {
        RuntimeValue::Data(Value::None)
    }
    pub fn bool(b: bool) -> Self {
        RuntimeValue::Data(Value::Bool(b))
    }
    pub fn int(i: i64) -> Self {
        RuntimeValue::Data(Value::Int(i))
    }
    pub fn float(f: f64) -> Self {
        RuntimeValue::Data(Value::Float(f))
    }
    pub fn str(s: impl Into<String>) -> Self {
        RuntimeValue::Data(Value::Str(s.into()))
    }
    pub fn list(items: Vec<RuntimeValue>) -> Self {
        RuntimeValue::List(Rc::new(RefCell::new(items)))
    }
    pub fn tuple(items: Vec<RuntimeValue>) -> Self {
        RuntimeValue::Tuple(Rc::new(items))
    }
    pub fn dict(items: IndexMap<RuntimeKey, RuntimeValue>) -> Self {
        RuntimeValue::Dict(Rc::new(RefCell::new(items)))
    }
    pub fn set(items: IndexSet<RuntimeKey>) -> Self {
        RuntimeValue::Set(Rc::new(RefCell::new(items)))
    }

    pub fn from_value(v: Value) -> Self {
        match v {
            Value::List(items) => {
                RuntimeValue::list(items.borrow().iter().map(|v| RuntimeValue::from_value(v.clone())).collect())
            }
            Value::Tuple(items) => {
                RuntimeValue::tuple(items.iter().map(|v| RuntimeValue::from_value(v.clone())).collect())
            }
            Value::Set(s) => RuntimeValue::set(
                s.borrow()
                    .0
                    .iter()
                    .map(|ov| RuntimeKey(RuntimeValue::from_value(ov.0.clone())))
                    .collect(),
            ),
            Value::Dict(d) => RuntimeValue::dict(
                d.borrow()
                    .0
                    .iter()
                    .map(|(k, v)| (RuntimeKey(RuntimeValue::from_value(k.0.clone())), RuntimeValue::from_value(v.clone())))
                    .collect(),
            ),
            other => RuntimeValue::Data(other),
        }
    }

    /// Attempts the state-commit conversion. Fails (with a human-readable
    /// reason) for anything that has no data representation: functions,
    /// classes, instances, live host tokens, complex numbers, and ranges.
    /// A bare top-level binding of one of those is still nameable — see
    /// `env::RootFrame::set`, which only calls this for values about to be
    /// persisted and falls back to an overlay binding when it's a *bare*
    /// capability value, not one nested inside a container.
    pub fn to_value(&self) -> Result<Value, String> {
        match self {
            RuntimeValue::Data(v) => Ok(v.clone()),
            RuntimeValue::List(items) => {
                let converted: Result<Vec<Value>, String> =
                    items.borrow().iter().map(RuntimeValue::to_value).collect();
                Ok(Value::list(converted?))
            }
            RuntimeValue::Tuple(items) => {
                let converted: Result<Vec<Value>, String> = items.iter().map(RuntimeValue::to_value).collect();
                Ok(Value::tuple(converted?))
            }
            RuntimeValue::Set(items) => {
                let converted: Result<indexmap::IndexSet<agex_core::OrderedValue>, String> = items
                    .borrow()
                    .iter()
                    .map(|k| k.0.to_value().map(agex_core::OrderedValue))
                    .collect();
                Ok(Value::set(agex_core::ValueSet(converted?)))
            }
            RuntimeValue::Dict(items) => {
                let mut out = indexmap::IndexMap::new();
                for (k, v) in items.borrow().iter() {
                    out.insert(agex_core::OrderedValue(k.0.to_value()?), v.to_value()?);
                }
                Ok(Value::dict(agex_core::ValueMap(out)))
            }
            RuntimeValue::Complex(..) => Err("complex numbers have no persistable representation".into()),
            RuntimeValue::Range(_) => Err("range objects have no persistable representation".into()),
            RuntimeValue::Function(f) => Err(format!("function '{}' cannot be stored in state", f.name)),
            RuntimeValue::Native(f) => Err(format!("native function '{}' cannot be stored in state", f.name)),
            RuntimeValue::Class(c) => Err(format!("class '{}' cannot be stored in state", c.name)),
            RuntimeValue::Instance(i) => Err(format!("instance of '{}' cannot be stored in state", i.class.name)),
            RuntimeValue::BoundMethod(..) => Err("bound methods cannot be stored in state".into()),
            RuntimeValue::Module(name) => Err(format!("module '{name}' cannot be stored in state")),
            RuntimeValue::HostInstance(name) => Err(format!("host object '{name}' cannot be stored in state")),
            RuntimeValue::TypeRef(name) => Err(format!("type reference '{name}' cannot be stored in state")),
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            RuntimeValue::Data(v) => v.type_name().to_string(),
            RuntimeValue::Complex(..) => "complex".into(),
            RuntimeValue::Range(_) => "range".into(),
            RuntimeValue::List(_) => "list".into(),
            RuntimeValue::Tuple(_) => "tuple".into(),
            RuntimeValue::Set(_) => "set".into(),
            RuntimeValue::Dict(_) => "dict".into(),
            RuntimeValue::Function(_) => "function".into(),
            RuntimeValue::Native(_) => "function".into(),
            RuntimeValue::Class(_) => "type".into(),
            RuntimeValue::Instance(i) => i.class.name.clone(),
            RuntimeValue::BoundMethod(..) => "method".into(),
            RuntimeValue::Module(_) => "module".into(),
            RuntimeValue::HostInstance(_) => "object".into(),
            RuntimeValue::TypeRef(_) => "type".into(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            RuntimeValue::Data(v) => v.is_truthy(),
            RuntimeValue::Complex(re, im) => *re != 0.0 || *im != 0.0,
            RuntimeValue::Range(r) => r.len() != 0,
            RuntimeValue::List(items) => !items.borrow().is_empty(),
            RuntimeValue::Tuple(items) => !items.is_empty(),
            RuntimeValue::Set(items) => !items.borrow().is_empty(),
            RuntimeValue::Dict(items) => !items.borrow().is_empty(),
            _ => true,
        }
    }

    pub fn deep_clone(&self) -> RuntimeValue {
        match self {
            RuntimeValue::Data(v) => RuntimeValue::Data(v.deep_clone()),
            RuntimeValue::List(items) => RuntimeValue::list(items.borrow().iter().map(|v| v.deep_clone()).collect()),
            RuntimeValue::Tuple(items) => RuntimeValue::tuple(items.iter().map(|v| v.deep_clone()).collect()),
            RuntimeValue::Set(items) => RuntimeValue::set(
                items.borrow().iter().map(|k| RuntimeKey(k.0.deep_clone())).collect(),
            ),
            RuntimeValue::Dict(items) => RuntimeValue::dict(
                items
                    .borrow()
                    .iter()
                    .map(|(k, v)| (RuntimeKey(k.0.deep_clone()), v.deep_clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Data(v) => write!(f, "{v}"),
            RuntimeValue::Complex(re, im) => {
                if *im >= 0.0 {
                    write!(f, "({re}+{im}j)")
                } else {
                    write!(f, "({re}{im}j)")
                }
            }
            RuntimeValue::Range(r) => write!(f, "range({}, {}, {})", r.start, r.stop, r.step),
            RuntimeValue::List(items) => {
                write!(f, "[")?;
                write_runtime_items(f, &items.borrow())?;
                write!(f, "]")
            }
            RuntimeValue::Tuple(items) => {
                write!(f, "(")?;
                write_runtime_items(f, items)?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            RuntimeValue::Set(items) => {
                let items = items.borrow();
                if items.is_empty() {
                    return write!(f, "set()");
                }
                write!(f, "{{")?;
                for (i, k) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", k.0)?;
                }
                write!(f, "}}")
            }
            RuntimeValue::Dict(items) => {
                let items = items.borrow();
                write!(f, "{{")?;
                for (i, (k, v)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k.0, v)?;
                }
                write!(f, "}}")
            }
            RuntimeValue::Function(func) => write!(f, "<function {}>", func.name),
            RuntimeValue::Native(func) => write!(f, "<built-in function {}>", func.name),
            RuntimeValue::Class(c) => write!(f, "<class '{}'>", c.name),
            RuntimeValue::Instance(inst) => {
                write!(f, "{}(", inst.class.name)?;
                for (i, field) in inst.class.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    let v = inst.fields.borrow().get(&field.name).cloned().unwrap_or_else(RuntimeValue::none);
                    write!(f, "{}={}", field.name, v)?;
                }
                write!(f, ")")
            }
            RuntimeValue::BoundMethod(inst, method) => write!(f, "<bound method {}.{} of {}>", inst.class.name, method.name, inst.class.name),
            RuntimeValue::Module(name) => write!(f, "<module '{name}'>"),
            RuntimeValue::HostInstance(name) => write!(f, "<object '{name}'>"),
            RuntimeValue::TypeRef(name) => write!(f, "<class '{name}'>"),
        }
    }
}

fn write_runtime_items(f: &mut fmt::Formatter<'_>, items: &[RuntimeValue]) -> fmt::Result {
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    Ok(())
}
