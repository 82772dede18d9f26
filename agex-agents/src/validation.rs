//! Structural output validation (SPEc_FULL.md §4.2 "Output validation").
//!
//! The sandboxed grammar has no return-type annotations (a task-marked
//! function's `def` carries no `-> T`), so nothing inside the evaluator can
//! check a sub-agent's return value against a declared shape. What *can*
//! carry a shape is the host-level `Task<In, Out>` builder: `Out` is a
//! concrete Rust type, and `TypeSpecOf::type_spec()` turns it into the
//! structural description `validate` checks the decoded `Value` against
//! before it's handed back to the caller.
//!
//! Large collections are validated by head/tail sampling rather than
//! exhaustively, matching `RuntimeLimits::{sampling_threshold, sample_size}`
//! (the same knobs `agex_context` uses to bound rendered diffs).

use agex_core::{EvalError, RuntimeLimits, Span, Value};

/// A structural description of the shape a `Value` must have. Deliberately
/// shallow — no union types, no field-level struct validation — since its
/// only job is to catch the LLM returning the wrong *kind* of thing
/// (a string where a list was expected, a list of strings where a list of
/// ints was expected), not to replace `serde`'s own field-level decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    Any,
    None,
    Bool,
    Int,
    Float,
    Str,
    List(Box<TypeSpec>),
    Dict(Box<TypeSpec>),
}

impl TypeSpec {
    fn describe(&self) -> String {
        match self {
            TypeSpec::Any => "any".to_string(),
            TypeSpec::None => "none".to_string(),
            TypeSpec::Bool => "bool".to_string(),
            TypeSpec::Int => "int".to_string(),
            TypeSpec::Float => "float".to_string(),
            TypeSpec::Str => "str".to_string(),
            TypeSpec::List(inner) => format!("list[{}]", inner.describe()),
            TypeSpec::Dict(inner) => format!("dict[str, {}]", inner.describe()),
        }
    }
}

/// Implemented for every Rust type a `Task<In, Out>` can decode into, so
/// the builder can validate `Out`'s shape without the caller writing it out
/// by hand. The default is deliberately permissive: types with no manual
/// impl below accept anything, which only weakens validation, never breaks
/// a legitimate decode.
pub trait TypeSpecOf {
    fn type_spec() -> TypeSpec {
        TypeSpec::Any
    }
}

impl TypeSpecOf for Value {}
impl TypeSpecOf for serde_json::Value {}

impl TypeSpecOf for () {
    fn type_spec() -> TypeSpec {
        TypeSpec::None
    }
}

impl TypeSpecOf for bool {
    fn type_spec() -> TypeSpec {
        TypeSpec::Bool
    }
}

macro_rules! int_type_spec {
    ($($t:ty),+) => {
        $(impl TypeSpecOf for $t {
            fn type_spec() -> TypeSpec { TypeSpec::Int }
        })+
    };
}
int_type_spec!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl TypeSpecOf for f32 {
    fn type_spec() -> TypeSpec {
        TypeSpec::Float
    }
}
impl TypeSpecOf for f64 {
    fn type_spec() -> TypeSpec {
        TypeSpec::Float
    }
}

impl TypeSpecOf for String {
    fn type_spec() -> TypeSpec {
        TypeSpec::Str
    }
}
impl TypeSpecOf for str {
    fn type_spec() -> TypeSpec {
        TypeSpec::Str
    }
}

impl<T: TypeSpecOf> TypeSpecOf for Option<T> {
    fn type_spec() -> TypeSpec {
        T::type_spec()
    }
}

impl<T: TypeSpecOf> TypeSpecOf for Vec<T> {
    fn type_spec() -> TypeSpec {
        TypeSpec::List(Box::new(T::type_spec()))
    }
}

impl<T: TypeSpecOf> TypeSpecOf for std::collections::HashMap<String, T> {
    fn type_spec() -> TypeSpec {
        TypeSpec::Dict(Box::new(T::type_spec()))
    }
}

impl<T: TypeSpecOf> TypeSpecOf for indexmap::IndexMap<String, T> {
    fn type_spec() -> TypeSpec {
        TypeSpec::Dict(Box::new(T::type_spec()))
    }
}

/// Validates `value` against `spec`, sampling only the first and last
/// `limits.sample_size` elements of a collection once it exceeds
/// `limits.sampling_threshold` (spec.md §4.2's stated reason: checking
/// every element of an arbitrarily large model-produced list is wasted
/// work once a handful of samples have agreed on the shape).
pub fn validate(value: &Value, spec: &TypeSpec, limits: &RuntimeLimits) -> Result<(), EvalError> {
    match spec {
        TypeSpec::Any => Ok(()),
        TypeSpec::None => match value {
            Value::None => Ok(()),
            _ => mismatch(spec, value),
        },
        TypeSpec::Bool => match value {
            Value::Bool(_) => Ok(()),
            _ => mismatch(spec, value),
        },
        TypeSpec::Int => match value {
            Value::Int(_) => Ok(()),
            _ => mismatch(spec, value),
        },
        TypeSpec::Float => match value {
            Value::Float(_) | Value::Int(_) => Ok(()),
            _ => mismatch(spec, value),
        },
        TypeSpec::Str => match value {
            Value::Str(_) => Ok(()),
            _ => mismatch(spec, value),
        },
        TypeSpec::List(inner) => match value {
            Value::List(items) => {
                let items = items.borrow();
                for item in sampled(&items, limits) {
                    validate(item, inner, limits)?;
                }
                Ok(())
            }
            Value::Tuple(items) => {
                for item in sampled(items, limits) {
                    validate(item, inner, limits)?;
                }
                Ok(())
            }
            _ => mismatch(spec, value),
        },
        TypeSpec::Dict(inner) => match value {
            Value::Dict(map) => {
                let map = map.borrow();
                let values: Vec<Value> = map.0.values().cloned().collect();
                for item in sampled(&values, limits) {
                    validate(item, inner, limits)?;
                }
                Ok(())
            }
            _ => mismatch(spec, value),
        },
    }
}

/// Returns the elements to check: all of them below the sampling
/// threshold, otherwise the first and last `sample_size` halves.
fn sampled<'a>(items: &'a [Value], limits: &RuntimeLimits) -> Vec<&'a Value> {
    if items.len() <= limits.sampling_threshold {
        return items.iter().collect();
    }
    let half = (limits.sample_size / 2).max(1);
    let head = items.iter().take(half);
    let tail = items.iter().skip(items.len().saturating_sub(half));
    head.chain(tail).collect()
}

fn mismatch(spec: &TypeSpec, value: &Value) -> Result<(), EvalError> {
    Err(EvalError::ValidationFailed {
        span: Span::default(),
        expected: spec.describe(),
        reason: format!("got a value of type '{}'", value.type_name()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RuntimeLimits {
        RuntimeLimits::default()
    }

    #[test]
    fn accepts_matching_scalar() {
        assert!(validate(&Value::Int(4), &TypeSpec::Int, &limits()).is_ok());
    }

    #[test]
    fn rejects_mismatched_scalar() {
        assert!(validate(&Value::Str("x".into()), &TypeSpec::Int, &limits()).is_err());
    }

    #[test]
    fn float_spec_accepts_int() {
        assert!(validate(&Value::Int(4), &TypeSpec::Float, &limits()).is_ok());
    }

    #[test]
    fn validates_list_elements() {
        let list = Value::list(vec![Value::Int(1), Value::Int(2), Value::Str("oops".into())]);
        assert!(validate(&list, &TypeSpec::List(Box::new(TypeSpec::Int)), &limits()).is_err());
    }

    #[test]
    fn large_list_is_sampled_not_exhaustive() {
        let mut limits = limits();
        limits.sampling_threshold = 4;
        limits.sample_size = 2;
        let mut items: Vec<Value> = (0..20i64).map(Value::Int).collect();
        // plant a bad element in the middle, outside the head/tail sample window
        items[10] = Value::Str("bad".into());
        let list = Value::list(items);
        assert!(validate(&list, &TypeSpec::List(Box::new(TypeSpec::Int)), &limits).is_ok());
    }

    #[test]
    fn vec_type_spec_of_matches_manual_spec() {
        assert_eq!(Vec::<i64>::type_spec(), TypeSpec::List(Box::new(TypeSpec::Int)));
    }
}
