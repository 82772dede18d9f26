//! Operator semantics: arithmetic, comparison, and boolean short-circuit
//! evaluation over `RuntimeValue`, plus the repr/str conversions builtins
//! and f-string formatting lean on.

use crate::eval::value::{runtime_values_equal, RangeValue, RuntimeKey, RuntimeValue};
use agex_core::{EvalError, Span, Value};

pub fn numeric_f64(v: &RuntimeValue) -> Option<f64> {
    match v {
        RuntimeValue::Data(Value::Int(i)) => Some(*i as f64),
        RuntimeValue::Data(Value::Float(f)) => Some(*f),
        RuntimeValue::Data(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn is_int_like(v: &RuntimeValue) -> Option<i64> {
    match v {
        RuntimeValue::Data(Value::Int(i)) => Some(*i),
        RuntimeValue::Data(Value::Bool(b)) => Some(if *b { 1 } else { 0 }),
        _ => None,
    }
}

fn type_err(span: Span, op: &str, a: &RuntimeValue, b: &RuntimeValue) -> EvalError {
    EvalError::Type {
        span,
        message: format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ),
    }
}

pub fn binop_add(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    use RuntimeValue::*;
    match (a, b) {
        (Data(Value::Str(x)), Data(Value::Str(y))) => Ok(RuntimeValue::str(format!("{x}{y}"))),
        (Data(Value::Bytes(x)), Data(Value::Bytes(y))) => {
            let mut out = (**x).clone();
            out.extend_from_slice(y);
            Ok(RuntimeValue::Data(Value::bytes(out)))
        }
        (List(x), List(y)) => {
            let mut out = x.borrow().clone();
            out.extend(y.borrow().iter().cloned());
            Ok(RuntimeValue::list(out))
        }
        (Tuple(x), Tuple(y)) => {
            let mut out = (**x).clone();
            out.extend(y.iter().cloned());
            Ok(RuntimeValue::tuple(out))
        }
        (Complex(ar, ai), Complex(br, bi)) => Ok(Complex(ar + br, ai + bi)),
        (Complex(ar, ai), other) | (other, Complex(ar, ai)) if numeric_f64(other).is_some() => {
            Ok(Complex(ar + numeric_f64(other).unwrap(), *ai))
        }
        _ => match (is_int_like(a), is_int_like(b)) {
            (Some(x), Some(y)) => Ok(RuntimeValue::int(x.wrapping_add(y))),
            _ => match (numeric_f64(a), numeric_f64(b)) {
                (Some(x), Some(y)) => Ok(RuntimeValue::float(x + y)),
                _ => Err(type_err(span, "+", a, b)),
            },
        },
    }
}

pub fn binop_mult(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    use RuntimeValue::*;
    match (a, b) {
        (Data(Value::Str(s)), n) | (n, Data(Value::Str(s))) if is_int_like(n).is_some() => {
            let count = is_int_like(n).unwrap().max(0) as usize;
            Ok(RuntimeValue::str(s.repeat(count)))
        }
        (List(items), n) | (n, List(items)) if is_int_like(n).is_some() => {
            let count = is_int_like(n).unwrap().max(0) as usize;
            let mut out = Vec::with_capacity(items.borrow().len() * count);
            for _ in 0..count {
                out.extend(items.borrow().iter().cloned());
            }
            Ok(RuntimeValue::list(out))
        }
        (Complex(ar, ai), Complex(br, bi)) => Ok(Complex(ar * br - ai * bi, ar * bi + ai * br)),
        _ => match (is_int_like(a), is_int_like(b)) {
            (Some(x), Some(y)) => Ok(RuntimeValue::int(x.wrapping_mul(y))),
            _ => match (numeric_f64(a), numeric_f64(b)) {
                (Some(x), Some(y)) => Ok(RuntimeValue::float(x * y)),
                _ => Err(type_err(span, "*", a, b)),
            },
        },
    }
}

macro_rules! simple_arith {
    ($name:ident, $op_sym:literal, $int_op:expr, $float_op:expr) => {
        pub fn $name(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
            match (is_int_like(a), is_int_like(b)) {
                (Some(x), Some(y)) => Ok(RuntimeValue::int($int_op(x, y))),
                _ => match (numeric_f64(a), numeric_f64(b)) {
                    (Some(x), Some(y)) => Ok(RuntimeValue::float($float_op(x, y))),
                    _ => Err(type_err(span, $op_sym, a, b)),
                },
            }
        }
    };
}

simple_arith!(binop_sub, "-", i64::wrapping_sub, |x: f64, y: f64| x - y);

pub fn binop_div(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    let (Some(x), Some(y)) = (numeric_f64(a), numeric_f64(b)) else {
        return Err(type_err(span, "/", a, b));
    };
    if y == 0.0 {
        return Err(EvalError::ZeroDivision { span });
    }
    Ok(RuntimeValue::float(x / y))
}

pub fn binop_floordiv(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    match (is_int_like(a), is_int_like(b)) {
        (Some(_), Some(0)) => Err(EvalError::ZeroDivision { span }),
        (Some(x), Some(y)) => Ok(RuntimeValue::int(x.div_euclid(y))),
        _ => {
            let (Some(x), Some(y)) = (numeric_f64(a), numeric_f64(b)) else {
                return Err(type_err(span, "//", a, b));
            };
            if y == 0.0 {
                return Err(EvalError::ZeroDivision { span });
            }
            Ok(RuntimeValue::float((x / y).floor()))
        }
    }
}

pub fn binop_mod(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    if let (RuntimeValue::Data(Value::Str(fmt)), _) = (a, b) {
        return crate::eval::format::percent_format(span, fmt, b);
    }
    match (is_int_like(a), is_int_like(b)) {
        (Some(_), Some(0)) => Err(EvalError::ZeroDivision { span }),
        (Some(x), Some(y)) => Ok(RuntimeValue::int(x.rem_euclid(y))),
        _ => {
            let (Some(x), Some(y)) = (numeric_f64(a), numeric_f64(b)) else {
                return Err(type_err(span, "%", a, b));
            };
            if y == 0.0 {
                return Err(EvalError::ZeroDivision { span });
            }
            Ok(RuntimeValue::float(x.rem_euclid(y)))
        }
    }
}

pub fn binop_pow(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    match (is_int_like(a), is_int_like(b)) {
        (Some(x), Some(y)) if y >= 0 => Ok(RuntimeValue::int(x.wrapping_pow(y as u32))),
        _ => match (numeric_f64(a), numeric_f64(b)) {
            (Some(x), Some(y)) => Ok(RuntimeValue::float(x.powf(y))),
            _ => Err(type_err(span, "**", a, b)),
        },
    }
}

macro_rules! bit_op {
    ($name:ident, $op_sym:literal, $int_op:tt) => {
        pub fn $name(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
            match (is_int_like(a), is_int_like(b)) {
                (Some(x), Some(y)) => Ok(RuntimeValue::int(x $int_op y)),
                _ => Err(type_err(span, $op_sym, a, b)),
            }
        }
    };
}

bit_op!(binop_bitor, "|", |);
bit_op!(binop_bitand, "&", &);
bit_op!(binop_bitxor, "^", ^);

pub fn binop_lshift(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    match (is_int_like(a), is_int_like(b)) {
        (Some(_), Some(y)) if y < 0 => Err(EvalError::Value { span, message: "negative shift count".into() }),
        (Some(x), Some(y)) => Ok(RuntimeValue::int(x.wrapping_shl(y as u32))),
        _ => Err(type_err(span, "<<", a, b)),
    }
}

pub fn binop_rshift(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    match (is_int_like(a), is_int_like(b)) {
        (Some(_), Some(y)) if y < 0 => Err(EvalError::Value { span, message: "negative shift count".into() }),
        (Some(x), Some(y)) => Ok(RuntimeValue::int(x.wrapping_shr(y as u32))),
        _ => Err(type_err(span, ">>", a, b)),
    }
}

pub fn unary_not(v: &RuntimeValue) -> RuntimeValue {
    RuntimeValue::bool(!v.is_truthy())
}

pub fn unary_neg(span: Span, v: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    match v {
        RuntimeValue::Data(Value::Int(i)) => Ok(RuntimeValue::int(i.wrapping_neg())),
        RuntimeValue::Data(Value::Float(f)) => Ok(RuntimeValue::float(-f)),
        RuntimeValue::Data(Value::Bool(b)) => Ok(RuntimeValue::int(if *b { -1 } else { 0 })),
        RuntimeValue::Complex(re, im) => Ok(RuntimeValue::Complex(-re, -im)),
        _ => Err(EvalError::Type { span, message: format!("bad operand type for unary -: '{}'", v.type_name()) }),
    }
}

pub fn unary_pos(span: Span, v: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    match v {
        RuntimeValue::Data(Value::Int(_)) | RuntimeValue::Data(Value::Float(_)) | RuntimeValue::Complex(..) => {
            Ok(v.clone())
        }
        RuntimeValue::Data(Value::Bool(b)) => Ok(RuntimeValue::int(if *b { 1 } else { 0 })),
        _ => Err(EvalError::Type { span, message: format!("bad operand type for unary +: '{}'", v.type_name()) }),
    }
}

pub fn unary_invert(span: Span, v: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    match is_int_like(v) {
        Some(i) => Ok(RuntimeValue::int(!i)),
        None => Err(EvalError::Type { span, message: format!("bad operand type for unary ~: '{}'", v.type_name()) }),
    }
}

/// Python's total ordering over (int, float, bool) and the lexicographic
/// container orders; anything else is a `TypeError` on `<`/`<=`/`>`/`>=`
/// (equality/identity comparisons never reach this).
pub fn compare_lt(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<bool, EvalError> {
    Ok(compare_ord(span, a, b)?.is_lt())
}

/// Full three-way order, for callers (e.g. `list.sort`) that need it
/// directly rather than derived booleans.
pub fn compare_ord(span: Span, a: &RuntimeValue, b: &RuntimeValue) -> Result<std::cmp::Ordering, EvalError> {
    use std::cmp::Ordering;
    match (a, b) {
        (RuntimeValue::Data(Value::Str(x)), RuntimeValue::Data(Value::Str(y))) => Ok(x.cmp(y)),
        (RuntimeValue::List(x), RuntimeValue::List(y)) => compare_seq(span, &x.borrow(), &y.borrow()),
        (RuntimeValue::Tuple(x), RuntimeValue::Tuple(y)) => compare_seq(span, x, y),
        _ => match (numeric_f64(a), numeric_f64(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| EvalError::Value {
                span,
                message: "cannot order NaN".into(),
            }),
            _ => Err(type_err(span, "<", a, b)),
        },
    }
}

fn compare_seq(span: Span, x: &[RuntimeValue], y: &[RuntimeValue]) -> Result<std::cmp::Ordering, EvalError> {
    for (a, b) in x.iter().zip(y.iter()) {
        let ord = compare_ord(span, a, b)?;
        if ord != std::cmp::Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(x.len().cmp(&y.len()))
}

pub fn values_eq(a: &RuntimeValue, b: &RuntimeValue) -> bool {
    runtime_values_equal(a, b)
}

pub fn contains(span: Span, container: &RuntimeValue, item: &RuntimeValue) -> Result<bool, EvalError> {
    match container {
        RuntimeValue::List(items) => Ok(items.borrow().iter().any(|v| values_eq(v, item))),
        RuntimeValue::Tuple(items) => Ok(items.iter().any(|v| values_eq(v, item))),
        RuntimeValue::Set(items) => Ok(items.borrow().contains(&RuntimeKey(item.clone()))),
        RuntimeValue::Dict(items) => Ok(items.borrow().contains_key(&RuntimeKey(item.clone()))),
        RuntimeValue::Data(Value::Str(s)) => {
            if let RuntimeValue::Data(Value::Str(needle)) = item {
                Ok(s.contains(needle.as_str()))
            } else {
                Err(EvalError::Type { span, message: "'in <string>' requires string as left operand".into() })
            }
        }
        RuntimeValue::Range(r) => match is_int_like(item) {
            Some(n) => Ok(r.iter().any(|x| x == n)),
            None => Ok(false),
        },
        _ => Err(EvalError::Type {
            span,
            message: format!("argument of type '{}' is not iterable", container.type_name()),
        }),
    }
}

/// Materializes any iterable expression value into a flat `Vec` the
/// evaluator's `for`/comprehension machinery and the sequence builtins can
/// walk uniformly. The sandbox has no lazy generators (spec.md: generator
/// expressions are eagerly materialized), so this is always a real `Vec`.
pub fn iterate(span: Span, v: &RuntimeValue) -> Result<Vec<RuntimeValue>, EvalError> {
    match v {
        RuntimeValue::List(items) => Ok(items.borrow().clone()),
        RuntimeValue::Tuple(items) => Ok((**items).clone()),
        RuntimeValue::Set(items) => Ok(items.borrow().iter().map(|k| k.0.clone()).collect()),
        RuntimeValue::Dict(items) => Ok(items.borrow().keys().map(|k| k.0.clone()).collect()),
        RuntimeValue::Range(r) => Ok(r.iter().map(RuntimeValue::int).collect()),
        RuntimeValue::Data(Value::Str(s)) => Ok(s.chars().map(|c| RuntimeValue::str(c.to_string())).collect()),
        RuntimeValue::Data(Value::Bytes(b)) => Ok(b.iter().map(|byte| RuntimeValue::int(*byte as i64)).collect()),
        _ => Err(EvalError::Type {
            span,
            message: format!("'{}' object is not iterable", v.type_name()),
        }),
    }
}

pub fn make_range(span: Span, args: &[RuntimeValue]) -> Result<RangeValue, EvalError> {
    let ints: Result<Vec<i64>, EvalError> = args
        .iter()
        .map(|a| is_int_like(a).ok_or_else(|| EvalError::Type {
            span,
            message: "'range' arguments must be integers".into(),
        }))
        .collect();
    let ints = ints?;
    match ints.as_slice() {
        [stop] => Ok(RangeValue { start: 0, stop: *stop, step: 1 }),
        [start, stop] => Ok(RangeValue { start: *start, stop: *stop, step: 1 }),
        [start, stop, step] => {
            if *step == 0 {
                return Err(EvalError::Value { span, message: "range() arg 3 must not be zero".into() });
            }
            Ok(RangeValue { start: *start, stop: *stop, step: *step })
        }
        _ => Err(EvalError::Type { span, message: "range expected 1 to 3 arguments".into() }),
    }
}

/// `str()` conversion (distinct from `repr()`: strings render unquoted).
pub fn str_of(v: &RuntimeValue) -> String {
    v.to_string()
}

/// `repr()` conversion: strings and bytes get quoted, everything else
/// matches `Display`.
pub fn repr_of(v: &RuntimeValue) -> String {
    match v {
        RuntimeValue::Data(Value::Str(s)) => format!("{s:?}"),
        RuntimeValue::Data(Value::Bytes(b)) => format!("b{:?}", String::from_utf8_lossy(b)),
        RuntimeValue::List(items) => {
            let inner: Vec<String> = items.borrow().iter().map(repr_of).collect();
            format!("[{}]", inner.join(", "))
        }
        RuntimeValue::Tuple(items) => {
            let inner: Vec<String> = items.iter().map(repr_of).collect();
            if items.len() == 1 {
                format!("({},)", inner[0])
            } else {
                format!("({})", inner.join(", "))
            }
        }
        RuntimeValue::Set(items) => {
            if items.borrow().is_empty() {
                return "set()".into();
            }
            let inner: Vec<String> = items.borrow().iter().map(|k| repr_of(&k.0)).collect();
            format!("{{{}}}", inner.join(", "))
        }
        RuntimeValue::Dict(items) => {
            let inner: Vec<String> = items
                .borrow()
                .iter()
                .map(|(k, v)| format!("{}: {}", repr_of(&k.0), repr_of(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        other => other.to_string(),
    }
}
