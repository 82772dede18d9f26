//! The builtin whitelist (`agex_policy::BUILTINS`) given real
//! implementations, split the way `original_source/agex/eval/call.py`
//! splits `STATEFUL_BUILTINS` from everything else: `print` and the
//! `task_*` control builtins touch the current call's stdout buffer or
//! unwind the task loop; everything else is a pure function of its
//! arguments.

use crate::eval::ops::{self, repr_of, str_of};
use crate::eval::signals::Signal;
use crate::eval::value::{RuntimeKey, RuntimeValue};
use crate::eval::{call_callable, EvalCtx};
use agex_core::{EvalError, Span, Value};
use indexmap::IndexMap;

/// `print`, `task_success`, `task_fail`, `task_clarify`, `task_continue` —
/// these touch evaluator-owned state (the per-call stdout buffer, or the
/// task signal channel) rather than just transforming their arguments.
pub const STATEFUL_BUILTINS: &[&str] = &["print", "task_success", "task_fail", "task_clarify", "task_continue"];

pub fn call_builtin(
    name: &str,
    args: Vec<RuntimeValue>,
    kwargs: IndexMap<String, RuntimeValue>,
    span: Span,
    ctx: &mut EvalCtx,
) -> Result<RuntimeValue, Signal> {
    match name {
        "print" => {
            let sep = match kwargs.get("sep") {
                Some(RuntimeValue::Data(Value::Str(s))) => s.clone(),
                _ => " ".to_string(),
            };
            let rendered = args.iter().map(str_of).collect::<Vec<_>>().join(&sep);
            ctx.stdout.push(rendered);
            Ok(RuntimeValue::none())
        }
        "task_success" => Err(Signal::TaskSuccess(args.into_iter().next().unwrap_or_else(RuntimeValue::none))),
        "task_fail" => {
            let msg = args.first().map(str_of).unwrap_or_default();
            Err(Signal::TaskFail(msg))
        }
        "task_clarify" => {
            let msg = args.first().map(str_of).unwrap_or_default();
            Err(Signal::TaskClarify(msg))
        }
        "task_continue" => Err(Signal::TaskContinue(args.first().map(str_of))),
        "len" => {
            let v = arg(&args, 0, "len")?;
            Ok(RuntimeValue::int(length_of(span, v)? as i64))
        }
        "range" => Ok(RuntimeValue::Range(ops::make_range(span, &args)?)),
        "isinstance" => {
            let v = arg(&args, 0, "isinstance")?;
            let ty = arg(&args, 1, "isinstance")?;
            Ok(RuntimeValue::bool(isinstance_check(v, ty)))
        }
        "str" => Ok(RuntimeValue::str(args.first().map(str_of).unwrap_or_default())),
        "repr" => Ok(RuntimeValue::str(args.first().map(repr_of).unwrap_or_default())),
        "int" => Ok(RuntimeValue::int(to_int(span, args.first())?)),
        "float" => Ok(RuntimeValue::float(to_float(span, args.first())?)),
        "bool" => Ok(RuntimeValue::bool(args.first().map(|v| v.is_truthy()).unwrap_or(false))),
        "bytes" => Ok(to_bytes(span, args.first())?),
        "list" => Ok(RuntimeValue::list(match args.first() {
            Some(v) => ops::iterate(span, v)?,
            None => vec![],
        })),
        "tuple" => Ok(RuntimeValue::tuple(match args.first() {
            Some(v) => ops::iterate(span, v)?,
            None => vec![],
        })),
        "set" => Ok(RuntimeValue::set(match args.first() {
            Some(v) => ops::iterate(span, v)?.into_iter().map(RuntimeKey).collect(),
            None => Default::default(),
        })),
        "dict" => Ok(dict_from_args(span, &args, &kwargs)?),
        "abs" => abs_of(span, arg(&args, 0, "abs")?),
        "round" => round_of(span, &args),
        "min" => extreme(span, args, ctx, true),
        "max" => extreme(span, args, ctx, false),
        "sum" => sum_of(span, &args),
        "sorted" => sorted_of(span, args, &kwargs, ctx),
        "reversed" => {
            let mut items = ops::iterate(span, arg(&args, 0, "reversed")?)?;
            items.reverse();
            Ok(RuntimeValue::list(items))
        }
        "enumerate" => {
            let start = match args.get(1) {
                Some(v) => ops::numeric_f64(v).map(|f| f as i64).unwrap_or(0),
                None => 0,
            };
            let items = ops::iterate(span, arg(&args, 0, "enumerate")?)?;
            Ok(RuntimeValue::list(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| RuntimeValue::tuple(vec![RuntimeValue::int(start + i as i64), v]))
                    .collect(),
            ))
        }
        "zip" => {
            let sequences: Result<Vec<Vec<RuntimeValue>>, EvalError> =
                args.iter().map(|a| ops::iterate(span, a)).collect();
            let sequences = sequences?;
            let len = sequences.iter().map(|s| s.len()).min().unwrap_or(0);
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                out.push(RuntimeValue::tuple(sequences.iter().map(|s| s[i].clone()).collect()));
            }
            Ok(RuntimeValue::list(out))
        }
        "map" => {
            let func = arg(&args, 0, "map")?.clone();
            let items = ops::iterate(span, arg(&args, 1, "map")?)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(call_callable(ctx, &func, vec![item], IndexMap::new(), span)?);
            }
            Ok(RuntimeValue::list(out))
        }
        "filter" => {
            let func = args.first().cloned();
            let items = ops::iterate(span, arg(&args, 1, "filter")?)?;
            let mut out = Vec::new();
            for item in items {
                let keep = match &func {
                    Some(RuntimeValue::Data(Value::None)) | None => item.is_truthy(),
                    Some(f) => call_callable(ctx, f, vec![item.clone()], IndexMap::new(), span)?.is_truthy(),
                };
                if keep {
                    out.push(item);
                }
            }
            Ok(RuntimeValue::list(out))
        }
        "any" => {
            let items = ops::iterate(span, arg(&args, 0, "any")?)?;
            Ok(RuntimeValue::bool(items.iter().any(|v| v.is_truthy())))
        }
        "all" => {
            let items = ops::iterate(span, arg(&args, 0, "all")?)?;
            Ok(RuntimeValue::bool(items.iter().all(|v| v.is_truthy())))
        }
        "type" => Ok(RuntimeValue::TypeRef(arg(&args, 0, "type")?.type_name())),
        "format" => {
            let v = arg(&args, 0, "format")?;
            let spec = match args.get(1) {
                Some(RuntimeValue::Data(Value::Str(s))) => s.clone(),
                _ => String::new(),
            };
            Ok(RuntimeValue::str(crate::eval::format::render_formatted_value(span, v, Some(&spec))?))
        }
        other => Err(Signal::Error(EvalError::Name {
            source: agex_core::PolicyError::NameNotDefined { name: other.to_string() },
            span,
        })),
    }
}

fn arg<'a>(args: &'a [RuntimeValue], i: usize, fname: &str) -> Result<&'a RuntimeValue, Signal> {
    args.get(i).ok_or_else(|| {
        Signal::Error(EvalError::Type {
            span: Span::default(),
            message: format!("{fname}() missing required argument at position {i}"),
        })
    })
}

fn length_of(span: Span, v: &RuntimeValue) -> Result<usize, EvalError> {
    match v {
        RuntimeValue::List(items) => Ok(items.borrow().len()),
        RuntimeValue::Tuple(items) => Ok(items.len()),
        RuntimeValue::Set(items) => Ok(items.borrow().len()),
        RuntimeValue::Dict(items) => Ok(items.borrow().len()),
        RuntimeValue::Data(Value::Str(s)) => Ok(s.chars().count()),
        RuntimeValue::Data(Value::Bytes(b)) => Ok(b.len()),
        RuntimeValue::Range(r) => Ok(r.len()),
        _ => Err(EvalError::Type { span, message: format!("object of type '{}' has no len()", v.type_name()) }),
    }
}

fn isinstance_check(v: &RuntimeValue, ty: &RuntimeValue) -> bool {
    let names: Vec<String> = match ty {
        RuntimeValue::Tuple(items) => items.iter().map(|t| type_ref_name(t)).collect(),
        other => vec![type_ref_name(other)],
    };
    let actual = v.type_name();
    names.iter().any(|n| {
        n == &actual
            || (n == "int" && matches!(v, RuntimeValue::Data(Value::Bool(_))))
            || (n == "float" && matches!(v, RuntimeValue::Data(Value::Int(_))))
    })
}

fn type_ref_name(v: &RuntimeValue) -> String {
    match v {
        RuntimeValue::TypeRef(name) => name.clone(),
        RuntimeValue::Class(c) => c.name.clone(),
        other => other.type_name(),
    }
}

fn to_int(span: Span, v: Option<&RuntimeValue>) -> Result<i64, EvalError> {
    match v {
        None => Ok(0),
        Some(RuntimeValue::Data(Value::Int(i))) => Ok(*i),
        Some(RuntimeValue::Data(Value::Bool(b))) => Ok(if *b { 1 } else { 0 }),
        Some(RuntimeValue::Data(Value::Float(f))) => Ok(*f as i64),
        Some(RuntimeValue::Data(Value::Str(s))) => s.trim().parse().map_err(|_| EvalError::Value {
            span,
            message: format!("invalid literal for int() with base 10: '{s}'"),
        }),
        Some(other) => Err(EvalError::Type {
            span,
            message: format!("int() argument must be a string or a number, not '{}'", other.type_name()),
        }),
    }
}

fn to_float(span: Span, v: Option<&RuntimeValue>) -> Result<f64, EvalError> {
    match v {
        None => Ok(0.0),
        Some(RuntimeValue::Data(Value::Str(s))) => s.trim().parse().map_err(|_| EvalError::Value {
            span,
            message: format!("could not convert string to float: '{s}'"),
        }),
        Some(other) => ops::numeric_f64(other).ok_or_else(|| EvalError::Type {
            span,
            message: format!("float() argument must be a string or a number, not '{}'", other.type_name()),
        }),
    }
}

fn to_bytes(span: Span, v: Option<&RuntimeValue>) -> Result<RuntimeValue, EvalError> {
    match v {
        None => Ok(RuntimeValue::Data(Value::bytes(vec![]))),
        Some(RuntimeValue::Data(Value::Str(s))) => Ok(RuntimeValue::Data(Value::bytes(s.as_bytes().to_vec()))),
        Some(RuntimeValue::Data(Value::Int(n))) => Ok(RuntimeValue::Data(Value::bytes(vec![0u8; (*n).max(0) as usize]))),
        Some(RuntimeValue::List(items)) => {
            let bytes: Result<Vec<u8>, EvalError> = items
                .borrow()
                .iter()
                .map(|v| to_int(span, Some(v)).map(|i| i as u8))
                .collect();
            Ok(RuntimeValue::Data(Value::bytes(bytes?)))
        }
        Some(other) => Err(EvalError::Type {
            span,
            message: format!("cannot convert '{}' to bytes", other.type_name()),
        }),
    }
}

fn dict_from_args(span: Span, args: &[RuntimeValue], kwargs: &IndexMap<String, RuntimeValue>) -> Result<RuntimeValue, EvalError> {
    let mut out = IndexMap::new();
    if let Some(first) = args.first() {
        match first {
            RuntimeValue::Dict(d) => out.extend(d.borrow().iter().map(|(k, v)| (k.clone(), v.clone()))),
            other => {
                for pair in ops::iterate(span, other)? {
                    if let RuntimeValue::Tuple(kv) = &pair {
                        if kv.len() == 2 {
                            out.insert(RuntimeKey(kv[0].clone()), kv[1].clone());
                            continue;
                        }
                    }
                    return Err(EvalError::Value { span, message: "dict update sequence element has wrong length".into() });
                }
            }
        }
    }
    for (k, v) in kwargs {
        out.insert(RuntimeKey(RuntimeValue::str(k.clone())), v.clone());
    }
    Ok(RuntimeValue::dict(out))
}

fn abs_of(span: Span, v: &RuntimeValue) -> Result<RuntimeValue, Signal> {
    Ok(match v {
        RuntimeValue::Data(Value::Int(i)) => RuntimeValue::int(i.wrapping_abs()),
        RuntimeValue::Data(Value::Float(f)) => RuntimeValue::float(f.abs()),
        RuntimeValue::Complex(re, im) => RuntimeValue::float((re * re + im * im).sqrt()),
        other => {
            return Err(Signal::Error(EvalError::Type {
                span,
                message: format!("bad operand type for abs(): '{}'", other.type_name()),
            }))
        }
    })
}

fn round_of(span: Span, args: &[RuntimeValue]) -> Result<RuntimeValue, Signal> {
    let v = arg(args, 0, "round")?;
    let ndigits = match args.get(1) {
        Some(v) => Some(to_int(span, Some(v)).map_err(Signal::Error)?),
        None => None,
    };
    let f = ops::numeric_f64(v).ok_or_else(|| {
        Signal::Error(EvalError::Type { span, message: format!("type '{}' doesn't define __round__", v.type_name()) })
    })?;
    match ndigits {
        None => Ok(RuntimeValue::int(f.round() as i64)),
        Some(n) => {
            let factor = 10f64.powi(n as i32);
            Ok(RuntimeValue::float((f * factor).round() / factor))
        }
    }
}

fn extreme(span: Span, args: Vec<RuntimeValue>, ctx: &mut EvalCtx, want_min: bool) -> Result<RuntimeValue, Signal> {
    let key_func = None::<RuntimeValue>;
    let items = if args.len() == 1 {
        ops::iterate(span, &args[0]).map_err(Signal::Error)?
    } else {
        args
    };
    if items.is_empty() {
        return Err(Signal::Error(EvalError::Value { span, message: "arg is an empty sequence".into() }));
    }
    let mut best = items[0].clone();
    for item in items.into_iter().skip(1) {
        let cmp_with = key_func.as_ref();
        let (a, b) = match cmp_with {
            Some(f) => (
                call_callable(ctx, f, vec![item.clone()], IndexMap::new(), span)?,
                call_callable(ctx, f, vec![best.clone()], IndexMap::new(), span)?,
            ),
            None => (item.clone(), best.clone()),
        };
        let lt = ops::compare_lt(span, &a, &b).map_err(Signal::Error)?;
        if (want_min && lt) || (!want_min && !lt && !ops::values_eq(&a, &b)) {
            best = item;
        }
    }
    Ok(best)
}

fn sum_of(span: Span, args: &[RuntimeValue]) -> Result<RuntimeValue, Signal> {
    let items = ops::iterate(span, arg(args, 0, "sum")?).map_err(Signal::Error)?;
    let mut acc = args.get(1).cloned().unwrap_or_else(|| RuntimeValue::int(0));
    for item in items {
        acc = ops::binop_add(span, &acc, &item).map_err(Signal::Error)?;
    }
    Ok(acc)
}

fn sorted_of(
    span: Span,
    args: Vec<RuntimeValue>,
    kwargs: &IndexMap<String, RuntimeValue>,
    ctx: &mut EvalCtx,
) -> Result<RuntimeValue, Signal> {
    let mut items = ops::iterate(span, arg(&args, 0, "sorted")?).map_err(Signal::Error)?;
    let reverse = kwargs.get("reverse").map(|v| v.is_truthy()).unwrap_or(false);
    let key_func = kwargs.get("key").cloned();
    let mut keys = Vec::with_capacity(items.len());
    for item in &items {
        keys.push(match &key_func {
            Some(f) => call_callable(ctx, f, vec![item.clone()], IndexMap::new(), span)?,
            None => item.clone(),
        });
    }
    let mut idx: Vec<usize> = (0..items.len()).collect();
    let mut sort_err = None;
    idx.sort_by(|&a, &b| {
        ops::compare_lt(span, &keys[a], &keys[b])
            .map(|lt| if lt { std::cmp::Ordering::Less } else { std::cmp::Ordering::Greater })
            .unwrap_or_else(|e| {
                sort_err = Some(e);
                std::cmp::Ordering::Equal
            })
    });
    if let Some(e) = sort_err {
        return Err(Signal::Error(e));
    }
    if reverse {
        idx.reverse();
    }
    items = idx.into_iter().map(|i| items[i].clone()).collect();
    Ok(RuntimeValue::list(items))
}
