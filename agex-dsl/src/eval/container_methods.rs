//! Implementations for the builtin container method whitelist
//! (`agex_policy::Policy::builtin_container_method_allowed`): `str.upper`,
//! `list.append`, `dict.get`, and friends. Reachability was already
//! certified by Policy before the evaluator ever gets here — this module
//! only supplies behavior.

use crate::eval::ops::repr_of;
use crate::eval::value::{RuntimeKey, RuntimeValue};
use agex_core::{EvalError, Span, Value};
use indexmap::IndexMap;

pub fn call_container_method(
    receiver: &RuntimeValue,
    method: &str,
    args: &[RuntimeValue],
    span: Span,
) -> Result<RuntimeValue, EvalError> {
    match receiver {
        RuntimeValue::Data(Value::Str(s)) => str_method(s, method, args, span),
        RuntimeValue::List(items) => list_method(items, method, args, span),
        RuntimeValue::Dict(items) => dict_method(items, method, args, span),
        RuntimeValue::Set(items) => set_method(items, method, args, span),
        RuntimeValue::Data(Value::Bytes(b)) => bytes_method(b, method, args, span),
        _ => Err(EvalError::Attribute {
            source: agex_core::PolicyError::AttributeNotAllowed {
                attr: method.to_string(),
                on: receiver.type_name(),
            },
            span,
        }),
    }
}

fn str_arg(args: &[RuntimeValue], i: usize, span: Span, method: &str) -> Result<String, EvalError> {
    match args.get(i) {
        Some(RuntimeValue::Data(Value::Str(s))) => Ok(s.clone()),
        _ => Err(EvalError::Type { span, message: format!("{method}() expects a string argument") }),
    }
}

fn str_method(s: &str, method: &str, args: &[RuntimeValue], span: Span) -> Result<RuntimeValue, EvalError> {
    Ok(match method {
        "upper" => RuntimeValue::str(s.to_uppercase()),
        "lower" => RuntimeValue::str(s.to_lowercase()),
        "strip" => RuntimeValue::str(match args.first() {
            Some(RuntimeValue::Data(Value::Str(chars))) => s.trim_matches(|c| chars.contains(c)).to_string(),
            _ => s.trim().to_string(),
        }),
        "lstrip" => RuntimeValue::str(s.trim_start().to_string()),
        "rstrip" => RuntimeValue::str(s.trim_end().to_string()),
        "split" => {
            let parts: Vec<RuntimeValue> = match args.first() {
                Some(RuntimeValue::Data(Value::Str(sep))) if !sep.is_empty() => {
                    s.split(sep.as_str()).map(RuntimeValue::str).collect()
                }
                _ => s.split_whitespace().map(RuntimeValue::str).collect(),
            };
            RuntimeValue::list(parts)
        }
        "rsplit" => {
            let sep = str_arg(args, 0, span, "rsplit")?;
            RuntimeValue::list(s.rsplit(sep.as_str()).map(RuntimeValue::str).collect())
        }
        "join" => {
            let items = crate::eval::ops::iterate(span, args.first().ok_or_else(|| EvalError::Type {
                span,
                message: "join() missing iterable argument".into(),
            })?)?;
            let parts: Result<Vec<String>, EvalError> = items
                .iter()
                .map(|v| match v {
                    RuntimeValue::Data(Value::Str(x)) => Ok(x.clone()),
                    other => Err(EvalError::Type { span, message: format!("sequence item: expected str, got {}", other.type_name()) }),
                })
                .collect();
            RuntimeValue::str(parts?.join(s))
        }
        "replace" => {
            let from = str_arg(args, 0, span, "replace")?;
            let to = str_arg(args, 1, span, "replace")?;
            RuntimeValue::str(s.replace(&from, &to))
        }
        "startswith" => RuntimeValue::bool(s.starts_with(str_arg(args, 0, span, "startswith")?.as_str())),
        "endswith" => RuntimeValue::bool(s.ends_with(str_arg(args, 0, span, "endswith")?.as_str())),
        "format" => {
            let kwargs = IndexMap::new();
            RuntimeValue::str(crate::eval::format::str_format(span, s, args, &kwargs)?)
        }
        "format_map" => {
            // `args[0]` is a mapping; map it onto a kwargs-shaped map.
            let mut kwargs = IndexMap::new();
            if let Some(RuntimeValue::Dict(d)) = args.first() {
                for (k, v) in d.borrow().iter() {
                    if let RuntimeValue::Data(Value::Str(name)) = &k.0 {
                        kwargs.insert(name.clone(), v.clone());
                    }
                }
            }
            RuntimeValue::str(crate::eval::format::str_format(span, s, &[], &kwargs)?)
        }
        "find" => RuntimeValue::int(s.find(str_arg(args, 0, span, "find")?.as_str()).map(|i| i as i64).unwrap_or(-1)),
        "rfind" => RuntimeValue::int(s.rfind(str_arg(args, 0, span, "rfind")?.as_str()).map(|i| i as i64).unwrap_or(-1)),
        "index" => {
            let needle = str_arg(args, 0, span, "index")?;
            s.find(needle.as_str())
                .map(|i| RuntimeValue::int(i as i64))
                .ok_or_else(|| EvalError::Value { span, message: "substring not found".into() })?
        }
        "count" => {
            let needle = str_arg(args, 0, span, "count")?;
            if needle.is_empty() {
                RuntimeValue::int(s.chars().count() as i64 + 1)
            } else {
                RuntimeValue::int(s.matches(needle.as_str()).count() as i64)
            }
        }
        "title" => RuntimeValue::str(title_case(s)),
        "capitalize" => RuntimeValue::str(capitalize(s)),
        "isdigit" => RuntimeValue::bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
        "isalpha" => RuntimeValue::bool(!s.is_empty() && s.chars().all(|c| c.is_alphabetic())),
        "isalnum" => RuntimeValue::bool(!s.is_empty() && s.chars().all(|c| c.is_alphanumeric())),
        "isspace" => RuntimeValue::bool(!s.is_empty() && s.chars().all(|c| c.is_whitespace())),
        "encode" => RuntimeValue::Data(Value::bytes(s.as_bytes().to_vec())),
        "zfill" => {
            let width = int_arg(args, 0, span, "zfill")? as usize;
            RuntimeValue::str(zfill(s, width))
        }
        "ljust" => RuntimeValue::str(pad(s, int_arg(args, 0, span, "ljust")? as usize, fill_char(args, 1), false)),
        "rjust" => RuntimeValue::str(pad(s, int_arg(args, 0, span, "rjust")? as usize, fill_char(args, 1), true)),
        "center" => RuntimeValue::str(center(s, int_arg(args, 0, span, "center")? as usize, fill_char(args, 1))),
        "splitlines" => RuntimeValue::list(s.lines().map(RuntimeValue::str).collect()),
        other => return Err(unknown_method("str", other, span)),
    })
}

fn int_arg(args: &[RuntimeValue], i: usize, span: Span, method: &str) -> Result<i64, EvalError> {
    match args.get(i) {
        Some(RuntimeValue::Data(Value::Int(n))) => Ok(*n),
        _ => Err(EvalError::Type { span, message: format!("{method}() expects an integer argument") }),
    }
}

fn fill_char(args: &[RuntimeValue], i: usize) -> char {
    match args.get(i) {
        Some(RuntimeValue::Data(Value::Str(s))) => s.chars().next().unwrap_or(' '),
        _ => ' ',
    }
}

fn zfill(s: &str, width: usize) -> String {
    if s.len() >= width {
        return s.to_string();
    }
    let (sign, rest) = if let Some(r) = s.strip_prefix('-') { ("-", r) } else { ("", s) };
    format!("{sign}{:0>width$}", rest, width = width.saturating_sub(sign.len()))
}

fn pad(s: &str, width: usize, fill: char, left: bool) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let padding: String = std::iter::repeat(fill).take(width - len).collect();
    if left {
        format!("{padding}{s}")
    } else {
        format!("{s}{padding}")
    }
}

fn center(s: &str, width: usize, fill: char) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let total = width - len;
    let left = total / 2;
    let right = total - left;
    format!(
        "{}{}{}",
        std::iter::repeat(fill).take(left).collect::<String>(),
        s,
        std::iter::repeat(fill).take(right).collect::<String>()
    )
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start_of_word = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            out.extend(if start_of_word { c.to_uppercase().collect::<Vec<_>>() } else { c.to_lowercase().collect::<Vec<_>>() });
            start_of_word = false;
        } else {
            out.push(c);
            start_of_word = true;
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn list_method(
    items: &std::rc::Rc<std::cell::RefCell<Vec<RuntimeValue>>>,
    method: &str,
    args: &[RuntimeValue],
    span: Span,
) -> Result<RuntimeValue, EvalError> {
    Ok(match method {
        "append" => {
            items.borrow_mut().push(args.first().cloned().unwrap_or_else(RuntimeValue::none));
            RuntimeValue::none()
        }
        "extend" => {
            let extra = crate::eval::ops::iterate(span, args.first().ok_or_else(|| EvalError::Type { span, message: "extend() missing argument".into() })?)?;
            items.borrow_mut().extend(extra);
            RuntimeValue::none()
        }
        "insert" => {
            let idx = int_arg(args, 0, span, "insert")?.clamp(0, items.borrow().len() as i64) as usize;
            items.borrow_mut().insert(idx, args.get(1).cloned().unwrap_or_else(RuntimeValue::none));
            RuntimeValue::none()
        }
        "remove" => {
            let target = args.first().cloned().unwrap_or_else(RuntimeValue::none);
            let mut b = items.borrow_mut();
            let pos = b.iter().position(|v| crate::eval::ops::values_eq(v, &target));
            match pos {
                Some(i) => {
                    b.remove(i);
                    RuntimeValue::none()
                }
                None => return Err(EvalError::Value { span, message: "list.remove(x): x not in list".into() }),
            }
        }
        "pop" => {
            let mut b = items.borrow_mut();
            if b.is_empty() {
                return Err(EvalError::Index { span, index: 0, len: 0 });
            }
            let idx = match args.first() {
                Some(v) => {
                    let n = int_arg(std::slice::from_ref(v), 0, span, "pop")?;
                    if n < 0 { (b.len() as i64 + n) as usize } else { n as usize }
                }
                None => b.len() - 1,
            };
            if idx >= b.len() {
                return Err(EvalError::Index { span, index: idx as i64, len: b.len() });
            }
            b.remove(idx)
        }
        "clear" => {
            items.borrow_mut().clear();
            RuntimeValue::none()
        }
        "index" => {
            let target = args.first().cloned().unwrap_or_else(RuntimeValue::none);
            items
                .borrow()
                .iter()
                .position(|v| crate::eval::ops::values_eq(v, &target))
                .map(|i| RuntimeValue::int(i as i64))
                .ok_or_else(|| EvalError::Value { span, message: "value not in list".into() })?
        }
        "count" => {
            let target = args.first().cloned().unwrap_or_else(RuntimeValue::none);
            RuntimeValue::int(items.borrow().iter().filter(|v| crate::eval::ops::values_eq(v, &target)).count() as i64)
        }
        "sort" => {
            let mut b = items.borrow_mut();
            let mut err = None;
            b.sort_by(|a, bb| {
                crate::eval::ops::compare_ord(span, a, bb).unwrap_or_else(|e| {
                    err = Some(e);
                    std::cmp::Ordering::Equal
                })
            });
            if let Some(e) = err {
                return Err(e);
            }
            RuntimeValue::none()
        }
        "reverse" => {
            items.borrow_mut().reverse();
            RuntimeValue::none()
        }
        "copy" => RuntimeValue::list(items.borrow().clone()),
        other => return Err(unknown_method("list", other, span)),
    })
}

fn dict_method(
    items: &std::rc::Rc<std::cell::RefCell<IndexMap<RuntimeKey, RuntimeValue>>>,
    method: &str,
    args: &[RuntimeValue],
    span: Span,
) -> Result<RuntimeValue, EvalError> {
    Ok(match method {
        "keys" => RuntimeValue::list(items.borrow().keys().map(|k| k.0.clone()).collect()),
        "values" => RuntimeValue::list(items.borrow().values().cloned().collect()),
        "items" => RuntimeValue::list(items.borrow().iter().map(|(k, v)| RuntimeValue::tuple(vec![k.0.clone(), v.clone()])).collect()),
        "get" => {
            let key = RuntimeKey(args.first().cloned().unwrap_or_else(RuntimeValue::none));
            items.borrow().get(&key).cloned().unwrap_or_else(|| args.get(1).cloned().unwrap_or_else(RuntimeValue::none))
        }
        "pop" => {
            let key = RuntimeKey(args.first().cloned().unwrap_or_else(RuntimeValue::none));
            match items.borrow_mut().shift_remove(&key) {
                Some(v) => v,
                None => match args.get(1) {
                    Some(default) => default.clone(),
                    None => return Err(EvalError::Key { span, key: repr_of(&key.0) }),
                },
            }
        }
        "update" => {
            if let Some(RuntimeValue::Dict(other)) = args.first() {
                for (k, v) in other.borrow().iter() {
                    items.borrow_mut().insert(k.clone(), v.clone());
                }
            }
            RuntimeValue::none()
        }
        "setdefault" => {
            let key = RuntimeKey(args.first().cloned().unwrap_or_else(RuntimeValue::none));
            let default = args.get(1).cloned().unwrap_or_else(RuntimeValue::none);
            items.borrow_mut().entry(key).or_insert(default).clone()
        }
        "clear" => {
            items.borrow_mut().clear();
            RuntimeValue::none()
        }
        "copy" => RuntimeValue::dict(items.borrow().clone()),
        other => return Err(unknown_method("dict", other, span)),
    })
}

fn set_method(
    items: &std::rc::Rc<std::cell::RefCell<indexmap::IndexSet<RuntimeKey>>>,
    method: &str,
    args: &[RuntimeValue],
    span: Span,
) -> Result<RuntimeValue, EvalError> {
    Ok(match method {
        "add" => {
            items.borrow_mut().insert(RuntimeKey(args.first().cloned().unwrap_or_else(RuntimeValue::none)));
            RuntimeValue::none()
        }
        "remove" => {
            let key = RuntimeKey(args.first().cloned().unwrap_or_else(RuntimeValue::none));
            if items.borrow_mut().shift_remove(&key) {
                RuntimeValue::none()
            } else {
                return Err(EvalError::Key { span, key: repr_of(&key.0) });
            }
        }
        "discard" => {
            let key = RuntimeKey(args.first().cloned().unwrap_or_else(RuntimeValue::none));
            items.borrow_mut().shift_remove(&key);
            RuntimeValue::none()
        }
        "pop" => {
            let first = items.borrow().iter().next().cloned();
            match first {
                Some(k) => {
                    items.borrow_mut().shift_remove(&k);
                    k.0
                }
                None => return Err(EvalError::Key { span, key: "pop from an empty set".into() }),
            }
        }
        "clear" => {
            items.borrow_mut().clear();
            RuntimeValue::none()
        }
        "union" => {
            let mut out = items.borrow().clone();
            if let Some(other) = args.first() {
                for v in crate::eval::ops::iterate(span, other)? {
                    out.insert(RuntimeKey(v));
                }
            }
            RuntimeValue::Set(std::rc::Rc::new(std::cell::RefCell::new(out)))
        }
        "intersection" => {
            let other: std::collections::HashSet<usize> = match args.first() {
                Some(o) => crate::eval::ops::iterate(span, o)?
                    .into_iter()
                    .filter_map(|v| items.borrow().get_index_of(&RuntimeKey(v)))
                    .collect(),
                None => Default::default(),
            };
            let out: indexmap::IndexSet<RuntimeKey> = items
                .borrow()
                .iter()
                .enumerate()
                .filter(|(i, _)| other.contains(i))
                .map(|(_, k)| k.clone())
                .collect();
            RuntimeValue::Set(std::rc::Rc::new(std::cell::RefCell::new(out)))
        }
        "difference" => {
            let other_vals: Vec<RuntimeValue> = match args.first() {
                Some(o) => crate::eval::ops::iterate(span, o)?,
                None => vec![],
            };
            let out: indexmap::IndexSet<RuntimeKey> = items
                .borrow()
                .iter()
                .filter(|k| !other_vals.iter().any(|v| crate::eval::ops::values_eq(v, &k.0)))
                .cloned()
                .collect();
            RuntimeValue::Set(std::rc::Rc::new(std::cell::RefCell::new(out)))
        }
        "symmetric_difference" => {
            let other_vals: Vec<RuntimeValue> = match args.first() {
                Some(o) => crate::eval::ops::iterate(span, o)?,
                None => vec![],
            };
            let mut out: indexmap::IndexSet<RuntimeKey> = items
                .borrow()
                .iter()
                .filter(|k| !other_vals.iter().any(|v| crate::eval::ops::values_eq(v, &k.0)))
                .cloned()
                .collect();
            for v in other_vals {
                if !items.borrow().contains(&RuntimeKey(v.clone())) {
                    out.insert(RuntimeKey(v));
                }
            }
            RuntimeValue::Set(std::rc::Rc::new(std::cell::RefCell::new(out)))
        }
        "issubset" => {
            let other_vals: Vec<RuntimeValue> = match args.first() {
                Some(o) => crate::eval::ops::iterate(span, o)?,
                None => vec![],
            };
            RuntimeValue::bool(items.borrow().iter().all(|k| other_vals.iter().any(|v| crate::eval::ops::values_eq(v, &k.0))))
        }
        "issuperset" => {
            let other_vals: Vec<RuntimeValue> = match args.first() {
                Some(o) => crate::eval::ops::iterate(span, o)?,
                None => vec![],
            };
            RuntimeValue::bool(other_vals.iter().all(|v| items.borrow().contains(&RuntimeKey(v.clone()))))
        }
        "update" => {
            if let Some(other) = args.first() {
                for v in crate::eval::ops::iterate(span, other)? {
                    items.borrow_mut().insert(RuntimeKey(v));
                }
            }
            RuntimeValue::none()
        }
        other => return Err(unknown_method("set", other, span)),
    })
}

fn bytes_method(b: &std::rc::Rc<Vec<u8>>, method: &str, args: &[RuntimeValue], span: Span) -> Result<RuntimeValue, EvalError> {
    Ok(match method {
        "decode" => RuntimeValue::str(String::from_utf8_lossy(b).to_string()),
        "hex" => RuntimeValue::str(b.iter().map(|byte| format!("{byte:02x}")).collect::<String>()),
        "split" => {
            let sep = match args.first() {
                Some(RuntimeValue::Data(Value::Bytes(s))) => (**s).clone(),
                _ => b" ".to_vec(),
            };
            RuntimeValue::list(
                b.split(|w| sep.contains(w))
                    .map(|chunk| RuntimeValue::Data(Value::bytes(chunk.to_vec())))
                    .collect(),
            )
        }
        "strip" => RuntimeValue::Data(Value::bytes(
            std::str::from_utf8(b).unwrap_or("").trim().as_bytes().to_vec(),
        )),
        "startswith" => {
            let prefix = match args.first() {
                Some(RuntimeValue::Data(Value::Bytes(p))) => p.clone(),
                _ => return Err(EvalError::Type { span, message: "startswith() expects bytes".into() }),
            };
            RuntimeValue::bool(b.starts_with(prefix.as_slice()))
        }
        "endswith" => {
            let suffix = match args.first() {
                Some(RuntimeValue::Data(Value::Bytes(p))) => p.clone(),
                _ => return Err(EvalError::Type { span, message: "endswith() expects bytes".into() }),
            };
            RuntimeValue::bool(b.ends_with(suffix.as_slice()))
        }
        other => return Err(unknown_method("bytes", other, span)),
    })
}

fn unknown_method(type_name: &str, method: &str, span: Span) -> EvalError {
    EvalError::Attribute {
        source: agex_core::PolicyError::AttributeNotAllowed { attr: method.to_string(), on: type_name.to_string() },
        span,
    }
}
