//! `str.format`, `%`-formatting, and f-string rendering.
//!
//! The one security-relevant rule here: a replacement field's format spec
//! is a plain string, never re-parsed as an expression, so `"{0.__class__}"`-
//! style attribute-escape attempts seen in template-injection CVEs against
//! Python's `str.format` can't reach attribute lookup at all — only the
//! field's already-sandbox-evaluated *value* and a conversion/spec string
//! ever reach this module.

use crate::eval::ops::{repr_of, str_of};
use crate::eval::value::RuntimeValue;
use agex_core::{EvalError, Span, Value};

/// Renders one f-string `FormattedValue` node's already-evaluated operand
/// against its (already-lexed-as-a-plain-string) format spec. Rejects any
/// spec that looks like it's trying to smuggle attribute/subscript access
/// rather than a genuine format spec (fill/align/width/precision/type).
pub fn render_formatted_value(
    span: Span,
    value: &RuntimeValue,
    format_spec: Option<&str>,
) -> Result<String, EvalError> {
    match format_spec {
        None => Ok(str_of(value)),
        Some(spec) => apply_format_spec(span, value, spec),
    }
}

fn apply_format_spec(span: Span, value: &RuntimeValue, spec: &str) -> Result<String, EvalError> {
    reject_unsafe_spec(span, spec)?;
    if spec.is_empty() {
        return Ok(str_of(value));
    }
    // A conservative subset of Python's Format Specification Mini-Language:
    // [[fill]align][sign][#][0][width][,][.precision][type]. Anything past
    // width/precision/type (nested replacement fields) was already
    // rejected above.
    let (spec_body, ty) = match spec.chars().last() {
        Some(c) if "bcdeEfFgGnosxX%".contains(c) => (&spec[..spec.len() - 1], Some(c)),
        _ => (spec, None),
    };
    let (precision, spec_body) = match spec_body.split_once('.') {
        Some((rest, prec)) => (prec.parse::<usize>().ok(), rest),
        None => (None, spec_body),
    };
    let width: Option<usize> = spec_body.trim_start_matches(['<', '>', '^', '=', '+', '-', ' ', '0', ',']).parse().ok();
    let align = spec_body.chars().next().filter(|c| "<>^=".contains(*c));

    let rendered = match (ty, value) {
        (Some('d'), _) => format_int(span, value)?,
        (Some('x'), _) => format!("{:x}", int_of(span, value)?),
        (Some('X'), _) => format!("{:X}", int_of(span, value)?),
        (Some('o'), _) => format!("{:o}", int_of(span, value)?),
        (Some('b'), _) => format!("{:b}", int_of(span, value)?),
        (Some('f') | Some('F'), _) => format!("{:.*}", precision.unwrap_or(6), float_of(span, value)?),
        (Some('e'), _) => format!("{:.*e}", precision.unwrap_or(6), float_of(span, value)?),
        (Some('%'), _) => format!("{:.*}%", precision.unwrap_or(6), float_of(span, value)? * 100.0),
        (Some('s'), _) | (None, _) => {
            let s = str_of(value);
            match precision {
                Some(p) => s.chars().take(p).collect(),
                None => s,
            }
        }
        _ => str_of(value),
    };

    Ok(match (width, align) {
        (Some(w), Some('<')) | (Some(w), None) if rendered.len() < w => {
            format!("{rendered:<w$}", w = w)
        }
        (Some(w), Some('>')) if rendered.len() < w => format!("{rendered:>w$}", w = w),
        (Some(w), Some('^')) if rendered.len() < w => format!("{rendered:^w$}", w = w),
        _ => rendered,
    })
}

fn reject_unsafe_spec(span: Span, spec: &str) -> Result<(), EvalError> {
    // Format specs never start with a letter other than the single
    // trailing type char; a leading identifier is an attribute/subscript
    // access attempt riding along in the spec string, not a real spec.
    if spec.chars().next().is_some_and(|c| c.is_alphabetic()) && spec.len() > 1 {
        return Err(EvalError::Value {
            span,
            message: "invalid format spec".into(),
        });
    }
    if spec.contains('{') || spec.contains('}') {
        return Err(EvalError::Value {
            span,
            message: "nested replacement fields in a format spec are not supported".into(),
        });
    }
    Ok(())
}

fn int_of(span: Span, v: &RuntimeValue) -> Result<i64, EvalError> {
    match v {
        RuntimeValue::Data(Value::Int(i)) => Ok(*i),
        RuntimeValue::Data(Value::Bool(b)) => Ok(if *b { 1 } else { 0 }),
        RuntimeValue::Data(Value::Float(f)) => Ok(*f as i64),
        _ => Err(EvalError::Type { span, message: format!("unknown format code for {}", v.type_name()) }),
    }
}

fn float_of(span: Span, v: &RuntimeValue) -> Result<f64, EvalError> {
    crate::eval::ops::numeric_f64(v).ok_or_else(|| EvalError::Type {
        span,
        message: format!("unknown format code for {}", v.type_name()),
    })
}

fn format_int(span: Span, v: &RuntimeValue) -> Result<String, EvalError> {
    Ok(int_of(span, v)?.to_string())
}

/// `str.format(*args, **kwargs)`: `{}`/`{0}`/`{name}` replacement fields
/// with an optional `:spec`, resolved only against the already-evaluated
/// argument list/keyword map — never against the template author's own
/// scope, so there is no way to reach outside the supplied arguments.
pub fn str_format(
    span: Span,
    template: &str,
    args: &[RuntimeValue],
    kwargs: &indexmap::IndexMap<String, RuntimeValue>,
) -> Result<String, EvalError> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                for c2 in chars.by_ref() {
                    if c2 == '}' {
                        break;
                    }
                    field.push(c2);
                }
                let (name_part, spec) = match field.split_once(':') {
                    Some((n, s)) => (n, Some(s)),
                    None => (field.as_str(), None),
                };
                let value = if name_part.is_empty() {
                    let v = args.get(auto_index).cloned().ok_or_else(|| EvalError::Index {
                        span,
                        index: auto_index as i64,
                        len: args.len(),
                    })?;
                    auto_index += 1;
                    v
                } else if let Ok(idx) = name_part.parse::<usize>() {
                    args.get(idx).cloned().ok_or_else(|| EvalError::Index {
                        span,
                        index: idx as i64,
                        len: args.len(),
                    })?
                } else {
                    kwargs.get(name_part).cloned().ok_or_else(|| EvalError::Key {
                        span,
                        key: name_part.to_string(),
                    })?
                };
                out.push_str(&apply_format_spec(span, &value, spec.unwrap_or(""))?);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// `%`-formatting (`"%s" % x`, `"%d of %d" % (a, b)`): the legacy printf
/// style still common in sandboxed agent scripts that crib from older
/// examples.
pub fn percent_format(span: Span, template: &str, args: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    let values: Vec<RuntimeValue> = match args {
        RuntimeValue::Tuple(items) => (**items).clone(),
        other => vec![other.clone()],
    };
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut idx = 0usize;
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(spec @ ('s' | 'd' | 'f' | 'r')) => {
                let v = values.get(idx).ok_or_else(|| EvalError::Value {
                    span,
                    message: "not enough arguments for format string".into(),
                })?;
                idx += 1;
                out.push_str(&match spec {
                    's' => str_of(v),
                    'r' => repr_of(v),
                    'd' => format_int(span, v)?,
                    'f' => format!("{:.6}", float_of(span, v)?),
                    _ => unreachable!(),
                });
            }
            _ => {
                return Err(EvalError::Value { span, message: "unsupported format character".into() });
            }
        }
    }
    Ok(RuntimeValue::str(out))
}
