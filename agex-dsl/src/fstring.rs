//! Parses the un-interpolated text captured by the scanner for an f-string
//! literal into a `JoinedStr` of literal and `FormattedValue` parts.
//!
//! The scanner hands us the string body verbatim (quotes already stripped,
//! escapes already resolved for the literal portions) with `{{`/`}}` still
//! doubled; this module splits on balanced `{...}` spans, recursively
//! re-lexes and re-parses the expression inside each one, and recognizes a
//! trailing `:spec` format-spec segment.

use crate::ast::{Expr, ExprKind};
use crate::lexer::{Scanner, Span, TokenKind};
use crate::parser::Parser;
use agex_core::EvalError;

pub fn parse_fstring(body: &str, span: Span) -> Result<Expr, EvalError> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '{' && chars.get(i + 1) == Some(&'{') {
            literal.push('{');
            i += 2;
            continue;
        }
        if c == '}' && chars.get(i + 1) == Some(&'}') {
            literal.push('}');
            i += 2;
            continue;
        }
        if c == '{' {
            if !literal.is_empty() {
                parts.push(Expr {
                    kind: ExprKind::Constant(crate::ast::Constant::Str(std::mem::take(&mut literal))),
                    span,
                });
            }
            i += 1;
            let (field, format_spec, consumed) = scan_field(&chars[i..])?;
            i += consumed;
            let value = parse_embedded_expr(&field, span)?;
            parts.push(Expr {
                kind: ExprKind::FormattedValue {
                    value: Box::new(value),
                    format_spec,
                },
                span,
            });
            continue;
        }
        if c == '}' {
            return Err(EvalError::Syntax {
                span,
                message: "single '}' is not allowed in an f-string, use '}}'".into(),
            });
        }
        literal.push(c);
        i += 1;
    }

    if !literal.is_empty() {
        parts.push(Expr {
            kind: ExprKind::Constant(crate::ast::Constant::Str(literal)),
            span,
        });
    }

    Ok(Expr {
        kind: ExprKind::JoinedStr(parts),
        span,
    })
}

/// Scans one `{field[:format_spec]}` replacement field, tracking bracket
/// nesting so a format spec containing `{}`-nested expressions or a dict
/// literal inside the field expression doesn't terminate early.
fn scan_field(chars: &[char]) -> Result<(String, Option<String>, usize), EvalError> {
    let mut depth = 0i32;
    let mut field = String::new();
    let mut format_spec: Option<String> = None;
    let mut in_spec = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                depth += 1;
                if in_spec {
                    format_spec.as_mut().unwrap().push(c);
                } else {
                    field.push(c);
                }
            }
            '}' if depth == 0 => {
                return Ok((field, format_spec, i + 1));
            }
            '}' => {
                depth -= 1;
                if in_spec {
                    format_spec.as_mut().unwrap().push(c);
                } else {
                    field.push(c);
                }
            }
            ':' if depth == 0 && !in_spec => {
                in_spec = true;
                format_spec = Some(String::new());
            }
            _ => {
                if in_spec {
                    format_spec.as_mut().unwrap().push(c);
                } else {
                    field.push(c);
                }
            }
        }
        i += 1;
    }

    Err(EvalError::Syntax {
        span: Span::default(),
        message: "unterminated replacement field in f-string".into(),
    })
}

fn parse_embedded_expr(source: &str, span: Span) -> Result<Expr, EvalError> {
    if source.trim().is_empty() {
        return Err(EvalError::Syntax {
            span,
            message: "empty expression in f-string replacement field".into(),
        });
    }
    let tokens = Scanner::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_fstring_expr()?;
    if !matches!(parser_peek_is_eof(&parser), true) {
        return Err(EvalError::Syntax {
            span,
            message: "unexpected trailing tokens in f-string replacement field".into(),
        });
    }
    Ok(expr)
}

fn parser_peek_is_eof(parser: &Parser) -> bool {
    matches!(parser.peek_kind(), TokenKind::Eof | TokenKind::Newline)
}
