//! Recursive-descent parser with precedence climbing for expressions,
//! turning a indentation-aware token stream into the restricted-Python AST
//! (`crate::ast`).

use crate::ast::*;
use crate::lexer::{Span, Token, TokenKind};
use agex_core::EvalError;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, EvalError>;

pub fn parse(tokens: Vec<Token>) -> PResult<Module> {
    Parser::new(tokens).parse_module()
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.cur().kind
    }

    fn span(&self) -> Span {
        self.cur().span
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.kind()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.kind())))
        }
    }

    fn error(&self, message: String) -> EvalError {
        EvalError::Syntax {
            span: self.span(),
            message,
        }
    }

    fn unsupported(&self, construct: impl Into<String>) -> EvalError {
        EvalError::Unsupported {
            span: self.span(),
            construct: construct.into(),
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    // ---------------------------------------------------------------- module

    /// Entry point used when re-parsing the expression inside an f-string
    /// replacement field: a single `testlist`, no statement structure.
    pub fn parse_fstring_expr(&mut self) -> PResult<Expr> {
        self.parse_testlist()
    }

    pub fn peek_kind(&self) -> &TokenKind {
        self.kind()
    }

    pub fn parse_module(&mut self) -> PResult<Module> {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !matches!(self.kind(), TokenKind::Eof) {
            stmts.extend(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(stmts)
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::Colon, "':'")?;
        if self.eat(&TokenKind::Newline) {
            self.skip_newlines();
            self.expect(&TokenKind::Indent, "an indented block")?;
            let mut stmts = Vec::new();
            self.skip_newlines();
            while !matches!(self.kind(), TokenKind::Dedent) {
                stmts.extend(self.parse_statement()?);
                self.skip_newlines();
            }
            self.expect(&TokenKind::Dedent, "dedent")?;
            Ok(stmts)
        } else {
            // Single-line suite: `if x: y = 1`
            self.parse_simple_stmt_line()
        }
    }

    /// One or more `;`-separated simple statements terminated by a newline
    /// (or EOF, for the last line of a file without a trailing newline).
    fn parse_simple_stmt_line(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_simple_stmt()?];
        while self.eat(&TokenKind::Semicolon) {
            if matches!(self.kind(), TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_simple_stmt()?);
        }
        self.eat(&TokenKind::Newline);
        Ok(stmts)
    }

    // ------------------------------------------------------------ statements

    fn parse_statement(&mut self) -> PResult<Vec<Stmt>> {
        match self.kind() {
            TokenKind::If => Ok(vec![self.parse_if()?]),
            TokenKind::While => Ok(vec![self.parse_while()?]),
            TokenKind::For => Ok(vec![self.parse_for()?]),
            TokenKind::Def => Ok(vec![self.parse_funcdef(Vec::new())?]),
            TokenKind::Class => Ok(vec![self.parse_classdef(Vec::new())?]),
            TokenKind::At => Ok(vec![self.parse_decorated()?]),
            TokenKind::Try => Ok(vec![self.parse_try()?]),
            TokenKind::With => Ok(vec![self.parse_with()?]),
            TokenKind::Async => Err(self.unsupported("async functions/await are not supported")),
            TokenKind::Global => Err(self.unsupported("'global' is not supported")),
            TokenKind::Nonlocal => Err(self.unsupported("'nonlocal' is not supported")),
            _ => self.parse_simple_stmt_line(),
        }
    }

    fn parse_decorated(&mut self) -> PResult<Stmt> {
        let mut decorators = Vec::new();
        while self.eat(&TokenKind::At) {
            decorators.push(self.parse_test()?);
            self.eat(&TokenKind::Newline);
        }
        match self.kind() {
            TokenKind::Def => self.parse_funcdef(decorators),
            TokenKind::Class => self.parse_classdef(decorators),
            _ => Err(self.error("decorators must precede 'def' or 'class'".into())),
        }
    }

    fn parse_simple_stmt(&mut self) -> PResult<Stmt> {
        let span = self.span();
        let kind = match self.kind().clone() {
            TokenKind::Pass => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                if matches!(self.kind(), TokenKind::Newline | TokenKind::Eof | TokenKind::Semicolon) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.parse_testlist()?))
                }
            }
            TokenKind::Raise => {
                self.advance();
                if matches!(self.kind(), TokenKind::Newline | TokenKind::Eof | TokenKind::Semicolon) {
                    StmtKind::Raise { exc: None, cause: None }
                } else {
                    let exc = self.parse_test()?;
                    let cause = if self.eat(&TokenKind::From) {
                        Some(self.parse_test()?)
                    } else {
                        None
                    };
                    StmtKind::Raise { exc: Some(exc), cause }
                }
            }
            TokenKind::Del => {
                self.advance();
                let mut targets = vec![self.parse_test()?];
                while self.eat(&TokenKind::Comma) {
                    targets.push(self.parse_test()?);
                }
                StmtKind::Delete(targets)
            }
            TokenKind::Import => {
                self.advance();
                let mut names = Vec::new();
                loop {
                    let name = self.parse_dotted_name()?;
                    let alias = if self.eat(&TokenKind::As) {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    names.push((name, alias));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                StmtKind::Import { names }
            }
            TokenKind::From => {
                self.advance();
                let module = self.parse_dotted_name()?;
                self.expect(&TokenKind::Import, "'import'")?;
                let mut names = Vec::new();
                loop {
                    let name = self.expect_name()?;
                    let alias = if self.eat(&TokenKind::As) {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    names.push((name, alias));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                StmtKind::ImportFrom { module, names }
            }
            TokenKind::Assert => {
                self.advance();
                let test = self.parse_test()?;
                let msg = if self.eat(&TokenKind::Comma) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            TokenKind::Global => return Err(self.unsupported("'global' is not supported")),
            TokenKind::Nonlocal => return Err(self.unsupported("'nonlocal' is not supported")),
            TokenKind::Yield => return Err(self.unsupported("'yield' is not supported")),
            _ => return self.parse_expr_or_assign_stmt(),
        };
        Ok(Stmt { kind, span })
    }

    fn parse_expr_or_assign_stmt(&mut self) -> PResult<Stmt> {
        let span = self.span();
        let first = self.parse_testlist_star()?;

        if self.check(&TokenKind::Colon) {
            self.advance();
            let _annotation = self.parse_test()?;
            let value = if self.eat(&TokenKind::Assign) {
                Some(self.parse_testlist()?)
            } else {
                None
            };
            return Ok(Stmt {
                kind: StmtKind::AnnAssign { target: first, value },
                span,
            });
        }

        if let Some(op) = self.augassign_op() {
            self.advance();
            let value = self.parse_testlist()?;
            return Ok(Stmt {
                kind: StmtKind::AugAssign { target: first, op, value },
                span,
            });
        }

        if self.eat(&TokenKind::Assign) {
            let mut targets = vec![first];
            let mut value = self.parse_testlist_star()?;
            while self.eat(&TokenKind::Assign) {
                targets.push(value.clone());
                value = self.parse_testlist_star()?;
            }
            return Ok(Stmt {
                kind: StmtKind::Assign { targets, value },
                span,
            });
        }

        Ok(Stmt {
            kind: StmtKind::Expr(first),
            span,
        })
    }

    fn augassign_op(&self) -> Option<BinOpKind> {
        use TokenKind::*;
        Some(match self.kind() {
            PlusEq => BinOpKind::Add,
            MinusEq => BinOpKind::Sub,
            StarEq => BinOpKind::Mult,
            SlashEq => BinOpKind::Div,
            DoubleSlashEq => BinOpKind::FloorDiv,
            PercentEq => BinOpKind::Mod,
            DoubleStarEq => BinOpKind::Pow,
            AmpEq => BinOpKind::BitAnd,
            PipeEq => BinOpKind::BitOr,
            CaretEq => BinOpKind::BitXor,
            LShiftEq => BinOpKind::LShift,
            RShiftEq => BinOpKind::RShift,
            _ => return None,
        })
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let orelse = if self.check(&TokenKind::Elif) {
            vec![self.parse_elif_chain()?]
        } else if self.eat(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::If { test, body, orelse },
            span,
        })
    }

    /// `elif` is parsed as a nested `If` statement so the AST only ever
    /// needs one conditional node shape.
    fn parse_elif_chain(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.expect(&TokenKind::Elif, "'elif'")?;
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let orelse = if self.check(&TokenKind::Elif) {
            vec![self.parse_elif_chain()?]
        } else if self.eat(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::If { test, body, orelse },
            span,
        })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::While { test, body, orelse },
            span,
        })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let target = self.parse_target_list()?;
        self.expect(&TokenKind::In, "'in'")?;
        let iter = self.parse_testlist()?;
        let body = self.parse_block()?;
        let orelse = if self.eat(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::For { target, iter, body, orelse },
            span,
        })
    }

    fn parse_target_list(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut items = vec![self.parse_target()?];
        let mut had_comma = false;
        while self.eat(&TokenKind::Comma) {
            had_comma = true;
            if self.check(&TokenKind::In) {
                break;
            }
            items.push(self.parse_target()?);
        }
        if had_comma {
            Ok(Expr {
                kind: ExprKind::TupleLit(items),
                span,
            })
        } else {
            Ok(items.pop().unwrap())
        }
    }

    fn parse_target(&mut self) -> PResult<Expr> {
        if self.eat(&TokenKind::LParen) {
            let inner = self.parse_target_list()?;
            self.expect(&TokenKind::RParen, "')'")?;
            return Ok(inner);
        }
        self.parse_postfix()
    }

    fn parse_funcdef(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let name = self.expect_name()?;
        self.expect(&TokenKind::LParen, "'('")?;
        let params = self.parse_params(&TokenKind::RParen)?;
        self.expect(&TokenKind::RParen, "')'")?;
        if self.eat(&TokenKind::Arrow) {
            self.parse_test()?;
        }
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef { name, params, body, decorators },
            span,
        })
    }

    fn parse_params(&mut self, end: &TokenKind) -> PResult<Params> {
        let mut params = Params::default();
        if self.check(end) {
            return Ok(params);
        }
        loop {
            if self.eat(&TokenKind::DoubleStar) {
                params.kwarg = Some(self.expect_name()?);
            } else if self.eat(&TokenKind::Star) {
                if let TokenKind::Name(_) = self.kind() {
                    params.vararg = Some(self.expect_name()?);
                }
            } else {
                let name = self.expect_name()?;
                if self.eat(&TokenKind::Colon) {
                    self.parse_test()?;
                }
                let default = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                if params.vararg.is_some() || params.kwarg.is_some() {
                    params.kwonly.push(Param { name, default });
                } else {
                    params.positional.push(Param { name, default });
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if self.check(end) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_classdef(&mut self, decorators: Vec<Expr>) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let name = self.expect_name()?;
        if self.eat(&TokenKind::LParen) {
            if !self.check(&TokenKind::RParen) {
                return Err(self.unsupported("class inheritance is not supported"));
            }
            self.advance();
        }
        let body = self.parse_block()?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        for stmt in body {
            match stmt.kind {
                StmtKind::Pass => {}
                StmtKind::Expr(Expr {
                    kind: ExprKind::Constant(Constant::Str(_)),
                    ..
                }) => {}
                StmtKind::AnnAssign { target, value } => {
                    if let ExprKind::Name(field_name) = target.kind {
                        fields.push(FieldDef { name: field_name, default: value });
                    } else {
                        return Err(self.unsupported("class field targets must be plain names"));
                    }
                }
                StmtKind::FunctionDef { .. } => methods.push(stmt),
                _ => {
                    return Err(self.unsupported(
                        "class bodies are restricted to field annotations and method definitions",
                    ))
                }
            }
        }

        Ok(Stmt {
            kind: StmtKind::ClassDef { name, decorators, fields, methods },
            span,
        })
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.check(&TokenKind::Except) {
            self.advance();
            let kind = if self.check(&TokenKind::Colon) {
                None
            } else {
                Some(self.parse_test()?)
            };
            let name = if self.eat(&TokenKind::As) {
                Some(self.expect_name()?)
            } else {
                None
            };
            let hbody = self.parse_block()?;
            handlers.push(ExceptHandler { kind, name, body: hbody });
        }
        let orelse = if self.eat(&TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat(&TokenKind::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(Stmt {
            kind: StmtKind::Try { body, handlers, orelse, finalbody },
            span,
        })
    }

    fn parse_with(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.advance();
        let mut items = Vec::new();
        loop {
            let context_expr = self.parse_test()?;
            let optional_vars = if self.eat(&TokenKind::As) {
                Some(self.parse_target()?)
            } else {
                None
            };
            items.push(WithItem { context_expr, optional_vars });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::With { items, body },
            span,
        })
    }

    fn parse_dotted_name(&mut self) -> PResult<String> {
        let mut name = self.expect_name()?;
        while self.eat(&TokenKind::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn expect_name(&mut self) -> PResult<String> {
        match self.kind().clone() {
            TokenKind::Name(n) => {
                self.advance();
                Ok(n)
            }
            _ => Err(self.error(format!("expected identifier, found {:?}", self.kind()))),
        }
    }

    // ----------------------------------------------------------- expressions

    fn parse_testlist(&mut self) -> PResult<Expr> {
        let span = self.span();
        let first = self.parse_test()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_expr_end() {
                break;
            }
            items.push(self.parse_test()?);
        }
        Ok(Expr {
            kind: ExprKind::TupleLit(items),
            span,
        })
    }

    fn parse_testlist_star(&mut self) -> PResult<Expr> {
        let span = self.span();
        let first = self.parse_star_or_test()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(&TokenKind::Comma) {
            if self.at_expr_end() || self.check(&TokenKind::Assign) {
                break;
            }
            items.push(self.parse_star_or_test()?);
        }
        Ok(Expr {
            kind: ExprKind::TupleLit(items),
            span,
        })
    }

    fn parse_star_or_test(&mut self) -> PResult<Expr> {
        let span = self.span();
        if self.eat(&TokenKind::Star) {
            let inner = self.parse_test()?;
            return Ok(Expr {
                kind: ExprKind::Starred(Box::new(inner)),
                span,
            });
        }
        self.parse_test()
    }

    fn at_expr_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Assign
                | TokenKind::Colon
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Semicolon
                | TokenKind::In
        )
    }

    /// `test ::= namedexpr_test | lambdef`. Handles the ternary `if/else`
    /// and the walrus operator at top precedence.
    fn parse_test(&mut self) -> PResult<Expr> {
        if matches!(self.kind(), TokenKind::Lambda) {
            return self.parse_lambda();
        }
        if let TokenKind::Name(n) = self.kind().clone() {
            if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Walrus)) {
                let span = self.span();
                self.advance();
                self.advance();
                let value = self.parse_test()?;
                return Ok(Expr {
                    kind: ExprKind::NamedExpr { target: n, value: Box::new(value) },
                    span,
                });
            }
        }
        let span = self.span();
        let body = self.parse_or_test()?;
        if self.eat(&TokenKind::If) {
            let test = self.parse_or_test()?;
            self.expect(&TokenKind::Else, "'else'")?;
            let orelse = self.parse_test()?;
            return Ok(Expr {
                kind: ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                span,
            });
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let span = self.span();
        self.advance();
        let params = self.parse_params(&TokenKind::Colon)?;
        self.expect(&TokenKind::Colon, "':'")?;
        let body = self.parse_test()?;
        Ok(Expr {
            kind: ExprKind::Lambda { params, body: Box::new(body) },
            span,
        })
    }

    fn parse_or_test(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut values = vec![self.parse_and_test()?];
        let mut is_or = false;
        while self.eat(&TokenKind::Or) {
            is_or = true;
            values.push(self.parse_and_test()?);
        }
        if is_or {
            Ok(Expr {
                kind: ExprKind::BoolOp { op: BoolOpKind::Or, values },
                span,
            })
        } else {
            Ok(values.pop().unwrap())
        }
    }

    fn parse_and_test(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut values = vec![self.parse_not_test()?];
        let mut is_and = false;
        while self.eat(&TokenKind::And) {
            is_and = true;
            values.push(self.parse_not_test()?);
        }
        if is_and {
            Ok(Expr {
                kind: ExprKind::BoolOp { op: BoolOpKind::And, values },
                span,
            })
        } else {
            Ok(values.pop().unwrap())
        }
    }

    fn parse_not_test(&mut self) -> PResult<Expr> {
        if self.check(&TokenKind::Not) {
            let span = self.span();
            self.advance();
            let operand = self.parse_not_test()?;
            return Ok(Expr {
                kind: ExprKind::UnaryOp { op: UnaryOpKind::Not, operand: Box::new(operand) },
                span,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let span = self.span();
        let left = self.parse_bitwise_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.kind() {
                TokenKind::Eq => CmpOp::Eq,
                TokenKind::NotEq => CmpOp::NotEq,
                TokenKind::Lt => CmpOp::Lt,
                TokenKind::Le => CmpOp::LtE,
                TokenKind::Gt => CmpOp::Gt,
                TokenKind::Ge => CmpOp::GtE,
                TokenKind::In => CmpOp::In,
                TokenKind::Not if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::In)) => {
                    self.advance();
                    CmpOp::NotIn
                }
                TokenKind::Is => {
                    self.advance();
                    if self.eat(&TokenKind::Not) {
                        comparators.push(self.parse_bitwise_or()?);
                        ops.push(CmpOp::IsNot);
                        continue;
                    }
                    comparators.push(self.parse_bitwise_or()?);
                    ops.push(CmpOp::Is);
                    continue;
                }
                _ => break,
            };
            self.advance();
            ops.push(op);
            comparators.push(self.parse_bitwise_or()?);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr {
                kind: ExprKind::Compare { left: Box::new(left), ops, comparators },
                span,
            })
        }
    }

    fn parse_bitwise_or(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut left = self.parse_bitwise_xor()?;
        while self.check(&TokenKind::Pipe) {
            self.advance();
            let right = self.parse_bitwise_xor()?;
            left = Expr {
                kind: ExprKind::BinOp { left: Box::new(left), op: BinOpKind::BitOr, right: Box::new(right) },
                span,
            };
        }
        Ok(left)
    }

    fn parse_bitwise_xor(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut left = self.parse_bitwise_and()?;
        while self.check(&TokenKind::Caret) {
            self.advance();
            let right = self.parse_bitwise_and()?;
            left = Expr {
                kind: ExprKind::BinOp { left: Box::new(left), op: BinOpKind::BitXor, right: Box::new(right) },
                span,
            };
        }
        Ok(left)
    }

    fn parse_bitwise_and(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut left = self.parse_shift()?;
        while self.check(&TokenKind::Amp) {
            self.advance();
            let right = self.parse_shift()?;
            left = Expr {
                kind: ExprKind::BinOp { left: Box::new(left), op: BinOpKind::BitAnd, right: Box::new(right) },
                span,
            };
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut left = self.parse_arith()?;
        loop {
            let op = match self.kind() {
                TokenKind::LShift => BinOpKind::LShift,
                TokenKind::RShift => BinOpKind::RShift,
                _ => break,
            };
            self.advance();
            let right = self.parse_arith()?;
            left = Expr {
                kind: ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) },
                span,
            };
        }
        Ok(left)
    }

    fn parse_arith(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut left = self.parse_term()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOpKind::Add,
                TokenKind::Minus => BinOpKind::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr {
                kind: ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) },
                span,
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> PResult<Expr> {
        let span = self.span();
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinOpKind::Mult,
                TokenKind::Slash => BinOpKind::Div,
                TokenKind::DoubleSlash => BinOpKind::FloorDiv,
                TokenKind::Percent => BinOpKind::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = Expr {
                kind: ExprKind::BinOp { left: Box::new(left), op, right: Box::new(right) },
                span,
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> PResult<Expr> {
        let span = self.span();
        let op = match self.kind() {
            TokenKind::Plus => Some(UnaryOpKind::UAdd),
            TokenKind::Minus => Some(UnaryOpKind::USub),
            TokenKind::Tilde => Some(UnaryOpKind::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_factor()?;
            return Ok(Expr {
                kind: ExprKind::UnaryOp { op, operand: Box::new(operand) },
                span,
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let span = self.span();
        let base = self.parse_postfix()?;
        if self.eat(&TokenKind::DoubleStar) {
            let exponent = self.parse_factor()?;
            return Ok(Expr {
                kind: ExprKind::BinOp { left: Box::new(base), op: BinOpKind::Pow, right: Box::new(exponent) },
                span,
            });
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            let span = self.span();
            if self.eat(&TokenKind::Dot) {
                let attr = self.expect_name()?;
                expr = Expr {
                    kind: ExprKind::Attribute { value: Box::new(expr), attr },
                    span,
                };
            } else if self.eat(&TokenKind::LBracket) {
                let slice = self.parse_slice()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                expr = Expr {
                    kind: ExprKind::Subscript { value: Box::new(expr), slice: Box::new(slice) },
                    span,
                };
            } else if self.eat(&TokenKind::LParen) {
                let (args, keywords) = self.parse_call_args()?;
                self.expect(&TokenKind::RParen, "')'")?;
                expr = Expr {
                    kind: ExprKind::Call { func: Box::new(expr), args, keywords },
                    span,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_slice(&mut self) -> PResult<Slice> {
        if self.check(&TokenKind::Colon) {
            return self.parse_slice_range(None);
        }
        let first = self.parse_test()?;
        if self.check(&TokenKind::Colon) {
            return self.parse_slice_range(Some(first));
        }
        Ok(Slice::Index(first))
    }

    fn parse_slice_range(&mut self, lower: Option<Expr>) -> PResult<Slice> {
        self.expect(&TokenKind::Colon, "':'")?;
        let upper = if matches!(self.kind(), TokenKind::Colon | TokenKind::RBracket) {
            None
        } else {
            Some(self.parse_test()?)
        };
        let step = if self.eat(&TokenKind::Colon) {
            if matches!(self.kind(), TokenKind::RBracket) {
                None
            } else {
                Some(self.parse_test()?)
            }
        } else {
            None
        };
        Ok(Slice::Range { lower, upper, step })
    }

    fn parse_call_args(&mut self) -> PResult<(Vec<Expr>, Vec<(Option<String>, Expr)>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok((args, keywords));
        }
        loop {
            if self.eat(&TokenKind::DoubleStar) {
                let value = self.parse_test()?;
                keywords.push((None, value));
            } else if self.eat(&TokenKind::Star) {
                let value = self.parse_test()?;
                args.push(Expr {
                    span: value.span,
                    kind: ExprKind::Starred(Box::new(value)),
                });
            } else if let TokenKind::Name(n) = self.kind().clone() {
                if matches!(self.tokens.get(self.pos + 1).map(|t| &t.kind), Some(TokenKind::Assign)) {
                    self.advance();
                    self.advance();
                    let value = self.parse_test()?;
                    keywords.push((Some(n), value));
                } else {
                    args.push(self.parse_comprehension_or_test()?);
                }
            } else {
                args.push(self.parse_comprehension_or_test()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            if self.check(&TokenKind::RParen) {
                break;
            }
        }
        Ok((args, keywords))
    }

    /// Inside a single-argument call, `f(x for x in xs)` is a bare
    /// generator expression without its own parens.
    fn parse_comprehension_or_test(&mut self) -> PResult<Expr> {
        let span = self.span();
        let elt = self.parse_test()?;
        if self.check(&TokenKind::For) {
            let generators = self.parse_comprehensions()?;
            return Ok(Expr {
                kind: ExprKind::GeneratorExp { element: Box::new(elt), generators },
                span,
            });
        }
        Ok(elt)
    }

    fn parse_comprehensions(&mut self) -> PResult<Vec<Comprehension>> {
        let mut gens = Vec::new();
        while self.eat(&TokenKind::For) {
            let target = self.parse_target_list()?;
            self.expect(&TokenKind::In, "'in'")?;
            let iter = self.parse_or_test()?;
            let mut ifs = Vec::new();
            while self.eat(&TokenKind::If) {
                ifs.push(self.parse_or_test()?);
            }
            gens.push(Comprehension { target, iter, ifs });
        }
        Ok(gens)
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        let span = self.span();
        match self.kind().clone() {
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr { kind: ExprKind::Constant(Constant::Int(v)), span })
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr { kind: ExprKind::Constant(Constant::Float(v)), span })
            }
            TokenKind::Str(s) => {
                self.advance();
                let mut combined = s;
                while let TokenKind::Str(next) = self.kind().clone() {
                    self.advance();
                    combined.push_str(&next);
                }
                Ok(Expr { kind: ExprKind::Constant(Constant::Str(combined)), span })
            }
            TokenKind::FString(s) => {
                self.advance();
                crate::fstring::parse_fstring(&s, span)
            }
            TokenKind::Bytes(b) => {
                self.advance();
                Ok(Expr { kind: ExprKind::Constant(Constant::Bytes(b)), span })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr { kind: ExprKind::Constant(Constant::Bool(true)), span })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr { kind: ExprKind::Constant(Constant::Bool(false)), span })
            }
            TokenKind::None => {
                self.advance();
                Ok(Expr { kind: ExprKind::Constant(Constant::None), span })
            }
            TokenKind::Name(n) => {
                self.advance();
                Ok(Expr { kind: ExprKind::Name(n), span })
            }
            TokenKind::LParen => {
                self.advance();
                if self.eat(&TokenKind::RParen) {
                    return Ok(Expr { kind: ExprKind::TupleLit(Vec::new()), span });
                }
                let first = self.parse_star_or_test()?;
                if self.check(&TokenKind::For) {
                    let generators = self.parse_comprehensions()?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    return Ok(Expr {
                        kind: ExprKind::GeneratorExp { element: Box::new(first), generators },
                        span,
                    });
                }
                if self.check(&TokenKind::Comma) {
                    let mut items = vec![first];
                    while self.eat(&TokenKind::Comma) {
                        if self.check(&TokenKind::RParen) {
                            break;
                        }
                        items.push(self.parse_star_or_test()?);
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    return Ok(Expr { kind: ExprKind::TupleLit(items), span });
                }
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(first)
            }
            TokenKind::LBracket => {
                self.advance();
                if self.eat(&TokenKind::RBracket) {
                    return Ok(Expr { kind: ExprKind::ListLit(Vec::new()), span });
                }
                let first = self.parse_star_or_test()?;
                if self.check(&TokenKind::For) {
                    let generators = self.parse_comprehensions()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    return Ok(Expr {
                        kind: ExprKind::ListComp { element: Box::new(first), generators },
                        span,
                    });
                }
                let mut items = vec![first];
                while self.eat(&TokenKind::Comma) {
                    if self.check(&TokenKind::RBracket) {
                        break;
                    }
                    items.push(self.parse_star_or_test()?);
                }
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(Expr { kind: ExprKind::ListLit(items), span })
            }
            TokenKind::LBrace => {
                self.advance();
                if self.eat(&TokenKind::RBrace) {
                    return Ok(Expr { kind: ExprKind::DictLit(Vec::new()), span });
                }
                if self.eat(&TokenKind::DoubleStar) {
                    let value = self.parse_or_test()?;
                    let mut entries = vec![(None, value)];
                    while self.eat(&TokenKind::Comma) {
                        if self.check(&TokenKind::RBrace) {
                            break;
                        }
                        entries.push(self.parse_dict_entry()?);
                    }
                    self.expect(&TokenKind::RBrace, "'}'")?;
                    return Ok(Expr { kind: ExprKind::DictLit(entries), span });
                }
                let first = self.parse_star_or_test()?;
                if self.eat(&TokenKind::Colon) {
                    let value = self.parse_test()?;
                    if self.check(&TokenKind::For) {
                        let generators = self.parse_comprehensions()?;
                        self.expect(&TokenKind::RBrace, "'}'")?;
                        return Ok(Expr {
                            kind: ExprKind::DictComp {
                                key: Box::new(first),
                                value: Box::new(value),
                                generators,
                            },
                            span,
                        });
                    }
                    let mut entries = vec![(Some(first), value)];
                    while self.eat(&TokenKind::Comma) {
                        if self.check(&TokenKind::RBrace) {
                            break;
                        }
                        entries.push(self.parse_dict_entry()?);
                    }
                    self.expect(&TokenKind::RBrace, "'}'")?;
                    return Ok(Expr { kind: ExprKind::DictLit(entries), span });
                }
                if self.check(&TokenKind::For) {
                    let generators = self.parse_comprehensions()?;
                    self.expect(&TokenKind::RBrace, "'}'")?;
                    return Ok(Expr {
                        kind: ExprKind::SetComp { element: Box::new(first), generators },
                        span,
                    });
                }
                let mut items = vec![first];
                while self.eat(&TokenKind::Comma) {
                    if self.check(&TokenKind::RBrace) {
                        break;
                    }
                    items.push(self.parse_star_or_test()?);
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
                Ok(Expr { kind: ExprKind::SetLit(items), span })
            }
            TokenKind::Lambda => self.parse_lambda(),
            TokenKind::Await => Err(self.unsupported("'await' is not supported")),
            TokenKind::Yield => Err(self.unsupported("'yield' is not supported")),
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_dict_entry(&mut self) -> PResult<(Option<Expr>, Expr)> {
        if self.eat(&TokenKind::DoubleStar) {
            let value = self.parse_or_test()?;
            return Ok((None, value));
        }
        let key = self.parse_test()?;
        self.expect(&TokenKind::Colon, "':'")?;
        let value = self.parse_test()?;
        Ok((Some(key), value))
    }
}
