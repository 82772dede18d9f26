//! The sandboxed tree-walking evaluator: the visitor that actually runs a
//! parsed program against a `Policy` and a `State`-backed `Env`, plus the
//! per-call budget and the top-level task-loop entrypoint.
//!
//! There is no bytecode compiler and no lazy iterator machinery — every
//! statement and expression is walked directly off the AST, and anything
//! the language treats as a generator (`GeneratorExp`, `ListComp`, ...) is
//! eagerly materialized into a `Vec` (`ops::iterate`). That keeps the whole
//! interpreter a single recursive-descent visitor with one control-flow
//! mechanism (`Signal`, not Rust panics or `std::error::Error` exceptions).

pub mod builtins;
pub mod container_methods;
pub mod env;
pub mod format;
pub mod native;
pub mod ops;
pub mod signals;
pub mod value;

pub use env::Env;
pub use native::NativeRegistry;
pub use signals::Signal;
pub use value::{RuntimeValue, TaskMarker, UserFunction};

use crate::ast::{
    BinOpKind, BoolOpKind, CmpOp, Comprehension, Constant, Expr, ExprKind, Param, Params, Slice,
    Stmt, StmtKind, UnaryOpKind,
};
use agex_core::{EvalError, PolicyError, RuntimeLimits, Span, Value};
use agex_policy::{NameBinding, Policy, Resolved};
use agex_storage::State;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use value::{ClassDef, FieldDef, Instance, NativeFunction, RuntimeKey};

/// Per-evaluation resource accounting (spec.md "Runtime limits"): every
/// statement and every expression node charges one operation, and the
/// whole run has a wall-clock deadline independent of the operation count
/// (an allocation-heavy but low-node-count loop can still blow the clock).
pub struct Budget {
    max_operations: u64,
    operations: u64,
    start: Instant,
    deadline: Instant,
}

impl Budget {
    pub fn new(limits: &RuntimeLimits) -> Self {
        let start = Instant::now();
        Self {
            max_operations: limits.max_operations,
            operations: 0,
            start,
            deadline: start + limits.eval_timeout,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(&RuntimeLimits {
            eval_timeout: Duration::from_secs(u64::MAX / 2),
            ..RuntimeLimits::default()
        })
    }

    fn tick(&mut self) -> Result<(), Signal> {
        self.operations += 1;
        if self.operations > self.max_operations {
            return Err(Signal::Error(EvalError::OperationBudgetExceeded {
                count: self.operations,
            }));
        }
        if Instant::now() >= self.deadline {
            return Err(Signal::Error(EvalError::Timeout {
                elapsed_ms: self.start.elapsed().as_millis() as u64,
            }));
        }
        Ok(())
    }
}

/// Everything the visitor threads through a single evaluation: the
/// capability registry, the native call dispatch table, the source text
/// (for error rendering and function `source` capture), the resource
/// budget, the accumulated `print()` output, and the signal an active
/// `except` clause is currently handling (for bare `raise`).
pub struct EvalCtx<'a> {
    pub policy: &'a Policy,
    pub natives: &'a NativeRegistry,
    pub source: &'a str,
    pub budget: Budget,
    pub stdout: Vec<String>,
    /// The state backing this run's root `Env`, surfaced separately so
    /// native functions (sub-agent task dispatch, in particular) can reach
    /// it without walking the `Env` chain themselves.
    pub state: Rc<dyn State>,
    /// Installed by the crate that owns the task loop (`agex-agents`) so a
    /// `@task(...)`-decorated function defined in sandboxed code drives a
    /// sub-agent invocation instead of running as a plain call. `None`
    /// outside a task-loop context (e.g. a bare `evaluate()` in a test) —
    /// calling a task-marked function then fails with a descriptive error
    /// rather than silently running it as a normal function.
    pub task_dispatch: Option<&'a dyn TaskDispatcher>,
    active_exception: Option<Signal>,
}

impl<'a> EvalCtx<'a> {
    pub fn new(
        policy: &'a Policy,
        natives: &'a NativeRegistry,
        source: &'a str,
        limits: &RuntimeLimits,
        state: Rc<dyn State>,
    ) -> Self {
        Self {
            policy,
            natives,
            source,
            budget: Budget::new(limits),
            stdout: Vec::new(),
            state,
            task_dispatch: None,
            active_exception: None,
        }
    }

    /// Installs the sub-agent dispatcher for this evaluation. Chainable so
    /// a task loop can write `EvalCtx::new(...).with_dispatcher(&self)`.
    pub fn with_dispatcher(mut self, dispatcher: &'a dyn TaskDispatcher) -> Self {
        self.task_dispatch = Some(dispatcher);
        self
    }
}

/// Hook a host crate installs on `EvalCtx` to drive a sub-agent task loop
/// when sandboxed code calls a `@task(...)`-decorated function
/// (spec.md §4.2 "Sub-agent dispatch"). Kept as a trait here (rather than
/// `agex-dsl` depending on `agex-agents`) so the evaluator stays at the
/// bottom of the dependency graph; `agex-agents` is the only crate that
/// implements it.
pub trait TaskDispatcher {
    fn dispatch(
        &self,
        func: &Rc<UserFunction>,
        args: Vec<RuntimeValue>,
        kwargs: IndexMap<String, RuntimeValue>,
        span: Span,
        ctx: &mut EvalCtx,
    ) -> Result<RuntimeValue, Signal>;
}

/// What a task invocation ended in, mirroring the `task_success` /
/// `task_fail` / `task_clarify` / `task_continue` control builtins.
/// `Completed` covers plain scripts (and `__main__`-level code run outside
/// a task loop) that fall off the end without ever calling one of them.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Success(RuntimeValue),
    Fail(String),
    Clarify(String),
    Continue(Option<String>),
    Completed,
}

pub struct RunOutcome {
    pub outcome: TaskOutcome,
    pub stdout: Vec<String>,
}

/// Runs a full program (one LLM-generated code block) against `env`,
/// returning once it either falls off the end or hits one of the task
/// control builtins. An uncaught `raise` becomes an `Err`, matching an
/// unhandled exception aborting the iteration the way spec.md's task loop
/// expects to observe it.
pub fn evaluate(program: &[Stmt], env: &Env, ctx: &mut EvalCtx) -> Result<RunOutcome, EvalError> {
    match exec_block(program, env, ctx) {
        Ok(()) => Ok(RunOutcome { outcome: TaskOutcome::Completed, stdout: std::mem::take(&mut ctx.stdout) }),
        Err(Signal::TaskSuccess(v)) => Ok(RunOutcome { outcome: TaskOutcome::Success(v), stdout: std::mem::take(&mut ctx.stdout) }),
        Err(Signal::TaskFail(m)) => Ok(RunOutcome { outcome: TaskOutcome::Fail(m), stdout: std::mem::take(&mut ctx.stdout) }),
        Err(Signal::TaskClarify(m)) => Ok(RunOutcome { outcome: TaskOutcome::Clarify(m), stdout: std::mem::take(&mut ctx.stdout) }),
        Err(Signal::TaskContinue(m)) => Ok(RunOutcome { outcome: TaskOutcome::Continue(m), stdout: std::mem::take(&mut ctx.stdout) }),
        Err(Signal::Return(_)) | Err(Signal::Break) | Err(Signal::Continue) => {
            Ok(RunOutcome { outcome: TaskOutcome::Completed, stdout: std::mem::take(&mut ctx.stdout) })
        }
        Err(Signal::Error(e)) => Err(e),
        Err(Signal::Raised { kind, message }) => Err(EvalError::Value {
            span: Span::default(),
            message: format!("unhandled {kind}: {message}"),
        }),
    }
}

fn exec_block(stmts: &[Stmt], env: &Env, ctx: &mut EvalCtx) -> Result<(), Signal> {
    for stmt in stmts {
        ctx.budget.tick()?;
        exec_stmt(stmt, env, ctx)?;
    }
    Ok(())
}

fn exec_stmt(stmt: &Stmt, env: &Env, ctx: &mut EvalCtx) -> Result<(), Signal> {
    let span = stmt.span;
    match &stmt.kind {
        StmtKind::Expr(e) => {
            eval_expr(e, env, ctx)?;
            Ok(())
        }
        StmtKind::Assign { targets, value } => {
            let v = eval_expr(value, env, ctx)?;
            for target in targets {
                assign_target(target, v.clone(), env, ctx)?;
            }
            Ok(())
        }
        StmtKind::AugAssign { target, op, value } => {
            let current = eval_expr(target, env, ctx)?;
            let rhs = eval_expr(value, env, ctx)?;
            let updated = apply_binop(span, *op, &current, &rhs)?;
            assign_target(target, updated, env, ctx)
        }
        StmtKind::AnnAssign { target, value } => {
            if let Some(v) = value {
                let rv = eval_expr(v, env, ctx)?;
                assign_target(target, rv, env, ctx)?;
            }
            Ok(())
        }
        StmtKind::Return(e) => {
            let v = match e {
                Some(expr) => eval_expr(expr, env, ctx)?,
                None => RuntimeValue::none(),
            };
            Err(Signal::Return(v))
        }
        StmtKind::Pass => Ok(()),
        StmtKind::Break => Err(Signal::Break),
        StmtKind::Continue => Err(Signal::Continue),
        StmtKind::Delete(targets) => {
            for t in targets {
                delete_target(t, env, ctx)?;
            }
            Ok(())
        }
        StmtKind::If { test, body, orelse } => {
            if eval_expr(test, env, ctx)?.is_truthy() {
                exec_block(body, env, ctx)
            } else {
                exec_block(orelse, env, ctx)
            }
        }
        StmtKind::While { test, body, orelse } => {
            loop {
                ctx.budget.tick()?;
                if !eval_expr(test, env, ctx)?.is_truthy() {
                    return exec_block(orelse, env, ctx);
                }
                match exec_block(body, env, ctx) {
                    Ok(()) => {}
                    Err(Signal::Break) => return Ok(()),
                    Err(Signal::Continue) => continue,
                    Err(other) => return Err(other),
                }
            }
        }
        StmtKind::For { target, iter, body, orelse } => {
            let iterable = eval_expr(iter, env, ctx)?;
            let items = ops::iterate(iter.span, &iterable)?;
            for item in items {
                ctx.budget.tick()?;
                assign_target(target, item, env, ctx)?;
                match exec_block(body, env, ctx) {
                    Ok(()) => {}
                    Err(Signal::Break) => return Ok(()),
                    Err(Signal::Continue) => continue,
                    Err(other) => return Err(other),
                }
            }
            exec_block(orelse, env, ctx)
        }
        StmtKind::FunctionDef { name, params, body, decorators } => {
            let task_marker = task_marker_from_decorators(decorators, env, ctx)?;
            let func = Rc::new(UserFunction {
                name: name.clone(),
                params: params.clone(),
                body: Rc::new(body.clone()),
                closure: env.clone(),
                source: slice_source(ctx.source, span),
                is_lambda: false,
                owner_fingerprint: None,
                task_marker,
            });
            env.set_local(name, RuntimeValue::Function(func))
                .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: name.clone(), reason: e }))?;
            Ok(())
        }
        StmtKind::ClassDef { name, decorators: _, fields, methods } => {
            let closure = env.clone();
            let mut method_table = IndexMap::new();
            for m in methods {
                if let StmtKind::FunctionDef { name: mname, params, body, decorators } = &m.kind {
                    let task_marker = task_marker_from_decorators(decorators, env, ctx)?;
                    method_table.insert(
                        mname.clone(),
                        Rc::new(UserFunction {
                            name: mname.clone(),
                            params: params.clone(),
                            body: Rc::new(body.clone()),
                            closure: closure.clone(),
                            source: slice_source(ctx.source, m.span),
                            is_lambda: false,
                            owner_fingerprint: None,
                            task_marker,
                        }),
                    );
                }
            }
            let class = Rc::new(ClassDef {
                name: name.clone(),
                fields: fields
                    .iter()
                    .map(|f| FieldDef { name: f.name.clone(), default: f.default.clone() })
                    .collect(),
                methods: method_table,
                closure,
            });
            env.set_local(name, RuntimeValue::Class(class))
                .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: name.clone(), reason: e }))?;
            Ok(())
        }
        StmtKind::Import { names } => {
            for (dotted, alias) in names {
                if !ctx.policy.modules.contains_key(dotted) {
                    return Err(Signal::Error(EvalError::Name {
                        source: PolicyError::ModuleNotRegistered { module: dotted.clone() },
                        span,
                    }));
                }
                let bound_name = alias.clone().unwrap_or_else(|| dotted.split('.').next().unwrap_or(dotted).to_string());
                env.set_local(&bound_name, RuntimeValue::Module(dotted.clone()))
                    .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: bound_name.clone(), reason: e }))?;
            }
            Ok(())
        }
        StmtKind::ImportFrom { module, names } => {
            for (member, alias) in names {
                let bound_name = alias.clone().unwrap_or_else(|| member.clone());
                let resolved = ctx
                    .policy
                    .resolve_module_member(module, member)
                    .map_err(|e| Signal::Error(EvalError::Name { source: e, span }))?;
                let value = match resolved {
                    Resolved::Function(f) => native_host_call(f.name),
                    Resolved::Class(c) => native_host_call(c.name),
                    Resolved::Module(m) => RuntimeValue::Module(m.name),
                    Resolved::Constant(_) => {
                        let dotted = format!("{module}.{member}");
                        call_native_dotted(&dotted, &[], IndexMap::new(), span, ctx)?
                    }
                };
                env.set_local(&bound_name, value)
                    .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: bound_name.clone(), reason: e }))?;
            }
            Ok(())
        }
        StmtKind::Try { body, handlers, orelse, finalbody } => {
            let body_result = exec_block(body, env, ctx);
            let mut outcome = match body_result {
                Ok(()) => exec_block(orelse, env, ctx),
                Err(sig) if sig.is_catchable() => {
                    let mut handled = None;
                    for h in handlers {
                        let matches = match &h.kind {
                            None => true,
                            Some(kind_expr) => match &kind_expr.kind {
                                ExprKind::Name(n) => signals::exception_name_matches(n, &sig.kind_name()),
                                _ => false,
                            },
                        };
                        if matches {
                            if let Some(bind_name) = &h.name {
                                env.set_local(bind_name, RuntimeValue::str(sig.message())).ok();
                            }
                            let prior = ctx.active_exception.replace(sig.clone());
                            let result = exec_block(&h.body, env, ctx);
                            ctx.active_exception = prior;
                            handled = Some(result);
                            break;
                        }
                    }
                    handled.unwrap_or(Err(sig))
                }
                Err(sig) => Err(sig),
            };
            let finally_result = exec_block(finalbody, env, ctx);
            if finally_result.is_err() {
                outcome = finally_result;
            }
            outcome
        }
        StmtKind::Raise { exc, cause: _ } => Err(raise_signal(exc.as_ref(), env, ctx, span)?),
        StmtKind::With { items, body } => {
            for item in items {
                let v = eval_expr(&item.context_expr, env, ctx)?;
                if let Some(target) = &item.optional_vars {
                    assign_target(target, v, env, ctx)?;
                }
            }
            exec_block(body, env, ctx)
        }
        StmtKind::Assert { test, msg } => {
            if eval_expr(test, env, ctx)?.is_truthy() {
                Ok(())
            } else {
                let message = match msg {
                    Some(m) => ops::str_of(&eval_expr(m, env, ctx)?),
                    None => String::new(),
                };
                Err(Signal::Raised { kind: "AssertionError".into(), message })
            }
        }
    }
}

fn slice_source(source: &str, span: Span) -> String {
    source.get(span.start..span.end).unwrap_or_default().to_string()
}

fn task_marker_from_decorators(decorators: &[Expr], env: &Env, ctx: &mut EvalCtx) -> Result<Option<TaskMarker>, Signal> {
    for d in decorators {
        let (attr, keywords): (Option<&str>, &[(Option<String>, Expr)]) = match &d.kind {
            ExprKind::Call { func, keywords, .. } => (decorator_attr(func), keywords.as_slice()),
            other => (decorator_attr_kind(other), &[]),
        };
        if attr == Some("task") {
            let mut state_arg = None;
            for (name, value) in keywords {
                if name.as_deref() == Some("state") {
                    if let ExprKind::Constant(Constant::Str(s)) = &value.kind {
                        state_arg = Some(s.clone());
                    } else {
                        let v = eval_expr(value, env, ctx)?;
                        if let RuntimeValue::Data(Value::Str(s)) = v {
                            state_arg = Some(s);
                        }
                    }
                }
            }
            return Ok(Some(TaskMarker { state_arg }));
        }
    }
    Ok(None)
}

fn decorator_attr(func: &Expr) -> Option<&str> {
    decorator_attr_kind(&func.kind)
}

fn decorator_attr_kind(kind: &ExprKind) -> Option<&str> {
    match kind {
        ExprKind::Name(n) => Some(n.as_str()),
        ExprKind::Attribute { attr, .. } => Some(attr.as_str()),
        _ => None,
    }
}

fn raise_signal(exc: Option<&Expr>, env: &Env, ctx: &mut EvalCtx, span: Span) -> Result<Signal, Signal> {
    match exc {
        None => match ctx.active_exception.clone() {
            Some(sig) => Ok(sig),
            None => Ok(Signal::Raised { kind: "RuntimeError".into(), message: "No active exception to re-raise".into() }),
        },
        Some(e) => match &e.kind {
            ExprKind::Call { func, args, .. } => match decorator_attr(func) {
                Some(kind) => {
                    let message = match args.first() {
                        Some(a) => ops::str_of(&eval_expr(a, env, ctx)?),
                        None => String::new(),
                    };
                    Ok(Signal::Raised { kind: kind.to_string(), message })
                }
                None => {
                    let v = eval_expr(e, env, ctx)?;
                    Ok(Signal::Raised { kind: "RuntimeError".into(), message: ops::str_of(&v) })
                }
            },
            ExprKind::Name(n) => Ok(Signal::Raised { kind: n.clone(), message: String::new() }),
            _ => {
                let v = eval_expr(e, env, ctx)?;
                Ok(Signal::Raised { kind: "RuntimeError".into(), message: ops::str_of(&v) })
            }
        },
    }
}

// -- expressions --------------------------------------------------------

pub fn eval_expr(expr: &Expr, env: &Env, ctx: &mut EvalCtx) -> Result<RuntimeValue, Signal> {
    ctx.budget.tick()?;
    let span = expr.span;
    match &expr.kind {
        ExprKind::Constant(c) => Ok(constant_value(c)),
        ExprKind::Name(n) => resolve_name(n, span, env, ctx),
        ExprKind::ListLit(items) => Ok(RuntimeValue::list(eval_splat_list(items, env, ctx)?)),
        ExprKind::TupleLit(items) => Ok(RuntimeValue::tuple(eval_splat_list(items, env, ctx)?)),
        ExprKind::SetLit(items) => Ok(RuntimeValue::set(
            eval_splat_list(items, env, ctx)?.into_iter().map(RuntimeKey).collect(),
        )),
        ExprKind::DictLit(pairs) => {
            let mut out = IndexMap::new();
            for (key_expr, value_expr) in pairs {
                match key_expr {
                    Some(k) => {
                        let key = eval_expr(k, env, ctx)?;
                        let value = eval_expr(value_expr, env, ctx)?;
                        out.insert(RuntimeKey(key), value);
                    }
                    None => {
                        let unpacked = eval_expr(value_expr, env, ctx)?;
                        if let RuntimeValue::Dict(d) = &unpacked {
                            for (k, v) in d.borrow().iter() {
                                out.insert(k.clone(), v.clone());
                            }
                        }
                    }
                }
            }
            Ok(RuntimeValue::dict(out))
        }
        ExprKind::BoolOp { op, values } => {
            let mut result = RuntimeValue::none();
            for v in values {
                result = eval_expr(v, env, ctx)?;
                let short_circuit = match op {
                    BoolOpKind::And => !result.is_truthy(),
                    BoolOpKind::Or => result.is_truthy(),
                };
                if short_circuit {
                    return Ok(result);
                }
            }
            Ok(result)
        }
        ExprKind::BinOp { left, op, right } => {
            let a = eval_expr(left, env, ctx)?;
            let b = eval_expr(right, env, ctx)?;
            apply_binop(span, *op, &a, &b).map_err(Signal::Error)
        }
        ExprKind::UnaryOp { op, operand } => {
            let v = eval_expr(operand, env, ctx)?;
            Ok(match op {
                UnaryOpKind::Not => ops::unary_not(&v),
                UnaryOpKind::UAdd => ops::unary_pos(span, &v)?,
                UnaryOpKind::USub => ops::unary_neg(span, &v)?,
                UnaryOpKind::Invert => ops::unary_invert(span, &v)?,
            })
        }
        ExprKind::Compare { left, ops: cmp_ops, comparators } => {
            let mut prev = eval_expr(left, env, ctx)?;
            for (op, comp_expr) in cmp_ops.iter().zip(comparators.iter()) {
                let cur = eval_expr(comp_expr, env, ctx)?;
                let result = apply_cmp(span, *op, &prev, &cur)?;
                if !result {
                    return Ok(RuntimeValue::bool(false));
                }
                prev = cur;
            }
            Ok(RuntimeValue::bool(true))
        }
        ExprKind::IfExp { test, body, orelse } => {
            if eval_expr(test, env, ctx)?.is_truthy() {
                eval_expr(body, env, ctx)
            } else {
                eval_expr(orelse, env, ctx)
            }
        }
        ExprKind::Attribute { value, attr } => {
            let receiver = eval_expr(value, env, ctx)?;
            get_attribute(&receiver, attr, span, ctx)
        }
        ExprKind::Subscript { value, slice } => {
            let receiver = eval_expr(value, env, ctx)?;
            get_subscript(&receiver, slice, span, env, ctx)
        }
        ExprKind::Call { func, args, keywords } => eval_call(func, args, keywords, span, env, ctx),
        ExprKind::JoinedStr(parts) => {
            let mut out = String::new();
            for p in parts {
                match &p.kind {
                    ExprKind::FormattedValue { value, format_spec } => {
                        let v = eval_expr(value, env, ctx)?;
                        out.push_str(&format::render_formatted_value(p.span, &v, format_spec.as_deref())?);
                    }
                    _ => out.push_str(&ops::str_of(&eval_expr(p, env, ctx)?)),
                }
            }
            Ok(RuntimeValue::str(out))
        }
        ExprKind::FormattedValue { value, format_spec } => {
            let v = eval_expr(value, env, ctx)?;
            Ok(RuntimeValue::str(format::render_formatted_value(span, &v, format_spec.as_deref())?))
        }
        ExprKind::Lambda { params, body } => {
            let synthetic = Stmt { kind: StmtKind::Return(Some((**body).clone())), span };
            Ok(RuntimeValue::Function(Rc::new(UserFunction {
                name: "<lambda>".into(),
                params: params.clone(),
                body: Rc::new(vec![synthetic]),
                closure: env.clone(),
                source: slice_source(ctx.source, span),
                is_lambda: true,
                owner_fingerprint: None,
                task_marker: None,
            })))
        }
        ExprKind::ListComp { element, generators } => {
            let mut out = Vec::new();
            eval_comprehension(generators, env, ctx, &mut |scope, ctx| {
                out.push(eval_expr(element, scope, ctx)?);
                Ok(())
            })?;
            Ok(RuntimeValue::list(out))
        }
        ExprKind::SetComp { element, generators } => {
            let mut out = indexmap::IndexSet::new();
            eval_comprehension(generators, env, ctx, &mut |scope, ctx| {
                out.insert(RuntimeKey(eval_expr(element, scope, ctx)?));
                Ok(())
            })?;
            Ok(RuntimeValue::set(out))
        }
        ExprKind::DictComp { key, value, generators } => {
            let mut out = IndexMap::new();
            eval_comprehension(generators, env, ctx, &mut |scope, ctx| {
                let k = eval_expr(key, scope, ctx)?;
                let v = eval_expr(value, scope, ctx)?;
                out.insert(RuntimeKey(k), v);
                Ok(())
            })?;
            Ok(RuntimeValue::dict(out))
        }
        ExprKind::GeneratorExp { element, generators } => {
            let mut out = Vec::new();
            eval_comprehension(generators, env, ctx, &mut |scope, ctx| {
                out.push(eval_expr(element, scope, ctx)?);
                Ok(())
            })?;
            Ok(RuntimeValue::list(out))
        }
        ExprKind::Starred(inner) => eval_expr(inner, env, ctx),
        ExprKind::NamedExpr { target, value } => {
            let v = eval_expr(value, env, ctx)?;
            env.set_local(target, v.clone())
                .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: target.clone(), reason: e }))?;
            Ok(v)
        }
    }
}

fn eval_splat_list(items: &[Expr], env: &Env, ctx: &mut EvalCtx) -> Result<Vec<RuntimeValue>, Signal> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if let ExprKind::Starred(inner) = &item.kind {
            let v = eval_expr(inner, env, ctx)?;
            out.extend(ops::iterate(item.span, &v)?);
        } else {
            out.push(eval_expr(item, env, ctx)?);
        }
    }
    Ok(out)
}

fn constant_value(c: &Constant) -> RuntimeValue {
    match c {
        Constant::None => RuntimeValue::none(),
        Constant::Bool(b) => RuntimeValue::bool(*b),
        Constant::Int(i) => RuntimeValue::int(*i),
        Constant::Float(f) => RuntimeValue::float(*f),
        Constant::Str(s) => RuntimeValue::str(s.clone()),
        Constant::Bytes(b) => RuntimeValue::Data(Value::bytes(b.clone())),
    }
}

fn apply_binop(span: Span, op: BinOpKind, a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, EvalError> {
    match op {
        BinOpKind::Add => ops::binop_add(span, a, b),
        BinOpKind::Sub => ops::binop_sub(span, a, b),
        BinOpKind::Mult => ops::binop_mult(span, a, b),
        BinOpKind::Div => ops::binop_div(span, a, b),
        BinOpKind::FloorDiv => ops::binop_floordiv(span, a, b),
        BinOpKind::Mod => ops::binop_mod(span, a, b),
        BinOpKind::Pow => ops::binop_pow(span, a, b),
        BinOpKind::LShift => ops::binop_lshift(span, a, b),
        BinOpKind::RShift => ops::binop_rshift(span, a, b),
        BinOpKind::BitOr => ops::binop_bitor(span, a, b),
        BinOpKind::BitXor => ops::binop_bitxor(span, a, b),
        BinOpKind::BitAnd => ops::binop_bitand(span, a, b),
    }
}

fn apply_cmp(span: Span, op: CmpOp, a: &RuntimeValue, b: &RuntimeValue) -> Result<bool, Signal> {
    Ok(match op {
        CmpOp::Eq => ops::values_eq(a, b),
        CmpOp::NotEq => !ops::values_eq(a, b),
        CmpOp::Lt => ops::compare_lt(span, a, b)?,
        CmpOp::LtE => !ops::compare_lt(span, b, a)?,
        CmpOp::Gt => ops::compare_lt(span, b, a)?,
        CmpOp::GtE => !ops::compare_lt(span, a, b)?,
        CmpOp::Is => identical(a, b),
        CmpOp::IsNot => !identical(a, b),
        CmpOp::In => ops::contains(span, b, a)?,
        CmpOp::NotIn => !ops::contains(span, b, a)?,
    })
}

fn identical(a: &RuntimeValue, b: &RuntimeValue) -> bool {
    match (a, b) {
        (RuntimeValue::Data(Value::None), RuntimeValue::Data(Value::None)) => true,
        (RuntimeValue::Instance(x), RuntimeValue::Instance(y)) => Rc::ptr_eq(x, y),
        (RuntimeValue::List(x), RuntimeValue::List(y)) => Rc::ptr_eq(x, y),
        (RuntimeValue::Dict(x), RuntimeValue::Dict(y)) => Rc::ptr_eq(x, y),
        (RuntimeValue::Set(x), RuntimeValue::Set(y)) => Rc::ptr_eq(x, y),
        (RuntimeValue::Function(x), RuntimeValue::Function(y)) => Rc::ptr_eq(x, y),
        _ => ops::values_eq(a, b),
    }
}

fn eval_comprehension(
    generators: &[Comprehension],
    env: &Env,
    ctx: &mut EvalCtx,
    emit: &mut dyn FnMut(&Env, &mut EvalCtx) -> Result<(), Signal>,
) -> Result<(), Signal> {
    match generators.split_first() {
        None => emit(env, ctx),
        Some((g, rest)) => {
            let iterable = eval_expr(&g.iter, env, ctx)?;
            let items = ops::iterate(g.iter.span, &iterable)?;
            for item in items {
                ctx.budget.tick()?;
                let scope = env.child();
                assign_target(&g.target, item, &scope, ctx)?;
                let mut keep = true;
                for cond in &g.ifs {
                    if !eval_expr(cond, &scope, ctx)?.is_truthy() {
                        keep = false;
                        break;
                    }
                }
                if keep {
                    eval_comprehension(rest, &scope, ctx, emit)?;
                }
            }
            Ok(())
        }
    }
}

fn resolve_name(name: &str, span: Span, env: &Env, ctx: &mut EvalCtx) -> Result<RuntimeValue, Signal> {
    if let Some(v) = env.get(name) {
        return Ok(v);
    }
    match ctx.policy.resolve_name(name) {
        Some(NameBinding::Builtin(b)) => Ok(native_builtin_call(b)),
        Some(NameBinding::Function(f)) => Ok(native_host_call(f.name)),
        Some(NameBinding::Class(c)) => Ok(native_host_call(c.name)),
        Some(NameBinding::Module(m)) => Ok(RuntimeValue::Module(m)),
        Some(NameBinding::Instance(i)) => Ok(RuntimeValue::HostInstance(i)),
        None => Err(Signal::Error(EvalError::Name {
            source: PolicyError::NameNotDefined { name: name.to_string() },
            span,
        })),
    }
}

/// Wraps a stdlib-style builtin (`len`, `print`, ...) so it's a first-class
/// callable value, not just something the `Call` visitor special-cases —
/// `f = len; f([1, 2])` works the same as calling `len` directly.
fn native_builtin_call(name: &'static str) -> RuntimeValue {
    RuntimeValue::Native(Rc::new(NativeFunction {
        name: name.to_string(),
        call: Rc::new(move |args, kwargs, span, ctx| builtins::call_builtin(name, args.to_vec(), kwargs.clone(), span, ctx)),
    }))
}

/// Wraps a `Policy`-certified dotted capability name so it can flow through
/// the value universe as a plain callable; the actual implementation is
/// looked up in `ctx.natives` at call time, not bound eagerly, so
/// registering natives and building the policy can happen in either order.
fn native_host_call(dotted_name: String) -> RuntimeValue {
    RuntimeValue::Native(Rc::new(NativeFunction {
        name: dotted_name.clone(),
        call: Rc::new(move |args, kwargs, span, ctx| call_native_dotted(&dotted_name, args, kwargs.clone(), span, ctx)),
    }))
}

fn call_native_dotted(
    dotted: &str,
    args: &[RuntimeValue],
    kwargs: IndexMap<String, RuntimeValue>,
    span: Span,
    ctx: &mut EvalCtx,
) -> Result<RuntimeValue, Signal> {
    let f = ctx.natives.get(dotted).ok_or_else(|| {
        Signal::Error(EvalError::Attribute {
            source: PolicyError::AttributeNotAllowed { attr: dotted.to_string(), on: "<natives>".into() },
            span,
        })
    })?;
    (f.call)(args, &kwargs, span, ctx)
}

fn bound_container_method(receiver: RuntimeValue, type_name: String, method: String) -> RuntimeValue {
    RuntimeValue::Native(Rc::new(NativeFunction {
        name: format!("{type_name}.{method}"),
        call: Rc::new(move |args, _kwargs, span, _ctx| {
            container_methods::call_container_method(&receiver, &method, args, span).map_err(Signal::Error)
        }),
    }))
}

fn get_attribute(receiver: &RuntimeValue, attr: &str, span: Span, ctx: &mut EvalCtx) -> Result<RuntimeValue, Signal> {
    match receiver {
        RuntimeValue::Instance(inst) => {
            if let Some(v) = inst.fields.borrow().get(attr) {
                return Ok(v.clone());
            }
            if let Some(m) = inst.class.methods.get(attr) {
                return Ok(RuntimeValue::BoundMethod(inst.clone(), m.clone()));
            }
            Err(Signal::Error(EvalError::Attribute {
                source: PolicyError::AttributeNotAllowed { attr: attr.to_string(), on: inst.class.name.clone() },
                span,
            }))
        }
        RuntimeValue::Class(c) => c
            .methods
            .get(attr)
            .map(|m| RuntimeValue::Function(m.clone()))
            .ok_or_else(|| {
                Signal::Error(EvalError::Attribute {
                    source: PolicyError::AttributeNotAllowed { attr: attr.to_string(), on: c.name.clone() },
                    span,
                })
            }),
        RuntimeValue::Module(name) => match ctx.policy.resolve_module_member(name, attr) {
            Ok(Resolved::Function(f)) => Ok(native_host_call(f.name)),
            Ok(Resolved::Class(c)) => Ok(native_host_call(c.name)),
            Ok(Resolved::Module(m)) => Ok(RuntimeValue::Module(m.name)),
            Ok(Resolved::Constant(_)) => call_native_dotted(&format!("{name}.{attr}"), &[], IndexMap::new(), span, ctx),
            Err(e) => Err(Signal::Error(EvalError::Attribute { source: e, span })),
        },
        RuntimeValue::HostInstance(name) => match ctx.policy.resolve_instance_member(name, attr) {
            Ok(f) => Ok(native_host_call(f.name.clone())),
            Err(e) => Err(Signal::Error(EvalError::Attribute { source: e, span })),
        },
        RuntimeValue::Data(Value::Str(_)) => container_method_or_err(receiver, "str", attr, span),
        RuntimeValue::List(_) => container_method_or_err(receiver, "list", attr, span),
        RuntimeValue::Dict(_) => container_method_or_err(receiver, "dict", attr, span),
        RuntimeValue::Set(_) => container_method_or_err(receiver, "set", attr, span),
        RuntimeValue::Data(Value::Bytes(_)) => container_method_or_err(receiver, "bytes", attr, span),
        other => Err(Signal::Error(EvalError::Attribute {
            source: PolicyError::AttributeNotAllowed { attr: attr.to_string(), on: other.type_name() },
            span,
        })),
    }
}

fn container_method_or_err(receiver: &RuntimeValue, type_name: &'static str, attr: &str, span: Span) -> Result<RuntimeValue, Signal> {
    if Policy::builtin_container_method_allowed(type_name, attr) {
        Ok(bound_container_method(receiver.clone(), type_name.to_string(), attr.to_string()))
    } else {
        Err(Signal::Error(EvalError::Attribute {
            source: PolicyError::AttributeNotAllowed { attr: attr.to_string(), on: type_name.to_string() },
            span,
        }))
    }
}

fn to_i64(span: Span, v: &RuntimeValue) -> Result<i64, Signal> {
    match v {
        RuntimeValue::Data(Value::Int(i)) => Ok(*i),
        RuntimeValue::Data(Value::Bool(b)) => Ok(if *b { 1 } else { 0 }),
        _ => Err(Signal::Error(EvalError::Type { span, message: "slice indices must be integers".into() })),
    }
}

fn get_subscript(receiver: &RuntimeValue, slice: &Slice, span: Span, env: &Env, ctx: &mut EvalCtx) -> Result<RuntimeValue, Signal> {
    match slice {
        Slice::Index(idx_expr) => {
            let idx = eval_expr(idx_expr, env, ctx)?;
            index_value(span, receiver, &idx)
        }
        Slice::Range { lower, upper, step } => {
            let lower = opt_i64(lower, env, ctx)?;
            let upper = opt_i64(upper, env, ctx)?;
            let step = match step {
                Some(e) => to_i64(span, &eval_expr(e, env, ctx)?)?,
                None => 1,
            };
            if step == 0 {
                return Err(Signal::Error(EvalError::Value { span, message: "slice step cannot be zero".into() }));
            }
            slice_value(span, receiver, lower, upper, step)
        }
    }
}

fn opt_i64(e: &Option<Expr>, env: &Env, ctx: &mut EvalCtx) -> Result<Option<i64>, Signal> {
    match e {
        Some(expr) => Ok(Some(to_i64(expr.span, &eval_expr(expr, env, ctx)?)?)),
        None => Ok(None),
    }
}

fn index_value(span: Span, receiver: &RuntimeValue, idx: &RuntimeValue) -> Result<RuntimeValue, Signal> {
    match receiver {
        RuntimeValue::List(items) => {
            let b = items.borrow();
            let i = normalize_index(span, to_i64(span, idx)?, b.len())?;
            Ok(b[i].clone())
        }
        RuntimeValue::Tuple(items) => {
            let i = normalize_index(span, to_i64(span, idx)?, items.len())?;
            Ok(items[i].clone())
        }
        RuntimeValue::Data(Value::Str(s)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(span, to_i64(span, idx)?, chars.len())?;
            Ok(RuntimeValue::str(chars[i].to_string()))
        }
        RuntimeValue::Data(Value::Bytes(b)) => {
            let i = normalize_index(span, to_i64(span, idx)?, b.len())?;
            Ok(RuntimeValue::int(b[i] as i64))
        }
        RuntimeValue::Range(r) => {
            let i = to_i64(span, idx)?;
            r.nth(i)
                .map(RuntimeValue::int)
                .ok_or_else(|| Signal::Error(EvalError::Index { span, index: i, len: r.len() }))
        }
        RuntimeValue::Dict(items) => items
            .borrow()
            .get(&RuntimeKey(idx.clone()))
            .cloned()
            .ok_or_else(|| Signal::Error(EvalError::Key { span, key: ops::repr_of(idx) })),
        other => Err(Signal::Error(EvalError::Type {
            span,
            message: format!("'{}' object is not subscriptable", other.type_name()),
        })),
    }
}

fn normalize_index(span: Span, i: i64, len: usize) -> Result<usize, Signal> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx < 0 || idx >= len as i64 {
        Err(Signal::Error(EvalError::Index { span, index: i, len }))
    } else {
        Ok(idx as usize)
    }
}

fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len_i = len as i64;
    let clamp = |i: i64| -> i64 { i.clamp(0, len_i) };
    let mut out = Vec::new();
    if step > 0 {
        let start = lower.map(|l| if l < 0 { clamp(l + len_i) } else { clamp(l) }).unwrap_or(0);
        let stop = upper.map(|u| if u < 0 { clamp(u + len_i) } else { clamp(u) }).unwrap_or(len_i);
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let start = lower
            .map(|l| if l < 0 { (l + len_i).max(-1) } else { l.min(len_i - 1) })
            .unwrap_or(len_i - 1);
        let stop = upper
            .map(|u| if u < 0 { (u + len_i).max(-1) } else { u.min(len_i - 1) })
            .unwrap_or(-1);
        let mut i = start;
        while i > stop {
            if i >= 0 && i < len_i {
                out.push(i as usize);
            }
            i += step;
        }
    }
    out
}

fn slice_value(span: Span, receiver: &RuntimeValue, lower: Option<i64>, upper: Option<i64>, step: i64) -> Result<RuntimeValue, Signal> {
    match receiver {
        RuntimeValue::List(items) => {
            let b = items.borrow();
            let idx = slice_indices(b.len(), lower, upper, step);
            Ok(RuntimeValue::list(idx.into_iter().map(|i| b[i].clone()).collect()))
        }
        RuntimeValue::Tuple(items) => {
            let idx = slice_indices(items.len(), lower, upper, step);
            Ok(RuntimeValue::tuple(idx.into_iter().map(|i| items[i].clone()).collect()))
        }
        RuntimeValue::Data(Value::Str(s)) => {
            let chars: Vec<char> = s.chars().collect();
            let idx = slice_indices(chars.len(), lower, upper, step);
            Ok(RuntimeValue::str(idx.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        RuntimeValue::Data(Value::Bytes(b)) => {
            let idx = slice_indices(b.len(), lower, upper, step);
            Ok(RuntimeValue::Data(Value::bytes(idx.into_iter().map(|i| b[i]).collect())))
        }
        other => Err(Signal::Error(EvalError::Type {
            span,
            message: format!("'{}' object is not subscriptable", other.type_name()),
        })),
    }
}

fn eval_call(func: &Expr, args: &[Expr], keywords: &[(Option<String>, Expr)], span: Span, env: &Env, ctx: &mut EvalCtx) -> Result<RuntimeValue, Signal> {
    let pos_args = eval_splat_list(args, env, ctx)?;
    let mut kwargs = IndexMap::new();
    for (name, value_expr) in keywords {
        match name {
            Some(n) => {
                kwargs.insert(n.clone(), eval_expr(value_expr, env, ctx)?);
            }
            None => {
                let v = eval_expr(value_expr, env, ctx)?;
                if let RuntimeValue::Dict(d) = &v {
                    for (k, val) in d.borrow().iter() {
                        if let RuntimeValue::Data(Value::Str(s)) = &k.0 {
                            kwargs.insert(s.clone(), val.clone());
                        }
                    }
                }
            }
        }
    }
    let callee = eval_expr(func, env, ctx)?;
    call_callable(ctx, &callee, pos_args, kwargs, span)
}

pub fn call_callable(
    ctx: &mut EvalCtx,
    func: &RuntimeValue,
    args: Vec<RuntimeValue>,
    kwargs: IndexMap<String, RuntimeValue>,
    span: Span,
) -> Result<RuntimeValue, Signal> {
    match func {
        RuntimeValue::Function(f) => {
            if f.task_marker.is_some() {
                return match ctx.task_dispatch {
                    Some(dispatcher) => dispatcher.dispatch(f, args, kwargs, span, ctx),
                    None => Err(Signal::Error(EvalError::Type {
                        span,
                        message: format!(
                            "'{}' is a task function, but no sub-agent dispatcher is installed for this run",
                            f.name
                        ),
                    })),
                };
            }
            let child = bind_params(ctx, &f.params, args, kwargs, &f.closure, span, &f.name)?;
            match exec_block(&f.body, &child, ctx) {
                Ok(()) => Ok(RuntimeValue::none()),
                Err(Signal::Return(v)) => Ok(v),
                Err(other) => Err(other),
            }
        }
        RuntimeValue::BoundMethod(inst, m) => {
            let mut full_args = Vec::with_capacity(args.len() + 1);
            full_args.push(RuntimeValue::Instance(inst.clone()));
            full_args.extend(args);
            if m.task_marker.is_some() {
                return match ctx.task_dispatch {
                    Some(dispatcher) => dispatcher.dispatch(m, full_args, kwargs, span, ctx),
                    None => Err(Signal::Error(EvalError::Type {
                        span,
                        message: format!(
                            "'{}' is a task method, but no sub-agent dispatcher is installed for this run",
                            m.name
                        ),
                    })),
                };
            }
            let child = bind_params(ctx, &m.params, full_args, kwargs, &m.closure, span, &m.name)?;
            match exec_block(&m.body, &child, ctx) {
                Ok(()) => Ok(RuntimeValue::none()),
                Err(Signal::Return(v)) => Ok(v),
                Err(other) => Err(other),
            }
        }
        RuntimeValue::Native(nf) => (nf.call)(&args, &kwargs, span, ctx),
        RuntimeValue::Class(c) => instantiate(ctx, c, args, kwargs, span),
        other => Err(Signal::Error(EvalError::Type {
            span,
            message: format!("'{}' object is not callable", other.type_name()),
        })),
    }
}

fn bind_params(
    ctx: &mut EvalCtx,
    params: &Params,
    args: Vec<RuntimeValue>,
    mut kwargs: IndexMap<String, RuntimeValue>,
    closure: &Env,
    span: Span,
    fname: &str,
) -> Result<Env, Signal> {
    let child = closure.child();
    let mut args_iter = args.into_iter();
    for p in &params.positional {
        let v = bind_one(ctx, p, &mut args_iter, &mut kwargs, &child, span, fname)?;
        child
            .set_local(&p.name, v)
            .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: p.name.clone(), reason: e }))?;
    }
    let remaining: Vec<RuntimeValue> = args_iter.collect();
    if let Some(va) = &params.vararg {
        child
            .set_local(va, RuntimeValue::tuple(remaining))
            .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: va.clone(), reason: e }))?;
    } else if !remaining.is_empty() {
        return Err(Signal::Error(EvalError::Type {
            span,
            message: format!("{fname}() takes {} positional argument(s) but more were given", params.positional.len()),
        }));
    }
    for p in &params.kwonly {
        let v = if let Some(v) = kwargs.shift_remove(&p.name) {
            v
        } else if let Some(d) = &p.default {
            eval_expr(d, &child, ctx)?
        } else {
            return Err(Signal::Error(EvalError::Type {
                span,
                message: format!("{fname}() missing required keyword-only argument: '{}'", p.name),
            }));
        };
        child
            .set_local(&p.name, v)
            .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: p.name.clone(), reason: e }))?;
    }
    if let Some(kw) = &params.kwarg {
        let dict: IndexMap<RuntimeKey, RuntimeValue> =
            kwargs.into_iter().map(|(k, v)| (RuntimeKey(RuntimeValue::str(k)), v)).collect();
        child
            .set_local(kw, RuntimeValue::dict(dict))
            .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: kw.clone(), reason: e }))?;
    } else if !kwargs.is_empty() {
        return Err(Signal::Error(EvalError::Type {
            span,
            message: format!("{fname}() got an unexpected keyword argument '{}'", kwargs.keys().next().unwrap()),
        }));
    }
    Ok(child)
}

fn bind_one(
    ctx: &mut EvalCtx,
    p: &Param,
    args_iter: &mut std::vec::IntoIter<RuntimeValue>,
    kwargs: &mut IndexMap<String, RuntimeValue>,
    child: &Env,
    span: Span,
    fname: &str,
) -> Result<RuntimeValue, Signal> {
    if let Some(v) = args_iter.next() {
        return Ok(v);
    }
    if let Some(v) = kwargs.shift_remove(&p.name) {
        return Ok(v);
    }
    if let Some(d) = &p.default {
        return eval_expr(d, child, ctx);
    }
    Err(Signal::Error(EvalError::Type {
        span,
        message: format!("{fname}() missing required argument: '{}'", p.name),
    }))
}

fn instantiate(ctx: &mut EvalCtx, c: &Rc<ClassDef>, args: Vec<RuntimeValue>, kwargs: IndexMap<String, RuntimeValue>, span: Span) -> Result<RuntimeValue, Signal> {
    let mut fields = IndexMap::new();
    let mut args_iter = args.into_iter();
    let mut kwargs = kwargs;
    for f in &c.fields {
        let v = if let Some(v) = args_iter.next() {
            v
        } else if let Some(v) = kwargs.shift_remove(&f.name) {
            v
        } else if let Some(d) = &f.default {
            eval_expr(d, &c.closure, ctx)?
        } else {
            return Err(Signal::Error(EvalError::Type {
                span,
                message: format!("{}() missing required argument: '{}'", c.name, f.name),
            }));
        };
        fields.insert(f.name.clone(), v);
    }
    if !kwargs.is_empty() {
        return Err(Signal::Error(EvalError::Type {
            span,
            message: format!("{}() got an unexpected keyword argument '{}'", c.name, kwargs.keys().next().unwrap()),
        }));
    }
    Ok(RuntimeValue::Instance(Rc::new(Instance { class: c.clone(), fields: RefCell::new(fields) })))
}

fn assign_target(target: &Expr, value: RuntimeValue, env: &Env, ctx: &mut EvalCtx) -> Result<(), Signal> {
    let span = target.span;
    match &target.kind {
        ExprKind::Name(n) => env
            .set_local(n, value)
            .map_err(|e| Signal::Error(EvalError::NotSerializable { span, key: n.clone(), reason: e })),
        ExprKind::TupleLit(items) | ExprKind::ListLit(items) => {
            let values = ops::iterate(span, &value)?;
            destructure(items, values, env, ctx, span)
        }
        ExprKind::Attribute { value: obj_expr, attr } => {
            let obj = eval_expr(obj_expr, env, ctx)?;
            match &obj {
                RuntimeValue::Instance(inst) => {
                    inst.fields.borrow_mut().insert(attr.clone(), value);
                    Ok(())
                }
                other => Err(Signal::Error(EvalError::Attribute {
                    source: PolicyError::AttributeNotAllowed { attr: attr.clone(), on: other.type_name() },
                    span,
                })),
            }
        }
        ExprKind::Subscript { value: obj_expr, slice } => {
            let obj = eval_expr(obj_expr, env, ctx)?;
            assign_subscript(&obj, slice, value, span, env, ctx)
        }
        _ => Err(Signal::Error(EvalError::Unsupported { span, construct: "assignment target".into() })),
    }
}

fn destructure(targets: &[Expr], values: Vec<RuntimeValue>, env: &Env, ctx: &mut EvalCtx, span: Span) -> Result<(), Signal> {
    if let Some(star_pos) = targets.iter().position(|t| matches!(t.kind, ExprKind::Starred(_))) {
        let before = &targets[..star_pos];
        let after = &targets[star_pos + 1..];
        if values.len() < before.len() + after.len() {
            return Err(Signal::Error(EvalError::Value { span, message: "not enough values to unpack".into() }));
        }
        for (t, v) in before.iter().zip(values.iter()) {
            assign_target(t, v.clone(), env, ctx)?;
        }
        let mid_end = values.len() - after.len();
        let mid: Vec<RuntimeValue> = values[before.len()..mid_end].to_vec();
        if let ExprKind::Starred(inner) = &targets[star_pos].kind {
            assign_target(inner, RuntimeValue::list(mid), env, ctx)?;
        }
        for (t, v) in after.iter().zip(values[mid_end..].iter()) {
            assign_target(t, v.clone(), env, ctx)?;
        }
        Ok(())
    } else {
        if values.len() != targets.len() {
            return Err(Signal::Error(EvalError::Value {
                span,
                message: format!("expected {} values to unpack, got {}", targets.len(), values.len()),
            }));
        }
        for (t, v) in targets.iter().zip(values.into_iter()) {
            assign_target(t, v, env, ctx)?;
        }
        Ok(())
    }
}

fn assign_subscript(receiver: &RuntimeValue, slice: &Slice, value: RuntimeValue, span: Span, env: &Env, ctx: &mut EvalCtx) -> Result<(), Signal> {
    match (receiver, slice) {
        (RuntimeValue::List(items), Slice::Index(idx_expr)) => {
            let idx = eval_expr(idx_expr, env, ctx)?;
            let i = normalize_index(span, to_i64(span, &idx)?, items.borrow().len())?;
            items.borrow_mut()[i] = value;
            Ok(())
        }
        (RuntimeValue::Dict(items), Slice::Index(idx_expr)) => {
            let key = eval_expr(idx_expr, env, ctx)?;
            items.borrow_mut().insert(RuntimeKey(key), value);
            Ok(())
        }
        (RuntimeValue::List(items), Slice::Range { lower, upper, step }) => {
            let lower = opt_i64(lower, env, ctx)?;
            let upper = opt_i64(upper, env, ctx)?;
            let step_val = match step {
                Some(e) => to_i64(span, &eval_expr(e, env, ctx)?)?,
                None => 1,
            };
            let replacement = ops::iterate(span, &value)?;
            let mut b = items.borrow_mut();
            if step_val == 1 {
                let len = b.len() as i64;
                let start = lower.map(|l| if l < 0 { l + len } else { l }).unwrap_or(0).clamp(0, len) as usize;
                let end = upper.map(|u| if u < 0 { u + len } else { u }).unwrap_or(len).clamp(start as i64, len) as usize;
                b.splice(start..end, replacement);
            } else {
                let idx = slice_indices(b.len(), lower, upper, step_val);
                if idx.len() != replacement.len() {
                    return Err(Signal::Error(EvalError::Value {
                        span,
                        message: "attempt to assign sequence of different size to extended slice".into(),
                    }));
                }
                for (i, v) in idx.into_iter().zip(replacement.into_iter()) {
                    b[i] = v;
                }
            }
            Ok(())
        }
        _ => Err(Signal::Error(EvalError::Type {
            span,
            message: format!("'{}' object does not support item assignment", receiver.type_name()),
        })),
    }
}

fn delete_target(target: &Expr, env: &Env, ctx: &mut EvalCtx) -> Result<(), Signal> {
    let span = target.span;
    match &target.kind {
        ExprKind::Name(n) => {
            env.remove(n);
            Ok(())
        }
        ExprKind::Attribute { value, attr } => {
            let obj = eval_expr(value, env, ctx)?;
            if let RuntimeValue::Instance(inst) = &obj {
                inst.fields.borrow_mut().shift_remove(attr);
                Ok(())
            } else {
                Err(Signal::Error(EvalError::Attribute {
                    source: PolicyError::AttributeNotAllowed { attr: attr.clone(), on: obj.type_name() },
                    span,
                }))
            }
        }
        ExprKind::Subscript { value, slice } => {
            let obj = eval_expr(value, env, ctx)?;
            match (&obj, slice.as_ref()) {
                (RuntimeValue::List(items), Slice::Index(idx_expr)) => {
                    let idx = eval_expr(idx_expr, env, ctx)?;
                    let i = normalize_index(span, to_i64(span, &idx)?, items.borrow().len())?;
                    items.borrow_mut().remove(i);
                    Ok(())
                }
                (RuntimeValue::Dict(items), Slice::Index(idx_expr)) => {
                    let key = eval_expr(idx_expr, env, ctx)?;
                    if items.borrow_mut().shift_remove(&RuntimeKey(key.clone())).is_none() {
                        return Err(Signal::Error(EvalError::Key { span, key: ops::repr_of(&key) }));
                    }
                    Ok(())
                }
                _ => Err(Signal::Error(EvalError::Type {
                    span,
                    message: format!("'{}' object doesn't support item deletion", obj.type_name()),
                })),
            }
        }
        _ => Err(Signal::Error(EvalError::Unsupported { span, construct: "delete target".into() })),
    }
}
