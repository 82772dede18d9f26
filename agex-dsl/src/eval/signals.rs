//! Control-flow and task outcomes modeled as a dedicated signal type
//! instead of catchable exceptions (spec.md §9 "Exceptions for control
//! flow"). `return`/`break`/`continue` and the `task_*` builtins unwind the
//! visitor exactly like a Rust `?`-propagated error, but `Try`/`Except`
//! refuses to catch anything except `Signal::Error` wrapping a genuinely
//! catchable `EvalError` variant — a stray `break` outside a loop or a
//! `task_success()` call can never be swallowed by user `except` blocks.

use agex_core::EvalError;

#[derive(Debug, Clone)]
pub enum Signal {
    /// A catchable runtime error. `kind_name()` gives the Python exception
    /// class name used to match `except ExceptionName:` clauses.
    Error(EvalError),
    /// A `raise SomeException("message")` naming a builtin exception type
    /// not otherwise represented in `EvalError` (e.g. `RuntimeError`,
    /// `StopIteration`, `NotImplementedError`), or a per-instance mapped
    /// host exception (`InstanceNamespace::exception_mappings`).
    Raised { kind: String, message: String },
    Return(crate::eval::value::RuntimeValue),
    Break,
    Continue,
    TaskSuccess(crate::eval::value::RuntimeValue),
    TaskContinue(Option<String>),
    TaskFail(String),
    TaskClarify(String),
}

impl From<EvalError> for Signal {
    fn from(e: EvalError) -> Self {
        Signal::Error(e)
    }
}

impl Signal {
    /// Whether a bare/typed `except` clause may ever catch this signal.
    /// Control-flow and task-outcome signals, plus interpreter-limit
    /// errors (`Timeout`, `OperationBudgetExceeded`, `Unsupported`,
    /// `Syntax`), are never catchable by sandboxed code.
    pub fn is_catchable(&self) -> bool {
        match self {
            Signal::Error(e) => !matches!(
                e,
                EvalError::Timeout { .. }
                    | EvalError::OperationBudgetExceeded { .. }
                    | EvalError::Unsupported { .. }
                    | EvalError::Syntax { .. }
            ),
            Signal::Raised { .. } => true,
            _ => false,
        }
    }

    pub fn kind_name(&self) -> String {
        match self {
            Signal::Error(e) => eval_error_kind_name(e),
            Signal::Raised { kind, .. } => kind.clone(),
            _ => "Exception".into(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Signal::Error(e) => e.to_string(),
            Signal::Raised { message, .. } => message.clone(),
            _ => String::new(),
        }
    }
}

/// Maps an `EvalError` to the Python exception class name sandboxed code
/// would see in an `except` clause.
pub fn eval_error_kind_name(e: &EvalError) -> String {
    match e {
        EvalError::Syntax { .. } => "SyntaxError".into(),
        EvalError::Unsupported { .. } => "RuntimeError".into(),
        EvalError::Name { .. } => "NameError".into(),
        EvalError::Attribute { .. } => "AttributeError".into(),
        EvalError::Type { .. } => "TypeError".into(),
        EvalError::Key { .. } => "KeyError".into(),
        EvalError::Index { .. } => "IndexError".into(),
        EvalError::ZeroDivision { .. } => "ZeroDivisionError".into(),
        EvalError::Value { .. } => "ValueError".into(),
        EvalError::OperationBudgetExceeded { .. } => "RuntimeError".into(),
        EvalError::Timeout { .. } => "RuntimeError".into(),
        EvalError::NotSerializable { .. } => "ValueError".into(),
        EvalError::ValidationFailed { .. } => "ValueError".into(),
    }
}

/// The set of built-in exception names `except Name:` may reference,
/// including `Exception`/`BaseException` as catch-all aliases.
pub fn exception_name_matches(clause: &str, kind: &str) -> bool {
    clause == kind || clause == "Exception" || clause == "BaseException"
}
