//! Error taxonomy for the agex runtime (see SPEC_FULL.md §7).

use thiserror::Error;

/// Errors raised while resolving names, attributes, or modules against a
/// policy registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("name '{name}' is not defined")]
    NameNotDefined { name: String },

    #[error("attribute '{attr}' is not allowed on {on}")]
    AttributeNotAllowed { attr: String, on: String },

    #[error("module '{module}' is not registered")]
    ModuleNotRegistered { module: String },

    #[error("submodule '{submodule}' is not reachable from non-recursive module '{module}'")]
    SubmoduleNotReachable { module: String, submodule: String },

    #[error("agent name '{name}' is already registered")]
    DuplicateAgentName { name: String },

    #[error("no agent found for fingerprint {fingerprint}")]
    UnknownFingerprint { fingerprint: String },
}

/// A source span within evaluated code, used to anchor evaluator errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

/// Errors raised while lexing, parsing, or tree-walking sandboxed code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("{span:?}: syntax error: {message}")]
    Syntax { span: Span, message: String },

    #[error("{span:?}: unsupported language construct: {construct}")]
    Unsupported { span: Span, construct: String },

    #[error("{span:?}: name error: {0}", span = span)]
    Name {
        #[source]
        source: PolicyError,
        span: Span,
    },

    #[error("{span:?}: attribute error: {0}", span = span)]
    Attribute {
        #[source]
        source: PolicyError,
        span: Span,
    },

    #[error("{span:?}: type error: {message}")]
    Type { span: Span, message: String },

    #[error("{span:?}: key error: {key}")]
    Key { span: Span, key: String },

    #[error("{span:?}: index out of range: {index} (len {len})")]
    Index { span: Span, index: i64, len: usize },

    #[error("{span:?}: division by zero")]
    ZeroDivision { span: Span },

    #[error("{span:?}: value error: {message}")]
    Value { span: Span, message: String },

    #[error("operation budget exceeded ({count} operations)")]
    OperationBudgetExceeded { count: u64 },

    #[error("evaluation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("{span:?}: value for key '{key}' could not be validated for serialization: {reason}")]
    NotSerializable {
        span: Span,
        key: String,
        reason: String,
    },

    #[error("{span:?}: return value does not match expected type '{expected}': {reason}")]
    ValidationFailed {
        span: Span,
        expected: String,
        reason: String,
    },
}

/// Errors raised by the state store (Ephemeral / Versioned / Namespaced).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("commit '{commit}' not found in history")]
    UnknownCommit { commit: String },

    #[error("namespace name '{name}' must not contain '/'")]
    InvalidNamespaceName { name: String },

    #[error("cannot wrap a transient store in a Namespaced view; use base_store() first")]
    CannotNamespaceTransient,

    #[error("backend I/O error: {reason}")]
    Backend { reason: String },

    #[error("serialization failed for key '{key}': {reason}")]
    Serialization { key: String, reason: String },
}

/// Errors surfaced by the LLM client contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("no response could be parsed into {{thinking, code}}: {reason}")]
    MalformedResponse { reason: String },

    #[error("request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("prompt exceeds model context window: {tokens} tokens > {window} window")]
    ContextWindowExceeded { tokens: usize, window: usize },

    #[error("exhausted {attempts} retries calling {provider}: {reason}")]
    RetriesExhausted {
        provider: String,
        attempts: u32,
        reason: String,
    },
}

/// Errors raised while validating configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("provider not supported: {provider}")]
    ProviderNotSupported { provider: String },
}

/// The task-loop-level outcomes that are not errors but control-flow
/// signals (see SPEC_FULL.md §7 "Rust shape of task signals"). Kept
/// separate from `AgexError` deliberately: a `TaskFail`/`TaskClarify` is an
/// expected, typed outcome of running a task, not a bug.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Fail(String),

    #[error("task needs clarification: {0}")]
    Clarify(String),

    #[error("task exceeded its iteration budget ({max_iterations} iterations)")]
    Timeout { max_iterations: u32 },

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Master error type composing every layer, following the same
/// `#[from]`-composition idiom used throughout this workspace's data crate.
#[derive(Debug, Clone, Error)]
pub enum AgexError {
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("task error: {0}")]
    Task(#[from] TaskError),
}

/// Result type alias for agex operations.
pub type AgexResult<T> = Result<T, AgexError>;
