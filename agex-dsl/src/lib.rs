//! Lexer, parser, and sandboxed tree-walking evaluator for the restricted-
//! Python agent language.
//!
//! ```text
//! source text
//!     -> Scanner (indentation-aware tokenizer)
//!     -> Parser (recursive descent, precedence climbing for expressions)
//!     -> Module (crate::ast)
//!     -> eval::evaluate (tree-walking visitor, Policy + State backed)
//! ```

pub mod ast;
pub mod eval;
pub mod fstring;
pub mod lexer;
pub mod parser;

pub use ast::Module;
pub use eval::{
    evaluate, Budget, Env, EvalCtx, NativeRegistry, RunOutcome, RuntimeValue, Signal, TaskDispatcher,
    TaskMarker, TaskOutcome, UserFunction,
};
pub use lexer::Scanner;
pub use parser::{parse, Parser};
