//! Turns `agex_policy::Policy` and `agex_storage::State` into prompt text
//! within a token budget.
//!
//! Two entry points, mirroring the two messages the task loop needs each
//! iteration:
//! - [`render_system_message`]: the static primer + rendered Policy
//!   definitions, built once per agent.
//! - [`render_context_message`]: the per-iteration state-diff/stdout
//!   summary, rebuilt every iteration and subject to a token budget.
//!
//! Token counting is abstracted behind [`TokenCounter`] so the truncation
//! logic in [`context`] never needs to know whether it's backed by a real
//! tiktoken encoding or the chars/4 fallback estimator.

mod context;
mod definitions;
mod tokens;
mod value;

pub use context::{render_context_message, stdout_from_state};
pub use definitions::{render_definitions, render_system_message, PRIMER_TEXT};
pub use tokens::{token_counter_for_model, CharsFallbackCounter, TiktokenCounter, TokenCounter};
pub use value::ValueRenderer;
