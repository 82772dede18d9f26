//! agex-core — pure data types for the agex agent runtime.
//!
//! Entity identifiers, the error taxonomy, configuration, the
//! data-interchange value universe, message types for the LLM client
//! contract, and the event taxonomy. Pure data: no policy, no state
//! backends, no evaluator. Every other crate in the workspace depends on
//! this one.

mod config;
mod error;
mod event;
mod identity;
mod message;
mod value;

pub use config::*;
pub use error::*;
pub use event::*;
pub use identity::*;
pub use message::*;
pub use value::*;
