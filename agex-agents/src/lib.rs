//! The agex agent runtime: agent identity and registry, the `Task<In, Out>`
//! builder, structural output validation, and the think→act task loop that
//! drives both top-level task invocations and in-sandbox sub-agent
//! dispatch.
//!
//! This is the crate that ties the rest of the workspace together: a
//! `Policy` (agex-policy) says what sandboxed code may reach, a `State`
//! (agex-storage) holds what it has written, `evaluate` (agex-dsl) walks
//! one LLM turn's code against both, and an `LlmClient` (agex-llm) is what
//! produces that code in the first place. `Agent` and `Task` are the
//! pieces that close the loop between them.

mod agent;
mod dispatch;
mod task;
mod validation;

pub use agent::{agent_by_fingerprint, agent_by_name, Agent, AgentBuilder};
pub use dispatch::{run_task_loop, start_task};
pub use task::Task;
pub use validation::{validate, TypeSpec, TypeSpecOf};
