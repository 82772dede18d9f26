//! The event taxonomy (SPEC_FULL.md §3, grounded in the original
//! `agex.agent.events` module). Notebook/HTML rendering aesthetics
//! (`_repr_markdown_`, `_repr_html_`, IPython formatter registration) are
//! an explicit non-goal and are not represented here — only the structural
//! fields of each event kind matter to this runtime.

use crate::identity::{AgentId, EventId, Timestamp};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A task invocation began.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStartEvent {
    pub task_name: String,
    pub inputs: Value,
    pub message: String,
}

/// The LLM produced a `{thinking, code}` turn and it was evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub thinking: String,
    pub code: String,
}

/// The agent printed output during an iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub parts: Vec<Value>,
}

/// A recoverable (by default) error occurred during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error: String,
    pub recoverable: bool,
}

/// The task completed successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessEvent {
    pub result: Value,
}

/// The task failed outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailEvent {
    pub message: String,
}

/// The task asked its caller for clarification instead of finishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarifyEvent {
    pub message: String,
}

/// The iteration ended with `task_continue()`: no outcome yet, but a note
/// for the next iteration's context message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinueEvent {
    pub message: Option<String>,
}

/// The tagged union of everything that can appear in an agent's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventKind {
    TaskStart(TaskStartEvent),
    Action(ActionEvent),
    Output(OutputEvent),
    Error(ErrorEvent),
    Success(SuccessEvent),
    Fail(FailEvent),
    Clarify(ClarifyEvent),
    Continue(ContinueEvent),
}

/// A logged event: the tagged payload plus the bookkeeping every event
/// carries regardless of kind (SPEC_FULL.md's `BaseEvent` analogue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub agent_name: String,
    /// The agent instance that emitted this event; `None` for events
    /// emitted before an agent identity is established (rare).
    pub agent_id: Option<AgentId>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(agent_name: impl Into<String>, agent_id: Option<AgentId>, kind: EventKind) -> Self {
        Self {
            id: EventId::now_v7(),
            timestamp: chrono::Utc::now(),
            agent_name: agent_name.into(),
            agent_id,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_round_trips_through_json() {
        let ev = Event::new(
            "worker",
            None,
            EventKind::Fail(FailEvent {
                message: "boom".into(),
            }),
        );
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }
}
