//! Append-only event and conversation logs for an agex agent, layered on
//! top of `agex_storage::State` rather than a standalone store of their
//! own. An agent's event log and message log are just more keys in the
//! same `Versioned`/`Namespaced`/`Ephemeral` state its task-level data
//! lives in — they ride along with every `snapshot()`, survive a
//! `checkout()` to a historical commit, and stay isolated per agent the
//! same way `Namespaced` isolates everything else.
//!
//! Both logs are append-only: entries are written once under a reserved
//! (`__`-prefixed) key and never mutated or removed, and an index key
//! records the ordered list of entry keys. `agex_storage::is_reserved`
//! already keeps these out of `State::keys()`/rendered diffs, so nothing
//! here needs its own filtering on top.

use agex_core::{Event, Message, StateError};
use agex_storage::State;

/// The reserved key holding the ordered list of event entry keys.
pub const EVENT_LOG_KEY: &str = "__event_log__";
/// The reserved key holding the ordered list of message entry keys.
pub const MSG_LOG_KEY: &str = "__msg_log__";

fn event_entry_key(seq: usize) -> String {
    format!("__event_{seq:020}__")
}

fn message_entry_key(seq: usize) -> String {
    format!("__msg_{seq:020}__")
}

fn log_keys(state: &dyn State, log_key: &str) -> Vec<String> {
    match state.get(log_key) {
        Some(agex_core::Value::List(items)) => items
            .borrow()
            .iter()
            .filter_map(|v| match v {
                agex_core::Value::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn push_log_key(state: &dyn State, log_key: &str, entry_key: String) -> Result<(), StateError> {
    let mut keys: Vec<agex_core::Value> = log_keys(state, log_key)
        .into_iter()
        .map(agex_core::Value::Str)
        .collect();
    keys.push(agex_core::Value::Str(entry_key));
    state.set(log_key, agex_core::Value::list(keys))
}

/// Append one event to `state`'s event log, assigning it the next sequence
/// number in that log (the log's own length — append-only, so this is
/// always unique and monotonic for a given state handle).
pub fn append_event(state: &dyn State, event: &Event) -> Result<(), StateError> {
    let seq = log_keys(state, EVENT_LOG_KEY).len();
    let json = serde_json::to_string(event).map_err(|e| StateError::Serialization {
        key: EVENT_LOG_KEY.to_string(),
        reason: e.to_string(),
    })?;
    let key = event_entry_key(seq);
    state.set(&key, agex_core::Value::Str(json))?;
    push_log_key(state, EVENT_LOG_KEY, key)
}

/// Every event recorded in `state`'s log, oldest first.
pub fn events(state: &dyn State) -> Vec<Event> {
    log_keys(state, EVENT_LOG_KEY)
        .into_iter()
        .filter_map(|k| state.get(&k))
        .filter_map(|v| match v {
            agex_core::Value::Str(s) => serde_json::from_str(&s).ok(),
            _ => None,
        })
        .collect()
}

/// Append one conversation turn to `state`'s message log.
pub fn append_message(state: &dyn State, message: &Message) -> Result<(), StateError> {
    let seq = log_keys(state, MSG_LOG_KEY).len();
    let json = serde_json::to_string(message).map_err(|e| StateError::Serialization {
        key: MSG_LOG_KEY.to_string(),
        reason: e.to_string(),
    })?;
    let key = message_entry_key(seq);
    state.set(&key, agex_core::Value::Str(json))?;
    push_log_key(state, MSG_LOG_KEY, key)
}

/// Every message recorded in `state`'s conversation log, oldest first —
/// the history the task loop replays to the LLM client on every iteration.
pub fn messages(state: &dyn State) -> Vec<Message> {
    log_keys(state, MSG_LOG_KEY)
        .into_iter()
        .filter_map(|k| state.get(&k))
        .filter_map(|v| match v {
            agex_core::Value::Str(s) => serde_json::from_str(&s).ok(),
            _ => None,
        })
        .collect()
}

/// Merge several agents' event logs (e.g. a parent and its sub-agents)
/// into one chronological timeline, stable on ties so two events with the
/// same timestamp keep the relative order `logs` gave them.
pub fn merge_chronological(logs: &[Vec<Event>]) -> Vec<Event> {
    let mut merged: Vec<Event> = logs.iter().flatten().cloned().collect();
    merged.sort_by_key(|e| e.timestamp);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use agex_core::{EventKind, FailEvent, Role, SuccessEvent, Value};
    use agex_storage::{base_store, MemoryBackend, StoreKind};
    use std::rc::Rc;

    fn fresh_state() -> Rc<dyn State> {
        base_store(StoreKind::Persistent, Box::new(MemoryBackend::new()))
    }

    #[test]
    fn appended_events_read_back_in_order() {
        let state = fresh_state();
        append_event(
            &*state,
            &Event::new("worker", None, EventKind::Success(SuccessEvent { result: Value::Int(1) })),
        )
        .unwrap();
        append_event(
            &*state,
            &Event::new("worker", None, EventKind::Fail(FailEvent { message: "no".into() })),
        )
        .unwrap();
        let log = events(&*state);
        assert_eq!(log.len(), 2);
        assert!(matches!(log[0].kind, EventKind::Success(_)));
        assert!(matches!(log[1].kind, EventKind::Fail(_)));
    }

    #[test]
    fn event_log_entries_are_reserved_and_never_surfaced() {
        let state = fresh_state();
        append_event(
            &*state,
            &Event::new("worker", None, EventKind::Fail(FailEvent { message: "x".into() })),
        )
        .unwrap();
        assert!(state.keys().is_empty());
    }

    #[test]
    fn messages_round_trip() {
        let state = fresh_state();
        append_message(&*state, &Message::text(Role::User, "hello")).unwrap();
        append_message(&*state, &Message::text(Role::Assistant, "hi")).unwrap();
        let log = messages(&*state);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].as_plain_text(), "hello");
        assert_eq!(log[1].role(), Role::Assistant);
    }

    #[test]
    fn merge_chronological_orders_across_logs() {
        let a = vec![Event::new("a", None, EventKind::Fail(FailEvent { message: "1".into() }))];
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = vec![Event::new("b", None, EventKind::Fail(FailEvent { message: "2".into() }))];
        let merged = merge_chronological(&[b.clone(), a.clone()]);
        assert_eq!(merged[0].agent_name, "a");
        assert_eq!(merged[1].agent_name, "b");
    }
}
