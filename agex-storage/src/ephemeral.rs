//! In-memory transient store (spec.md §3 "Ephemeral / Live"): never
//! persisted, used when a task invocation supplies no state at all.

use crate::state::{is_reserved, State};
use agex_core::{StateError, Value};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct EphemeralState {
    data: Rc<RefCell<IndexMap<String, Value>>>,
}

impl EphemeralState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State for EphemeralState {
    fn get(&self, key: &str) -> Option<Value> {
        self.data.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        self.data.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> bool {
        self.data.borrow_mut().shift_remove(key).is_some()
    }

    fn keys(&self) -> Vec<String> {
        self.data
            .borrow()
            .keys()
            .filter(|k| !is_reserved(k))
            .cloned()
            .collect()
    }

    fn is_transient(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let s = EphemeralState::new();
        s.set("x", Value::Int(1)).unwrap();
        assert_eq!(s.get("x").map(|v| v.type_name()), Some("int"));
    }

    #[test]
    fn reserved_keys_are_hidden_from_keys() {
        let s = EphemeralState::new();
        s.set("__stdout__", Value::list(vec![])).unwrap();
        s.set("visible", Value::Int(1)).unwrap();
        assert_eq!(s.keys(), vec!["visible".to_string()]);
        // Still readable directly by the plumbing that knows the name.
        assert!(s.get("__stdout__").is_some());
    }

    #[test]
    fn clone_shares_the_same_backing_map() {
        let s = EphemeralState::new();
        let s2 = s.clone();
        s.set("x", Value::Int(1)).unwrap();
        assert!(s2.get("x").is_some());
    }
}
