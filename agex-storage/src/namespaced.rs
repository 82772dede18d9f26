//! A sub-tree view over another store (spec.md §3 "Namespaced"): every key
//! is transparently prefixed with a path, so two agents sharing one
//! underlying store never see each other's keys unless explicitly
//! rendered through `descendant_keys`.

use crate::state::{is_reserved, SnapshotResult, State};
use agex_core::{StateError, Value};
use std::rc::Rc;

/// Wraps a parent `State` and transparently prefixes every logical key
/// with `path` + `/`. Only ever constructed over a persistent parent
/// (`Versioned` or another `Namespaced`); wrapping an `Ephemeral` store is
/// rejected since transient state has no stable identity to namespace.
#[derive(Debug, Clone)]
pub struct NamespacedState {
    parent: Rc<dyn State>,
    path: String,
}

fn validate_segment(name: &str) -> Result<(), StateError> {
    if name.is_empty() || name.contains('/') {
        return Err(StateError::InvalidNamespaceName {
            name: name.to_string(),
        });
    }
    Ok(())
}

impl NamespacedState {
    pub fn new(parent: Rc<dyn State>, name: &str) -> Result<Self, StateError> {
        if parent.is_transient() {
            return Err(StateError::CannotNamespaceTransient);
        }
        validate_segment(name)?;
        Ok(Self {
            parent,
            path: name.to_string(),
        })
    }

    /// Build a namespace nested under this one (`self.path/name`), for
    /// multi-level agent hierarchies. Shares the same root backing store
    /// rather than wrapping `self`, so key lookups never re-apply this
    /// namespace's own prefix twice.
    pub fn nest(&self, name: &str) -> Result<NamespacedState, StateError> {
        validate_segment(name)?;
        Ok(NamespacedState {
            parent: Rc::clone(&self.parent),
            path: format!("{}/{}", self.path, name),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}/{key}", self.path)
    }

    /// Every key reachable anywhere under this namespace, including
    /// nested namespaces, with this namespace's prefix stripped. Used by
    /// renderers that need a full sub-tree diff rather than this level's
    /// direct children.
    pub fn descendant_keys(&self) -> Vec<String> {
        let prefix = format!("{}/", self.path);
        self.parent
            .keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(prefix.as_str()).map(|s| s.to_string()))
            .collect()
    }
}

impl State for NamespacedState {
    fn get(&self, key: &str) -> Option<Value> {
        self.parent.get(&self.full_key(key))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        self.parent.set(&self.full_key(key), value)
    }

    fn remove(&self, key: &str) -> bool {
        self.parent.remove(&self.full_key(key))
    }

    fn keys(&self) -> Vec<String> {
        let prefix = format!("{}/", self.path);
        self.parent
            .keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(prefix.as_str()))
            // Direct children only: a key with a further '/' belongs to a
            // nested namespace, not this one.
            .filter(|rest| !rest.contains('/'))
            .filter(|rest| !is_reserved(rest))
            .map(|s| s.to_string())
            .collect()
    }

    fn snapshot(&self) -> SnapshotResult {
        self.parent.snapshot()
    }

    fn diffs(&self) -> Vec<(String, Value)> {
        let prefix = format!("{}/", self.path);
        self.parent
            .diffs()
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix.as_str()).map(|rest| (rest.to_string(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ephemeral::EphemeralState;
    use crate::kv::MemoryBackend;
    use crate::versioned::VersionedState;

    fn versioned_parent() -> Rc<dyn State> {
        Rc::new(VersionedState::new(Box::new(MemoryBackend::new())))
    }

    #[test]
    fn rejects_segment_names_with_slashes() {
        let parent = versioned_parent();
        let err = NamespacedState::new(parent, "bad/name").unwrap_err();
        assert!(matches!(err, StateError::InvalidNamespaceName { .. }));
    }

    #[test]
    fn set_and_get_round_trip_through_the_prefix() {
        let parent = versioned_parent();
        let ns = NamespacedState::new(parent.clone(), "agent-a").unwrap();
        ns.set("x", Value::Int(1)).unwrap();
        assert_eq!(ns.get("x").map(|v| v.to_string()), Some("1".into()));
        assert_eq!(parent.get("agent-a/x").map(|v| v.to_string()), Some("1".into()));
    }

    #[test]
    fn two_namespaces_over_the_same_parent_are_isolated() {
        let parent = versioned_parent();
        let a = NamespacedState::new(parent.clone(), "agent-a").unwrap();
        let b = NamespacedState::new(parent.clone(), "agent-b").unwrap();
        a.set("x", Value::Int(1)).unwrap();
        assert!(b.get("x").is_none());
        assert_eq!(a.keys(), vec!["x".to_string()]);
    }

    #[test]
    fn keys_returns_only_direct_children_not_nested_namespace_contents() {
        let parent = versioned_parent();
        let a = NamespacedState::new(parent.clone(), "agent-a").unwrap();
        a.set("own", Value::Int(1)).unwrap();
        let nested = a.nest("sub").unwrap();
        nested.set("deep", Value::Int(2)).unwrap();

        assert_eq!(a.keys(), vec!["own".to_string()]);
        let mut descendants = a.descendant_keys();
        descendants.sort();
        assert_eq!(descendants, vec!["own".to_string(), "sub/deep".to_string()]);
    }

    #[test]
    fn snapshot_and_diffs_delegate_to_the_anchoring_store() {
        let parent = versioned_parent();
        let ns = NamespacedState::new(parent.clone(), "agent-a").unwrap();
        ns.set("x", Value::Int(1)).unwrap();
        let result = State::snapshot(&ns);
        assert_ne!(result.commit_hash, crate::versioned::SENTINEL_COMMIT);
        assert_eq!(State::diffs(&ns), vec![("x".to_string(), Value::Int(1))]);
        // A sibling namespace's commit never leaks into this one's diffs.
        let sibling = NamespacedState::new(parent, "agent-b").unwrap();
        sibling.set("y", Value::Int(2)).unwrap();
        State::snapshot(&sibling);
        assert_eq!(State::diffs(&sibling), vec![("y".to_string(), Value::Int(2))]);
    }

    #[test]
    fn ephemeral_cannot_back_a_namespaced_view() {
        let transient: Rc<dyn State> = Rc::new(EphemeralState::new());
        let err = NamespacedState::new(transient, "agent-a").unwrap_err();
        assert!(matches!(err, StateError::CannotNamespaceTransient));
    }
}
