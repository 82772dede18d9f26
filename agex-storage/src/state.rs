//! The `State` contract every store implements (spec.md §3).

use agex_core::{StateError, Value};

/// Keys prefixed this way are plumbing (`__stdout__`, `__event_log__`,
/// `__msg_log__`, ...) and are never surfaced by `keys()`/`values()`/
/// `items()` nor included in rendered state diffs (spec.md §3
/// "Invariants").
pub const RESERVED_PREFIX: &str = "__";

pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// The result of a `Versioned::snapshot()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotResult {
    pub commit_hash: String,
    /// Keys whose values could not be serialized at commit time. The
    /// commit is still created for every other key (spec.md §4.3 step 4).
    pub unsaved_keys: Vec<String>,
}

/// Every concrete store (`Ephemeral`, `Versioned`, `Namespaced`)
/// implements this contract uniformly. `Scoped` (the transient lexical
/// scope layered during function calls) lives in `agex-dsl` instead,
/// since it binds runtime-only values the evaluator never persists.
pub trait State: std::fmt::Debug {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<(), StateError>;
    fn remove(&self, key: &str) -> bool;
    /// Keys reachable from this store, filtered to this store's own level
    /// (a `Namespaced` store's `keys()` never includes deeper descendants
    /// — see `descendant_keys`) and with reserved keys omitted.
    fn keys(&self) -> Vec<String>;
    fn values(&self) -> Vec<Value> {
        self.keys().into_iter().filter_map(|k| self.get(&k)).collect()
    }
    fn items(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .filter_map(|k| self.get(&k).map(|v| (k, v)))
            .collect()
    }
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
    /// True only for `Ephemeral`: it has no stable identity across a
    /// process restart, so wrapping it in a `Namespaced` view would be
    /// meaningless. Overridden by `EphemeralState`; every persistent store
    /// keeps the default.
    fn is_transient(&self) -> bool {
        false
    }

    /// Commits any pending mutations and returns the resulting commit (or
    /// a no-op result if nothing changed). Only `Versioned` has anything
    /// to commit; `Ephemeral` never persists and `Namespaced` delegates to
    /// whatever store anchors it, so the task loop can call this uniformly
    /// regardless of which kind of state it ended up holding (spec.md
    /// §4.5 step "snapshot if the loop owns this state").
    fn snapshot(&self) -> SnapshotResult {
        SnapshotResult::default()
    }

    /// The ordered key/value writes from the most recent commit, with
    /// reserved keys excluded — what `agex_context::render_context_message`
    /// renders each iteration. `Ephemeral` has no commit history so this is
    /// always empty there; `Namespaced` strips its own prefix off whatever
    /// its anchor reports.
    fn diffs(&self) -> Vec<(String, Value)> {
        Vec::new()
    }

    /// Whether the *loop* (as opposed to whatever called it) is
    /// responsible for calling `snapshot()` after an iteration (spec.md
    /// §4.5 "state ownership rules"). Only a bare `Versioned` store handed
    /// to the loop directly answers yes: a `Namespaced` view means some
    /// caller further up the call chain already owns its anchor's commit
    /// cycle, and an `Ephemeral` store has nothing to commit at all.
    fn owns_snapshot(&self) -> bool {
        false
    }
}
