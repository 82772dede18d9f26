//! Content-addressed, versioned key-value state for the agex runtime.
//!
//! `KvBackend` (the `kv` module) is the interchangeable byte-level layer —
//! memory, LMDB on disk, or an LRU cache in front of either. `State` is
//! the value-level contract every concrete store implements: `Ephemeral`
//! for in-memory transient state, `Versioned` for append-only commit
//! history with mutation detection, and `Namespaced` for giving multiple
//! agents isolated sub-trees of one shared store.

mod ephemeral;
mod kv;
mod namespaced;
mod serialize;
mod state;
mod versioned;

pub use ephemeral::EphemeralState;
pub use kv::{CacheBackend, DiskBackend, KvBackend, MemoryBackend};
pub use namespaced::NamespacedState;
pub use serialize::{content_hash, deserialize_value, mutation_hash, serialize_value, SerializeError};
pub use state::{is_reserved, SnapshotResult, State, RESERVED_PREFIX};
pub use versioned::{VersionedState, SENTINEL_COMMIT};

use std::rc::Rc;

/// Where a task's root state lives. `Transient` never touches a backend at
/// all; `Persistent` is backed by whatever `KvBackend` the caller wired up
/// (memory for tests, LMDB for a real process).
#[derive(Debug, Clone, Copy)]
pub enum StoreKind {
    Transient,
    Persistent,
}

/// Build the root store a top-level task call starts from. `Persistent`
/// wraps `kv` in a fresh `VersionedState`; `Namespaced` views can only be
/// built over the result of a `Persistent` call (`Transient` stores reject
/// namespacing — see `NamespacedState::new`).
pub fn base_store(kind: StoreKind, kv: Box<dyn KvBackend>) -> Rc<dyn State> {
    match kind {
        StoreKind::Transient => Rc::new(EphemeralState::new()),
        StoreKind::Persistent => Rc::new(VersionedState::new(kv)),
    }
}

/// Anchors a sub-agent's namespace under `parent`. A transient parent has
/// nothing durable to anchor under, so a fresh `Ephemeral` store is handed
/// back instead of an error — the sub-agent still runs, it just never
/// persists (mirrors `base_store`'s own transient case). A persistent
/// parent — itself a bare `VersionedState` or an already-`Namespaced` view
/// one level up — gets one more `NamespacedState` layer pushed on top;
/// `NamespacedState::get`/`set` recurse through `parent` to compose the full
/// key path, so nesting through an intermediate namespace composes exactly
/// the same as calling `NamespacedState::nest` would.
pub fn child_namespace(parent: Rc<dyn State>, name: &str) -> Result<Rc<dyn State>, agex_core::StateError> {
    if parent.is_transient() {
        return Ok(Rc::new(EphemeralState::new()));
    }
    Ok(Rc::new(NamespacedState::new(parent, name)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_base_store_is_usable_directly() {
        let store = base_store(StoreKind::Transient, Box::new(MemoryBackend::new()));
        store.set("x", agex_core::Value::Int(1)).unwrap();
        assert_eq!(store.get("x").map(|v| v.to_string()), Some("1".into()));
    }

    #[test]
    fn only_a_persistent_base_store_can_be_namespaced() {
        let transient = base_store(StoreKind::Transient, Box::new(MemoryBackend::new()));
        assert!(NamespacedState::new(transient, "agent-a").is_err());

        let persistent = base_store(StoreKind::Persistent, Box::new(MemoryBackend::new()));
        assert!(NamespacedState::new(persistent, "agent-a").is_ok());
    }
}
