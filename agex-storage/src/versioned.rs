//! The content-addressed versioned store (spec.md §3 "Versioned", §4.3
//! "Versioned.snapshot()"): append-only commits, mutation detection via
//! byte-hash comparison, graceful degradation when a value can't be
//! serialized.

use crate::kv::KvBackend;
use crate::serialize::{content_hash, deserialize_value, mutation_hash, serialize_value};
use crate::state::{is_reserved, State, SnapshotResult};
use agex_core::{StateError, Value};
use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::rc::Rc;

/// Stable sentinel returned by `current_commit()` before any snapshot has
/// ever been taken, so "history" is never `null` after first access
/// (spec.md §3 "Lifecycle").
pub const SENTINEL_COMMIT: &str = "0000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone)]
enum PendingEntry {
    Value(Value),
    /// A value that could not be serialized; recorded so the next
    /// `snapshot()` reports it in `unsaved_keys` instead of silently
    /// dropping it or aborting the whole commit.
    Unserializable(String),
}

#[derive(Debug)]
struct AccessRecord {
    original_hash: u64,
    value: Value,
}

#[derive(Debug)]
struct VersionedInner {
    kv: Box<dyn KvBackend>,
    current_commit: RefCell<Option<String>>,
    commit_keys: RefCell<IndexMap<String, String>>,
    ephemeral: RefCell<IndexMap<String, PendingEntry>>,
    removed: RefCell<IndexSet<String>>,
    accessed_objects: RefCell<IndexMap<String, AccessRecord>>,
    /// The keys/values actually written by the most recent `commit()`, in
    /// insertion order, reserved keys excluded — what the renderer shows as
    /// "state changes" for the iteration that produced this commit.
    last_commit_diff: RefCell<IndexMap<String, Value>>,
}

/// Append-only, content-addressed commit chain over a byte-level KV
/// backend. Cloning a `VersionedState` shares the same backend and working
/// set (it's a handle, not a deep copy) — `checkout` is the operation that
/// produces an independent working set anchored at a historical commit.
#[derive(Debug, Clone)]
pub struct VersionedState {
    inner: Rc<VersionedInner>,
}

impl VersionedState {
    pub fn new(kv: Box<dyn KvBackend>) -> Self {
        Self {
            inner: Rc::new(VersionedInner {
                kv,
                current_commit: RefCell::new(None),
                commit_keys: RefCell::new(IndexMap::new()),
                ephemeral: RefCell::new(IndexMap::new()),
                removed: RefCell::new(IndexSet::new()),
                accessed_objects: RefCell::new(IndexMap::new()),
                last_commit_diff: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// The keys/values written by the most recent commit, insertion order,
    /// reserved keys excluded. Empty if the last `snapshot()` call was a
    /// no-op (nothing had changed) or nothing has been committed yet.
    pub fn diffs(&self) -> Vec<(String, Value)> {
        self.inner
            .last_commit_diff
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The active commit hash, or the stable sentinel if nothing has ever
    /// been committed.
    pub fn current_commit(&self) -> String {
        self.inner
            .current_commit
            .borrow()
            .clone()
            .unwrap_or_else(|| SENTINEL_COMMIT.to_string())
    }

    /// Move a key straight to "needs saving but can't be": the evaluator
    /// calls this instead of `set` when a host value survived the
    /// pre-assignment serializability check but genuinely can't be turned
    /// into bytes (spec.md §4.2 "graceful degradation"; scenario S5).
    pub fn mark_unserializable(&self, key: &str, reason: impl Into<String>) {
        self.inner.removed.borrow_mut().shift_remove(key);
        self.inner
            .ephemeral
            .borrow_mut()
            .insert(key.to_string(), PendingEntry::Unserializable(reason.into()));
    }

    fn versioned_key(commit_hash: &str, logical_key: &str) -> String {
        format!("{commit_hash}:{logical_key}")
    }

    fn commit_keyset_key(commit_hash: &str) -> String {
        format!("__commit_keyset__{commit_hash}")
    }

    fn parent_commit_key(commit_hash: &str) -> String {
        format!("__parent_commit__{commit_hash}")
    }

    /// Run mutation detection, then write a new commit if anything is
    /// pending. Returns the resulting commit hash unchanged if nothing
    /// needed to be written.
    pub fn snapshot(&self) -> SnapshotResult {
        self.detect_mutations();

        let ephemeral = self.inner.ephemeral.borrow();
        let removed = self.inner.removed.borrow();
        if ephemeral.is_empty() && removed.is_empty() {
            self.inner.last_commit_diff.borrow_mut().clear();
            return SnapshotResult {
                commit_hash: self.current_commit(),
                unsaved_keys: Vec::new(),
            };
        }
        drop(ephemeral);
        drop(removed);

        self.commit()
    }

    fn detect_mutations(&self) {
        let ephemeral = self.inner.ephemeral.borrow();
        let already_pending: IndexSet<String> = ephemeral.keys().cloned().collect();
        drop(ephemeral);

        let accessed = self.inner.accessed_objects.borrow();
        let mut to_insert = Vec::new();
        for (key, record) in accessed.iter() {
            if already_pending.contains(key) {
                continue;
            }
            match serialize_value(&record.value) {
                Ok(bytes) => {
                    let new_hash = mutation_hash(&bytes);
                    if new_hash != record.original_hash {
                        to_insert.push((key.clone(), PendingEntry::Value(record.value.clone())));
                    }
                }
                Err(e) => {
                    to_insert.push((key.clone(), PendingEntry::Unserializable(e.to_string())));
                }
            }
        }
        drop(accessed);
        let mut ephemeral = self.inner.ephemeral.borrow_mut();
        for (k, v) in to_insert {
            ephemeral.insert(k, v);
        }
    }

    fn commit(&self) -> SnapshotResult {
        let parent = self.inner.current_commit.borrow().clone();
        let old_keys = self.inner.commit_keys.borrow().clone();
        let removed = self.inner.removed.borrow().clone();
        let ephemeral: Vec<(String, PendingEntry)> =
            self.inner.ephemeral.borrow_mut().drain(..).collect();

        let mut new_keys: IndexMap<String, String> = old_keys
            .into_iter()
            .filter(|(k, _)| !removed.contains(k))
            .collect();

        let mut unsaved_keys = Vec::new();
        let mut writes: Vec<(String, Vec<u8>)> = Vec::new();
        let mut diff: IndexMap<String, Value> = IndexMap::new();

        // Commit hash is derived from parent + the sorted set of logical
        // keys about to change, making it a genuine content address rather
        // than an arbitrary counter.
        let mut change_summary: Vec<&str> = ephemeral.iter().map(|(k, _)| k.as_str()).collect();
        change_summary.sort_unstable();
        let commit_hash = content_hash(&[
            parent.as_deref().unwrap_or(SENTINEL_COMMIT).as_bytes(),
            change_summary.join(",").as_bytes(),
        ]);

        for (key, entry) in ephemeral {
            match entry {
                PendingEntry::Value(value) => match serialize_value(&value) {
                    Ok(bytes) => {
                        let vkey = Self::versioned_key(&commit_hash, &key);
                        writes.push((vkey.clone(), bytes));
                        if !is_reserved(&key) {
                            diff.insert(key.clone(), value);
                        }
                        new_keys.insert(key, vkey);
                    }
                    Err(_) => unsaved_keys.push(key),
                },
                PendingEntry::Unserializable(_) => unsaved_keys.push(key),
            }
        }
        *self.inner.last_commit_diff.borrow_mut() = diff;

        let keyset_bytes = bincode::serialize(&new_keys).expect("key map always serializes");
        let parent_bytes = bincode::serialize(&parent).expect("option<string> always serializes");
        writes.push((Self::commit_keyset_key(&commit_hash), keyset_bytes));
        writes.push((Self::parent_commit_key(&commit_hash), parent_bytes));

        for (k, v) in writes {
            self.inner.kv.set(&k, v);
        }

        *self.inner.commit_keys.borrow_mut() = new_keys;
        *self.inner.current_commit.borrow_mut() = Some(commit_hash.clone());
        self.inner.removed.borrow_mut().clear();
        self.inner.accessed_objects.borrow_mut().clear();

        if !unsaved_keys.is_empty() {
            tracing::warn!(keys = ?unsaved_keys, commit = %commit_hash, "snapshot committed with unsaved keys");
        }

        SnapshotResult {
            commit_hash,
            unsaved_keys,
        }
    }

    /// Commit hashes from `current_commit` back to genesis, newest first.
    pub fn history(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = self.inner.current_commit.borrow().clone();
        while let Some(hash) = cursor {
            out.push(hash.clone());
            let parent_bytes = self.inner.kv.get(&Self::parent_commit_key(&hash));
            cursor = parent_bytes
                .and_then(|b| bincode::deserialize::<Option<String>>(&b).ok())
                .flatten();
        }
        out
    }

    /// Produce an independent working-set view anchored at a historical
    /// commit. Shares the same backend; writes made after checkout never
    /// affect other views (each view owns its own working set).
    pub fn checkout(&self, commit_hash: &str) -> Result<VersionedState, StateError> {
        if commit_hash == SENTINEL_COMMIT {
            return Ok(VersionedState {
                inner: Rc::new(VersionedInner {
                    kv: CheckoutHandle::wrap(&self.inner),
                    current_commit: RefCell::new(None),
                    commit_keys: RefCell::new(IndexMap::new()),
                    ephemeral: RefCell::new(IndexMap::new()),
                    removed: RefCell::new(IndexSet::new()),
                    accessed_objects: RefCell::new(IndexMap::new()),
                    last_commit_diff: RefCell::new(IndexMap::new()),
                }),
            });
        }
        let keyset_bytes = self
            .inner
            .kv
            .get(&Self::commit_keyset_key(commit_hash))
            .ok_or_else(|| StateError::UnknownCommit {
                commit: commit_hash.to_string(),
            })?;
        let keyset: IndexMap<String, String> =
            bincode::deserialize(&keyset_bytes).map_err(|e| StateError::Serialization {
                key: format!("__commit_keyset__{commit_hash}"),
                reason: e.to_string(),
            })?;
        Ok(VersionedState {
            inner: Rc::new(VersionedInner {
                kv: CheckoutHandle::wrap(&self.inner),
                current_commit: RefCell::new(Some(commit_hash.to_string())),
                commit_keys: RefCell::new(keyset),
                ephemeral: RefCell::new(IndexMap::new()),
                removed: RefCell::new(IndexSet::new()),
                accessed_objects: RefCell::new(IndexMap::new()),
                last_commit_diff: RefCell::new(IndexMap::new()),
            }),
        })
    }
}

/// A `KvBackend` that forwards every call to the backend owned by another
/// `VersionedState`'s shared `Rc<VersionedInner>`. `checkout` needs a fresh
/// working set that still reads from the same backend without taking
/// ownership of it twice; holding the `Rc` (rather than a borrow) keeps the
/// backend alive for as long as any checked-out view exists.
struct CheckoutHandle(Rc<VersionedInner>);

impl CheckoutHandle {
    fn wrap(inner: &Rc<VersionedInner>) -> Box<dyn KvBackend> {
        Box::new(CheckoutHandle(Rc::clone(inner)))
    }
}

impl std::fmt::Debug for CheckoutHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutHandle")
    }
}

impl KvBackend for CheckoutHandle {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.0.kv.get(key)
    }
    fn set(&self, key: &str, value: Vec<u8>) {
        self.0.kv.set(key, value)
    }
    fn items(&self) -> Vec<(String, Vec<u8>)> {
        self.0.kv.items()
    }
    fn remove(&self, key: &str) -> bool {
        self.0.kv.remove(key)
    }
}

impl State for VersionedState {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(entry) = self.inner.ephemeral.borrow().get(key) {
            return match entry {
                PendingEntry::Value(v) => Some(v.clone()),
                PendingEntry::Unserializable(_) => None,
            };
        }
        if self.inner.removed.borrow().contains(key) {
            return None;
        }
        let vkey = self.inner.commit_keys.borrow().get(key).cloned()?;
        let bytes = self.inner.kv.get(&vkey)?;
        let value = deserialize_value(&bytes).ok()?;

        let mut accessed = self.inner.accessed_objects.borrow_mut();
        if !accessed.contains_key(key) {
            let hash = mutation_hash(&bytes);
            accessed.insert(
                key.to_string(),
                AccessRecord {
                    original_hash: hash,
                    value: value.clone(),
                },
            );
        }
        // Return the tracked (possibly already-aliased) reference so a
        // caller mutating the list they got back mutates the very value
        // `accessed_objects` is watching.
        Some(accessed.get(key).map(|r| r.value.clone()).unwrap_or(value))
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StateError> {
        self.inner.removed.borrow_mut().shift_remove(key);
        self.inner
            .ephemeral
            .borrow_mut()
            .insert(key.to_string(), PendingEntry::Value(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> bool {
        let existed = self.contains(key);
        self.inner.ephemeral.borrow_mut().shift_remove(key);
        self.inner.removed.borrow_mut().insert(key.to_string());
        existed
    }

    fn keys(&self) -> Vec<String> {
        let committed = self.inner.commit_keys.borrow();
        let ephemeral = self.inner.ephemeral.borrow();
        let removed = self.inner.removed.borrow();
        let mut seen = IndexSet::new();
        for k in committed.keys().chain(ephemeral.keys()) {
            if !removed.contains(k) && !is_reserved(k) {
                seen.insert(k.clone());
            }
        }
        seen.into_iter().collect()
    }

    fn snapshot(&self) -> SnapshotResult {
        VersionedState::snapshot(self)
    }

    fn diffs(&self) -> Vec<(String, Value)> {
        VersionedState::diffs(self)
    }

    fn owns_snapshot(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryBackend;

    fn store() -> VersionedState {
        VersionedState::new(Box::new(MemoryBackend::new()))
    }

    #[test]
    fn empty_store_has_a_stable_sentinel_commit() {
        let s = store();
        assert_eq!(s.current_commit(), SENTINEL_COMMIT);
    }

    #[test]
    fn snapshot_with_no_pending_writes_is_a_no_op() {
        let s = store();
        let r1 = s.snapshot();
        let r2 = s.snapshot();
        assert_eq!(r1.commit_hash, r2.commit_hash);
        assert!(r1.unsaved_keys.is_empty());
    }

    #[test]
    fn set_then_snapshot_then_checkout_round_trips() {
        let s = store();
        s.set("x", Value::Int(42)).unwrap();
        let r = s.snapshot();
        let view = s.checkout(&r.commit_hash).unwrap();
        assert_eq!(view.get("x").map(|v| v.to_string()), Some("42".into()));
    }

    #[test]
    fn writes_after_checkout_do_not_affect_other_commit_reads() {
        let s = store();
        s.set("x", Value::Int(1)).unwrap();
        let first = s.snapshot();
        s.set("x", Value::Int(2)).unwrap();
        let second = s.snapshot();

        let view_first = s.checkout(&first.commit_hash).unwrap();
        view_first.set("x", Value::Int(999)).unwrap();
        view_first.snapshot();

        let view_second_again = s.checkout(&second.commit_hash).unwrap();
        assert_eq!(view_second_again.get("x").map(|v| v.to_string()), Some("2".into()));
    }

    #[test]
    fn mutation_is_detected_on_the_next_snapshot() {
        let s = store();
        s.set("x", Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
            .unwrap();
        s.snapshot();

        let x = s.get("x").unwrap();
        if let Value::List(items) = &x {
            items.borrow_mut().push(Value::Int(4));
        }
        let r2 = s.snapshot();
        assert!(r2.unsaved_keys.is_empty());

        let reread = s.get("x").unwrap();
        assert_eq!(reread.to_string(), "[1, 2, 3, 4]");
    }

    #[test]
    fn history_walks_newest_to_oldest() {
        let s = store();
        s.set("a", Value::Int(1)).unwrap();
        let c1 = s.snapshot().commit_hash;
        s.set("b", Value::Int(2)).unwrap();
        let c2 = s.snapshot().commit_hash;
        assert_eq!(s.history(), vec![c2, c1]);
    }

    #[test]
    fn mark_unserializable_is_reported_without_aborting_the_commit() {
        let s = store();
        s.set("keep", Value::Int(1)).unwrap();
        s.mark_unserializable("f", "file handles are not serializable");
        let r = s.snapshot();
        assert_eq!(r.unsaved_keys, vec!["f".to_string()]);
        assert!(s.get("keep").is_some());
    }

    #[test]
    fn keys_excludes_removed_and_reserved() {
        let s = store();
        s.set("a", Value::Int(1)).unwrap();
        s.set("__hidden__", Value::Int(2)).unwrap();
        s.snapshot();
        s.remove("a");
        assert!(s.keys().is_empty());
    }
}
