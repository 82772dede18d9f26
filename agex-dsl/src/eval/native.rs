//! The native-call dispatch registry `agex_policy::namespace` documents but
//! deliberately doesn't own: Policy only certifies that a dotted name is
//! *reachable*; this registry is what actually runs it. Populated by
//! whoever builds an agent (typically `agex-agents`) at the same time its
//! `Policy` registers the matching module/class/instance namespaces.

use crate::eval::value::NativeFunction;
use indexmap::IndexMap;
use std::rc::Rc;

/// Maps a dotted capability name (`"math.sqrt"`, `"db.query"`,
/// `"MyClass.helper"`) to the native closure that implements it. Looked up
/// only after `Policy::resolve_*` has already certified the name is
/// allowed — a registry miss for a policy-certified name is a host
/// configuration bug, not a sandbox violation, and surfaces as a plain
/// `EvalError::Attribute`.
#[derive(Default)]
pub struct NativeRegistry {
    entries: IndexMap<String, Rc<NativeFunction>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, dotted_name: impl Into<String>, f: NativeFunction) -> &mut Self {
        self.entries.insert(dotted_name.into(), Rc::new(f));
        self
    }

    pub fn get(&self, dotted_name: &str) -> Option<Rc<NativeFunction>> {
        self.entries.get(dotted_name).cloned()
    }
}

impl std::fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeRegistry({} entries)", self.entries.len())
    }
}
