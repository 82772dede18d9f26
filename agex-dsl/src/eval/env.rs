//! Lexical scoping. The top-level frame (`RootFrame`) is backed by a real
//! `State`, so plain-data assignments at module scope become observable
//! state diffs; every function/lambda/comprehension call layers a
//! `ScopedFrame` on top, holding locals in memory only. Closures capture
//! the defining `Env` by cloning the `Rc` chain, which gives Python's
//! late-binding lookup semantics for free: a nested function reads its
//! enclosing scope's *current* binding at call time, not a snapshot taken
//! at `def` time.

use crate::eval::value::RuntimeValue;
use agex_storage::State;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone)]
pub enum Env {
    Root(Rc<RootFrame>),
    Scoped(Rc<ScopedFrame>),
}

pub struct RootFrame {
    pub state: Rc<dyn State>,
    /// Bindings with no data representation (functions, classes, modules,
    /// live host tokens) live here instead of going through `State::set`.
    pub overlay: RefCell<IndexMap<String, RuntimeValue>>,
}

pub struct ScopedFrame {
    pub vars: RefCell<IndexMap<String, RuntimeValue>>,
    pub parent: Env,
}

impl Env {
    pub fn root(state: Rc<dyn State>) -> Env {
        Env::Root(Rc::new(RootFrame {
            state,
            overlay: RefCell::new(IndexMap::new()),
        }))
    }

    /// A child lexical frame: function calls, lambda calls, comprehension
    /// iterations, and exception-name bindings all push one of these.
    pub fn child(&self) -> Env {
        Env::Scoped(Rc::new(ScopedFrame {
            vars: RefCell::new(IndexMap::new()),
            parent: self.clone(),
        }))
    }

    pub fn get(&self, name: &str) -> Option<RuntimeValue> {
        match self {
            Env::Root(root) => {
                if let Some(v) = root.overlay.borrow().get(name) {
                    return Some(v.clone());
                }
                root.state.get(name).map(RuntimeValue::from_value)
            }
            Env::Scoped(frame) => {
                if let Some(v) = frame.vars.borrow().get(name) {
                    return Some(v.clone());
                }
                frame.parent.get(name)
            }
        }
    }

    /// Python assignment semantics: always binds in the *innermost* frame
    /// (no `global`/`nonlocal` — the grammar doesn't support them).
    pub fn set_local(&self, name: &str, value: RuntimeValue) -> Result<(), String> {
        match self {
            Env::Root(root) => {
                match value.to_value() {
                    Ok(v) => {
                        root.overlay.borrow_mut().shift_remove(name);
                        root.state.set(name, v).map_err(|e| e.to_string())
                    }
                    Err(reason) => {
                        // Only a *bare* non-data binding (function, class,
                        // module/host token) is allowed to bypass state;
                        // anything nested inside an unconvertible container
                        // is a genuine serialization failure.
                        if is_bare_capability(&value) {
                            root.state.remove(name);
                            root.overlay.borrow_mut().insert(name.to_string(), value);
                            Ok(())
                        } else {
                            Err(reason)
                        }
                    }
                }
            }
            Env::Scoped(frame) => {
                frame.vars.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        match self {
            Env::Root(root) => {
                let removed_overlay = root.overlay.borrow_mut().shift_remove(name).is_some();
                let removed_state = root.state.remove(name);
                removed_overlay || removed_state
            }
            Env::Scoped(frame) => frame.vars.borrow_mut().shift_remove(name).is_some(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True once the chain bottoms out at a frame backed by real state
    /// (used by the evaluator to decide whether a name lives at module
    /// scope for rendering purposes).
    pub fn is_root(&self) -> bool {
        matches!(self, Env::Root(_))
    }

    pub fn state(&self) -> Option<Rc<dyn State>> {
        match self {
            Env::Root(root) => Some(root.state.clone()),
            Env::Scoped(frame) => frame.parent.state(),
        }
    }
}

fn is_bare_capability(v: &RuntimeValue) -> bool {
    matches!(
        v,
        RuntimeValue::Function(_)
            | RuntimeValue::Native(_)
            | RuntimeValue::Class(_)
            | RuntimeValue::Instance(_)
            | RuntimeValue::BoundMethod(..)
            | RuntimeValue::Module(_)
            | RuntimeValue::HostInstance(_)
            | RuntimeValue::TypeRef(_)
    )
}
