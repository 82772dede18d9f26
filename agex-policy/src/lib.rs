//! agex-policy — the capability registry (spec.md §4.1).
//!
//! Policy answers three queries for the evaluator: `resolve_name`,
//! `resolve_module_member`, and `attribute_allowed`. It never executes
//! anything; it only decides reachability and, for the renderer,
//! visibility.

mod fingerprint;
mod namespace;
mod pattern;
mod visibility;

pub use fingerprint::fingerprint;
pub use namespace::{
    CandidateKind, CandidateMember, ClassNamespace, FunctionNamespace, HostModule,
    InstanceNamespace, MemberResolution, ModuleNamespace, Resolved, Signature, StaticHostModule,
};
pub use pattern::{member_selected, Glob, Pattern};
pub use visibility::{promote, MemberSpec, Visibility};

use agex_core::PolicyError;
use indexmap::IndexMap;

/// What a bare name (`resolve_name`) in `__main__` scope binds to, before
/// the evaluator's own lexical scope (locals, closures) is consulted —
/// lexical scope always wins and is not modeled here.
#[derive(Debug, Clone)]
pub enum NameBinding {
    /// A language builtin (`len`, `range`, `print`, `isinstance`, ...). The
    /// evaluator implements its semantics directly; Policy only certifies
    /// that the name is reachable.
    Builtin(&'static str),
    Function(FunctionNamespace),
    Class(ClassNamespace),
    /// A registered module, resolved further via `resolve_module_member`.
    Module(String),
    /// A registered live instance, resolved further via `attribute_allowed`
    /// / `InstanceNamespace::resolve_member`.
    Instance(String),
}

/// The static whitelist of Python builtins this runtime's grammar supports
/// referencing by bare name. Anything not on this list and not registered
/// in `__main__` is a `NameError`.
const BUILTINS: &[&str] = &[
    "len", "range", "print", "isinstance", "str", "int", "float", "bool", "list", "tuple", "set",
    "dict", "bytes", "abs", "min", "max", "sum", "sorted", "reversed", "enumerate", "zip", "map",
    "filter", "any", "all", "round", "type", "repr", "format",
];

/// The capability registry for one agent: `__main__` free
/// functions/classes, registered modules, registered live instances, and
/// the primer text folded into the agent's fingerprint.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub primer: String,
    pub functions: IndexMap<String, FunctionNamespace>,
    pub classes: IndexMap<String, ClassNamespace>,
    pub modules: IndexMap<String, ModuleNamespace>,
    pub instances: IndexMap<String, InstanceNamespace>,
}

impl Policy {
    pub fn new(primer: impl Into<String>) -> Self {
        Self {
            primer: primer.into(),
            ..Default::default()
        }
    }

    pub fn register_function(&mut self, f: FunctionNamespace) -> &mut Self {
        self.functions.insert(f.name.clone(), f);
        self
    }

    pub fn register_class(&mut self, c: ClassNamespace) -> &mut Self {
        self.classes.insert(c.name.clone(), c);
        self
    }

    pub fn register_module(&mut self, m: ModuleNamespace) -> &mut Self {
        self.modules.insert(m.name.clone(), m);
        self
    }

    pub fn register_instance(&mut self, i: InstanceNamespace) -> &mut Self {
        self.instances.insert(i.name.clone(), i);
        self
    }

    /// `resolve_name(name) -> NameBinding | None` (spec.md §4.1 query 1).
    pub fn resolve_name(&self, name: &str) -> Option<NameBinding> {
        if let Some(f) = self.functions.get(name) {
            return Some(NameBinding::Function(f.clone()));
        }
        if let Some(c) = self.classes.get(name) {
            return Some(NameBinding::Class(c.clone()));
        }
        if self.modules.contains_key(name) {
            return Some(NameBinding::Module(name.to_string()));
        }
        if self.instances.contains_key(name) {
            return Some(NameBinding::Instance(name.to_string()));
        }
        if let Some(b) = BUILTINS.iter().find(|b| **b == name) {
            return Some(NameBinding::Builtin(b));
        }
        None
    }

    /// `resolve_module_member(module_name, member) -> Resolved | None`
    /// (spec.md §4.1 query 2), surfaced as a `Result` so the evaluator can
    /// distinguish "not found" from "exists but unreachable".
    pub fn resolve_module_member(
        &self,
        module_name: &str,
        member: &str,
    ) -> Result<Resolved, PolicyError> {
        let module = self
            .modules
            .get(module_name)
            .ok_or_else(|| PolicyError::ModuleNotRegistered {
                module: module_name.to_string(),
            })?;
        match module.resolve(member) {
            MemberResolution::Found(r) => Ok(r),
            MemberResolution::NotFound => Err(PolicyError::AttributeNotAllowed {
                attr: member.to_string(),
                on: format!("module '{module_name}'"),
            }),
            MemberResolution::Excluded => Err(PolicyError::AttributeNotAllowed {
                attr: member.to_string(),
                on: format!("module '{module_name}'"),
            }),
            MemberResolution::NonRecursiveSubmodule => {
                // Non-recursive reachability requires the submodule to be
                // separately registered at its own dotted name.
                let dotted = format!("{module_name}.{member}");
                if self.modules.contains_key(&dotted) {
                    Ok(Resolved::Module(self.modules[&dotted].clone()))
                } else {
                    Err(PolicyError::SubmoduleNotReachable {
                        module: module_name.to_string(),
                        submodule: member.to_string(),
                    })
                }
            }
        }
    }

    /// Resolve an attribute on a registered class, by the class's own
    /// dotted name (for `ClassName.method` style access, e.g. calling a
    /// classmethod or reading a constructable's static surface).
    pub fn resolve_class_member(
        &self,
        class_name: &str,
        attr: &str,
    ) -> Result<&FunctionNamespace, PolicyError> {
        let class = self
            .classes
            .get(class_name)
            .ok_or_else(|| PolicyError::AttributeNotAllowed {
                attr: attr.to_string(),
                on: format!("class '{class_name}'"),
            })?;
        class.resolve_member(attr).ok_or_else(|| PolicyError::AttributeNotAllowed {
            attr: attr.to_string(),
            on: format!("class '{class_name}'"),
        })
    }

    /// Resolve an attribute on a live registered instance.
    pub fn resolve_instance_member(
        &self,
        instance_name: &str,
        attr: &str,
    ) -> Result<&FunctionNamespace, PolicyError> {
        let instance = self.instances.get(instance_name).ok_or_else(|| {
            PolicyError::AttributeNotAllowed {
                attr: attr.to_string(),
                on: format!("instance '{instance_name}'"),
            }
        })?;
        instance
            .resolve_member(attr)
            .ok_or_else(|| PolicyError::AttributeNotAllowed {
                attr: attr.to_string(),
                on: format!("instance '{instance_name}'"),
            })
    }

    /// `attribute_allowed(host_value, attr) -> bool` (spec.md §4.1 query 3)
    /// for the evaluator's own container/scalar values, which bypass
    /// Policy entirely in favor of a fixed whitelist (they're language
    /// primitives, not host capabilities).
    pub fn builtin_container_method_allowed(type_name: &str, attr: &str) -> bool {
        let whitelist: &[&str] = match type_name {
            "str" => &[
                "upper", "lower", "strip", "lstrip", "rstrip", "split", "rsplit", "join",
                "replace", "startswith", "endswith", "format", "find", "rfind", "index",
                "count", "title", "capitalize", "isdigit", "isalpha", "isalnum", "isspace",
                "encode", "zfill", "ljust", "rjust", "center", "splitlines", "format_map",
            ],
            "list" => &[
                "append", "extend", "insert", "remove", "pop", "clear", "index", "count",
                "sort", "reverse", "copy",
            ],
            "dict" => &["keys", "values", "items", "get", "pop", "update", "setdefault", "clear", "copy"],
            "set" => &[
                "add", "remove", "discard", "pop", "clear", "union", "intersection",
                "difference", "symmetric_difference", "issubset", "issuperset", "update",
            ],
            "bytes" => &["decode", "hex", "split", "strip", "startswith", "endswith"],
            _ => &[],
        };
        whitelist.contains(&attr)
    }

    /// The deterministic fingerprint of this policy's declared surface,
    /// folded together with the primer.
    pub fn fingerprint(&self) -> agex_core::Fingerprint {
        let functions: Vec<_> = self.functions.values().cloned().collect();
        let classes: Vec<_> = self.classes.values().cloned().collect();
        let modules: Vec<_> = self.modules.values().cloned().collect();
        fingerprint(&self.primer, &functions, &classes, &modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_policy() -> Policy {
        let mut p = Policy::new("a test agent");
        p.register_function(FunctionNamespace {
            name: "greet".into(),
            signature: Signature {
                params: vec!["name".into()],
                return_type: Some("str".into()),
            },
            spec: MemberSpec::new(Visibility::High),
        });
        p
    }

    #[test]
    fn resolves_registered_main_function() {
        let p = sample_policy();
        assert!(matches!(p.resolve_name("greet"), Some(NameBinding::Function(_))));
    }

    #[test]
    fn resolves_builtin_name() {
        let p = sample_policy();
        assert!(matches!(p.resolve_name("len"), Some(NameBinding::Builtin("len"))));
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        let p = sample_policy();
        assert!(p.resolve_name("nonexistent").is_none());
    }

    #[test]
    fn reflective_attrs_are_never_in_the_builtin_whitelist() {
        for attr in ["__class__", "__globals__", "__subclasses__", "mro", "__dict__"] {
            for ty in ["str", "list", "dict", "set", "bytes"] {
                assert!(!Policy::builtin_container_method_allowed(ty, attr));
            }
        }
    }

    #[test]
    fn non_recursive_submodule_requires_explicit_registration() {
        let mut p = Policy::new("primer");
        p.register_module(ModuleNamespace {
            name: "pkg".into(),
            host: std::sync::Arc::new(StaticHostModule {
                candidates: vec![CandidateMember {
                    name: "sub".into(),
                    kind: CandidateKind::Submodule(std::sync::Arc::new(StaticHostModule::default())),
                }],
            }),
            include: Pattern::All,
            exclude: Pattern::None,
            overrides: IndexMap::new(),
            recursive: false,
            visibility: Visibility::Medium,
            docstring: None,
        });
        let err = p.resolve_module_member("pkg", "sub").unwrap_err();
        assert!(matches!(err, PolicyError::SubmoduleNotReachable { .. }));
    }
}
