//! Policy namespace variants (spec.md §3 "Policy Namespace", §4.1).

use crate::pattern::{member_selected, Pattern};
use crate::visibility::{MemberSpec, Visibility};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A host-side function signature, used only for rendering — the
/// evaluator dispatches native calls through a separate registry keyed by
/// the same name. Kept here because Policy is the thing that decides
/// whether the signature is describable at all.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Signature {
    pub params: Vec<String>,
    pub return_type: Option<String>,
}

/// A single free function exposed to the sandbox, either top-level
/// (`"__main__"`) or as a module member.
#[derive(Debug, Clone)]
pub struct FunctionNamespace {
    pub name: String,
    pub signature: Signature,
    pub spec: MemberSpec,
}

/// A registered type's sandbox surface: attrs/methods enumerated by
/// include/exclude, `constructable` gating whether `__init__` is exposed.
#[derive(Debug, Clone)]
pub struct ClassNamespace {
    pub name: String,
    pub include: Pattern,
    pub exclude: Pattern,
    pub members: IndexMap<String, FunctionNamespace>,
    pub overrides: IndexMap<String, MemberSpec>,
    pub constructable: bool,
    pub visibility: Visibility,
    pub docstring: Option<String>,
}

impl ClassNamespace {
    pub fn resolve_member(&self, attr: &str) -> Option<&FunctionNamespace> {
        let dotted = format!("{}.{attr}", self.name);
        if !member_selected(&self.include, &self.exclude, &dotted) {
            return None;
        }
        self.members.get(attr)
    }

    pub fn effective_spec(&self, attr: &str) -> Option<MemberSpec> {
        if let Some(over) = self.overrides.get(attr) {
            return Some(MemberSpec {
                visibility: over.visibility,
                docstring: over.docstring.clone(),
                constructable: over.constructable,
            });
        }
        self.resolve_member(attr).map(|m| m.spec.clone())
    }

    /// Visibilities of the members actually reachable through this class,
    /// for the renderer's promotion pass.
    pub fn member_visibilities(&self) -> Vec<Visibility> {
        self.members
            .keys()
            .filter_map(|name| self.effective_spec(name))
            .map(|s| s.visibility)
            .collect()
    }
}

/// A candidate member a `HostModule` advertises: analogous to what Python's
/// `dir()` would surface, since Rust has no runtime module reflection.
#[derive(Clone)]
pub enum CandidateKind {
    Function(Signature),
    Class(ClassNamespace),
    Submodule(Arc<dyn HostModule>),
    Constant,
}

impl fmt::Debug for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::Function(sig) => write!(f, "Function({sig:?})"),
            CandidateKind::Class(c) => write!(f, "Class({})", c.name),
            CandidateKind::Submodule(_) => write!(f, "Submodule(<host>)"),
            CandidateKind::Constant => write!(f, "Constant"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CandidateMember {
    pub name: String,
    pub kind: CandidateKind,
}

/// Declares the members a registered host module exposes. Because this is
/// a static Rust registration rather than Python's live `dir()`, the
/// registrant supplies the full candidate list up front; Policy applies
/// include/exclude filtering on top.
pub trait HostModule: Send + Sync + fmt::Debug {
    fn members(&self) -> Vec<CandidateMember>;
}

/// A plain declared list of members, the common case for registering a
/// host module or crate.
#[derive(Debug, Clone, Default)]
pub struct StaticHostModule {
    pub candidates: Vec<CandidateMember>,
}

impl HostModule for StaticHostModule {
    fn members(&self) -> Vec<CandidateMember> {
        self.candidates.clone()
    }
}

/// Wraps a host module; members enumerated by include/exclude glob
/// patterns with per-member `MemberSpec` overrides; `recursive` controls
/// whether attribute access reaching a submodule auto-wraps it.
#[derive(Debug, Clone)]
pub struct ModuleNamespace {
    pub name: String,
    pub host: Arc<dyn HostModule>,
    pub include: Pattern,
    pub exclude: Pattern,
    pub overrides: IndexMap<String, MemberSpec>,
    pub recursive: bool,
    pub visibility: Visibility,
    pub docstring: Option<String>,
}

/// What resolving a module member (or `__main__` name) yields.
#[derive(Debug, Clone)]
pub enum Resolved {
    Function(FunctionNamespace),
    Class(ClassNamespace),
    Module(ModuleNamespace),
    Constant(MemberSpec),
}

impl ModuleNamespace {
    /// Resolve `member` against this module's candidates, honoring
    /// include/exclude and recursion. Returns `Ok(None)` when the member
    /// genuinely doesn't exist, and a dedicated error variant (via the
    /// caller, `Policy::resolve_module_member`) when it exists but is
    /// unreachable (excluded, or a non-recursive submodule).
    pub fn resolve(&self, member: &str) -> MemberResolution {
        let dotted = format!("{}.{member}", self.name);
        let Some(candidate) = self.host.members().into_iter().find(|c| c.name == member) else {
            return MemberResolution::NotFound;
        };
        if !member_selected(&self.include, &self.exclude, &dotted) {
            return MemberResolution::Excluded;
        }
        let spec = self.effective_spec(member, &candidate.kind);
        match candidate.kind {
            CandidateKind::Function(sig) => MemberResolution::Found(Resolved::Function(FunctionNamespace {
                name: dotted,
                signature: sig,
                spec,
            })),
            CandidateKind::Class(mut c) => {
                c.visibility = spec.visibility;
                if let Some(doc) = spec.docstring {
                    c.docstring = Some(doc);
                }
                MemberResolution::Found(Resolved::Class(c))
            }
            CandidateKind::Constant => MemberResolution::Found(Resolved::Constant(spec)),
            CandidateKind::Submodule(host) => {
                if self.recursive {
                    MemberResolution::Found(Resolved::Module(ModuleNamespace {
                        name: dotted,
                        host,
                        include: Pattern::All,
                        exclude: Pattern::None,
                        overrides: IndexMap::new(),
                        recursive: true,
                        visibility: spec.visibility,
                        docstring: spec.docstring,
                    }))
                } else {
                    MemberResolution::NonRecursiveSubmodule
                }
            }
        }
    }

    fn effective_spec(&self, member: &str, kind: &CandidateKind) -> MemberSpec {
        if let Some(over) = self.overrides.get(member) {
            return MemberSpec {
                visibility: over.visibility,
                docstring: over.docstring.clone(),
                constructable: over.constructable,
            };
        }
        match kind {
            CandidateKind::Class(c) => MemberSpec {
                visibility: c.visibility,
                docstring: c.docstring.clone(),
                constructable: c.constructable,
            },
            _ => MemberSpec::default(),
        }
    }

    /// Describable members for the renderer's promotion pass: every
    /// candidate that is included/not-excluded, regardless of visibility
    /// (visibility decides *how* it's shown, not whether it's considered).
    pub fn reachable_members(&self) -> Vec<(String, MemberSpec)> {
        self.host
            .members()
            .into_iter()
            .filter_map(|c| {
                let dotted = format!("{}.{}", self.name, c.name);
                if !member_selected(&self.include, &self.exclude, &dotted) {
                    return None;
                }
                Some((c.name.clone(), self.effective_spec(&c.name, &c.kind)))
            })
            .collect()
    }
}

pub enum MemberResolution {
    Found(Resolved),
    NotFound,
    Excluded,
    NonRecursiveSubmodule,
}

/// Wraps a live host object stored in the per-process host object
/// registry; exposes methods/properties by inclusion, with optional
/// exception-kind remapping for its domain errors.
#[derive(Debug, Clone)]
pub struct InstanceNamespace {
    pub name: String,
    pub include: Pattern,
    pub exclude: Pattern,
    pub members: IndexMap<String, FunctionNamespace>,
    pub overrides: IndexMap<String, MemberSpec>,
    /// host exception type name -> sandbox exception kind name (e.g.
    /// `"sqlite3.OperationalError" -> "RuntimeError"`).
    pub exception_mappings: IndexMap<String, String>,
}

impl InstanceNamespace {
    pub fn resolve_member(&self, attr: &str) -> Option<&FunctionNamespace> {
        let dotted = format!("{}.{attr}", self.name);
        if !member_selected(&self.include, &self.exclude, &dotted) {
            return None;
        }
        self.members.get(attr)
    }

    pub fn map_exception(&self, host_exception_type: &str) -> Option<&str> {
        self.exception_mappings.get(host_exception_type).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn math_module() -> ModuleNamespace {
        ModuleNamespace {
            name: "math".into(),
            host: Arc::new(StaticHostModule {
                candidates: vec![
                    CandidateMember {
                        name: "sqrt".into(),
                        kind: CandidateKind::Function(Signature {
                            params: vec!["x".into()],
                            return_type: Some("float".into()),
                        }),
                    },
                    CandidateMember {
                        name: "pi".into(),
                        kind: CandidateKind::Constant,
                    },
                ],
            }),
            include: Pattern::All,
            exclude: Pattern::None,
            overrides: IndexMap::new(),
            recursive: true,
            visibility: Visibility::High,
            docstring: None,
        }
    }

    #[test]
    fn resolves_included_function() {
        let m = math_module();
        match m.resolve("sqrt") {
            MemberResolution::Found(Resolved::Function(f)) => assert_eq!(f.name, "math.sqrt"),
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn excluded_member_is_unreachable() {
        let mut m = math_module();
        m.exclude = Pattern::glob("sqrt");
        assert!(matches!(m.resolve("sqrt"), MemberResolution::Excluded));
    }

    #[test]
    fn unknown_member_is_not_found() {
        let m = math_module();
        assert!(matches!(m.resolve("frobnicate"), MemberResolution::NotFound));
    }
}
