//! Deterministic agent capability fingerprint (spec.md §3 "Agent", §4.1
//! "Fingerprint"). Two agents with identical effective capability surface
//! share a fingerprint; host callable bodies are never hashed since they
//! aren't portable across a state round-trip.

use crate::namespace::{CandidateKind, ClassNamespace, FunctionNamespace, ModuleNamespace};
use crate::visibility::MemberSpec;
use agex_core::Fingerprint;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Serialize)]
struct SpecDigest {
    visibility: String,
    docstring: Option<String>,
    constructable: bool,
}

impl From<&MemberSpec> for SpecDigest {
    fn from(s: &MemberSpec) -> Self {
        Self {
            visibility: format!("{:?}", s.visibility),
            docstring: s.docstring.clone(),
            constructable: s.constructable,
        }
    }
}

#[derive(Serialize)]
struct FunctionDigest {
    name: String,
    params: Vec<String>,
    return_type: Option<String>,
    spec: SpecDigest,
}

impl From<&FunctionNamespace> for FunctionDigest {
    fn from(f: &FunctionNamespace) -> Self {
        Self {
            name: f.name.clone(),
            params: f.signature.params.clone(),
            return_type: f.signature.return_type.clone(),
            spec: (&f.spec).into(),
        }
    }
}

#[derive(Serialize)]
struct ClassDigest {
    name: String,
    constructable: bool,
    members: BTreeMap<String, FunctionDigest>,
}

impl From<&ClassNamespace> for ClassDigest {
    fn from(c: &ClassNamespace) -> Self {
        Self {
            name: c.name.clone(),
            constructable: c.constructable,
            members: c.members.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
        }
    }
}

#[derive(Serialize)]
struct ModuleDigest {
    name: String,
    recursive: bool,
    members: BTreeMap<String, MemberDigest>,
}

#[derive(Serialize)]
enum MemberDigest {
    Function(FunctionDigest),
    Class(ClassDigest),
    Constant(SpecDigest),
    // Submodules contribute their own name + recursion flag only; their
    // live host bodies are never hashed (not portable).
    Submodule { recursive_hint: bool },
}

impl From<&ModuleNamespace> for ModuleDigest {
    fn from(m: &ModuleNamespace) -> Self {
        let members = m
            .reachable_members()
            .into_iter()
            .map(|(name, spec)| {
                let full = format!("{}.{name}", m.name);
                let digest = match m.host.members().into_iter().find(|c| c.name == name) {
                    Some(c) => match c.kind {
                        CandidateKind::Function(sig) => MemberDigest::Function(FunctionDigest {
                            name: full,
                            params: sig.params,
                            return_type: sig.return_type,
                            spec: (&spec).into(),
                        }),
                        CandidateKind::Class(c) => MemberDigest::Class((&c).into()),
                        CandidateKind::Constant => MemberDigest::Constant((&spec).into()),
                        CandidateKind::Submodule(_) => MemberDigest::Submodule {
                            recursive_hint: m.recursive,
                        },
                    },
                    None => MemberDigest::Constant((&spec).into()),
                };
                (name, digest)
            })
            .collect();
        Self {
            name: m.name.clone(),
            recursive: m.recursive,
            members,
        }
    }
}

#[derive(Serialize)]
struct AgentDigest {
    primer: String,
    functions: BTreeMap<String, FunctionDigest>,
    classes: BTreeMap<String, ClassDigest>,
    modules: BTreeMap<String, ModuleDigest>,
}

/// Compute the deterministic fingerprint of an agent's declared surface:
/// `SHA-256({primer, sorted(functions), sorted(classes), sorted(modules)})`.
/// `BTreeMap` gives the canonical sort; `serde_json` gives a canonical byte
/// encoding of that sorted structure.
pub fn fingerprint(
    primer: &str,
    functions: &[FunctionNamespace],
    classes: &[ClassNamespace],
    modules: &[ModuleNamespace],
) -> Fingerprint {
    let digest = AgentDigest {
        primer: primer.to_string(),
        functions: functions.iter().map(|f| (f.name.clone(), f.into())).collect(),
        classes: classes.iter().map(|c| (c.name.clone(), c.into())).collect(),
        modules: modules.iter().map(|m| (m.name.clone(), m.into())).collect(),
    };
    let bytes = serde_json::to_vec(&digest).expect("agent digest is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Signature;
    use crate::visibility::Visibility;

    fn func(name: &str, vis: Visibility) -> FunctionNamespace {
        FunctionNamespace {
            name: name.into(),
            signature: Signature::default(),
            spec: MemberSpec::new(vis),
        }
    }

    #[test]
    fn identical_surfaces_share_a_fingerprint() {
        let a = fingerprint("primer", &[func("f", Visibility::High)], &[], &[]);
        let b = fingerprint("primer", &[func("f", Visibility::High)], &[], &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn changing_visibility_flips_the_fingerprint() {
        let a = fingerprint("primer", &[func("f", Visibility::High)], &[], &[]);
        let b = fingerprint("primer", &[func("f", Visibility::Low)], &[], &[]);
        assert_ne!(a, b);
    }

    #[test]
    fn function_order_does_not_matter() {
        let a = fingerprint(
            "primer",
            &[func("a", Visibility::High), func("b", Visibility::Medium)],
            &[],
            &[],
        );
        let b = fingerprint(
            "primer",
            &[func("b", Visibility::Medium), func("a", Visibility::High)],
            &[],
            &[],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn primer_text_is_part_of_the_surface() {
        let a = fingerprint("primer A", &[], &[], &[]);
        let b = fingerprint("primer B", &[], &[], &[]);
        assert_ne!(a, b);
    }
}
