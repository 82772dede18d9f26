//! Visibility and promotion (spec.md §3 "Visibility", §4.1 "Visibility
//! promotion"). Orthogonal to permission: low visibility hides a member
//! from the rendered prompt but does not make it uncallable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Visibility {
    Low,
    Medium,
    High,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Medium
    }
}

/// The renderer's per-member override: visibility, an optional docstring
/// shown at `High`, and whether the member is constructable (classes only).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberSpec {
    pub visibility: Visibility,
    pub docstring: Option<String>,
    pub constructable: bool,
}

impl MemberSpec {
    pub fn new(visibility: Visibility) -> Self {
        Self {
            visibility,
            docstring: None,
            constructable: false,
        }
    }

    pub fn with_docstring(mut self, doc: impl Into<String>) -> Self {
        self.docstring = Some(doc.into());
        self
    }

    pub fn constructable(mut self, yes: bool) -> Self {
        self.constructable = yes;
        self
    }
}

/// Promote a container's effective visibility given the visibilities of its
/// direct members: promoted from `Low` to `Medium` if any member is `High`,
/// or if the container would otherwise show only `Low` members (i.e. it
/// has at least one member and none would otherwise be visible).
pub fn promote(container_visibility: Visibility, member_visibilities: &[Visibility]) -> Visibility {
    if container_visibility != Visibility::Low {
        return container_visibility;
    }
    if member_visibilities.is_empty() {
        return container_visibility;
    }
    let any_high = member_visibilities.iter().any(|v| *v == Visibility::High);
    let all_low = member_visibilities.iter().all(|v| *v == Visibility::Low);
    if any_high || all_low {
        Visibility::Medium
    } else {
        container_visibility
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_module_with_only_low_members_promotes_to_medium() {
        let v = promote(Visibility::Low, &[Visibility::Low, Visibility::Low]);
        assert_eq!(v, Visibility::Medium);
    }

    #[test]
    fn low_module_with_a_high_member_promotes_to_medium() {
        let v = promote(Visibility::Low, &[Visibility::Low, Visibility::High]);
        assert_eq!(v, Visibility::Medium);
    }

    #[test]
    fn medium_or_high_container_is_unaffected() {
        assert_eq!(promote(Visibility::High, &[Visibility::Low]), Visibility::High);
        assert_eq!(promote(Visibility::Medium, &[Visibility::Low]), Visibility::Medium);
    }

    #[test]
    fn container_with_a_medium_member_and_no_high_stays_hidden() {
        let v = promote(Visibility::Low, &[Visibility::Medium]);
        assert_eq!(v, Visibility::Low);
    }
}
