//! Include/exclude pattern matching (SPEC_FULL.md / spec.md §4.1 "Pattern
//! semantics"): a single glob, a set of globs, or a predicate, matched
//! against dotted paths (`"submod.cls.method"`).

use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// A compiled glob: `*` matches any run of characters except `.`, `**`
/// matches across `.` boundaries, `?` matches exactly one non-`.`
/// character. Everything else is matched literally.
#[derive(Clone)]
pub struct Glob {
    raw: String,
    re: Regex,
}

impl Glob {
    pub fn new(pattern: impl Into<String>) -> Self {
        let raw = pattern.into();
        let re = Regex::new(&glob_to_regex(&raw)).unwrap_or_else(|e| {
            panic!("invalid glob pattern '{raw}': {e}");
        });
        Self { raw, re }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.re.is_match(path)
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Glob({:?})", self.raw)
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^.]*");
                }
            }
            '?' => out.push_str("[^.]"),
            '.' => out.push_str("\\."),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

/// `include`/`exclude` surfaces as specified: a single glob, an iterable of
/// globs, or a caller-supplied predicate.
#[derive(Clone)]
pub enum Pattern {
    /// Matches everything (the default `include`).
    All,
    /// Matches nothing (the default `exclude`).
    None,
    Glob(Glob),
    AnyOf(Vec<Glob>),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Pattern {
    pub fn glob(pattern: impl Into<String>) -> Self {
        Pattern::Glob(Glob::new(pattern))
    }

    pub fn any_of<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Pattern::AnyOf(patterns.into_iter().map(Glob::new).collect())
    }

    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Pattern::Predicate(Arc::new(f))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Pattern::All => true,
            Pattern::None => false,
            Pattern::Glob(g) => g.matches(path),
            Pattern::AnyOf(gs) => gs.iter().any(|g| g.matches(path)),
            Pattern::Predicate(f) => f(path),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::All => write!(f, "Pattern::All"),
            Pattern::None => write!(f, "Pattern::None"),
            Pattern::Glob(g) => write!(f, "Pattern::Glob({g:?})"),
            Pattern::AnyOf(gs) => write!(f, "Pattern::AnyOf({gs:?})"),
            Pattern::Predicate(_) => write!(f, "Pattern::Predicate(<fn>)"),
        }
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::All
    }
}

/// A member is selected iff `include` matches and `exclude` does not.
pub fn member_selected(include: &Pattern, exclude: &Pattern, dotted_path: &str) -> bool {
    include.matches(dotted_path) && !exclude.matches(dotted_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_does_not_cross_dots() {
        let g = Glob::new("math.*");
        assert!(g.matches("math.sqrt"));
        assert!(!g.matches("math.sub.sqrt"));
    }

    #[test]
    fn double_star_crosses_dots() {
        let g = Glob::new("math.**");
        assert!(g.matches("math.sub.sqrt"));
    }

    #[test]
    fn exact_name_matches_only_itself() {
        let g = Glob::new("sqrt");
        assert!(g.matches("sqrt"));
        assert!(!g.matches("sqrtx"));
    }

    #[test]
    fn member_selected_respects_exclude_over_include() {
        let include = Pattern::glob("*");
        let exclude = Pattern::glob("_*");
        assert!(member_selected(&include, &exclude, "visible"));
        assert!(!member_selected(&include, &exclude, "_hidden"));
    }
}
