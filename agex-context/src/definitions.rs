//! Renders a `Policy`'s registered surface into Python-like signatures
//! (spec.md §4.4 "System message"), grounded in the original definitions
//! renderer's visibility rules: `high` shows the docstring, `medium`
//! shows only the signature, `low` is hidden unless promoted by a
//! visible member underneath it.

use agex_policy::{
    ClassNamespace, FunctionNamespace, InstanceNamespace, MemberResolution, ModuleNamespace,
    Policy, Resolved, Signature, Visibility,
};

/// The fixed primer describing task-completion primitives and the
/// expected `{thinking, code}` response shape, prepended to every
/// agent's rendered Policy definitions and its own primer text.
pub const PRIMER_TEXT: &str = "\
You are an autonomous agent. You complete your task by writing Python-like
code in a sandboxed interpreter, one turn at a time.

Each turn, respond with your reasoning followed by a single fenced code
block. The code runs immediately; anything it prints, and any state it
writes, is shown back to you on the next turn.

Call `task_success(value)` to finish the task with a result, `task_fail(message)`
to give up and report why, or `task_clarify(message)` to ask the caller a
question before continuing. If you do none of these, the loop continues to
another turn.";

fn render_docstring(doc: &str, indent: &str) -> String {
    let clean = doc.trim();
    let body = clean.lines().map(|l| format!("{indent}{l}")).collect::<Vec<_>>().join("\n");
    format!("{indent}\"\"\"\n{body}\n{indent}\"\"\"")
}

fn render_function(name: &str, sig: &Signature, spec: &agex_policy::MemberSpec, indent: &str) -> String {
    let params = sig.params.join(", ");
    let ret = sig.return_type.as_deref().map(|t| format!(" -> {t}")).unwrap_or_default();
    let header = format!("{indent}def {name}({params}){ret}:");
    match (&spec.docstring, spec.visibility) {
        (Some(doc), Visibility::High) if !doc.is_empty() => {
            format!("{header}\n{}", render_docstring(doc, &format!("{indent}    ")))
        }
        _ => format!("{header}\n{indent}    ..."),
    }
}

fn render_class(name: &str, c: &ClassNamespace, indent: &str) -> String {
    let body_indent = format!("{indent}    ");
    let mut parts = Vec::new();

    if c.constructable && matches!(c.visibility, Visibility::High | Visibility::Medium) {
        if let (Some(init), Some(spec)) = (c.resolve_member("__init__"), c.effective_spec("__init__")) {
            parts.push(render_function("__init__", &init.signature, &spec, &body_indent));
        }
    }

    if matches!(c.visibility, Visibility::High | Visibility::Medium) {
        let mut rendered: Vec<String> = c
            .members
            .keys()
            .filter(|n| n.as_str() != "__init__")
            .filter_map(|name| {
                let spec = c.effective_spec(name)?;
                if spec.visibility == Visibility::Low {
                    return None;
                }
                let f = c.resolve_member(name)?;
                Some(render_function(name, &f.signature, &spec, &body_indent))
            })
            .collect();
        rendered.sort();
        parts.extend(rendered);
    }

    let mut out = vec![format!("{indent}class {name}:")];
    if parts.is_empty() {
        out.push(format!("{body_indent}pass"));
    } else {
        out.extend(parts);
    }
    out.join("\n")
}

fn render_module(name: &str, m: &ModuleNamespace, indent: &str) -> String {
    let reachable = m.reachable_members();
    let member_visibilities: Vec<Visibility> = reachable.iter().map(|(_, s)| s.visibility).collect();
    let effective = agex_policy::promote(m.visibility, &member_visibilities);
    if effective == Visibility::Low {
        return format!("{indent}module {name}:\n{indent}    ...");
    }

    let body_indent = format!("{indent}    ");
    let mut rendered: Vec<String> = Vec::new();
    for (member_name, spec) in &reachable {
        if spec.visibility == Visibility::Low {
            continue;
        }
        match m.resolve(member_name) {
            MemberResolution::Found(Resolved::Function(f)) => {
                rendered.push(render_function(member_name, &f.signature, spec, &body_indent));
            }
            MemberResolution::Found(Resolved::Class(c)) => {
                rendered.push(render_class(member_name, &c, &body_indent));
            }
            MemberResolution::Found(Resolved::Module(_)) => {
                rendered.push(format!("{body_indent}module {member_name}: ..."));
            }
            _ => {}
        }
    }
    rendered.sort();

    let mut out = vec![format!("{indent}module {name}:")];
    if rendered.is_empty() {
        out.push(format!("{body_indent}..."));
    } else {
        out.extend(rendered);
    }
    out.join("\n")
}

fn render_instance(name: &str, inst: &InstanceNamespace, indent: &str) -> String {
    let body_indent = format!("{indent}    ");
    let mut rendered: Vec<String> = inst
        .members
        .keys()
        .filter_map(|name| {
            let f = inst.resolve_member(name)?;
            if f.spec.visibility == Visibility::Low {
                return None;
            }
            Some(render_function(name, &f.signature, &f.spec, &body_indent))
        })
        .collect();
    rendered.sort();

    let mut out = vec![format!("{indent}object {name}:")];
    if rendered.is_empty() {
        out.push(format!("{body_indent}..."));
    } else {
        out.extend(rendered);
    }
    out.join("\n")
}

/// Renders every function, class, module, and live instance a Policy
/// makes reachable, in the visibility-gated Python-like shape the LLM
/// reads as a familiar signature. Top-level (`__main__`) functions only
/// show up here at `high` visibility — `medium`/`low` top-level
/// functions are callable but not worth describing in the prompt, same
/// as the source this is grounded on.
pub fn render_definitions(policy: &Policy) -> String {
    let mut sections = Vec::new();

    for (name, f) in &policy.functions {
        if f.spec.visibility == Visibility::High {
            sections.push(render_function(name, &f.signature, &f.spec, ""));
        }
    }

    let mut classes_out = Vec::new();
    for (name, c) in &policy.classes {
        let effective = agex_policy::promote(c.visibility, &c.member_visibilities());
        if effective != Visibility::Low {
            let mut promoted = c.clone();
            promoted.visibility = effective;
            classes_out.push(render_class(name, &promoted, ""));
        }
    }
    if !classes_out.is_empty() {
        sections.push(format!(
            "# Available classes (use directly, no import needed):\n{}",
            classes_out.join("\n\n")
        ));
    }

    let mut modules_out = Vec::new();
    for (name, m) in &policy.modules {
        modules_out.push(render_module(name, m, ""));
    }
    if !modules_out.is_empty() {
        sections.push(format!(
            "# Available modules (import before using):\n{}",
            modules_out.join("\n\n")
        ));
    }

    for (name, inst) in &policy.instances {
        sections.push(render_instance(name, inst, ""));
    }

    sections.join("\n\n")
}

/// The static system message: primer ⊕ rendered Policy definitions ⊕
/// agent primer.
pub fn render_system_message(policy: &Policy) -> String {
    let mut parts = vec![PRIMER_TEXT.to_string()];
    let defs = render_definitions(policy);
    if !defs.is_empty() {
        parts.push(defs);
    }
    if !policy.primer.is_empty() {
        parts.push(policy.primer.clone());
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use agex_policy::{CandidateKind, CandidateMember, MemberSpec, Pattern, StaticHostModule};
    use std::sync::Arc;

    fn function(name: &str, vis: Visibility, doc: Option<&str>) -> FunctionNamespace {
        FunctionNamespace {
            name: name.to_string(),
            signature: Signature {
                params: vec!["x".into()],
                return_type: Some("int".into()),
            },
            spec: MemberSpec {
                visibility: vis,
                docstring: doc.map(|d| d.to_string()),
                constructable: false,
            },
        }
    }

    #[test]
    fn high_visibility_function_shows_docstring() {
        let mut policy = Policy::new("be helpful");
        policy.register_function(function("double", Visibility::High, Some("Doubles x.")));
        let rendered = render_definitions(&policy);
        assert!(rendered.contains("def double(x: int) -> int:"));
        assert!(rendered.contains("Doubles x."));
    }

    #[test]
    fn medium_visibility_top_level_function_is_not_rendered() {
        let mut policy = Policy::new("");
        policy.register_function(function("hidden_helper", Visibility::Medium, Some("docs")));
        assert_eq!(render_definitions(&policy), "");
    }

    #[test]
    fn low_visibility_module_promotes_when_a_member_is_high() {
        let module = ModuleNamespace {
            name: "mathx".into(),
            host: Arc::new(StaticHostModule {
                candidates: vec![CandidateMember {
                    name: "sqrt".into(),
                    kind: CandidateKind::Function(Signature {
                        params: vec!["x".into()],
                        return_type: Some("float".into()),
                    }),
                }],
            }),
            include: Pattern::All,
            exclude: Pattern::None,
            overrides: [(
                "sqrt".to_string(),
                MemberSpec {
                    visibility: Visibility::High,
                    docstring: Some("Square root.".into()),
                    constructable: false,
                },
            )]
            .into_iter()
            .collect(),
            recursive: true,
            visibility: Visibility::Low,
            docstring: None,
        };
        let mut policy = Policy::new("");
        policy.register_module(module);
        let rendered = render_definitions(&policy);
        assert!(rendered.contains("module mathx:"));
        assert!(rendered.contains("def sqrt(x: float):"));
    }

    #[test]
    fn system_message_includes_primer_and_agent_primer() {
        let policy = Policy::new("You are a helpful research assistant.");
        let msg = render_system_message(&policy);
        assert!(msg.contains("task_success"));
        assert!(msg.contains("You are a helpful research assistant."));
    }
}
