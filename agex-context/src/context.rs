//! Per-iteration context message: state diffs ⊕ stdout, independently
//! token-budgeted (spec.md §4.4 "Context message"), grounded in the
//! original context renderer's 60/40 split and line-wise truncation.

use crate::tokens::TokenCounter;
use crate::value::ValueRenderer;
use agex_core::Value;
use agex_storage::State;

const TRUNCATION_MARKER: &str = "... (truncated)";

/// Reads the reserved `__stdout__` list a task iteration accumulates
/// (spec.md §4.5 step 1, "Clear per-iteration stdout") back out as plain
/// lines, in print order. Non-string entries render with `Display` rather
/// than being dropped, since `print()` accepts any value.
pub fn stdout_from_state(state: &dyn State) -> Vec<String> {
    match state.get("__stdout__") {
        Some(Value::List(items)) => items.borrow().iter().map(|v| v.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Truncates `text` line-by-line until it fits `budget` tokens (as
/// counted by `counter`), appending a marker so the degradation is
/// visible rather than silent. Returns `text` unchanged if it already
/// fits.
fn truncate_to_budget(text: &str, budget: usize, counter: &dyn TokenCounter) -> String {
    if counter.count(text) <= budget {
        return text.to_string();
    }
    let mut kept: Vec<&str> = Vec::new();
    for line in text.lines() {
        let mut candidate = kept.clone();
        candidate.push(line);
        let candidate_text = format!("{}\n{TRUNCATION_MARKER}", candidate.join("\n"));
        if counter.count(&candidate_text) > budget {
            break;
        }
        kept.push(line);
    }
    if kept.is_empty() {
        return TRUNCATION_MARKER.to_string();
    }
    format!("{}\n{TRUNCATION_MARKER}", kept.join("\n"))
}

/// Renders the ordered state writes from the most recent commit and the
/// iteration's stdout into one context message, splitting `budget` 60/40
/// between the two streams when both are present and giving the full
/// budget to whichever one is present alone.
pub fn render_context_message(
    diffs: &[(String, Value)],
    stdout: &[String],
    budget: usize,
    counter: &dyn TokenCounter,
) -> String {
    let renderer = ValueRenderer::default();

    let state_text = if diffs.is_empty() {
        String::new()
    } else {
        diffs
            .iter()
            .map(|(name, v)| format!("{name} = {}", renderer.render(v)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let stdout_text = if stdout.is_empty() {
        String::new()
    } else {
        format!("Agent printed:\n{}", stdout.join("\n"))
    };

    let (state_budget, stdout_budget) = match (state_text.is_empty(), stdout_text.is_empty()) {
        (false, false) => ((budget as f64 * 0.6) as usize, (budget as f64 * 0.4) as usize),
        (false, true) => (budget, 0),
        (true, false) => (0, budget),
        (true, true) => (0, 0),
    };

    let rendered_state = if state_text.is_empty() {
        String::new()
    } else {
        truncate_to_budget(&state_text, state_budget, counter)
    };
    let rendered_stdout = if stdout_text.is_empty() {
        String::new()
    } else {
        truncate_to_budget(&stdout_text, stdout_budget, counter)
    };

    [rendered_state, rendered_stdout]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::CharsFallbackCounter;

    #[test]
    fn stdout_from_state_reads_reserved_key_in_print_order() {
        use agex_storage::{base_store, MemoryBackend, StoreKind};
        let state = base_store(StoreKind::Transient, Box::new(MemoryBackend::new()));
        state
            .set(
                "__stdout__",
                Value::list(vec![Value::Str("one".into()), Value::Int(2)]),
            )
            .unwrap();
        assert_eq!(stdout_from_state(&*state), vec!["one".to_string(), "2".to_string()]);
    }

    #[test]
    fn empty_inputs_render_nothing() {
        let counter = CharsFallbackCounter;
        assert_eq!(render_context_message(&[], &[], 1000, &counter), "");
    }

    #[test]
    fn single_stream_gets_the_full_budget() {
        let counter = CharsFallbackCounter;
        let diffs = vec![("x".to_string(), Value::Int(1))];
        let out = render_context_message(&diffs, &[], 1000, &counter);
        assert_eq!(out, "x = 1");
    }

    #[test]
    fn both_streams_present_renders_both() {
        let counter = CharsFallbackCounter;
        let diffs = vec![("x".to_string(), Value::Int(1))];
        let stdout = vec!["hello".to_string()];
        let out = render_context_message(&diffs, &stdout, 1000, &counter);
        assert!(out.contains("x = 1"));
        assert!(out.contains("Agent printed:\nhello"));
    }

    #[test]
    fn tight_budget_truncates_with_a_marker() {
        let counter = CharsFallbackCounter;
        let diffs: Vec<(String, Value)> = (0..50)
            .map(|i| (format!("k{i}"), Value::Int(i)))
            .collect();
        let out = render_context_message(&diffs, &[], 5, &counter);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert!(out.len() < diffs.len() * 10);
    }
}
