//! Scripted `LlmClient` test double, grounded in
//! `agex.llm.dummy_client.DummyLLMClient`: cycles through a fixed list of
//! canned response texts, extracting `{thinking, code}` from them the same
//! way a real provider's structured output would arrive.

use agex_core::{LlmError, LlmResponse, Message};
use agex_llm::{CompletionOptions, LlmClient};
use async_trait::async_trait;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn default_responses() -> Vec<String> {
    vec!["# Thinking\nI will use the provided tools.\n\n```python\nprint('Hello from Dummy')\n```".to_string()]
}

/// Returns a fixed response (or cycles through a script) instead of
/// calling out to a real model, so task-loop tests are deterministic and
/// offline. `call_count` advances on every `complete`/`complete_blocking`
/// call regardless of whether it races with another thread, matching the
/// original's simple increment-then-index behavior.
#[derive(Debug)]
pub struct DummyLlmClient {
    responses: Vec<String>,
    call_count: AtomicUsize,
    /// Every message list passed to `complete`, in call order — lets a
    /// test assert on what the task loop actually sent without needing a
    /// recording wrapper of its own.
    calls: Mutex<Vec<Vec<Message>>>,
}

impl DummyLlmClient {
    pub fn new() -> Self {
        Self::with_responses(default_responses())
    }

    pub fn with_responses(responses: Vec<String>) -> Self {
        let responses = if responses.is_empty() { default_responses() } else { responses };
        Self {
            responses,
            call_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for a single scripted turn, the common case in a task
    /// test that only needs one LLM round-trip.
    pub fn single(response: impl Into<String>) -> Self {
        Self::with_responses(vec![response.into()])
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn recorded_calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    fn extract(response_text: &str) -> LlmResponse {
        let thinking_re = Regex::new(r"(?s)# Thinking\n(.*?)\n\n").expect("static regex");
        let code_re = Regex::new(r"(?s)```python\n(.*?)\n```").expect("static regex");

        let thinking = thinking_re
            .captures(response_text)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();
        let mut code = code_re
            .captures(response_text)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();

        if thinking.is_empty() && code.is_empty() && !response_text.contains("python") {
            code = response_text.to_string();
        }

        LlmResponse { thinking, code }
    }
}

impl Default for DummyLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for DummyLlmClient {
    async fn complete(&self, messages: &[Message], _opts: &CompletionOptions) -> Result<LlmResponse, LlmError> {
        self.calls.lock().expect("calls mutex poisoned").push(messages.to_vec());
        let n = self.call_count.fetch_add(1, Ordering::SeqCst);
        let response_text = &self.responses[n % self.responses.len()];
        Ok(Self::extract(response_text))
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        text.len() / 4
    }

    fn context_window(&self) -> usize {
        8192
    }

    fn model(&self) -> &str {
        "dummy"
    }

    fn provider_name(&self) -> &str {
        "dummy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agex_core::Role;

    #[tokio::test]
    async fn default_response_extracts_thinking_and_code() {
        let client = DummyLlmClient::new();
        let resp = client.complete(&[], &CompletionOptions::default()).await.unwrap();
        assert_eq!(resp.thinking, "I will use the provided tools.");
        assert_eq!(resp.code, "print('Hello from Dummy')");
    }

    #[tokio::test]
    async fn cycles_through_scripted_responses() {
        let client = DummyLlmClient::with_responses(vec![
            "```python\ntask_continue()\n```".to_string(),
            "```python\ntask_success(1)\n```".to_string(),
        ]);
        let first = client.complete(&[], &CompletionOptions::default()).await.unwrap();
        let second = client.complete(&[], &CompletionOptions::default()).await.unwrap();
        let third = client.complete(&[], &CompletionOptions::default()).await.unwrap();
        assert_eq!(first.code, "task_continue()");
        assert_eq!(second.code, "task_success(1)");
        assert_eq!(third.code, "task_continue()");
    }

    #[tokio::test]
    async fn plain_text_without_python_marker_becomes_code() {
        let client = DummyLlmClient::single("task_success(42)");
        let resp = client.complete(&[], &CompletionOptions::default()).await.unwrap();
        assert_eq!(resp.thinking, "");
        assert_eq!(resp.code, "task_success(42)");
    }

    #[tokio::test]
    async fn records_every_call() {
        let client = DummyLlmClient::new();
        let msgs = vec![Message::text(Role::User, "hi")];
        client.complete(&msgs, &CompletionOptions::default()).await.unwrap();
        assert_eq!(client.call_count(), 1);
        assert_eq!(client.recorded_calls().len(), 1);
    }

    #[test]
    fn estimate_tokens_and_metadata_match_the_original() {
        let client = DummyLlmClient::new();
        assert_eq!(client.estimate_tokens("abcdefgh"), 2);
        assert_eq!(client.context_window(), 8192);
        assert_eq!(client.model(), "dummy");
    }
}
