//! The LLM client contract (spec.md §6 "External Interfaces") and its
//! provider adapters.
//!
//! `agex-agents` drives a synchronous task loop, but every concrete
//! provider talks HTTP, so the boundary here is deliberately async: the
//! task loop bridges into it with `tokio::runtime::Handle::block_on` (or
//! awaits directly if it is already running inside an async context).
//! `LlmClient` itself says nothing about that bridge — it is a plain
//! `async_trait`, object-safe so a task loop can hold a `Box<dyn
//! LlmClient>` without knowing which provider it wraps.

mod retry;
pub mod providers;

pub use retry::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryingClient};

use agex_core::{LlmError, Message};
use async_trait::async_trait;

/// Per-call overrides layered over an agent's programmatic `LlmConfig`
/// (spec.md §6 "Environment configuration" — explicit call args outrank
/// everything else). `None` fields mean "use whatever the client was
/// constructed with."
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

/// The wire-level contract every LLM provider adapter implements. A call
/// is required to come back as the structured `{thinking, code}` shape
/// regardless of how the underlying API represents structured output —
/// forced tool-use, native JSON schema responses, or (for tests) plain
/// regex extraction.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        opts: &CompletionOptions,
    ) -> Result<agex_core::LlmResponse, LlmError>;

    /// A cheap, provider-specific estimate used by the context renderer to
    /// size its token budget before ever making a call.
    fn estimate_tokens(&self, text: &str) -> usize;

    fn context_window(&self) -> usize;

    fn model(&self) -> &str;

    fn provider_name(&self) -> &str;

    /// Bridges into [`complete`](Self::complete) from the task loop's
    /// synchronous call site. If a tokio runtime is already driving the
    /// current thread (tests, an embedding async host) this dispatches
    /// onto it via `block_in_place`; otherwise it spins up a throwaway
    /// current-thread runtime just for this call. Provider adapters never
    /// need to override this — it only exists because the task loop
    /// itself is synchronous while every HTTP-backed client is not.
    fn complete_blocking(
        &self,
        messages: &[Message],
        opts: &CompletionOptions,
    ) -> Result<agex_core::LlmResponse, LlmError> {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(|| handle.block_on(self.complete(messages, opts))),
            Err(_) => {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| LlmError::RequestFailed {
                        provider: self.provider_name().to_string(),
                        status: 0,
                        message: format!("failed to start runtime for blocking call: {e}"),
                    })?;
                rt.block_on(self.complete(messages, opts))
            }
        }
    }
}
