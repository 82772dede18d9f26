//! Retry/backoff orchestration wrapping any `LlmClient`, grounded in the
//! teacher's provider-health circuit breaker and generalized from
//! per-provider routing to the single-client retry loop this runtime
//! needs (spec.md §6, `RetryConfig` in `agex-core::config`).

use crate::{CompletionOptions, LlmClient};
use agex_core::{LlmError, LlmResponse, Message, RetryConfig};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for CircuitState {
    fn from(v: u8) -> Self {
        match v {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Tracks a single provider's recent health so a run of retries against a
/// downed provider fails fast instead of burning its whole backoff budget
/// on calls that were never going to succeed.
pub struct CircuitBreaker {
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    last_failure: RwLock<Option<Instant>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            last_failure: RwLock::new(None),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_allowed(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if let Ok(guard) = self.last_failure.read() {
                    if let Some(last) = *guard {
                        if last.elapsed() > self.config.timeout {
                            self.state.store(CircuitState::HalfOpen as u8, Ordering::SeqCst);
                            return true;
                        }
                    }
                }
                false
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        if self.state() == CircuitState::HalfOpen {
            let count = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
            if count >= self.config.success_threshold {
                self.state.store(CircuitState::Closed as u8, Ordering::SeqCst);
                self.success_count.store(0, Ordering::SeqCst);
            }
        }
    }

    pub fn record_failure(&self) {
        self.success_count.store(0, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_failure.write() {
            *guard = Some(Instant::now());
        }
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.config.failure_threshold {
            self.state.store(CircuitState::Open as u8, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .field("failure_count", &self.failure_count.load(Ordering::Relaxed))
            .finish()
    }
}

/// Wraps any `LlmClient` with `agex_core::RetryConfig`'s exponential
/// backoff and a circuit breaker, so `complete()` only gives up after
/// `max_retries` attempts and surfaces `LlmError::RetriesExhausted` rather
/// than the last transport error alone.
pub struct RetryingClient<C: LlmClient> {
    inner: C,
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl<C: LlmClient> RetryingClient<C> {
    pub fn new(inner: C, retry: RetryConfig) -> Self {
        Self {
            inner,
            retry,
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let scaled = self.retry.initial_backoff.as_secs_f32() * self.retry.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f32(scaled).min(self.retry.max_backoff)
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RetryingClient<C> {
    async fn complete(&self, messages: &[Message], opts: &CompletionOptions) -> Result<LlmResponse, LlmError> {
        if !self.breaker.is_allowed() {
            return Err(LlmError::RequestFailed {
                provider: self.inner.provider_name().to_string(),
                status: 0,
                message: "circuit breaker open, refusing to call a recently-failing provider".to_string(),
            });
        }

        let mut last_err = None;
        for attempt in 0..=self.retry.max_retries {
            match self.inner.complete(messages, opts).await {
                Ok(response) => {
                    self.breaker.record_success();
                    return Ok(response);
                }
                Err(err) => {
                    self.breaker.record_failure();
                    warn!(provider = self.inner.provider_name(), attempt, error = %err, "llm call failed");
                    last_err = Some(err);
                    if attempt < self.retry.max_retries {
                        tokio::time::sleep(self.backoff_for(attempt)).await;
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            provider: self.inner.provider_name().to_string(),
            attempts: self.retry.max_retries + 1,
            reason: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        self.inner.estimate_tokens(text)
    }

    fn context_window(&self) -> usize {
        self.inner.context_window()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agex_core::{Role, TextMessage};
    use std::sync::atomic::AtomicUsize;

    struct FlakyClient {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(&self, _messages: &[Message], _opts: &CompletionOptions) -> Result<LlmResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(LlmError::RequestFailed {
                    provider: "flaky".into(),
                    status: 500,
                    message: "down".into(),
                })
            } else {
                Ok(LlmResponse {
                    thinking: "ok".into(),
                    code: "task_success(1)".into(),
                })
            }
        }
        fn estimate_tokens(&self, text: &str) -> usize {
            text.len() / 4
        }
        fn context_window(&self) -> usize {
            1000
        }
        fn model(&self) -> &str {
            "flaky"
        }
        fn provider_name(&self) -> &str {
            "flaky"
        }
    }

    fn retry_config() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let client = RetryingClient::new(
            FlakyClient {
                calls: AtomicUsize::new(0),
                fail_first: 2,
            },
            retry_config(),
        );
        let messages = [Message::Text(TextMessage {
            role: Role::User,
            content: "hi".into(),
        })];
        let response = client.complete(&messages, &CompletionOptions::default()).await.unwrap();
        assert_eq!(response.code, "task_success(1)");
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_attempts() {
        let client = RetryingClient::new(
            FlakyClient {
                calls: AtomicUsize::new(0),
                fail_first: 10,
            },
            retry_config(),
        );
        let messages = [Message::Text(TextMessage {
            role: Role::User,
            content: "hi".into(),
        })];
        let err = client.complete(&messages, &CompletionOptions::default()).await.unwrap_err();
        match err {
            LlmError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
