//! OpenAI HTTP client: rate-limited request plumbing plus the `LlmClient`
//! adapter that drives it with native structured outputs, grounded in
//! `original_source/agex/llm/openai_client.py`.

use super::types::{llm_response_format, ApiError, Choice, CompletionRequest, CompletionResponse, Message as WireMessage};
use crate::{CompletionOptions, LlmClient};
use agex_core::{LlmError, LlmResponse, Message, Role};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

fn context_windows() -> HashMap<&'static str, usize> {
    [("gpt-4.1", 128_000), ("gpt-4.1-nano", 128_000)].into_iter().collect()
}

/// OpenAI API client with rate limiting and native JSON-schema structured
/// output.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    rate_limiter: Arc<Semaphore>,
    last_request: Arc<AtomicU64>,
    min_request_interval_ms: u64,
}

impl OpenAiClient {
    /// Create a new OpenAI client.
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - model identifier (e.g. `gpt-4.1-nano`)
    /// * `requests_per_minute` - maximum requests per minute
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, requests_per_minute: u32) -> Self {
        let permits = (requests_per_minute as usize).max(1);
        let min_interval_ms = (60_000 / requests_per_minute as u64).max(10);

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            rate_limiter: Arc::new(Semaphore::new(permits)),
            last_request: Arc::new(AtomicU64::new(0)),
            min_request_interval_ms: min_interval_ms,
        }
    }

    /// Make an API request with automatic rate limiting.
    async fn request<Req: Serialize, Res: DeserializeOwned>(&self, endpoint: &str, body: Req) -> Result<Res, LlmError> {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| LlmError::RequestFailed {
            provider: "openai".to_string(),
            status: 0,
            message: format!("rate limiter error: {e}"),
        })?;

        let now_ms = Instant::now().elapsed().as_millis() as u64;
        let last_ms = self.last_request.load(Ordering::Relaxed);
        let elapsed = now_ms.saturating_sub(last_ms);

        if elapsed < self.min_request_interval_ms {
            let wait_ms = self.min_request_interval_ms - elapsed;
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }

        self.last_request.store(now_ms, Ordering::Relaxed);

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "openai".to_string(),
                status: 0,
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| LlmError::RequestFailed {
                provider: "openai".to_string(),
                status: status.as_u16() as i32,
                message: format!("failed to parse response: {e}"),
            })
        } else {
            let error_text = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            let error_msg = serde_json::from_str::<ApiError>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);

            if status == StatusCode::TOO_MANY_REQUESTS {
                Err(LlmError::RateLimited {
                    provider: "openai".to_string(),
                    retry_after_ms: 1000,
                })
            } else {
                Err(LlmError::RequestFailed {
                    provider: "openai".to_string(),
                    status: status.as_u16() as i32,
                    message: error_msg,
                })
            }
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: &[Message], opts: &CompletionOptions) -> Result<LlmResponse, LlmError> {
        let wire_messages = messages
            .iter()
            .map(|m| WireMessage {
                role: role_name(m.role()).to_string(),
                content: m.as_plain_text(),
            })
            .collect();

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: wire_messages,
            max_tokens: opts.max_tokens.map(|t| t as i32),
            temperature: opts.temperature,
            top_p: opts.top_p,
            response_format: llm_response_format(),
        };

        let response: CompletionResponse = self.request("chat/completions", request).await?;

        let Choice { message, .. } = response.choices.into_iter().next().ok_or_else(|| LlmError::MalformedResponse {
            reason: "openai returned no choices".to_string(),
        })?;

        serde_json::from_str(&message.content).map_err(|e| LlmError::MalformedResponse {
            reason: format!("could not decode structured content as {{thinking, code}}: {e}"),
        })
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        text.len() / 4
    }

    fn context_window(&self) -> usize {
        context_windows().get(self.model.as_str()).copied().unwrap_or(128_000)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
