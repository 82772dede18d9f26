//! Anthropic HTTP client: rate-limited request plumbing plus the
//! `LlmClient` adapter that drives it with a forced tool-use call,
//! grounded in `original_source/agex/llm/anthropic_client.py`.

use super::types::{
    structured_response_tool, ApiError, ContentBlock, Message as WireMessage, MessageRequest, MessageResponse,
    ToolChoice, STRUCTURED_RESPONSE_TOOL,
};
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
    [
        ("claude-3-sonnet-20240229", 200_000),
        ("claude-3-opus-20240229", 200_000),
        ("claude-3-haiku-20240307", 200_000),
        ("claude-3-5-sonnet-20240620", 200_000),
        ("claude-3-5-haiku-20241022", 200_000),
    ]
    .into_iter()
    .collect()
}

/// Anthropic API client with rate limiting and forced tool-use structured
/// output.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    rate_limiter: Arc<Semaphore>,
    last_request: Arc<AtomicU64>,
    min_request_interval_ms: u64,
}

impl AnthropicClient {
    /// Create a new Anthropic client.
    ///
    /// * `api_key` - Anthropic API key
    /// * `model` - model identifier (e.g. `claude-3-5-sonnet-20240620`)
    /// * `requests_per_minute` - maximum requests per minute
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, requests_per_minute: u32) -> Self {
        let permits = (requests_per_minute as usize).max(1);
        let min_interval_ms = (60_000 / requests_per_minute as u64).max(10);

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            model: model.into(),
            rate_limiter: Arc::new(Semaphore::new(permits)),
            last_request: Arc::new(AtomicU64::new(0)),
            min_request_interval_ms: min_interval_ms,
        }
    }

    /// Make an API request with automatic rate limiting.
    async fn request<Req: Serialize, Res: DeserializeOwned>(&self, endpoint: &str, body: Req) -> Result<Res, LlmError> {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| LlmError::RequestFailed {
            provider: "anthropic".to_string(),
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
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                status: 0,
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| LlmError::RequestFailed {
                provider: "anthropic".to_string(),
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
                    provider: "anthropic".to_string(),
                    retry_after_ms: 1000,
                })
            } else {
                Err(LlmError::RequestFailed {
                    provider: "anthropic".to_string(),
                    status: status.as_u16() as i32,
                    message: error_msg,
                })
            }
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, messages: &[Message], opts: &CompletionOptions) -> Result<LlmResponse, LlmError> {
        let mut system_message: Option<String> = None;
        let mut conversation = Vec::with_capacity(messages.len());
        for msg in messages {
            match msg.role() {
                Role::System => {
                    let text = msg.as_plain_text();
                    system_message = Some(match system_message {
                        Some(existing) => format!("{existing}\n\n{text}"),
                        None => text,
                    });
                }
                role => conversation.push(WireMessage {
                    role: role_name(role).to_string(),
                    content: msg.as_plain_text(),
                }),
            }
        }

        let request = MessageRequest {
            model: self.model.clone(),
            messages: conversation,
            max_tokens: opts.max_tokens.unwrap_or(4096) as i32,
            system: system_message,
            temperature: opts.temperature,
            top_p: opts.top_p,
            tools: vec![structured_response_tool()],
            tool_choice: ToolChoice::Tool {
                name: STRUCTURED_RESPONSE_TOOL.to_string(),
            },
        };

        let response: MessageResponse = self.request("messages", request).await?;

        let tool_use = response.content.into_iter().find_map(|block| match block {
            ContentBlock::ToolUse { name, input } if name == STRUCTURED_RESPONSE_TOOL => Some(input),
            _ => None,
        });

        let input = tool_use.ok_or_else(|| LlmError::MalformedResponse {
            reason: "anthropic did not return the expected structured_response tool use".to_string(),
        })?;

        let thinking = input.get("thinking").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let code = input.get("code").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        Ok(LlmResponse { thinking, code })
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        // Anthropic's own rough estimate: ~4 characters per token.
        text.len() / 4
    }

    fn context_window(&self) -> usize {
        context_windows().get(self.model.as_str()).copied().unwrap_or(200_000)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
