//! Anthropic (Claude) provider adapter: structured `{thinking, code}`
//! output via forced tool-use, grounded in
//! `original_source/agex/llm/anthropic_client.py`.

mod client;
mod types;

pub use client::AnthropicClient;
