//! OpenAI provider implementation, grounded in
//! `original_source/agex/llm/openai_client.py`'s native structured-output
//! chat completion call.

mod client;
mod types;

pub use client::OpenAiClient;
