//! Concrete `LlmClient` adapters (spec.md §6 "Provider adapters").

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
