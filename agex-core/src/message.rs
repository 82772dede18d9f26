//! LLM message and response types (SPEC_FULL.md §6 "LLM client contract").
//!
//! These types are the *shape* of the opaque `complete(messages) ->
//! {thinking, code}` contract; they say nothing about how any particular
//! provider's wire format maps onto them — that mapping is
//! `agex-llm`'s job, not this crate's.

use serde::{Deserialize, Serialize};

/// The role a message plays in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One piece of a multimodal message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ContentPart {
    Text(TextPart),
    Image(ImagePart),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePart {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A single turn in a conversation sent to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    Text(TextMessage),
    Multimodal(MultimodalMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultimodalMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Message::Text(TextMessage {
            role,
            content: content.into(),
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Message::Text(m) => m.role,
            Message::Multimodal(m) => m.role,
        }
    }

    /// A plain-text rendering of the message, used by token estimators and
    /// by providers whose wire format has no native multimodal content.
    pub fn as_plain_text(&self) -> String {
        match self {
            Message::Text(m) => m.content.clone(),
            Message::Multimodal(m) => m
                .content
                .iter()
                .map(|p| match p {
                    ContentPart::Text(t) => t.text.clone(),
                    ContentPart::Image(_) => "[image]".to_string(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// The structured response every provider adapter must ultimately produce,
/// regardless of how its native API shapes tool calls or structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub thinking: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_joins_multimodal_parts() {
        let msg = Message::Multimodal(MultimodalMessage {
            role: Role::User,
            content: vec![
                ContentPart::Text(TextPart {
                    text: "look at this".into(),
                }),
                ContentPart::Image(ImagePart {
                    bytes: vec![1, 2, 3],
                    mime_type: "image/png".into(),
                }),
            ],
        });
        assert_eq!(msg.as_plain_text(), "look at this\n[image]");
    }
}
