//! Request types for the upstream [OpenAI-compatible Chat Completions API](https://openrouter.ai/docs/api-reference/chat-completion).
//!
//! Only the request side is modelled: the streamed response is relayed as raw
//! bytes and never parsed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl UpstreamMessage {
    pub fn new(role: Role, content: Option<String>) -> Self {
        Self { role, content }
    }
}

/// Body of the outbound `POST`.
///
/// Non-finite tuning values serialize as JSON `null`.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamChatRequest {
    pub model: String,
    pub messages: Vec<UpstreamMessage>,
    pub temperature: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub stream: bool,
}
