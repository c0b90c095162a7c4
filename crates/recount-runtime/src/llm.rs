use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// A trailing assistant message acts as a prefill: the model continues
    /// from its content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct MessageResponse {
    /// Concatenated text blocks of the completion (prefill not included).
    pub text: String,
    pub stop_reason: Option<String>,
}

/// Upstream LLM contract. The runtime only ever issues single bounded calls;
/// streaming is deliberately out of scope.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn create_message(&self, req: MessageRequest) -> Result<MessageResponse>;
}

/// Default client for an Anthropic-style `/v1/messages` endpoint.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    content: Vec<WireContent>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WireContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Unknown,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn create_message(&self, req: MessageRequest) -> Result<MessageResponse> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("upstream returned {}: {}", status, body)));
        }

        let wire: WireResponse = response.json().await?;
        let text = wire
            .content
            .iter()
            .filter_map(|block| match block {
                WireContent::Text { text } => Some(text.as_str()),
                WireContent::Unknown => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(MessageResponse {
            text,
            stop_reason: wire.stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_to_wire_shape() {
        let req = MessageRequest {
            model: "claude-haiku-4-5".to_string(),
            max_tokens: 1000,
            temperature: 0.25,
            system: "be brief".to_string(),
            messages: vec![ChatMessage::user("hello"), ChatMessage::assistant("{")],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][1]["role"], "assistant");
        assert_eq!(json["messages"][1]["content"], "{");
        assert_eq!(json["temperature"], 0.25);
    }

    #[test]
    fn wire_response_concatenates_text_blocks() {
        let wire: WireResponse = serde_json::from_str(
            r#"{"content":[{"type":"text","text":"\"a\": 1"},{"type":"tool_use","id":"x"},{"type":"text","text":"}"}],"stop_reason":"end_turn"}"#,
        )
        .unwrap();
        let text: String = wire
            .content
            .iter()
            .filter_map(|b| match b {
                WireContent::Text { text } => Some(text.as_str()),
                WireContent::Unknown => None,
            })
            .collect();
        assert_eq!(text, "\"a\": 1}");
    }
}
