//! Messages API request and response types

use serde::{Deserialize, Serialize};

/// Request body for `POST /v1/messages`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    /// Model identifier (e.g., "claude-sonnet-4-5-20250929")
    pub model: String,

    /// Conversation turns
    pub messages: Vec<Message>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// System prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Sampling temperature (0.0 to 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl MessageRequest {
    /// Single user turn with an optional system prompt
    pub fn simple_message(model: impl Into<String>, prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::user(prompt)],
            max_tokens,
            system: None,
            temperature: None,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// "user" or "assistant"
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Content block of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// Any block type this client does not consume (thinking, tool_use, ...)
    #[serde(other)]
    Other,
}

/// Response body of `POST /v1/messages`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,

    pub model: String,

    pub content: Vec<ContentBlock>,

    /// end_turn, max_tokens, stop_sequence, ...
    #[serde(default)]
    pub stop_reason: Option<String>,

    pub usage: Usage,
}

impl MessageResponse {
    /// All text blocks joined with newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Token accounting of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_request_serialization() {
        let request = MessageRequest::simple_message("claude-sonnet-4-5-20250929", "Hello", 100)
            .with_temperature(0.5);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "claude-sonnet-4-5-20250929");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "Hello");
        assert_eq!(json["temperature"], 0.5);
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_response_text_skips_other_blocks() {
        let body = r#"{
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-5-20250929",
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "numpy==1.26.4"},
                {"type": "text", "text": "pandas==2.2.2"}
            ],
            "stop_reason": "end_turn",
            "stop_sequence": null,
            "usage": {"input_tokens": 10, "output_tokens": 5}
        }"#;

        let response: MessageResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.content[0], ContentBlock::Other);
        assert_eq!(response.text(), "numpy==1.26.4\npandas==2.2.2");
        assert_eq!(response.usage.output_tokens, 5);
    }
}
