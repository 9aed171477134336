//! Provider-agnostic request and response types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A normalized chat completion request.
///
/// Messages are sent in the order given. Adapters fill in `max_tokens` and
/// `temperature` from their configured defaults when these are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Check the request against the limits every provider accepts.
    pub fn validate(&self) -> Result<(), String> {
        if self.messages.is_empty() {
            return Err("request must contain at least one message".to_string());
        }
        if self.max_tokens == Some(0) {
            return Err("max_tokens must be positive".to_string());
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(format!("temperature {} is outside [0, 2]", t));
            }
        }
        Ok(())
    }
}

/// Single-prompt convenience form of [`ChatRequest`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }
}

impl From<GenerateRequest> for ChatRequest {
    /// The system prompt becomes a leading system message, so the converted
    /// request carries it exactly once.
    fn from(req: GenerateRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = req.system_prompt {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(req.prompt));
        Self {
            messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            system_prompt: None,
        }
    }
}

/// Normalized completion returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    /// Display name of the provider that answered
    pub provider: String,
    /// Model identifier that produced the content
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

/// Static description of one configured provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub display_name: String,
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl ProviderDescriptor {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Operator-facing view of a provider, keyed by id in status maps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub enabled: bool,
    pub display_name: String,
}

/// Why one provider attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub provider_name: String,
    pub message: String,
}

/// Parsed value obtained from a structured completion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredResponse {
    pub data: serde_json::Value,
    pub provider: String,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.provider_name, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_display() {
        assert_eq!(ChatRole::User.to_string(), "user");
        assert_eq!(ChatRole::Assistant.to_string(), "assistant");
        assert_eq!(ChatRole::System.to_string(), "system");
    }

    #[test]
    fn test_generate_request_converts_to_single_user_message() {
        let chat: ChatRequest = GenerateRequest::new("X").into();
        assert_eq!(chat.messages, vec![ChatMessage::user("X")]);
        assert!(chat.system_prompt.is_none());
    }

    #[test]
    fn test_generate_request_system_prompt_leads() {
        let req = GenerateRequest {
            prompt: "X".to_string(),
            max_tokens: Some(100),
            temperature: Some(0.2),
            system_prompt: Some("be brief".to_string()),
        };
        let chat = ChatRequest::from(req);
        assert_eq!(
            chat.messages,
            vec![ChatMessage::system("be brief"), ChatMessage::user("X")]
        );
        assert_eq!(chat.max_tokens, Some(100));
        assert_eq!(chat.temperature, Some(0.2));
        assert!(chat.system_prompt.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        assert!(ChatRequest::new(vec![]).validate().is_err());

        let zero = ChatRequest::new(vec![ChatMessage::user("hi")]).with_max_tokens(0);
        assert!(zero.validate().is_err());

        let hot = ChatRequest::new(vec![ChatMessage::user("hi")]).with_temperature(2.5);
        assert!(hot.validate().is_err());

        let ok = ChatRequest::new(vec![ChatMessage::user("hi")])
            .with_temperature(2.0)
            .with_max_tokens(1);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_failure_record_display() {
        let rec = FailureRecord {
            provider_name: "OpenAI".to_string(),
            message: "request timed out after 50ms".to_string(),
        };
        assert_eq!(rec.to_string(), "[OpenAI] request timed out after 50ms");
    }

    #[test]
    fn test_descriptor_timeout() {
        let d = ProviderDescriptor {
            id: "openai".to_string(),
            display_name: "OpenAI".to_string(),
            enabled: true,
            timeout_ms: 1500,
        };
        assert_eq!(d.timeout(), Duration::from_millis(1500));
    }
}
