//! OpenAI chat completions adapter (also the wire format for compatible APIs)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GenerationDefaults, ProviderSettings};
use crate::error::ProviderError;
use crate::types::{AiResponse, ChatRequest};

use super::{ProviderAdapter, api_error, ensure_messages, transport_error};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI provider
pub struct OpenAiAdapter {
    client: Client,
    id: String,
    display_name: String,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAdapter")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiAdapter {
    pub fn new(
        client: Client,
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client,
            id: "openai".to_string(),
            display_name: "OpenAI".to_string(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
            temperature,
        }
    }

    /// Build from configuration; fails with `NotConfigured` when no key is set
    pub fn from_settings(
        client: Client,
        settings: &ProviderSettings,
        defaults: &GenerationDefaults,
    ) -> Result<Self, ProviderError> {
        if !settings.has_credentials() {
            return Err(ProviderError::NotConfigured {
                provider: "OpenAI".to_string(),
                credential: "OPENAI_API_KEY".to_string(),
            });
        }
        Ok(Self::new(
            client,
            settings.api_key.clone(),
            settings.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            settings.max_tokens_or(defaults),
            settings.temperature_or(defaults),
        ))
    }

    /// Re-label the adapter for an OpenAI-compatible service
    pub(crate) fn with_identity(mut self, id: &str, display_name: &str) -> Self {
        self.id = id.to_string();
        self.display_name = display_name.to_string();
        self
    }

    /// Convert a normalized request to OpenAI wire format
    fn to_openai_request<'a>(&'a self, request: &ChatRequest) -> OpenAiRequest<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_prompt {
            messages.push(OpenAiMessage {
                role: "system".to_string(),
                content: Some(system.clone()),
            });
        }
        messages.extend(request.messages.iter().map(|m| OpenAiMessage {
            role: m.role.to_string(),
            content: Some(m.content.clone()),
        }));

        OpenAiRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            temperature: request.temperature.unwrap_or(self.temperature),
        }
    }

    /// Convert an OpenAI response to the normalized shape
    fn normalize_response(&self, resp: OpenAiApiResponse) -> Result<AiResponse, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode {
                provider: self.display_name.clone(),
                message: "response had no choices".to_string(),
            })?;

        Ok(AiResponse {
            content: choice.message.content.unwrap_or_default(),
            provider: self.display_name.clone(),
            model: resp.model.unwrap_or_else(|| self.model.clone()),
            tokens_used: resp.usage.and_then(|u| u.total_tokens),
        })
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<AiResponse, ProviderError> {
        ensure_messages(request, &self.display_name)?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.to_openai_request(request);

        debug!(
            "{} request: model={}, messages={}",
            self.display_name,
            self.model,
            body.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&self.display_name, e))?;

        if !response.status().is_success() {
            return Err(api_error(&self.display_name, response).await);
        }

        let api_response: OpenAiApiResponse =
            response.json().await.map_err(|e| ProviderError::Decode {
                provider: self.display_name.clone(),
                message: e.to_string(),
            })?;

        debug!(
            "{} response: choices={}, finish_reason={:?}",
            self.display_name,
            api_response.choices.len(),
            api_response.choices.first().and_then(|c| c.finish_reason.as_deref())
        );

        self.normalize_response(api_response)
    }
}

// ── OpenAI wire types ──

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    total_tokens: Option<u32>,
}
