//! Perplexity provider
//!
//! Perplexity speaks the OpenAI chat completions wire format, so this wraps
//! [`OpenAiAdapter`] with its own identity, endpoint, and model defaults.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{GenerationDefaults, ProviderSettings};
use crate::error::ProviderError;
use crate::types::{AiResponse, ChatRequest};

use super::ProviderAdapter;
use super::openai::OpenAiAdapter;

pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
pub const DEFAULT_MODEL: &str = "sonar";

pub struct PerplexityAdapter {
    inner: OpenAiAdapter,
}

impl std::fmt::Debug for PerplexityAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerplexityAdapter")
            .field("inner", &self.inner)
            .finish()
    }
}

impl PerplexityAdapter {
    pub fn new(
        client: Client,
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            inner: OpenAiAdapter::new(client, api_key, model, base_url, max_tokens, temperature)
                .with_identity("perplexity", "Perplexity"),
        }
    }

    pub fn from_settings(
        client: Client,
        settings: &ProviderSettings,
        defaults: &GenerationDefaults,
    ) -> Result<Self, ProviderError> {
        if !settings.has_credentials() {
            return Err(ProviderError::NotConfigured {
                provider: "Perplexity".to_string(),
                credential: "PERPLEXITY_API_KEY".to_string(),
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
}

#[async_trait]
impl ProviderAdapter for PerplexityAdapter {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn display_name(&self) -> &str {
        self.inner.display_name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<AiResponse, ProviderError> {
        self.inner.complete(request).await
    }
}
