//! Google Gemini provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GenerationDefaults, ProviderSettings};
use crate::error::ProviderError;
use crate::types::{AiResponse, ChatRequest, ChatRole};

use super::{ProviderAdapter, api_error, ensure_messages, transport_error};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const DISPLAY_NAME: &str = "Google Gemini";

/// Google Gemini provider
pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl GeminiAdapter {
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
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
            temperature,
        }
    }

    pub fn from_settings(
        client: Client,
        settings: &ProviderSettings,
        defaults: &GenerationDefaults,
    ) -> Result<Self, ProviderError> {
        if !settings.has_credentials() {
            return Err(ProviderError::NotConfigured {
                provider: DISPLAY_NAME.to_string(),
                credential: "GEMINI_API_KEY".to_string(),
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

    /// Convert a normalized request to Gemini wire format.
    ///
    /// Gemini has no system role inside `contents`: the request's system prompt
    /// and any system messages are merged, in order, into `systemInstruction`.
    fn to_gemini_request(&self, request: &ChatRequest) -> GeminiRequest {
        let mut system_parts = Vec::new();
        if let Some(system) = &request.system_prompt {
            system_parts.push(GeminiPart {
                text: system.clone(),
            });
        }

        let mut contents = Vec::with_capacity(request.messages.len());
        for msg in &request.messages {
            let role = match msg.role {
                ChatRole::System => {
                    system_parts.push(GeminiPart {
                        text: msg.content.clone(),
                    });
                    continue;
                }
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            };
            contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts: vec![GeminiPart {
                    text: msg.content.clone(),
                }],
            });
        }

        GeminiRequest {
            contents,
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(GeminiContent {
                    role: None,
                    parts: system_parts,
                })
            },
            generation_config: GeminiGenerationConfig {
                max_output_tokens: request.max_tokens.unwrap_or(self.max_tokens),
                temperature: request.temperature.unwrap_or(self.temperature),
            },
        }
    }

    /// Convert a Gemini response to the normalized shape
    fn normalize_response(&self, resp: GeminiApiResponse) -> Result<AiResponse, ProviderError> {
        if let Some(reason) = resp
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(ProviderError::Api {
                provider: DISPLAY_NAME.to_string(),
                status: 200,
                message: format!("prompt blocked: {}", reason),
            });
        }

        let content = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(AiResponse {
            content,
            provider: DISPLAY_NAME.to_string(),
            model: resp.model_version.unwrap_or_else(|| self.model.clone()),
            tokens_used: resp.usage_metadata.and_then(|u| u.total_token_count),
        })
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> &str {
        "gemini"
    }

    fn display_name(&self) -> &str {
        DISPLAY_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<AiResponse, ProviderError> {
        ensure_messages(request, DISPLAY_NAME)?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = self.to_gemini_request(request);

        debug!(
            "Gemini request: model={}, contents={}",
            self.model,
            body.contents.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(DISPLAY_NAME, e))?;

        if !response.status().is_success() {
            return Err(api_error(DISPLAY_NAME, response).await);
        }

        let api_response: GeminiApiResponse =
            response.json().await.map_err(|e| ProviderError::Decode {
                provider: DISPLAY_NAME.to_string(),
                message: e.to_string(),
            })?;

        debug!(
            "Gemini response: candidates={}",
            api_response.candidates.len()
        );

        self.normalize_response(api_response)
    }
}

// ── Gemini wire types ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiApiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    total_token_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
