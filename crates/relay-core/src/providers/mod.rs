//! Provider adapters
//!
//! Each adapter translates a [`ChatRequest`] into one provider's wire format,
//! issues exactly one HTTP call, and normalizes the reply into an
//! [`AiResponse`]. The orchestrator only ever sees [`ProviderAdapter`].

pub mod gemini;
pub mod openai;
pub mod perplexity;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::error::ProviderError;
use crate::types::{AiResponse, ChatRequest};

pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use perplexity::PerplexityAdapter;

/// Trait that every provider adapter implements
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier used in configuration and status maps (e.g. "openai")
    fn id(&self) -> &str;

    /// Human-readable name reported in responses and failure records
    fn display_name(&self) -> &str;

    /// Model identifier requests are sent to
    fn model(&self) -> &str;

    /// Perform one completion call
    async fn complete(&self, request: &ChatRequest) -> Result<AiResponse, ProviderError>;
}

/// Build the HTTP client shared by every adapter.
///
/// No overall request timeout is set here: each attempt is bounded by the
/// per-provider timeout guard instead.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("relay/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Reject requests no provider can serve before touching the network
pub(crate) fn ensure_messages(request: &ChatRequest, provider: &str) -> Result<(), ProviderError> {
    if request.messages.is_empty() {
        return Err(ProviderError::InvalidRequest {
            provider: provider.to_string(),
            message: "request must contain at least one message".to_string(),
        });
    }
    Ok(())
}

/// Turn a non-success HTTP response into a [`ProviderError::Api`], keeping the
/// provider's own error text.
pub(crate) async fn api_error(provider: &str, response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    ProviderError::Api {
        provider: provider.to_string(),
        status: status.as_u16(),
        message: error_message_from_body(&body),
    }
}

/// Pull the human-readable message out of the `{"error": {"message": ...}}`
/// envelope shared by OpenAI-style and Google APIs; fall back to the raw body.
pub(crate) fn error_message_from_body(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| match v.get("error") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(err) => err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        None => v.get("message").and_then(Value::as_str).map(str::to_string),
    });
    match message {
        Some(m) if !m.is_empty() => m,
        _ if body.trim().is_empty() => "empty error response".to_string(),
        _ => body.trim().to_string(),
    }
}

/// Wrap a reqwest failure as a transport error
pub(crate) fn transport_error(provider: &str, source: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        provider: provider.to_string(),
        source,
    }
}
