//! relay-core - Resilient multi-provider completion routing
//!
//! This crate provides:
//! - Provider adapters for OpenAI-style, Gemini, and Perplexity chat APIs
//! - A per-attempt timeout guard
//! - An ordered provider registry built from environment or TOML configuration
//! - A fallback orchestrator that tries providers in priority order
//! - Structured (JSON) generation with extraction from free-form replies

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod structured;
pub mod timeout;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{GenerationDefaults, ProviderSettings, ProvidersConfig, RelayConfig, mask_secret};
pub use error::{AggregateError, ExtractionError, ProviderError, RelayError};
pub use orchestrator::{AttemptEvent, AttemptObserver, AttemptOutcome, Orchestrator};
pub use providers::{GeminiAdapter, OpenAiAdapter, PerplexityAdapter, ProviderAdapter};
pub use registry::ProviderRegistry;
pub use structured::extract_json;
pub use timeout::with_timeout;
pub use types::{
    AiResponse, ChatMessage, ChatRequest, ChatRole, FailureRecord, GenerateRequest,
    ProviderDescriptor, ProviderStatus, StructuredResponse,
};
