//! Error types for provider calls, fallback exhaustion, and structured extraction

use thiserror::Error;

use crate::types::FailureRecord;

/// Maximum number of characters of raw model output kept in extraction errors
const SAMPLE_CHARS: usize = 200;

/// Failure of a single provider attempt.
///
/// These are recorded by the orchestrator and folded into an
/// [`AggregateError`]; callers never see them directly.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} is not configured: {credential} is not set")]
    NotConfigured { provider: String, credential: String },

    #[error("request timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("network error: {source}")]
    Transport {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API error (status {status}): {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("malformed response: {message}")]
    Decode { provider: String, message: String },

    #[error("invalid request: {message}")]
    InvalidRequest { provider: String, message: String },
}

impl ProviderError {
    /// Name of the provider the failure is attributed to
    pub fn provider(&self) -> &str {
        match self {
            Self::NotConfigured { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Api { provider, .. }
            | Self::Decode { provider, .. }
            | Self::InvalidRequest { provider, .. } => provider,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Every enabled provider failed, or none was enabled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct AggregateError {
    /// Failures in the order providers were attempted
    pub failures: Vec<FailureRecord>,
}

impl AggregateError {
    pub fn new(failures: Vec<FailureRecord>) -> Self {
        Self { failures }
    }

    /// No provider was enabled, so nothing was attempted
    pub fn is_unconfigured(&self) -> bool {
        self.failures.is_empty()
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.failures.is_empty() {
            return write!(
                f,
                "no AI providers are configured; set at least one provider API key"
            );
        }
        write!(f, "all {} AI providers failed: ", self.failures.len())?;
        for (idx, failure) in self.failures.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

/// A completion succeeded but no structured value could be read from it
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no JSON object or array found in model output: {sample:?}")]
    NotFound { sample: String },

    #[error("JSON in model output failed to parse ({source}): {sample:?}")]
    Parse {
        sample: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ExtractionError {
    pub(crate) fn not_found(content: &str) -> Self {
        Self::NotFound {
            sample: sample(content),
        }
    }

    pub(crate) fn parse(content: &str, source: serde_json::Error) -> Self {
        Self::Parse {
            sample: sample(content),
            source,
        }
    }

    /// The raw content excerpt kept for diagnosis
    pub fn sample(&self) -> &str {
        match self {
            Self::NotFound { sample } | Self::Parse { sample, .. } => sample,
        }
    }
}

fn sample(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(SAMPLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Errors surfaced to callers of the orchestrator
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Exhausted(#[from] AggregateError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request cancelled")]
    Cancelled,
}
