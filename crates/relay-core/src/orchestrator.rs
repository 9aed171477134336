//! Fallback orchestrator
//!
//! Tries providers strictly in registry order, one at a time, each bounded by
//! its own timeout. The first success is returned; if every enabled provider
//! fails the caller gets an [`AggregateError`] listing each failure in attempt
//! order. Per-call state (the failure list) never outlives the call.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::{DEFAULT_STRUCTURED_TEMPERATURE, RelayConfig};
use crate::error::{AggregateError, RelayError};
use crate::registry::ProviderRegistry;
use crate::timeout::with_timeout;
use crate::types::{
    AiResponse, ChatRequest, FailureRecord, GenerateRequest, ProviderDescriptor, ProviderStatus,
};

/// How a single provider attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Failed,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Timeout => write!(f, "timeout"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One provider attempt, reported to an [`AttemptObserver`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptEvent {
    pub provider_id: String,
    pub provider: String,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

/// Hook for per-attempt metrics (latency, timeouts vs. errors)
pub trait AttemptObserver: Send + Sync {
    fn on_attempt(&self, event: &AttemptEvent);
}

/// Routes completion requests across the registry with ordered fallback
pub struct Orchestrator {
    registry: Arc<ProviderRegistry>,
    structured_temperature: f32,
    observer: Option<Arc<dyn AttemptObserver>>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            structured_temperature: DEFAULT_STRUCTURED_TEMPERATURE,
            observer: None,
        }
    }

    /// Build the registry from configuration and wrap it
    pub fn from_config(config: &RelayConfig) -> anyhow::Result<Self> {
        let registry = ProviderRegistry::from_config(config)?;
        Ok(Self::new(Arc::new(registry))
            .with_structured_temperature(config.defaults.structured_temperature))
    }

    /// Set the temperature used by structured generation
    pub fn with_structured_temperature(mut self, temperature: f32) -> Self {
        self.structured_temperature = temperature;
        self
    }

    /// Report every provider attempt to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn structured_temperature(&self) -> f32 {
        self.structured_temperature
    }

    /// Enabled flag and display name of every provider, keyed by id
    pub fn providers_status(&self) -> BTreeMap<String, ProviderStatus> {
        self.registry.status()
    }

    /// Run a chat request through the fallback chain
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<AiResponse, RelayError> {
        self.chat_completion_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`chat_completion`](Self::chat_completion), abandoning the in-flight
    /// attempt and skipping remaining providers once `cancel` fires.
    pub async fn chat_completion_with_cancel(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<AiResponse, RelayError> {
        request.validate().map_err(RelayError::InvalidRequest)?;

        let span = info_span!("completion", call_id = %Uuid::new_v4());
        self.run_chain(request, cancel).instrument(span).await
    }

    /// Run a single-prompt request through the fallback chain
    pub async fn generate_text(&self, request: GenerateRequest) -> Result<AiResponse, RelayError> {
        self.chat_completion(&request.into()).await
    }

    pub async fn generate_text_with_cancel(
        &self,
        request: GenerateRequest,
        cancel: &CancellationToken,
    ) -> Result<AiResponse, RelayError> {
        self.chat_completion_with_cancel(&request.into(), cancel)
            .await
    }

    async fn run_chain(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<AiResponse, RelayError> {
        if self.registry.enabled_count() == 0 {
            warn!("Completion requested but no AI providers are configured");
            return Err(AggregateError::new(Vec::new()).into());
        }

        let mut failures: Vec<FailureRecord> = Vec::new();

        for (descriptor, adapter) in self.registry.entries() {
            let Some(adapter) = adapter else {
                debug!("Skipping disabled provider {}", descriptor.display_name);
                continue;
            };
            if cancel.is_cancelled() {
                return Err(RelayError::Cancelled);
            }

            debug!(
                "Trying provider {} ({}) with {}ms timeout",
                descriptor.display_name,
                adapter.model(),
                descriptor.timeout_ms
            );

            let started = Instant::now();
            let attempt = with_timeout(
                adapter.complete(request),
                descriptor.timeout(),
                &descriptor.display_name,
            );
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(
                        "Completion cancelled while waiting on {}",
                        descriptor.display_name
                    );
                    return Err(RelayError::Cancelled);
                }
                result = attempt => result,
            };
            let latency = started.elapsed();

            match result {
                Ok(response) => {
                    self.report(descriptor, AttemptOutcome::Success, latency);
                    if !failures.is_empty() {
                        info!(
                            "Request succeeded on failover provider {} after {} failure(s)",
                            descriptor.display_name,
                            failures.len()
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let outcome = if e.is_timeout() {
                        AttemptOutcome::Timeout
                    } else {
                        AttemptOutcome::Failed
                    };
                    self.report(descriptor, outcome, latency);
                    warn!("Provider {} failed: {}", descriptor.display_name, e);
                    failures.push(FailureRecord {
                        provider_name: descriptor.display_name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(AggregateError::new(failures).into())
    }

    fn report(&self, descriptor: &ProviderDescriptor, outcome: AttemptOutcome, latency: Duration) {
        info!(
            provider = %descriptor.id,
            outcome = %outcome,
            latency_ms = latency.as_millis() as u64,
            "provider attempt"
        );
        if let Some(observer) = &self.observer {
            observer.on_attempt(&AttemptEvent {
                provider_id: descriptor.id.clone(),
                provider: descriptor.display_name.clone(),
                outcome,
                latency,
            });
        }
    }
}
