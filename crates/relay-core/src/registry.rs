//! Ordered registry of configured providers
//!
//! Built once at start-up and read-only afterwards, so it can be shared across
//! concurrent calls behind an `Arc` without locking. Registration order is the
//! fallback priority order.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{self, DEFAULT_TIMEOUT_MS, RelayConfig};
use crate::error::ProviderError;
use crate::providers::{
    GeminiAdapter, OpenAiAdapter, PerplexityAdapter, ProviderAdapter, build_http_client,
};
use crate::types::{ProviderDescriptor, ProviderStatus};

/// Providers in fallback order (index 0 = primary)
#[derive(Default)]
pub struct ProviderRegistry {
    descriptors: Vec<ProviderDescriptor>,
    /// Parallel to `descriptors`; `None` for disabled providers
    adapters: Vec<Option<Arc<dyn ProviderAdapter>>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.descriptors)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every configured adapter once, sharing one HTTP client
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let client = build_http_client().context("Failed to build HTTP client")?;
        Ok(Self::from_config_with_client(config, client))
    }

    /// Like [`from_config`](Self::from_config) with a caller-supplied client
    pub fn from_config_with_client(config: &RelayConfig, client: reqwest::Client) -> Self {
        let defaults = &config.defaults;
        let mut registry = Self::new();

        info!("Initializing provider registry");

        for id in &config.providers.order {
            let Some(settings) = config.providers.settings(id) else {
                warn!("Unknown provider '{}' in provider order, skipping", id);
                continue;
            };
            let timeout = Duration::from_millis(settings.timeout_ms);

            let built: Result<Arc<dyn ProviderAdapter>, ProviderError> = match id.as_str() {
                config::OPENAI => OpenAiAdapter::from_settings(client.clone(), settings, defaults)
                    .map(|a| Arc::new(a) as Arc<dyn ProviderAdapter>),
                config::GEMINI => GeminiAdapter::from_settings(client.clone(), settings, defaults)
                    .map(|a| Arc::new(a) as Arc<dyn ProviderAdapter>),
                config::PERPLEXITY => {
                    PerplexityAdapter::from_settings(client.clone(), settings, defaults)
                        .map(|a| Arc::new(a) as Arc<dyn ProviderAdapter>)
                }
                _ => continue,
            };

            registry = match built {
                Ok(adapter) => {
                    info!(
                        "Provider {} enabled: model={}, timeout={}ms",
                        adapter.display_name(),
                        adapter.model(),
                        settings.timeout_ms
                    );
                    registry.with_provider(adapter, timeout)
                }
                Err(e) => {
                    info!("Provider {} disabled: {}", e.provider(), e);
                    registry.with_disabled(id, e.provider(), timeout)
                }
            };
        }

        if registry.enabled_count() == 0 {
            warn!("No AI providers configured - every completion request will fail");
        }

        registry
    }

    /// Append an enabled provider at the lowest priority
    pub fn with_provider(mut self, adapter: Arc<dyn ProviderAdapter>, timeout: Duration) -> Self {
        let descriptor = ProviderDescriptor {
            id: adapter.id().to_string(),
            display_name: adapter.display_name().to_string(),
            enabled: true,
            timeout_ms: positive_timeout_ms(adapter.id(), timeout),
        };
        self.push(descriptor, Some(adapter));
        self
    }

    /// Append a provider that is known but lacks credentials
    pub fn with_disabled(mut self, id: &str, display_name: &str, timeout: Duration) -> Self {
        let descriptor = ProviderDescriptor {
            id: id.to_string(),
            display_name: display_name.to_string(),
            enabled: false,
            timeout_ms: positive_timeout_ms(id, timeout),
        };
        self.push(descriptor, None);
        self
    }

    fn push(&mut self, descriptor: ProviderDescriptor, adapter: Option<Arc<dyn ProviderAdapter>>) {
        if self.descriptors.iter().any(|d| d.id == descriptor.id) {
            warn!(
                "Provider '{}' is already registered, ignoring duplicate",
                descriptor.id
            );
            return;
        }
        self.descriptors.push(descriptor);
        self.adapters.push(adapter);
    }

    /// Providers in priority order, enabled or not
    pub fn list_providers(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.descriptors.iter().any(|d| d.id == id && d.enabled)
    }

    /// Read-only diagnostic view keyed by provider id
    pub fn status(&self) -> BTreeMap<String, ProviderStatus> {
        self.descriptors
            .iter()
            .map(|d| {
                (
                    d.id.clone(),
                    ProviderStatus {
                        enabled: d.enabled,
                        display_name: d.display_name.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn enabled_count(&self) -> usize {
        self.adapters.iter().filter(|a| a.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors paired with their adapter, in priority order
    pub(crate) fn entries(
        &self,
    ) -> impl Iterator<Item = (&ProviderDescriptor, Option<&Arc<dyn ProviderAdapter>>)> {
        self.descriptors
            .iter()
            .zip(self.adapters.iter().map(Option::as_ref))
    }
}

fn positive_timeout_ms(id: &str, timeout: Duration) -> u64 {
    let ms = timeout.as_millis() as u64;
    if ms == 0 {
        warn!(
            "Provider '{}' has a zero timeout, using {}ms",
            id, DEFAULT_TIMEOUT_MS
        );
        DEFAULT_TIMEOUT_MS
    } else {
        ms
    }
}
