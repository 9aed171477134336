//! Scripted adapters for exercising the registry and orchestrator without a network

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::ProviderError;
use crate::providers::ProviderAdapter;
use crate::types::{AiResponse, ChatRequest};

/// Shared record of which adapters were invoked, in order
pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Succeed { content: String, delay: Duration },
    Fail(String),
    Hang,
}

pub(crate) struct ScriptedAdapter {
    id: String,
    display_name: String,
    behavior: Behavior,
    calls: AtomicUsize,
    log: CallLog,
    last_request: Mutex<Option<ChatRequest>>,
}

impl ScriptedAdapter {
    pub(crate) fn new(id: &str, display_name: &str, behavior: Behavior, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            log: log.clone(),
            last_request: Mutex::new(None),
        })
    }

    pub(crate) fn ok(id: &str, display_name: &str, content: &str) -> Arc<Self> {
        Self::new(
            id,
            display_name,
            Behavior::Succeed {
                content: content.to_string(),
                delay: Duration::ZERO,
            },
            &call_log(),
        )
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_request(&self) -> Option<ChatRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<AiResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(self.id.clone());
        *self.last_request.lock().unwrap() = Some(request.clone());

        match &self.behavior {
            Behavior::Succeed { content, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(AiResponse {
                    content: content.clone(),
                    provider: self.display_name.clone(),
                    model: format!("{}-1", self.id),
                    tokens_used: Some(3),
                })
            }
            Behavior::Fail(message) => Err(ProviderError::Api {
                provider: self.display_name.clone(),
                status: 500,
                message: message.clone(),
            }),
            Behavior::Hang => std::future::pending().await,
        }
    }
}
