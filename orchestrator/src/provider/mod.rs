//! Provider adapters — the uniform contract around each AI backend.
//!
//! Every backend implements [`ProviderAdapter`]. Adapters report faults as
//! [`ProviderError`]; [`invoke_with_timeout`] turns those (and timeouts) into
//! a failed [`ProviderResponse`] so a single flaky backend never aborts a
//! dispatch.
//!
//! # Modules
//!
//! - [`registry`]: ordered, capability-tagged set of adapters
//! - [`http`]: OpenAI-compatible chat-completions adapter
//! - [`mock`]: scripted adapter for tests and local development

pub mod http;
pub mod mock;
pub mod registry;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::types::{FailureReason, Priority, ProviderResponse, TaskRequest};

pub use http::OpenAiCompatibleProvider;
pub use mock::{ScriptedProvider, ScriptedReply};
pub use registry::{ProviderRegistry, RegisteredProvider, RegistryError, RegistryResult};

/// Errors reported by a provider adapter.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Rate limited: retry after {0:?}")]
    RateLimited(Duration),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Result type for provider adapter calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Everything a provider receives for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCall {
    pub task_id: String,
    pub task: String,
    pub context: serde_json::Value,
    pub task_priority: Priority,
    /// Capability tags the request asked for.
    pub capability_tags: Vec<String>,
    /// Individual timeout for this call.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl ProviderCall {
    pub fn from_request(request: &TaskRequest, timeout: Duration) -> Self {
        Self {
            task_id: request.id.clone(),
            task: request.task.clone(),
            context: request.context.clone(),
            task_priority: request.priority,
            capability_tags: request.required(),
            timeout,
        }
    }
}

/// A successful reply from a backend, before latency is attached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderReply {
    pub payload: serde_json::Value,
    /// Self-reported confidence or quality, any scale clamped to [0, 1] later.
    pub quality: Option<f64>,
    pub cost: f64,
    pub tokens_used: u32,
}

impl ProviderReply {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_tokens(mut self, tokens: u32) -> Self {
        self.tokens_used = tokens;
        self
    }
}

/// Trait for AI backends queried by the dispatcher.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique provider name.
    fn name(&self) -> &str;

    /// Capability tags this provider declares (e.g. `"recipe-analysis"`).
    fn capabilities(&self) -> &[String];

    /// Query the backend. Timeouts are enforced by the caller.
    async fn invoke(&self, call: &ProviderCall) -> ProviderResult<ProviderReply>;
}

/// Invoke `adapter` bounded by `call.timeout`, always yielding a response.
pub async fn invoke_with_timeout(
    adapter: &dyn ProviderAdapter,
    call: &ProviderCall,
    priority: usize,
) -> ProviderResponse {
    let start = Instant::now();
    let outcome = tokio::time::timeout(call.timeout, adapter.invoke(call)).await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let capabilities = adapter.capabilities().to_vec();

    match outcome {
        Ok(Ok(reply)) => ProviderResponse {
            provider: adapter.name().to_string(),
            priority,
            payload: reply.payload,
            quality: reply.quality,
            latency_ms,
            cost: reply.cost.max(0.0),
            tokens_used: reply.tokens_used,
            success: true,
            failure: None,
            capabilities,
        },
        Ok(Err(e)) => {
            tracing::warn!(provider = adapter.name(), error = %e, "Provider call failed");
            ProviderResponse::failed(
                adapter.name(),
                priority,
                capabilities,
                latency_ms,
                FailureReason::Provider {
                    message: e.to_string(),
                },
            )
        }
        Err(_) => {
            tracing::warn!(
                provider = adapter.name(),
                timeout_ms = call.timeout.as_millis() as u64,
                "Provider call timed out"
            );
            ProviderResponse::failed(
                adapter.name(),
                priority,
                capabilities,
                latency_ms,
                FailureReason::Timeout {
                    timeout_ms: call.timeout.as_millis() as u64,
                },
            )
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
