//! Core data model for orchestration calls.
//!
//! A [`TaskRequest`] goes in, each provider produces a [`ProviderResponse`],
//! the scorer wraps those into [`ScoredResponse`]s and the selector returns a
//! [`SelectionResult`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state_machine::TransitionRecord;

/// Caller-assigned urgency of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A single logical task submitted to the orchestrator.
///
/// Immutable once submitted: the orchestrator only ever borrows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Unique id for this submission.
    pub id: String,
    /// Task type, e.g. `"recipe-analysis"`.
    pub task: String,
    /// Opaque payload forwarded to every provider.
    pub context: serde_json::Value,
    pub priority: Priority,
    /// Capability tags a provider must declare to be eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_capabilities: Option<BTreeSet<String>>,
}

impl TaskRequest {
    /// Create a medium-priority request with no capability requirements.
    pub fn new(task: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            context,
            priority: Priority::Medium,
            required_capabilities: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Require the given capability tags.
    pub fn with_required_capabilities<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Required tags, empty when the request has none.
    pub fn required(&self) -> Vec<String> {
        self.required_capabilities
            .as_ref()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Why a provider did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Exceeded its individual timeout.
    Timeout { timeout_ms: u64 },
    /// Transport, HTTP, or parse failure reported by the adapter.
    Provider { message: String },
    /// Still pending when the request-level deadline expired.
    Cancelled { deadline_ms: u64 },
    /// The provider task panicked.
    Panicked { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { timeout_ms } => write!(f, "timed out after {}ms", timeout_ms),
            Self::Provider { message } => write!(f, "provider error: {}", message),
            Self::Cancelled { deadline_ms } => {
                write!(f, "cancelled at request deadline ({}ms)", deadline_ms)
            }
            Self::Panicked { message } => write!(f, "provider task panicked: {}", message),
        }
    }
}

/// Outcome of one provider invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub provider: String,
    /// Position in the registry (0 = highest priority).
    pub priority: usize,
    pub payload: serde_json::Value,
    /// Self-reported quality signal, if the provider supplied one.
    pub quality: Option<f64>,
    pub latency_ms: u64,
    pub cost: f64,
    pub tokens_used: u32,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    /// Capability tags the provider declares.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl ProviderResponse {
    /// Build a failed response with an empty payload.
    pub fn failed(
        provider: impl Into<String>,
        priority: usize,
        capabilities: Vec<String>,
        latency_ms: u64,
        reason: FailureReason,
    ) -> Self {
        Self {
            provider: provider.into(),
            priority,
            payload: serde_json::Value::Null,
            quality: None,
            latency_ms,
            cost: 0.0,
            tokens_used: 0,
            success: false,
            failure: Some(reason),
            capabilities,
        }
    }
}

/// The scoring signals that fed into a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    IntrinsicQuality,
    HistoricalReliability,
    CapabilityFit,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntrinsicQuality => write!(f, "intrinsic quality"),
            Self::HistoricalReliability => write!(f, "historical reliability"),
            Self::CapabilityFit => write!(f, "capability fit"),
        }
    }
}

/// Per-signal breakdown of a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactors {
    pub intrinsic: f64,
    pub reliability: f64,
    pub capability_fit: f64,
    /// Normalized weights (sum to 1.0) in signal order.
    pub weights: [f64; 3],
}

impl ScoreFactors {
    /// Weighted contribution of each signal, in declaration order.
    pub fn contributions(&self) -> [(Signal, f64); 3] {
        [
            (Signal::IntrinsicQuality, self.intrinsic * self.weights[0]),
            (Signal::HistoricalReliability, self.reliability * self.weights[1]),
            (Signal::CapabilityFit, self.capability_fit * self.weights[2]),
        ]
    }

    /// The signal with the largest weighted contribution.
    ///
    /// Earlier signals win exact ties.
    pub fn dominant(&self) -> (Signal, f64) {
        let contributions = self.contributions();
        let mut best = contributions[0];
        for candidate in &contributions[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }
        (best.0, self.value_of(best.0))
    }

    /// Raw (unweighted) value of a signal.
    pub fn value_of(&self, signal: Signal) -> f64 {
        match signal {
            Signal::IntrinsicQuality => self.intrinsic,
            Signal::HistoricalReliability => self.reliability,
            Signal::CapabilityFit => self.capability_fit,
        }
    }
}

/// A provider response with its computed confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResponse {
    pub response: ProviderResponse,
    /// Confidence in [0, 1]; always 0 for failed responses.
    pub score: f64,
    /// `None` for failed responses, which are never scored.
    pub factors: Option<ScoreFactors>,
}

impl ScoredResponse {
    pub fn provider(&self) -> &str {
        &self.response.provider
    }

    pub fn is_success(&self) -> bool {
        self.response.success
    }
}

/// What the caller receives from a successful orchestration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub task_id: String,
    pub selected: ScoredResponse,
    /// Every other response, failures included (score 0).
    pub alternatives: Vec<ScoredResponse>,
    pub rationale: String,
    /// Wall-clock time for the whole call.
    pub total_latency_ms: u64,
    /// Sum of cost estimates across all responses.
    pub total_cost: f64,
    /// Id of the episode recorded for this call.
    pub episode_id: String,
    pub transitions: Vec<TransitionRecord>,
}
