//! A single recorded orchestration outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How one provider fared as a candidate in an episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub provider: String,
    /// Whether the provider returned a usable response.
    pub success: bool,
    /// Confidence score it was given (0 for failures).
    pub confidence: f64,
    pub latency_ms: u64,
    pub cost: f64,
}

/// A single entry in the context store.
///
/// Never mutated once appended; the store hands out `Arc<Episode>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    /// Monotonic sequence number, assigned by the store.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub task_type: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    /// `None` only for failure episodes.
    pub selected_provider: Option<String>,
    /// Winning confidence score in [0, 1].
    pub confidence: f64,
    pub success: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub execution_time_ms: u64,
    pub cost: f64,
    pub tokens_used: u64,
    /// Every provider that took part, when known.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateOutcome>,
}

impl Episode {
    /// A successful episode won by `selected_provider`.
    pub fn new(
        task_type: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
        selected_provider: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            seq: 0, // assigned by store
            timestamp: Utc::now(),
            task_type: task_type.into(),
            input,
            output,
            selected_provider: Some(selected_provider.into()),
            confidence: clamp_unit(confidence),
            success: true,
            tags: Vec::new(),
            execution_time_ms: 0,
            cost: 0.0,
            tokens_used: 0,
            candidates: Vec::new(),
        }
    }

    /// A failure episode: no provider was selected.
    pub fn failure(task_type: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            seq: 0,
            timestamp: Utc::now(),
            task_type: task_type.into(),
            input,
            output: serde_json::Value::Null,
            selected_provider: None,
            confidence: 0.0,
            success: false,
            tags: Vec::new(),
            execution_time_ms: 0,
            cost: 0.0,
            tokens_used: 0,
            candidates: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = tokens;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<CandidateOutcome>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Mark a successful episode as failed after the fact (caller-side
    /// validation rejected the output). Keeps the selected provider.
    pub fn marked_unsuccessful(mut self) -> Self {
        self.success = false;
        self
    }

    /// Candidates, falling back to the selected provider alone when the
    /// episode was recorded without candidate detail.
    pub fn effective_candidates(&self) -> Vec<CandidateOutcome> {
        if !self.candidates.is_empty() {
            return self.candidates.clone();
        }
        match &self.selected_provider {
            Some(provider) => vec![CandidateOutcome {
                provider: provider.clone(),
                success: self.success,
                confidence: self.confidence,
                latency_ms: self.execution_time_ms,
                cost: self.cost,
            }],
            None => Vec::new(),
        }
    }

    /// Whether `provider` won this episode and it was marked successful.
    pub fn won_by(&self, provider: &str) -> bool {
        self.success && self.selected_provider.as_deref() == Some(provider)
    }

    /// Enforce the stored-episode invariants.
    pub(crate) fn normalize(&mut self) {
        self.confidence = clamp_unit(self.confidence);
        if self.selected_provider.is_none() {
            self.success = false;
        }
        for candidate in &mut self.candidates {
            candidate.confidence = clamp_unit(candidate.confidence);
        }
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
