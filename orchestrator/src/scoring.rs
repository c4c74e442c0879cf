//! Confidence scoring.
//!
//! Every successful response gets a score in [0, 1]:
//!
//! ```text
//! score = w_i * intrinsic + w_r * reliability + w_c * capability_fit
//! ```
//!
//! with the weights normalized to sum to 1. Failed responses are never
//! scored: they carry score 0 and no factors.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::config::ScoringWeights;
use crate::memory::episode::clamp_unit;
use crate::memory::Episode;
use crate::types::{ProviderResponse, ScoreFactors, ScoredResponse};

/// Neutral value used for missing quality and cold-start reliability.
pub const NEUTRAL: f64 = 0.5;

/// Per-provider response success over recent candidate appearances.
///
/// Built once per call from a single store snapshot, so every response in
/// that call is scored against the same history.
#[derive(Debug, Clone, Default)]
pub struct ReliabilityIndex {
    // provider -> (successes, appearances)
    counts: HashMap<String, (usize, usize)>,
}

impl ReliabilityIndex {
    /// Count the last `window` appearances of each provider, newest first.
    pub fn from_episodes(episodes: &[Arc<Episode>], window: usize) -> Self {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for episode in episodes.iter().rev() {
            for candidate in episode.effective_candidates() {
                let entry = counts.entry(candidate.provider).or_insert((0, 0));
                if entry.1 >= window {
                    continue;
                }
                entry.1 += 1;
                if candidate.success {
                    entry.0 += 1;
                }
            }
        }
        Self { counts }
    }

    /// Success fraction for `provider`, or [`NEUTRAL`] without history.
    pub fn reliability(&self, provider: &str) -> f64 {
        match self.counts.get(provider) {
            Some(&(successes, appearances)) if appearances > 0 => {
                successes as f64 / appearances as f64
            }
            _ => NEUTRAL,
        }
    }

    /// Number of appearances the reliability figure is based on.
    pub fn samples(&self, provider: &str) -> usize {
        self.counts.get(provider).map_or(0, |&(_, n)| n)
    }
}

/// 1.0 when every required tag is declared, reduced by 1/n per missing tag.
pub fn capability_fit(declared: &[String], required: &BTreeSet<String>) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    let missing = required
        .iter()
        .filter(|tag| !declared.iter().any(|d| d == *tag))
        .count();
    1.0 - missing as f64 / required.len() as f64
}

/// Combines intrinsic quality, reliability and capability fit.
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    weights: [f64; 3],
}

impl ConfidenceScorer {
    pub fn new(weights: &ScoringWeights) -> Self {
        Self {
            weights: weights.normalized(),
        }
    }

    pub fn weights(&self) -> [f64; 3] {
        self.weights
    }

    pub fn score(
        &self,
        response: ProviderResponse,
        required: &BTreeSet<String>,
        reliability: &ReliabilityIndex,
    ) -> ScoredResponse {
        if !response.success {
            return ScoredResponse {
                response,
                score: 0.0,
                factors: None,
            };
        }

        let factors = ScoreFactors {
            intrinsic: response.quality.map_or(NEUTRAL, clamp_unit),
            reliability: reliability.reliability(&response.provider),
            capability_fit: capability_fit(&response.capabilities, required),
            weights: self.weights,
        };
        let score = clamp_unit(factors.contributions().iter().map(|(_, c)| c).sum());

        ScoredResponse {
            response,
            score,
            factors: Some(factors),
        }
    }

    /// Score every response, preserving input order.
    pub fn score_all(
        &self,
        responses: Vec<ProviderResponse>,
        required: &BTreeSet<String>,
        reliability: &ReliabilityIndex,
    ) -> Vec<ScoredResponse> {
        responses
            .into_iter()
            .map(|r| self.score(r, required, reliability))
            .collect()
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(&ScoringWeights::default())
    }
}
