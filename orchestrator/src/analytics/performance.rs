//! Per-provider performance aggregated from the Context Store.
//!
//! Always recomputed from a snapshot; nothing here is cached.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::memory::Episode;

/// Aggregate figures for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPerformance {
    pub provider: String,
    /// Episodes in which the provider was a candidate.
    pub candidate_count: usize,
    /// Episodes in which it was selected.
    pub selected_count: usize,
    /// Episodes in which it was selected and the episode is marked success.
    pub success_count: usize,
    /// `success_count / candidate_count`.
    pub success_rate: f64,
    /// Fraction of candidacies with a successful response.
    pub response_rate: f64,
    /// Mean confidence over successful responses.
    pub mean_confidence: f64,
    pub mean_latency_ms: f64,
    pub mean_cost: f64,
}

/// Store-wide performance summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_episodes: usize,
    pub failed_episodes: usize,
    /// Sorted by provider name.
    pub providers: Vec<ProviderPerformance>,
}

#[derive(Default)]
struct Accumulator {
    candidates: usize,
    selected: usize,
    successes: usize,
    responded: usize,
    confidence_sum: f64,
    latency_sum: f64,
    cost_sum: f64,
}

impl PerformanceReport {
    pub fn from_episodes(episodes: &[Arc<Episode>]) -> Self {
        let mut by_provider: BTreeMap<String, Accumulator> = BTreeMap::new();
        let mut failed_episodes = 0;

        for episode in episodes {
            if !episode.success {
                failed_episodes += 1;
            }
            for candidate in episode.effective_candidates() {
                let won = episode.selected_provider.as_deref() == Some(candidate.provider.as_str());
                let acc = by_provider.entry(candidate.provider).or_default();
                acc.candidates += 1;
                acc.latency_sum += candidate.latency_ms as f64;
                acc.cost_sum += candidate.cost;
                if candidate.success {
                    acc.responded += 1;
                    acc.confidence_sum += candidate.confidence;
                }
                if won {
                    acc.selected += 1;
                    if episode.success {
                        acc.successes += 1;
                    }
                }
            }
        }

        let providers = by_provider
            .into_iter()
            .map(|(provider, acc)| {
                let n = acc.candidates as f64;
                ProviderPerformance {
                    provider,
                    candidate_count: acc.candidates,
                    selected_count: acc.selected,
                    success_count: acc.successes,
                    success_rate: acc.successes as f64 / n,
                    response_rate: acc.responded as f64 / n,
                    mean_confidence: if acc.responded > 0 {
                        acc.confidence_sum / acc.responded as f64
                    } else {
                        0.0
                    },
                    mean_latency_ms: acc.latency_sum / n,
                    mean_cost: acc.cost_sum / n,
                }
            })
            .collect();

        Self {
            total_episodes: episodes.len(),
            failed_episodes,
            providers,
        }
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderPerformance> {
        self.providers.iter().find(|p| p.provider == name)
    }
}
