//! Reflexive assessment: how well has the selector been doing lately?
//!
//! A pure function over an episode snapshot. The window is the most recent
//! `window` episodes:
//!
//! ```text
//!   ... baseline (everything earlier) ... | older half | newer half |
//!                                          \_______ window _______/
//! ```
//!
//! The confidence trend compares the older and newer halves. Provider flags
//! compare each provider's response rate inside the window with its rate
//! over the baseline.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ReflexiveConfig;
use crate::memory::Episode;

/// Direction of the selector's mean confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
    InsufficientData,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Stable => write!(f, "stable"),
            Self::Degrading => write!(f, "degrading"),
            Self::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

/// A provider whose recent response rate fell below its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFlag {
    pub provider: String,
    pub baseline_rate: f64,
    pub recent_rate: f64,
    pub baseline_samples: usize,
    pub recent_samples: usize,
}

impl ProviderFlag {
    pub fn rate_drop(&self) -> f64 {
        self.baseline_rate - self.recent_rate
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflexiveAssessment {
    /// Episodes inside the window.
    pub window_size: usize,
    pub trend: Trend,
    /// Mean confidence of successful episodes in the older half.
    pub earlier_mean_confidence: Option<f64>,
    /// Mean confidence of successful episodes in the newer half.
    pub recent_mean_confidence: Option<f64>,
    /// Successful episodes in the window divided by window size.
    pub selection_success_rate: f64,
    pub flagged_providers: Vec<ProviderFlag>,
    pub needs_attention: bool,
    pub summary: String,
}

fn mean_success_confidence(episodes: &[Arc<Episode>]) -> (Option<f64>, usize) {
    let confidences: Vec<f64> = episodes
        .iter()
        .filter(|e| e.success)
        .map(|e| e.confidence)
        .collect();
    if confidences.is_empty() {
        return (None, 0);
    }
    let n = confidences.len();
    (Some(confidences.iter().sum::<f64>() / n as f64), n)
}

// provider -> (successful responses, appearances)
fn response_counts(episodes: &[Arc<Episode>]) -> BTreeMap<String, (usize, usize)> {
    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for episode in episodes {
        for candidate in episode.effective_candidates() {
            let entry = counts.entry(candidate.provider).or_insert((0, 0));
            entry.1 += 1;
            if candidate.success {
                entry.0 += 1;
            }
        }
    }
    counts
}

fn classify_trend(
    earlier: Option<f64>,
    recent: Option<f64>,
    successful: usize,
    config: &ReflexiveConfig,
) -> Trend {
    let (Some(earlier), Some(recent)) = (earlier, recent) else {
        return Trend::InsufficientData;
    };
    if successful < config.min_samples {
        return Trend::InsufficientData;
    }
    let delta = recent - earlier;
    if delta > config.trend_tolerance {
        Trend::Improving
    } else if delta < -config.trend_tolerance {
        Trend::Degrading
    } else {
        Trend::Stable
    }
}

/// Assess `episodes` (oldest first).
pub fn assess(episodes: &[Arc<Episode>], config: &ReflexiveConfig) -> ReflexiveAssessment {
    let split = episodes.len().saturating_sub(config.window);
    let (baseline, window) = episodes.split_at(split);
    let (older, newer) = window.split_at(window.len() / 2);

    let (earlier_mean, older_n) = mean_success_confidence(older);
    let (recent_mean, newer_n) = mean_success_confidence(newer);
    let trend = classify_trend(earlier_mean, recent_mean, older_n + newer_n, config);

    let selection_success_rate = if window.is_empty() {
        0.0
    } else {
        (older_n + newer_n) as f64 / window.len() as f64
    };

    let baseline_counts = response_counts(baseline);
    let recent_counts = response_counts(window);
    let flagged_providers: Vec<ProviderFlag> = recent_counts
        .iter()
        .filter_map(|(provider, &(recent_ok, recent_n))| {
            let &(base_ok, base_n) = baseline_counts.get(provider)?;
            if recent_n < config.min_samples || base_n < config.min_samples {
                return None;
            }
            let flag = ProviderFlag {
                provider: provider.clone(),
                baseline_rate: base_ok as f64 / base_n as f64,
                recent_rate: recent_ok as f64 / recent_n as f64,
                baseline_samples: base_n,
                recent_samples: recent_n,
            };
            (flag.rate_drop() >= config.degradation_threshold).then_some(flag)
        })
        .collect();

    let needs_attention = trend == Trend::Degrading || !flagged_providers.is_empty();
    let summary = summarize(window.len(), trend, selection_success_rate, &flagged_providers);

    ReflexiveAssessment {
        window_size: window.len(),
        trend,
        earlier_mean_confidence: earlier_mean,
        recent_mean_confidence: recent_mean,
        selection_success_rate,
        flagged_providers,
        needs_attention,
        summary,
    }
}

fn summarize(window: usize, trend: Trend, success_rate: f64, flags: &[ProviderFlag]) -> String {
    let mut summary = format!(
        "Last {} episodes: confidence trend {}, selection success {:.0}%",
        window,
        trend,
        success_rate * 100.0
    );
    if flags.is_empty() {
        summary.push_str(", no provider degradation");
    } else {
        let names: Vec<String> = flags
            .iter()
            .map(|f| {
                format!(
                    "{} ({:.0}% -> {:.0}%)",
                    f.provider,
                    f.baseline_rate * 100.0,
                    f.recent_rate * 100.0
                )
            })
            .collect();
        summary.push_str(&format!(", degraded: {}", names.join(", ")));
    }
    summary
}
