//! Winner selection and rationale.
//!
//! Scores are compared on a 1e-9 grid so that floating-point noise never
//! decides a winner; anything closer than that is a tie.

use std::cmp::Reverse;

use crate::types::ScoredResponse;

/// Score resolution below which two scores are considered equal.
pub const SCORE_EPSILON: f64 = 1e-9;

fn score_key(score: f64) -> i64 {
    (score / SCORE_EPSILON).round() as i64
}

/// Winner, ordered alternatives and rationale for one call.
#[derive(Debug, Clone)]
pub struct Selection {
    pub selected: ScoredResponse,
    pub alternatives: Vec<ScoredResponse>,
    pub rationale: String,
}

/// Pick the winner among successful responses.
///
/// Winner: highest score, then lower latency, then provider priority.
/// Alternatives: successful before failed, then score descending, then
/// provider priority, then lower latency. Hands the input back when nothing
/// succeeded.
pub fn select(scored: Vec<ScoredResponse>) -> Result<Selection, Vec<ScoredResponse>> {
    let winner = scored
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_success())
        .min_by_key(|(_, s)| {
            (
                Reverse(score_key(s.score)),
                s.response.latency_ms,
                s.response.priority,
            )
        })
        .map(|(i, _)| i);
    let Some(winner_idx) = winner else {
        return Err(scored);
    };

    let mut alternatives = scored;
    let selected = alternatives.remove(winner_idx);
    alternatives.sort_by_key(|s| {
        (
            !s.is_success(),
            Reverse(score_key(s.score)),
            s.response.priority,
            s.response.latency_ms,
        )
    });

    let rationale = build_rationale(&selected, &alternatives);
    Ok(Selection {
        selected,
        alternatives,
        rationale,
    })
}

/// Human-readable explanation naming the winner and its dominant signal.
pub fn build_rationale(selected: &ScoredResponse, alternatives: &[ScoredResponse]) -> String {
    let mut rationale = format!(
        "Selected {} with confidence {:.3}",
        selected.provider(),
        selected.score
    );

    if let Some(factors) = &selected.factors {
        let (signal, value) = factors.dominant();
        rationale.push_str(&format!("; dominant signal: {} ({:.2})", signal, value));
    }

    let outscored: Vec<&ScoredResponse> = alternatives.iter().filter(|a| a.is_success()).collect();
    let failed: Vec<&ScoredResponse> = alternatives.iter().filter(|a| !a.is_success()).collect();

    if let Some(runner_up) = outscored.first() {
        if score_key(runner_up.score) == score_key(selected.score) {
            let by = if selected.response.latency_ms < runner_up.response.latency_ms {
                "lower latency"
            } else {
                "provider priority"
            };
            rationale.push_str(&format!("; tie with {} broken by {}", runner_up.provider(), by));
        }
        rationale.push_str(&format!(
            "; outscored {} alternative(s), runner-up {} ({:.3})",
            outscored.len(),
            runner_up.provider(),
            runner_up.score
        ));
    }

    if !failed.is_empty() {
        let details: Vec<String> = failed
            .iter()
            .map(|f| match &f.response.failure {
                Some(reason) => format!("{}: {}", f.provider(), reason),
                None => f.provider().to_string(),
            })
            .collect();
        rationale.push_str(&format!(
            "; {} provider(s) failed ({})",
            failed.len(),
            details.join(", ")
        ));
    }

    rationale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureReason, ProviderResponse, ScoreFactors};
    use serde_json::json;

    fn scored(provider: &str, priority: usize, score: f64, latency_ms: u64) -> ScoredResponse {
        ScoredResponse {
            response: ProviderResponse {
                provider: provider.to_string(),
                priority,
                payload: json!(provider),
                quality: Some(score),
                latency_ms,
                cost: 0.0,
                tokens_used: 0,
                success: true,
                failure: None,
                capabilities: Vec::new(),
            },
            score,
            factors: Some(ScoreFactors {
                intrinsic: score,
                reliability: 0.5,
                capability_fit: 1.0,
                weights: [1.0 / 3.0; 3],
            }),
        }
    }

    fn failed(provider: &str, priority: usize) -> ScoredResponse {
        ScoredResponse {
            response: ProviderResponse::failed(
                provider,
                priority,
                Vec::new(),
                200,
                FailureReason::Timeout { timeout_ms: 200 },
            ),
            score: 0.0,
            factors: None,
        }
    }

    fn names(selection: &Selection) -> Vec<&str> {
        selection.alternatives.iter().map(|s| s.provider()).collect()
    }

    #[test]
    fn test_highest_score_wins() {
        let selection = select(vec![
            scored("p1", 0, 0.6, 50),
            scored("p2", 1, 0.8, 90),
            failed("p3", 2),
        ])
        .unwrap();
        assert_eq!(selection.selected.provider(), "p2");
        assert_eq!(names(&selection), vec!["p1", "p3"]);
    }

    #[test]
    fn test_tie_broken_by_latency_then_priority() {
        let selection = select(vec![scored("p1", 0, 0.7, 80), scored("p2", 1, 0.7, 40)]).unwrap();
        assert_eq!(selection.selected.provider(), "p2");
        assert!(selection.rationale.contains("lower latency"));

        let selection = select(vec![scored("p2", 1, 0.7, 40), scored("p1", 0, 0.7, 40)]).unwrap();
        assert_eq!(selection.selected.provider(), "p1");
        assert!(selection.rationale.contains("provider priority"));
    }

    #[test]
    fn test_sub_epsilon_difference_is_a_tie() {
        let selection = select(vec![
            scored("p1", 0, 0.7 + 1e-12, 80),
            scored("p2", 1, 0.7, 40),
        ])
        .unwrap();
        assert_eq!(selection.selected.provider(), "p2");
    }

    #[test]
    fn test_alternatives_ties_by_priority_then_latency() {
        let selection = select(vec![
            scored("winner", 3, 0.9, 10),
            scored("c", 2, 0.5, 10),
            scored("a", 0, 0.5, 90),
            scored("b", 1, 0.5, 20),
        ])
        .unwrap();
        assert_eq!(names(&selection), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_nothing_successful_selects_nothing() {
        let returned = select(vec![failed("p1", 0), failed("p2", 1)]).unwrap_err();
        assert_eq!(returned.len(), 2);
        assert!(select(Vec::new()).is_err());
    }

    #[test]
    fn test_rationale_names_winner_signal_and_failures() {
        let selection = select(vec![
            scored("p1", 0, 0.9, 10),
            scored("p2", 1, 0.4, 10),
            failed("p3", 2),
        ])
        .unwrap();
        let rationale = &selection.rationale;
        assert!(rationale.starts_with("Selected p1"));
        assert!(rationale.contains("dominant signal: capability fit"));
        assert!(rationale.contains("outscored 1 alternative(s)"));
        assert!(rationale.contains("p3: timed out after 200ms"));
    }
}
