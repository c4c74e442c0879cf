//! Relevance ranking for context retrieval.
//!
//! Scoring is deterministic and order-independent:
//!
//! ```text
//! score = tag_hits + overlap_ratio
//!   tag_hits      = distinct query tokens equal to one of the episode's tags
//!   overlap_ratio = |query ∩ episode tokens| / |query|
//! ```
//!
//! Episode tokens come from the task type, every key and scalar inside the
//! input payload, and the tags. Zero-score episodes are dropped; ties go to
//! the more recent episode (higher `seq`).

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use super::episode::Episode;

/// Lowercased tokens, split on anything that is not alphanumeric, `-` or `_`.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(str::to_lowercase)
        .collect()
}

fn collect_value_tokens(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            out.insert(b.to_string());
        }
        Value::Number(n) => {
            out.insert(n.to_string());
        }
        Value::String(s) => out.extend(tokenize(s)),
        Value::Array(items) => {
            for item in items {
                collect_value_tokens(item, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                out.extend(tokenize(key));
                collect_value_tokens(item, out);
            }
        }
    }
}

/// All searchable tokens of an episode.
pub fn episode_tokens(episode: &Episode) -> BTreeSet<String> {
    let mut tokens = tokenize(&episode.task_type);
    collect_value_tokens(&episode.input, &mut tokens);
    for tag in &episode.tags {
        tokens.extend(tokenize(tag));
    }
    tokens
}

/// Relevance of `episode` to an already tokenized query.
pub fn relevance(query: &BTreeSet<String>, episode: &Episode) -> f64 {
    if query.is_empty() {
        return 0.0;
    }

    let tags: BTreeSet<String> = episode.tags.iter().map(|t| t.trim().to_lowercase()).collect();
    let tag_hits = query.iter().filter(|t| tags.contains(*t)).count();

    let tokens = episode_tokens(episode);
    let overlap = query.intersection(&tokens).count();

    tag_hits as f64 + overlap as f64 / query.len() as f64
}

/// Rank `episodes` against `query`, returning at most `limit`.
///
/// A query without tokens returns the most recent episodes.
pub fn rank(episodes: &[Arc<Episode>], query: &str, limit: usize) -> Vec<Arc<Episode>> {
    let query = tokenize(query);
    if query.is_empty() {
        return episodes.iter().rev().take(limit).cloned().collect();
    }

    let mut scored: Vec<(f64, &Arc<Episode>)> = episodes
        .iter()
        .map(|ep| (relevance(&query, ep), ep))
        .filter(|(score, _)| *score > 0.0)
        .collect();

    scored.sort_by(|a, b| match b.0.total_cmp(&a.0) {
        Ordering::Equal => b.1.seq.cmp(&a.1.seq),
        other => other,
    });

    scored
        .into_iter()
        .take(limit)
        .map(|(_, ep)| Arc::clone(ep))
        .collect()
}
