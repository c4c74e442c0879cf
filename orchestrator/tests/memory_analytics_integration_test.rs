//! Context Store, performance report and reflexive analysis through the
//! orchestrator's public surface.

use std::sync::Arc;

use orchestrator::{
    CandidateOutcome, Episode, Orchestrator, OrchestratorConfig, ProviderRegistry,
    ReflexiveConfig, ScriptedProvider, ScriptedReply, TaskRequest, Trend,
};
use serde_json::json;

fn orchestrator_with(config: OrchestratorConfig) -> Orchestrator {
    orchestrator::telemetry::init_tracing("orchestrator=debug");
    Orchestrator::new(config, ProviderRegistry::new()).unwrap()
}

fn candidate(provider: &str, success: bool, confidence: f64) -> CandidateOutcome {
    CandidateOutcome {
        provider: provider.to_string(),
        success,
        confidence,
        latency_ms: 100,
        cost: 0.001,
    }
}

#[test]
fn store_rotation_keeps_newest_hundred() {
    let orch = orchestrator_with(OrchestratorConfig {
        store_capacity: 100,
        ..Default::default()
    });

    let mut ids = Vec::new();
    for i in 1..=150 {
        let episode = Episode::new(
            "recipe-analysis",
            json!({"n": i}),
            json!(null),
            "p1",
            0.6,
        )
        .with_tags([format!("batch-{}", i)]);
        ids.push(episode.id.clone());
        orch.add_episode(episode);
    }

    assert_eq!(orch.store().len(), 100);
    let recent: Vec<u64> = orch.recent_assessments(5).iter().map(|e| e.seq).collect();
    assert_eq!(recent, vec![150, 149, 148, 147, 146]);

    assert!(orch.store().get(&ids[0]).is_none());
    assert!(orch.retrieve("batch-1", 10).iter().all(|e| e.id != ids[0]));
    assert!(orch.store().get(&ids[149]).is_some());
}

#[test]
fn retrieve_ranks_by_tags_then_recency() {
    let orch = orchestrator_with(OrchestratorConfig::default());

    orch.add_episode(
        Episode::new("recipe-analysis", json!({"dish": "vegan curry"}), json!(null), "p1", 0.7)
            .with_tags(["vegan"]),
    );
    orch.add_episode(Episode::new(
        "menu-planning",
        json!({"notes": "one vegan option"}),
        json!(null),
        "p2",
        0.7,
    ));
    orch.add_episode(
        Episode::new("recipe-analysis", json!({"dish": "lamb"}), json!(null), "p1", 0.7)
            .with_tags(["vegan"]),
    );
    orch.add_episode(Episode::new("proposal-text", json!({"client": "acme"}), json!(null), "p3", 0.7));

    let hits = orch.retrieve("vegan", 10);
    let seqs: Vec<u64> = hits.iter().map(|e| e.seq).collect();
    // tagged episodes first (newest first), then text-only match
    assert_eq!(seqs, vec![3, 1, 2]);

    let again: Vec<u64> = orch.retrieve("vegan", 10).iter().map(|e| e.seq).collect();
    assert_eq!(seqs, again);
    assert_eq!(orch.retrieve("vegan", 2).len(), 2);
}

#[test]
fn performance_success_rate_matches_candidate_formula() {
    let orch = orchestrator_with(OrchestratorConfig::default());

    // alpha: candidate 4 times, selected+success twice
    orch.add_episode(
        Episode::new("t", json!({}), json!({}), "alpha", 0.9)
            .with_candidates(vec![candidate("alpha", true, 0.9), candidate("beta", true, 0.5)]),
    );
    orch.add_episode(
        Episode::new("t", json!({}), json!({}), "beta", 0.8)
            .with_candidates(vec![candidate("alpha", true, 0.6), candidate("beta", true, 0.8)]),
    );
    orch.add_episode(
        Episode::new("t", json!({}), json!({}), "alpha", 0.7)
            .with_candidates(vec![candidate("alpha", true, 0.7)]),
    );
    orch.add_episode(
        Episode::new("t", json!({}), json!({}), "alpha", 0.6)
            .with_candidates(vec![candidate("alpha", true, 0.6), candidate("beta", false, 0.0)])
            .marked_unsuccessful(),
    );

    let report = orch.performance_report();
    assert_eq!(report.total_episodes, 4);
    assert_eq!(report.failed_episodes, 1);

    let alpha = report.provider("alpha").unwrap();
    assert_eq!(alpha.candidate_count, 4);
    assert_eq!(alpha.selected_count, 3);
    assert_eq!(alpha.success_count, 2);
    assert!((alpha.success_rate - 0.5).abs() < 1e-12);

    let beta = report.provider("beta").unwrap();
    assert_eq!(beta.candidate_count, 3);
    assert!((beta.success_rate - 1.0 / 3.0).abs() < 1e-12);
    assert!((beta.response_rate - 2.0 / 3.0).abs() < 1e-12);

    // recomputed, never cached
    orch.reset_memory();
    assert_eq!(orch.performance_report().total_episodes, 0);
}

#[test]
fn reflexive_analysis_flags_degrading_provider() {
    let orch = orchestrator_with(OrchestratorConfig {
        reflexive: ReflexiveConfig {
            window: 8,
            min_samples: 4,
            trend_tolerance: 0.05,
            degradation_threshold: 0.3,
            interval_secs: 60,
        },
        ..Default::default()
    });

    for _ in 0..8 {
        orch.add_episode(
            Episode::new("t", json!({}), json!({}), "lead", 0.85)
                .with_candidates(vec![candidate("lead", true, 0.85), candidate("backup", true, 0.6)]),
        );
    }
    for _ in 0..4 {
        orch.add_episode(
            Episode::new("t", json!({}), json!({}), "lead", 0.85)
                .with_candidates(vec![candidate("lead", true, 0.85), candidate("backup", true, 0.6)]),
        );
    }
    for _ in 0..4 {
        orch.add_episode(
            Episode::new("t", json!({}), json!({}), "backup", 0.55)
                .with_candidates(vec![candidate("lead", false, 0.0), candidate("backup", true, 0.55)]),
        );
    }

    let assessment = orch.reflexive_analysis();
    assert_eq!(assessment.window_size, 8);
    assert_eq!(assessment.trend, Trend::Degrading);
    assert!(assessment.needs_attention);
    let flagged: Vec<_> = assessment
        .flagged_providers
        .iter()
        .map(|f| f.provider.as_str())
        .collect();
    assert_eq!(flagged, vec!["lead"]);
}

#[tokio::test(start_paused = true)]
async fn orchestrated_episodes_feed_analytics() {
    orchestrator::telemetry::init_tracing("orchestrator=debug");
    let registry = ProviderRegistry::new()
        .with(Arc::new(
            ScriptedProvider::new("chef", ["recipe-analysis"])
                .with_reply(ScriptedReply::ok(json!("ok"), 0.9).after_ms(10)),
        ))
        .unwrap()
        .with(Arc::new(
            ScriptedProvider::new("sous", ["recipe-analysis"])
                .with_reply(ScriptedReply::error("overloaded")),
        ))
        .unwrap();
    let orch = Orchestrator::new(OrchestratorConfig::default(), registry).unwrap();

    for dish in ["paella", "risotto", "ramen", "tagine"] {
        orch.run_parallel_comparison(&TaskRequest::new("recipe-analysis", json!({ "dish": dish })))
            .await
            .unwrap();
    }

    let report = orch.performance_report();
    let chef = report.provider("chef").unwrap();
    let sous = report.provider("sous").unwrap();
    assert_eq!(chef.success_rate, 1.0);
    assert_eq!(sous.success_rate, 0.0);
    assert_eq!(sous.response_rate, 0.0);

    let hits = orch.retrieve("risotto", 5);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].input["dish"], "risotto");

    let assessment = orch.reflexive_analysis();
    assert_eq!(assessment.selection_success_rate, 1.0);
}
