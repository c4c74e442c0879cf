//! The orchestrator: one object owning the registry, the Context Store and
//! the per-call pipeline.
//!
//! ```text
//! run_parallel_comparison(request)
//!   Received → Dispatching   Dispatcher::launch      (NoEligibleProviders → Failed)
//!   Dispatching → Collecting InFlightDispatch::collect (AllProvidersFailed → Failed)
//!   Collecting → Scoring     ConfidenceScorer over one store snapshot
//!   Scoring → Selected       selection::select
//!   Selected → Recorded      ContextStore::append
//!   Recorded → Completed
//! ```
//!
//! The store is the only state shared between concurrent calls. Build one
//! orchestrator per process and share it behind an `Arc`.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::analytics::{self, MonitorHandle, PerformanceReport, ReflexiveAssessment, ReflexiveMonitor};
use crate::config::OrchestratorConfig;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::memory::{CandidateOutcome, ContextStore, Episode, SharedContextStore};
use crate::provider::ProviderRegistry;
use crate::scoring::{ConfidenceScorer, ReliabilityIndex};
use crate::selection;
use crate::state_machine::{CallState, CallStateMachine};
use crate::types::{ProviderResponse, ScoredResponse, SelectionResult, TaskRequest};

/// Shared handle for request handlers.
pub type SharedOrchestrator = Arc<Orchestrator>;

pub struct Orchestrator {
    config: OrchestratorConfig,
    dispatcher: Dispatcher,
    scorer: ConfidenceScorer,
    store: SharedContextStore,
}

impl Orchestrator {
    /// Validate `config` and build an orchestrator with a fresh store.
    pub fn new(config: OrchestratorConfig, registry: ProviderRegistry) -> OrchestrationResult<Self> {
        let store = Arc::new(ContextStore::new(config.store_capacity));
        Self::with_store(config, registry, store)
    }

    /// Like [`new`](Self::new) but records into an existing store.
    pub fn with_store(
        config: OrchestratorConfig,
        registry: ProviderRegistry,
        store: SharedContextStore,
    ) -> OrchestrationResult<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(Arc::new(registry), &config);
        let scorer = ConfidenceScorer::new(&config.weights);
        info!(
            providers = dispatcher.registry().len(),
            store_capacity = store.capacity(),
            "Orchestrator ready"
        );
        Ok(Self {
            config,
            dispatcher,
            scorer,
            store,
        })
    }

    /// Build HTTP providers for every endpoint in `config.providers`.
    pub fn from_config(config: OrchestratorConfig) -> OrchestrationResult<Self> {
        config.validate()?;
        let registry = ProviderRegistry::from_config(&config)?;
        Self::new(config, registry)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.dispatcher.registry()
    }

    pub fn store(&self) -> &SharedContextStore {
        &self.store
    }

    /// Dispatch `request` to every eligible provider concurrently, score the
    /// responses, pick a winner and record the episode.
    pub async fn run_parallel_comparison(
        &self,
        request: &TaskRequest,
    ) -> OrchestrationResult<SelectionResult> {
        let started = Instant::now();
        let mut machine = CallStateMachine::new(&request.id);

        machine.advance(CallState::Dispatching, None)?;
        let inflight = match self.dispatcher.launch(request) {
            Ok(inflight) => inflight,
            Err(e) => {
                warn!(task_id = %request.id, task = %request.task, error = %e, "Dispatch rejected");
                machine.fail(&e.to_string())?;
                return Err(OrchestrationError::from_dispatch(&request.task, e));
            }
        };

        let dispatched = format!("{} providers", inflight.provider_count());
        machine.advance(CallState::Collecting, Some(&dispatched))?;
        let responses = match inflight.collect().await {
            Ok(responses) => responses,
            Err(DispatchError::AllProvidersFailed { failures }) => {
                warn!(
                    task_id = %request.id,
                    task = %request.task,
                    attempted = failures.len(),
                    "All providers failed"
                );
                machine.fail("all providers failed")?;
                if self.config.record_failures {
                    self.record_failure(request, &failures, started);
                }
                return Err(OrchestrationError::AllProvidersFailed {
                    task: request.task.clone(),
                    failures,
                });
            }
            Err(e) => {
                machine.fail(&e.to_string())?;
                return Err(OrchestrationError::from_dispatch(&request.task, e));
            }
        };

        machine.advance(CallState::Scoring, None)?;
        let reliability =
            ReliabilityIndex::from_episodes(&self.store.snapshot(), self.config.reliability_window);
        let required: BTreeSet<String> = request.required_capabilities.clone().unwrap_or_default();
        let scored = self.scorer.score_all(responses, &required, &reliability);

        let selection = match selection::select(scored) {
            Ok(selection) => selection,
            Err(scored) => {
                // collect() only returns Ok with at least one success
                return Err(OrchestrationError::AllProvidersFailed {
                    task: request.task.clone(),
                    failures: scored.into_iter().map(|s| s.response).collect(),
                });
            }
        };
        machine.advance(CallState::Selected, Some(selection.selected.provider()))?;

        let all: Vec<&ScoredResponse> = std::iter::once(&selection.selected)
            .chain(selection.alternatives.iter())
            .collect();
        let total_cost: f64 = all.iter().map(|s| s.response.cost).sum();
        let total_tokens: u64 = all.iter().map(|s| u64::from(s.response.tokens_used)).sum();
        let total_latency_ms = started.elapsed().as_millis() as u64;

        let episode = Episode::new(
            request.task.clone(),
            request.context.clone(),
            selection.selected.response.payload.clone(),
            selection.selected.provider(),
            selection.selected.score,
        )
        .with_tags(episode_tags(request, Some(selection.selected.provider())))
        .with_execution_time(total_latency_ms)
        .with_cost(total_cost)
        .with_tokens(total_tokens)
        .with_candidates(all.iter().map(|s| candidate_outcome(s)).collect());
        let episode_id = episode.id.clone();
        let seq = self.store.append(episode);

        machine.advance(CallState::Recorded, Some(&format!("seq {}", seq)))?;
        machine.advance(CallState::Completed, None)?;

        info!(
            task_id = %request.id,
            task = %request.task,
            selected = %selection.selected.provider(),
            score = selection.selected.score,
            alternatives = selection.alternatives.len(),
            total_latency_ms,
            total_cost,
            seq,
            "Selection completed"
        );

        Ok(SelectionResult {
            task_id: request.id.clone(),
            selected: selection.selected,
            alternatives: selection.alternatives,
            rationale: selection.rationale,
            total_latency_ms,
            total_cost,
            episode_id,
            transitions: machine.into_transitions(),
        })
    }

    fn record_failure(&self, request: &TaskRequest, failures: &[ProviderResponse], started: Instant) {
        let candidates = failures
            .iter()
            .map(|r| CandidateOutcome {
                provider: r.provider.clone(),
                success: false,
                confidence: 0.0,
                latency_ms: r.latency_ms,
                cost: r.cost,
            })
            .collect();
        let episode = Episode::failure(request.task.clone(), request.context.clone())
            .with_tags(episode_tags(request, None))
            .with_execution_time(started.elapsed().as_millis() as u64)
            .with_cost(failures.iter().map(|r| r.cost).sum())
            .with_candidates(candidates);
        self.store.append(episode);
    }

    /// Record a caller-supplied episode.
    pub fn add_episode(&self, episode: Episode) -> u64 {
        self.store.append(episode)
    }

    /// Per-provider statistics, recomputed from the current store contents.
    pub fn performance_report(&self) -> PerformanceReport {
        PerformanceReport::from_episodes(&self.store.snapshot())
    }

    /// Reflexive assessment over the current store contents.
    pub fn reflexive_analysis(&self) -> ReflexiveAssessment {
        analytics::assess(&self.store.snapshot(), &self.config.reflexive)
    }

    pub fn recent_assessments(&self, limit: usize) -> Vec<Arc<Episode>> {
        self.store.recent_assessments(limit)
    }

    pub fn retrieve(&self, query: &str, limit: usize) -> Vec<Arc<Episode>> {
        self.store.retrieve(query, limit)
    }

    /// Clear the store.
    pub fn reset_memory(&self) {
        self.store.reset();
    }

    /// Start a background reflexive monitor over this orchestrator's store.
    pub fn spawn_reflexive_monitor(&self) -> MonitorHandle {
        ReflexiveMonitor::new(Arc::clone(&self.store), self.config.reflexive.clone()).spawn()
    }
}

fn episode_tags(request: &TaskRequest, selected: Option<&str>) -> Vec<String> {
    let last = selected.unwrap_or("failed").to_string();
    let mut seen = HashSet::new();
    std::iter::once(request.task.clone())
        .chain(request.required())
        .chain(std::iter::once(last))
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

fn candidate_outcome(scored: &ScoredResponse) -> CandidateOutcome {
    CandidateOutcome {
        provider: scored.provider().to_string(),
        success: scored.is_success(),
        confidence: scored.score,
        latency_ms: scored.response.latency_ms,
        cost: scored.response.cost,
    }
}
