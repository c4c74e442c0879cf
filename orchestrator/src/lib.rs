//! Multi-Provider AI Orchestration
//!
//! This library dispatches one logical task to several AI backends at once,
//! scores their answers under a single confidence metric, keeps a bounded
//! memory of past episodes, and evaluates its own selection record.
//!
//! # Components
//!
//! - `provider`: the `ProviderAdapter` contract, registry, HTTP and scripted adapters
//! - `dispatch`: concurrent fan-out under per-call and per-request timeouts
//! - `scoring` / `selection`: confidence scores, winner, alternatives, rationale
//! - `memory`: episodes, the bounded Context Store, relevance retrieval
//! - `analytics`: performance report, reflexive assessment, background monitor
//! - `orchestrator`: the call pipeline tying the above together
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use orchestrator::{Orchestrator, OrchestratorConfig, ProviderRegistry, ScriptedProvider, ScriptedReply, TaskRequest};
//!
//! # async fn run() -> orchestrator::OrchestrationResult<()> {
//! let registry = ProviderRegistry::new()
//!     .with(Arc::new(
//!         ScriptedProvider::new("local", ["recipe-analysis"])
//!             .with_reply(ScriptedReply::ok(serde_json::json!({"allergens": []}), 0.8)),
//!     ))?;
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default(), registry)?;
//!
//! let request = TaskRequest::new("recipe-analysis", serde_json::json!({"dish": "paella"}));
//! let result = orchestrator.run_parallel_comparison(&request).await?;
//! println!("{}", result.rationale);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod analytics;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod provider;
pub mod scoring;
pub mod selection;
pub mod state_machine;
pub mod telemetry;
pub mod types;

pub use analytics::{
    assess, MonitorHandle, PerformanceReport, ProviderFlag, ProviderPerformance,
    ReflexiveAssessment, ReflexiveMonitor, Trend,
};
pub use config::{
    CapabilityMatch, ConfigError, ConfigResult, OrchestratorConfig, ProviderEndpoint,
    ReflexiveConfig, ScoringWeights,
};
pub use dispatch::{DispatchError, DispatchResult, Dispatcher, InFlightDispatch};
pub use error::{ErrorReport, OrchestrationError, OrchestrationResult};
pub use memory::{CandidateOutcome, ContextStore, Episode, SharedContextStore};
pub use orchestrator::{Orchestrator, SharedOrchestrator};
pub use provider::{
    invoke_with_timeout, OpenAiCompatibleProvider, ProviderAdapter, ProviderCall, ProviderError,
    ProviderRegistry, ProviderReply, ProviderResult, RegisteredProvider, RegistryError,
    RegistryResult, ScriptedProvider, ScriptedReply,
};
pub use scoring::{ConfidenceScorer, ReliabilityIndex};
pub use selection::Selection;
pub use state_machine::{CallState, CallStateMachine, IllegalTransition, TransitionRecord};
pub use types::{
    FailureReason, Priority, ProviderResponse, ScoreFactors, ScoredResponse, SelectionResult,
    Signal, TaskRequest,
};
