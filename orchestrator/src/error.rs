//! Call-level error taxonomy surfaced to callers of the orchestrator.
//!
//! Provider timeouts and provider errors never appear here: they are turned
//! into failed [`ProviderResponse`]s during dispatch.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::provider::RegistryError;
use crate::state_machine::IllegalTransition;
use crate::types::ProviderResponse;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The capability filter excluded every registered provider.
    #[error("No eligible providers for required capabilities {required:?}")]
    NoEligibleProviders { required: Vec<String> },

    /// Every eligible provider failed, timed out or was cancelled.
    #[error("All providers failed for task '{task}' ({} attempted)", .failures.len())]
    AllProvidersFailed {
        task: String,
        failures: Vec<ProviderResponse>,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

/// Result type for orchestration calls
pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

impl OrchestrationError {
    pub(crate) fn from_dispatch(task: &str, err: DispatchError) -> Self {
        match err {
            DispatchError::NoEligibleProviders { required } => Self::NoEligibleProviders { required },
            DispatchError::AllProvidersFailed { failures } => Self::AllProvidersFailed {
                task: task.to_string(),
                failures,
            },
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoEligibleProviders { .. } => "no_eligible_providers",
            Self::AllProvidersFailed { .. } => "all_providers_failed",
            Self::Config(_) => "config",
            Self::Registry(_) => "registry",
            Self::IllegalTransition(_) => "illegal_transition",
        }
    }

    /// Structured form for the request-handling layer.
    pub fn to_report(&self) -> ErrorReport {
        let (required, failures) = match self {
            Self::NoEligibleProviders { required } => (required.clone(), Vec::new()),
            Self::AllProvidersFailed { failures, .. } => (Vec::new(), failures.clone()),
            _ => (Vec::new(), Vec::new()),
        };
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            required_capabilities: required,
            failures,
        }
    }
}

/// Serializable failure description.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderResponse>,
}
