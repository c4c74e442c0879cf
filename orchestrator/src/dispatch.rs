//! Dispatch coordinator — concurrent fan-out to eligible providers.
//!
//! ```text
//! launch(request)
//!   ├─ filter registry by required capabilities (none → NoEligibleProviders)
//!   └─ JoinSet::spawn(invoke_with_timeout(provider_i)) × N
//! collect()
//!   ├─ join_next() under the request deadline
//!   ├─ deadline hit → abort_all(), pending slots become Cancelled
//!   └─ no successful response → AllProvidersFailed
//! ```
//!
//! Each call owns its own `JoinSet`, so cancelling one dispatch (deadline or
//! dropping the [`InFlightDispatch`]) never touches another call's providers.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{CapabilityMatch, OrchestratorConfig};
use crate::provider::{invoke_with_timeout, ProviderCall, ProviderRegistry, RegisteredProvider};
use crate::telemetry;
use crate::types::{FailureReason, ProviderResponse, TaskRequest};

/// Errors surfaced by dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("No registered provider satisfies required capabilities {required:?}")]
    NoEligibleProviders { required: Vec<String> },

    #[error("All {} eligible providers failed", .failures.len())]
    AllProvidersFailed { failures: Vec<ProviderResponse> },
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Fans a request out to every eligible provider.
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    provider_timeout: Duration,
    request_timeout: Duration,
    capability_match: CapabilityMatch,
}

impl Dispatcher {
    pub fn new(registry: Arc<ProviderRegistry>, config: &OrchestratorConfig) -> Self {
        Self {
            registry,
            provider_timeout: config.provider_timeout(),
            request_timeout: config.request_timeout(),
            capability_match: config.capability_match,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Providers eligible for `request`, in priority order.
    pub fn eligible(&self, request: &TaskRequest) -> DispatchResult<Vec<RegisteredProvider>> {
        let required = request.required_capabilities.clone().unwrap_or_default();
        let eligible = self.registry.eligible(&required, self.capability_match);
        if eligible.is_empty() {
            return Err(DispatchError::NoEligibleProviders {
                required: required.into_iter().collect(),
            });
        }
        Ok(eligible)
    }

    /// Spawn one call per eligible provider and return the in-flight handle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch(&self, request: &TaskRequest) -> DispatchResult<InFlightDispatch> {
        let eligible = self.eligible(request)?;
        let call = ProviderCall::from_request(request, self.provider_timeout);
        let started = Instant::now();

        let mut join_set = JoinSet::new();
        let mut slots = Vec::with_capacity(eligible.len());

        for (slot, provider) in eligible.into_iter().enumerate() {
            slots.push(Slot {
                name: provider.name().to_string(),
                priority: provider.priority,
                capabilities: provider.capabilities.clone(),
            });

            let adapter = provider.adapter.clone();
            let call = call.clone();
            let priority = provider.priority;
            join_set.spawn(async move {
                let call_started = Instant::now();
                let invocation = invoke_with_timeout(adapter.as_ref(), &call, priority);
                let response = match AssertUnwindSafe(invocation).catch_unwind().await {
                    Ok(response) => response,
                    Err(panic) => ProviderResponse::failed(
                        adapter.name(),
                        priority,
                        adapter.capabilities().to_vec(),
                        call_started.elapsed().as_millis() as u64,
                        FailureReason::Panicked {
                            message: panic_message(panic.as_ref()),
                        },
                    ),
                };
                (slot, response)
            });
        }

        info!(
            task_id = %request.id,
            task = %request.task,
            providers = slots.len(),
            "Dispatching to providers"
        );

        Ok(InFlightDispatch {
            task_id: request.id.clone(),
            join_set,
            slots,
            started,
            deadline: started + self.request_timeout,
            request_timeout: self.request_timeout,
        })
    }

    /// Launch and collect in one step.
    pub async fn dispatch(&self, request: &TaskRequest) -> DispatchResult<Vec<ProviderResponse>> {
        self.launch(request)?.collect().await
    }
}

#[derive(Debug, Clone)]
struct Slot {
    name: String,
    priority: usize,
    capabilities: BTreeSet<String>,
}

/// Provider calls spawned for one request, not yet collected.
///
/// Dropping this value aborts every provider call it still owns.
pub struct InFlightDispatch {
    task_id: String,
    join_set: JoinSet<(usize, ProviderResponse)>,
    slots: Vec<Slot>,
    started: Instant,
    deadline: Instant,
    request_timeout: Duration,
}

impl InFlightDispatch {
    /// Number of providers dispatched to.
    pub fn provider_count(&self) -> usize {
        self.slots.len()
    }

    /// Names of the providers dispatched to, in priority order.
    pub fn provider_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name.clone()).collect()
    }

    /// Wait for responses until all providers finish or the request deadline
    /// passes, whichever comes first.
    ///
    /// Returns one response per provider in priority order. Fails with
    /// [`DispatchError::AllProvidersFailed`] when none succeeded.
    pub async fn collect(mut self) -> DispatchResult<Vec<ProviderResponse>> {
        let mut collected: Vec<Option<ProviderResponse>> = vec![None; self.slots.len()];

        loop {
            match tokio::time::timeout_at(self.deadline, self.join_set.join_next()).await {
                Ok(Some(Ok((slot, response)))) => {
                    telemetry::record_provider_call(&self.task_id, &response);
                    collected[slot] = Some(response);
                }
                Ok(Some(Err(e))) => {
                    warn!(task_id = %self.task_id, error = %e, "Provider task ended without a response");
                }
                Ok(None) => break,
                Err(_) => {
                    let pending = collected.iter().filter(|r| r.is_none()).count();
                    warn!(
                        task_id = %self.task_id,
                        pending,
                        deadline_ms = self.request_timeout.as_millis() as u64,
                        "Request deadline reached, cancelling pending providers"
                    );
                    self.join_set.abort_all();
                    break;
                }
            }
        }

        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let deadline_ms = self.request_timeout.as_millis() as u64;
        let responses: Vec<ProviderResponse> = collected
            .into_iter()
            .zip(self.slots.iter())
            .map(|(response, slot)| {
                response.unwrap_or_else(|| {
                    let cancelled = ProviderResponse::failed(
                        slot.name.clone(),
                        slot.priority,
                        slot.capabilities.iter().cloned().collect(),
                        elapsed_ms,
                        FailureReason::Cancelled { deadline_ms },
                    );
                    telemetry::record_provider_call(&self.task_id, &cancelled);
                    cancelled
                })
            })
            .collect();

        let succeeded = responses.iter().filter(|r| r.success).count();
        debug!(
            task_id = %self.task_id,
            succeeded,
            failed = responses.len() - succeeded,
            elapsed_ms,
            "Dispatch collected"
        );

        if succeeded == 0 {
            return Err(DispatchError::AllProvidersFailed {
                failures: responses,
            });
        }
        Ok(responses)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
