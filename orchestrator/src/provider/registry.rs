//! Ordered, capability-tagged set of provider adapters.
//!
//! Registration order is the declared priority: the first registered provider
//! has priority 0 and wins selection ties that survive the latency check.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use super::{OpenAiCompatibleProvider, ProviderAdapter};
use crate::config::{CapabilityMatch, OrchestratorConfig};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    #[error("Provider name must not be empty")]
    EmptyName,

    #[error("Failed to build provider {name}: {reason}")]
    Build { name: String, reason: String },
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// An adapter together with its priority and declared capabilities.
#[derive(Clone)]
pub struct RegisteredProvider {
    pub adapter: Arc<dyn ProviderAdapter>,
    pub priority: usize,
    pub capabilities: BTreeSet<String>,
}

impl RegisteredProvider {
    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Whether this provider satisfies `required` under `mode`.
    ///
    /// An empty requirement is satisfied by every provider.
    pub fn is_eligible(&self, required: &BTreeSet<String>, mode: CapabilityMatch) -> bool {
        if required.is_empty() {
            return true;
        }
        match mode {
            CapabilityMatch::All => required.is_subset(&self.capabilities),
            CapabilityMatch::Any => required.iter().any(|tag| self.capabilities.contains(tag)),
        }
    }
}

impl std::fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("name", &self.name())
            .field("priority", &self.priority)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// The closed set of providers an orchestrator may dispatch to.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an HTTP adapter for every endpoint in `config.providers`.
    pub fn from_config(config: &OrchestratorConfig) -> RegistryResult<Self> {
        let mut registry = Self::new();
        for endpoint in &config.providers {
            let provider = OpenAiCompatibleProvider::from_endpoint(endpoint, config.provider_timeout())
                .map_err(|e| RegistryError::Build {
                    name: endpoint.name.clone(),
                    reason: e.to_string(),
                })?;
            registry.register(Arc::new(provider))?;
        }
        Ok(registry)
    }

    /// Register an adapter at the lowest priority so far.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> RegistryResult<usize> {
        let name = adapter.name();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.get(name).is_some() {
            return Err(RegistryError::DuplicateProvider(name.to_string()));
        }

        let priority = self.providers.len();
        let capabilities = adapter.capabilities().iter().cloned().collect();
        tracing::info!(provider = name, priority, "Provider registered");
        self.providers.push(RegisteredProvider {
            adapter,
            priority,
            capabilities,
        });
        Ok(priority)
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> RegistryResult<Self> {
        self.register(adapter)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredProvider> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// All providers in priority order.
    pub fn providers(&self) -> &[RegisteredProvider] {
        &self.providers
    }

    /// Providers eligible for `required`, in priority order.
    pub fn eligible(
        &self,
        required: &BTreeSet<String>,
        mode: CapabilityMatch,
    ) -> Vec<RegisteredProvider> {
        self.providers
            .iter()
            .filter(|p| p.is_eligible(required, mode))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedProvider;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new()
            .with(Arc::new(ScriptedProvider::new(
                "gpt",
                ["recipe-analysis", "proposal-text"],
            )))
            .unwrap()
            .with(Arc::new(ScriptedProvider::new("claude", ["recipe-analysis"])))
            .unwrap()
            .with(Arc::new(ScriptedProvider::new("gemini", ["menu-planning"])))
            .unwrap()
    }

    #[test]
    fn test_priority_follows_registration_order() {
        let registry = registry();
        let names: Vec<_> = registry.providers().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["gpt", "claude", "gemini"]);
        assert_eq!(registry.get("gemini").unwrap().priority, 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = registry();
        let err = registry
            .register(Arc::new(ScriptedProvider::new("claude", Vec::<String>::new())))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateProvider(name) if name == "claude"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = ProviderRegistry::new();
        let err = registry
            .register(Arc::new(ScriptedProvider::new("  ", Vec::<String>::new())))
            .unwrap_err();
        assert!(matches!(err, RegistryError::EmptyName));
    }

    #[test]
    fn test_no_requirements_means_everyone() {
        let eligible = registry().eligible(&BTreeSet::new(), CapabilityMatch::All);
        assert_eq!(eligible.len(), 3);
    }

    #[test]
    fn test_all_mode_requires_superset() {
        let eligible = registry().eligible(
            &tags(&["recipe-analysis", "proposal-text"]),
            CapabilityMatch::All,
        );
        let names: Vec<_> = eligible.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["gpt"]);
    }

    #[test]
    fn test_any_mode_requires_overlap() {
        let eligible = registry().eligible(
            &tags(&["proposal-text", "menu-planning"]),
            CapabilityMatch::Any,
        );
        let names: Vec<_> = eligible.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["gpt", "gemini"]);
    }

    #[test]
    fn test_unknown_tag_matches_nobody() {
        let registry = registry();
        assert!(registry
            .eligible(&tags(&["kik-analysis"]), CapabilityMatch::All)
            .is_empty());
        assert!(registry
            .eligible(&tags(&["kik-analysis"]), CapabilityMatch::Any)
            .is_empty());
    }
}
