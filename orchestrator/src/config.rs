//! Orchestrator configuration.
//!
//! Defaults are usable as-is. A TOML file can override any subset of fields
//! (`#[serde(default)]` everywhere) and `ORCHESTRATOR_*` environment
//! variables override both.
//!
//! ```toml
//! provider_timeout_ms = 20000
//! request_timeout_ms = 30000
//! store_capacity = 500
//! capability_match = "any"
//!
//! [weights]
//! intrinsic = 0.5
//! reliability = 0.3
//! capability = 0.2
//!
//! [[providers]]
//! name = "local-qwen"
//! url = "http://localhost:8080/v1/chat/completions"
//! model = "qwen2.5-14b-instruct"
//! capabilities = ["recipe-analysis", "proposal-text"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// How required capability tags restrict the candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityMatch {
    /// Provider must declare every required tag.
    #[default]
    All,
    /// Provider must declare at least one required tag.
    Any,
}

/// Relative weights of the three confidence signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub intrinsic: f64,
    pub reliability: f64,
    pub capability: f64,
}

impl ScoringWeights {
    pub fn new(intrinsic: f64, reliability: f64, capability: f64) -> Self {
        Self {
            intrinsic,
            reliability,
            capability,
        }
    }

    /// Weights scaled to sum to 1.0, in signal order.
    ///
    /// Falls back to equal weighting when the sum is not positive.
    pub fn normalized(&self) -> [f64; 3] {
        let sum = self.intrinsic + self.reliability + self.capability;
        if !(sum.is_finite() && sum > 0.0) {
            return [1.0 / 3.0; 3];
        }
        [
            self.intrinsic / sum,
            self.reliability / sum,
            self.capability / sum,
        ]
    }

    fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("weights.intrinsic", self.intrinsic),
            ("weights.reliability", self.reliability),
            ("weights.capability", self.capability),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be finite and non-negative, got {}", value),
                });
            }
        }
        if self.intrinsic + self.reliability + self.capability <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "weights",
                reason: "weights must not all be zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// Tuning for the reflexive self-assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexiveConfig {
    /// Number of most recent episodes examined.
    pub window: usize,
    /// Minimum samples before a trend or a provider flag is reported.
    pub min_samples: usize,
    /// Confidence delta below which the trend counts as stable.
    pub trend_tolerance: f64,
    /// Absolute drop in response rate (baseline − recent) that flags a provider.
    pub degradation_threshold: f64,
    /// Period of the background monitor.
    pub interval_secs: u64,
}

impl Default for ReflexiveConfig {
    fn default() -> Self {
        Self {
            window: 20,
            min_samples: 4,
            trend_tolerance: 0.05,
            degradation_threshold: 0.2,
            interval_secs: 300,
        }
    }
}

/// An OpenAI-compatible HTTP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub name: String,
    /// Full chat-completions URL.
    pub url: String,
    pub model: String,
    /// Environment variable holding the API key, if the backend needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// System prompt prepended to every call.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2048
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Individual timeout for each provider call.
    pub provider_timeout_ms: u64,
    /// Bound on the whole dispatch, regardless of pending providers.
    pub request_timeout_ms: u64,
    /// Maximum number of episodes kept in the context store.
    pub store_capacity: usize,
    /// Recent candidate appearances considered for historical reliability.
    pub reliability_window: usize,
    pub weights: ScoringWeights,
    pub capability_match: CapabilityMatch,
    /// Record a failure episode when every provider fails.
    pub record_failures: bool,
    pub reflexive: ReflexiveConfig,
    pub providers: Vec<ProviderEndpoint>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 30_000,
            request_timeout_ms: 45_000,
            store_capacity: 1_000,
            reliability_window: 20,
            weights: ScoringWeights::default(),
            capability_match: CapabilityMatch::All,
            record_failures: true,
            reflexive: ReflexiveConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Build from the environment.
    ///
    /// Starts from the file named by `ORCHESTRATOR_CONFIG` when set, otherwise
    /// from defaults, then applies the individual `ORCHESTRATOR_*` overrides.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = match std::env::var("ORCHESTRATOR_CONFIG") {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(ms) = env_parse("ORCHESTRATOR_PROVIDER_TIMEOUT_MS") {
            self.provider_timeout_ms = ms;
        }
        if let Some(ms) = env_parse("ORCHESTRATOR_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = ms;
        }
        if let Some(n) = env_parse("ORCHESTRATOR_STORE_CAPACITY") {
            self.store_capacity = n;
        }
        if let Some(n) = env_parse("ORCHESTRATOR_RELIABILITY_WINDOW") {
            self.reliability_window = n;
        }
        if let Ok(val) = std::env::var("ORCHESTRATOR_CAPABILITY_MATCH") {
            match val.to_lowercase().as_str() {
                "all" => self.capability_match = CapabilityMatch::All,
                "any" => self.capability_match = CapabilityMatch::Any,
                other => tracing::warn!(value = other, "Ignoring unknown ORCHESTRATOR_CAPABILITY_MATCH"),
            }
        }
        if let Some(flag) = env_flag("ORCHESTRATOR_RECORD_FAILURES") {
            self.record_failures = flag;
        }
        if let Some(n) = env_parse("ORCHESTRATOR_REFLEXIVE_WINDOW") {
            self.reflexive.window = n;
        }
        if let Some(secs) = env_parse("ORCHESTRATOR_REFLEXIVE_INTERVAL_SECS") {
            self.reflexive.interval_secs = secs;
        }
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.provider_timeout_ms == 0 {
            return Err(invalid("provider_timeout_ms", "must be greater than zero"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be greater than zero"));
        }
        if self.provider_timeout_ms > self.request_timeout_ms {
            return Err(invalid(
                "provider_timeout_ms",
                "must not exceed request_timeout_ms",
            ));
        }
        if self.store_capacity == 0 {
            return Err(invalid("store_capacity", "must be greater than zero"));
        }
        if self.reliability_window == 0 {
            return Err(invalid("reliability_window", "must be greater than zero"));
        }
        self.weights.validate()?;

        let reflexive = &self.reflexive;
        if reflexive.window == 0 {
            return Err(invalid("reflexive.window", "must be greater than zero"));
        }
        if reflexive.interval_secs == 0 {
            return Err(invalid("reflexive.interval_secs", "must be greater than zero"));
        }
        for (field, value) in [
            ("reflexive.trend_tolerance", reflexive.trend_tolerance),
            ("reflexive.degradation_threshold", reflexive.degradation_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be within [0, 1]"));
            }
        }

        for endpoint in &self.providers {
            if endpoint.name.trim().is_empty() {
                return Err(invalid("providers.name", "must not be empty"));
            }
            if endpoint.url.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "providers.url",
                    reason: format!("provider '{}' has no url", endpoint.name),
                });
            }
        }
        Ok(())
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

/// `true`/`false` in any case, or `1`/`0`. Anything else is ignored with a warning.
fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim() {
        "1" => Some(true),
        "0" => Some(false),
        other => match other.to_lowercase().parse::<bool>() {
            Ok(flag) => Some(flag),
            Err(_) => {
                tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
                None
            }
        },
    }
}
