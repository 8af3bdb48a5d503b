//! Router configuration types for switchyard.
//!
//! `RouterConfig` represents the top-level `config.toml`: the provider list,
//! primary/fallback order, selection policy and the tuning knobs of every
//! resilience component. All fields have sensible defaults.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::{ModelConfig, ProviderDescriptor, ProviderType};

/// Policy used to pick the first candidate for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    Failover,
    RoundRobin,
    LowestLatency,
    LowestCost,
    LoadBalance,
    BestHealth,
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::Failover => write!(f, "failover"),
            SelectionPolicy::RoundRobin => write!(f, "round_robin"),
            SelectionPolicy::LowestLatency => write!(f, "lowest_latency"),
            SelectionPolicy::LowestCost => write!(f, "lowest_cost"),
            SelectionPolicy::LoadBalance => write!(f, "load_balance"),
            SelectionPolicy::BestHealth => write!(f, "best_health"),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "failover" => Ok(SelectionPolicy::Failover),
            "round_robin" => Ok(SelectionPolicy::RoundRobin),
            "lowest_latency" => Ok(SelectionPolicy::LowestLatency),
            "lowest_cost" => Ok(SelectionPolicy::LowestCost),
            "load_balance" => Ok(SelectionPolicy::LoadBalance),
            "best_health" => Ok(SelectionPolicy::BestHealth),
            other => Err(format!("invalid selection policy: '{other}'")),
        }
    }
}

/// One `[[providers]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Stable provider name used by `primary`, `fallbacks` and the CLI.
    pub name: String,
    pub provider_type: ProviderType,
    /// Backend base URL; each provider type has its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub model: ModelConfig,
}

impl ProviderConfig {
    /// The out-of-the-box local Ollama provider.
    pub fn local_ollama() -> Self {
        Self {
            name: "ollama".to_string(),
            provider_type: ProviderType::Ollama,
            base_url: None,
            api_key_env: None,
            enabled: true,
            model: ModelConfig::named("llama3.2"),
        }
    }

    pub fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: self.name.clone(),
            provider_type: self.provider_type,
            model: self.model.clone(),
        }
    }
}

/// `[retry]` backoff schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per provider, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    /// Multiply each delay by a uniform factor in [0.5, 1.0].
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// `[context]` token budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_tokens: u32,
    /// Fraction of `max_tokens` an optimization pass aims for.
    pub target_ratio: f64,
    /// Fraction of `max_tokens` above which a conversation is optimized.
    pub warning_ratio: f64,
    pub preserve_system: bool,
    /// Messages kept verbatim by the summarize strategy.
    pub keep_recent: usize,
    /// Messages kept verbatim by the hybrid strategy.
    pub hybrid_keep_recent: usize,
    pub summary_max_tokens: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4_096,
            target_ratio: 0.8,
            warning_ratio: 0.9,
            preserve_system: true,
            keep_recent: 15,
            hybrid_keep_recent: 20,
            summary_max_tokens: 500,
        }
    }
}

impl ContextConfig {
    pub fn target_tokens(&self) -> u32 {
        (f64::from(self.max_tokens) * self.target_ratio) as u32
    }

    pub fn warning_tokens(&self) -> u32 {
        (f64::from(self.max_tokens) * self.warning_ratio) as u32
    }
}

/// How a context overflow is repaired before the next attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationMethod {
    /// Keep the most recent messages.
    Tail,
    /// Keep the earliest messages.
    Head,
    /// Keep system messages, then the most recent others.
    #[default]
    Smart,
}

/// `[recovery]` remediation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub truncation_ratio: f64,
    pub truncation_method: TruncationMethod,
    /// Wait used when a rate-limited backend gives no retry-after.
    pub rate_limit_wait_secs: u64,
    pub rate_limit_jitter_secs: u64,
    pub timeout_multiplier: f64,
    pub max_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            truncation_ratio: 0.9,
            truncation_method: TruncationMethod::Smart,
            rate_limit_wait_secs: 60,
            rate_limit_jitter_secs: 10,
            timeout_multiplier: 1.5,
            max_timeout_secs: 120,
        }
    }
}

/// `[health]` liveness probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_secs: u64,
    /// Consecutive probe failures before a provider is marked unhealthy.
    pub failure_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            failure_threshold: 3,
        }
    }
}

/// `[circuit_breaker]` invocation failure gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

/// `[sessions]` conversation lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Write a snapshot to durable storage after every mutation.
    pub snapshots: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 86_400,
            cleanup_interval_secs: 3_600,
            snapshots: true,
        }
    }
}

/// Top-level switchyard configuration.
///
/// Loaded from `<data_dir>/config.toml`. All fields have sensible defaults;
/// an empty file yields a single local Ollama provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub providers: Vec<ProviderConfig>,
    /// Primary provider; the first enabled provider when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    /// Fallback order after the primary.
    pub fallbacks: Vec<String>,
    pub selection: SelectionPolicy,
    pub retry: RetryConfig,
    pub context: ContextConfig,
    pub recovery: RecoveryConfig,
    pub health: HealthConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub sessions: SessionConfig,
    /// Base timeout of a single provider attempt.
    pub request_timeout_secs: u64,
    /// Overall deadline of one request across all attempts and providers.
    pub request_deadline_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            providers: vec![ProviderConfig::local_ollama()],
            primary: None,
            fallbacks: Vec::new(),
            selection: SelectionPolicy::default(),
            retry: RetryConfig::default(),
            context: ContextConfig::default(),
            recovery: RecoveryConfig::default(),
            health: HealthConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            sessions: SessionConfig::default(),
            request_timeout_secs: 60,
            request_deadline_secs: 300,
        }
    }
}

fn default_true() -> bool {
    true
}

impl RouterConfig {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }

    /// The configured primary, or the first enabled provider.
    pub fn primary_name(&self) -> Option<&str> {
        self.primary
            .as_deref()
            .or_else(|| self.enabled_providers().next().map(|p| p.name.as_str()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::Invalid("provider name must not be empty".into()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
        }
        if self.enabled_providers().next().is_none() {
            return Err(ConfigError::Invalid("no enabled providers".into()));
        }

        let chain = self.primary.iter().chain(self.fallbacks.iter());
        for name in chain {
            match self.provider(name) {
                None => {
                    return Err(ConfigError::Invalid(format!("unknown provider '{name}'")));
                }
                Some(p) if !p.enabled => {
                    return Err(ConfigError::Invalid(format!("provider '{name}' is disabled")));
                }
                Some(_) => {}
            }
        }

        for (label, ratio) in [
            ("context.target_ratio", self.context.target_ratio),
            ("context.warning_ratio", self.context.warning_ratio),
            ("recovery.truncation_ratio", self.recovery.truncation_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{label} must be in (0, 1], got {ratio}"
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.exponential_base < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.exponential_base must be at least 1.0".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms exceeds retry.max_delay_ms".into(),
            ));
        }
        if self.health.failure_threshold == 0 || self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid("failure thresholds must be at least 1".into()));
        }
        if self.context.max_tokens == 0 {
            return Err(ConfigError::Invalid("context.max_tokens must be positive".into()));
        }
        Ok(())
    }
}
