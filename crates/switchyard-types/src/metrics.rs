//! Metric and health snapshots exposed by the operational query surface.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of one provider's invocation metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetricsSnapshot {
    pub provider: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// 1.0 when no requests have been made.
    pub success_rate: f64,
    pub average_latency_ms: f64,
    /// Average over the rolling latency window; `None` without samples.
    pub recent_average_latency_ms: Option<f64>,
    pub total_tokens: u64,
    /// Estimated USD spend.
    pub total_cost: f64,
    pub cost_per_token: f64,
    pub health_score: f64,
    /// Requests issued within the load-balance window.
    pub recent_requests: usize,
    pub recent_errors: Vec<String>,
}

/// Liveness view of a provider, maintained by the health monitor and the
/// orchestrator's failure path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            last_error: None,
            last_checked: None,
        }
    }
}

/// Externally visible circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStateKind {
    Closed,
    Open,
    /// Recovery timeout elapsed; the single probe call is allowed or in flight.
    Probing,
}

impl fmt::Display for CircuitStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitStateKind::Closed => write!(f, "closed"),
            CircuitStateKind::Open => write!(f, "open"),
            CircuitStateKind::Probing => write!(f, "probing"),
        }
    }
}

/// Provider status for the CLI `provider status` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatusInfo {
    pub name: String,
    pub model: String,
    pub healthy: bool,
    pub circuit_state: CircuitStateKind,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub total_calls: u64,
    pub total_failures: u64,
}

/// Human-readable "Ns/Nm/Nh ago" for a timestamp.
pub fn format_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3_600 {
        format!("{}m ago", secs / 60)
    } else {
        format!("{}h ago", secs / 3_600)
    }
}
