//! Provider abstractions and the resilience machinery around them.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: object-safe wrapper for dynamic dispatch
//! - `CircuitBreaker` / `HealthBoard` / `HealthMonitor`: failure gating and liveness
//! - `MetricsStore` + `selection`: per-provider metrics and selection policies
//! - `classify` / `RetryPolicy` / `RecoveryRegistry`: failure handling
//! - `Orchestrator`: composes all of the above per request

pub mod box_provider;
pub mod circuit_breaker;
pub mod classify;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod params;
pub mod provider;
pub mod recovery;
pub mod registry;
pub mod retry;
pub mod selection;

#[cfg(test)]
pub(crate) mod testing;
