//! Provider health tracking.
//!
//! Two independent signals decide whether a provider may be selected:
//! - `HealthStatus`, driven by the periodic liveness probe (`is_available`)
//!   run by [`HealthMonitor`], flipped unhealthy after N consecutive probe
//!   failures;
//! - the [`CircuitBreaker`], driven by *invocation* failures.
//!
//! A provider is eligible only when it is healthy and its breaker would not
//! reject a call. Each map sits behind its own lock, never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use switchyard_types::config::CircuitBreakerConfig;
use switchyard_types::error::ErrorRecord;
use switchyard_types::metrics::{CircuitStateKind, HealthStatus};

use super::circuit_breaker::{CircuitBreaker, Permit};
use super::registry::ProviderRegistry;

/// Health status and circuit breaker of every registered provider.
#[derive(Debug)]
pub struct HealthBoard {
    statuses: RwLock<HashMap<String, HealthStatus>>,
    breakers: Mutex<HashMap<String, CircuitBreaker>>,
    failure_threshold: u32,
    breaker_config: CircuitBreakerConfig,
}

impl HealthBoard {
    /// `failure_threshold` is the consecutive probe failure count that marks
    /// a provider unhealthy.
    pub fn new(failure_threshold: u32, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            breakers: Mutex::new(HashMap::new()),
            failure_threshold: failure_threshold.max(1),
            breaker_config,
        }
    }

    pub fn register(&self, name: &str) {
        self.statuses
            .write()
            .entry(name.to_string())
            .or_default();
        self.breakers
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| CircuitBreaker::from_config(&self.breaker_config));
    }

    pub fn is_healthy(&self, name: &str) -> bool {
        self.statuses.read().get(name).is_some_and(|s| s.healthy)
    }

    /// Healthy and not rejected by the circuit breaker.
    pub fn is_eligible(&self, name: &str) -> bool {
        self.is_healthy(name) && !self.breaker_would_reject(name)
    }

    /// Ask the provider's breaker for permission to make one call.
    pub fn try_acquire(&self, name: &str) -> Option<Permit> {
        self.breakers
            .lock()
            .get_mut(name)
            .and_then(CircuitBreaker::try_acquire)
    }

    pub fn release_probe(&self, name: &str) {
        if let Some(breaker) = self.breakers.lock().get_mut(name) {
            breaker.release_probe();
        }
    }

    pub fn breaker_would_reject(&self, name: &str) -> bool {
        self.breakers
            .lock()
            .get(name)
            .is_none_or(CircuitBreaker::would_reject)
    }

    pub fn breaker_is_open(&self, name: &str) -> bool {
        self.breakers
            .lock()
            .get(name)
            .is_some_and(CircuitBreaker::is_open)
    }

    pub fn breaker_state(&self, name: &str) -> Option<CircuitStateKind> {
        self.breakers.lock().get(name).map(CircuitBreaker::state)
    }

    /// Record a successful invocation.
    pub fn record_success(&self, name: &str) {
        if let Some(breaker) = self.breakers.lock().get_mut(name) {
            breaker.record_success();
        }
    }

    /// Record a failed invocation. Feeds the breaker and remembers the error
    /// text; liveness is left to the probe.
    pub fn record_failure(&self, name: &str, error: &ErrorRecord) {
        let opened = {
            let mut breakers = self.breakers.lock();
            match breakers.get_mut(name) {
                Some(breaker) => {
                    let was_open = breaker.is_open();
                    breaker.record_failure();
                    !was_open && breaker.is_open()
                }
                None => false,
            }
        };
        if opened {
            tracing::warn!(provider = %name, "Circuit breaker opened");
        }

        if let Some(status) = self.statuses.write().get_mut(name) {
            status.last_error = Some(error.to_string());
            status.last_checked = Some(Utc::now());
        }
    }

    /// Record the outcome of one liveness probe.
    pub fn record_probe(&self, name: &str, available: bool) {
        let mut statuses = self.statuses.write();
        let Some(status) = statuses.get_mut(name) else {
            return;
        };
        status.last_checked = Some(Utc::now());
        if available {
            if !status.healthy {
                tracing::info!(provider = %name, "Provider healthy again");
            }
            status.healthy = true;
            status.consecutive_failures = 0;
        } else {
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
            status.last_error = Some("liveness probe failed".to_string());
            if status.healthy && status.consecutive_failures >= self.failure_threshold {
                status.healthy = false;
                tracing::warn!(
                    provider = %name,
                    failures = status.consecutive_failures,
                    "Provider marked unhealthy"
                );
            }
        }
    }

    /// Close the provider's breaker. Returns `false` for unknown providers.
    pub fn reset_breaker(&self, name: &str) -> bool {
        match self.breakers.lock().get_mut(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn status(&self, name: &str) -> Option<HealthStatus> {
        self.statuses.read().get(name).cloned()
    }
}

/// Background liveness prober.
///
/// Calls `is_available()` on every registered provider at a fixed interval
/// and feeds the results into the [`HealthBoard`].
pub struct HealthMonitor {
    registry: Arc<ProviderRegistry>,
    board: Arc<HealthBoard>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ProviderRegistry>, board: Arc<HealthBoard>, interval: Duration) -> Self {
        Self {
            registry,
            board,
            interval,
            probe_timeout: Duration::from_secs(10).min(interval),
        }
    }

    /// Probe every provider once, sequentially. A probe that exceeds the
    /// probe timeout counts as a failure.
    pub async fn check_all(&self) -> Vec<(String, bool)> {
        let mut results = Vec::with_capacity(self.registry.len());
        for provider in self.registry.iter() {
            let available = tokio::time::timeout(self.probe_timeout, provider.is_available())
                .await
                .unwrap_or(false);
            tracing::debug!(provider = %provider.name(), available, "Liveness probe");
            self.board.record_probe(provider.name(), available);
            results.push((provider.name().to_string(), available));
        }
        results
    }

    /// Run the probe loop until `cancel` fires. The first round runs
    /// immediately.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Health monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.check_all().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use switchyard_types::error::ErrorCategory;

    use crate::llm::box_provider::BoxLlmProvider;
    use crate::llm::testing::MockProvider;

    fn board() -> HealthBoard {
        let board = HealthBoard::new(3, CircuitBreakerConfig::default());
        board.register("a");
        board
    }

    fn record() -> ErrorRecord {
        ErrorRecord::new(ErrorCategory::Connection, "refused")
    }

    #[test]
    fn test_probe_threshold_marks_unhealthy() {
        let board = board();
        board.record_probe("a", false);
        board.record_probe("a", false);
        assert!(board.is_healthy("a"));
        board.record_probe("a", false);
        assert!(!board.is_healthy("a"));
        assert!(!board.is_eligible("a"));

        board.record_probe("a", true);
        let status = board.status("a").unwrap();
        assert!(status.healthy);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[test]
    fn test_invocation_failures_open_breaker_not_health() {
        let board = board();
        for _ in 0..5 {
            board.record_failure("a", &record());
        }
        assert!(board.is_healthy("a"));
        assert!(board.breaker_is_open("a"));
        assert!(!board.is_eligible("a"));
        assert_eq!(board.breaker_state("a"), Some(CircuitStateKind::Open));
        assert!(board.status("a").unwrap().last_error.unwrap().contains("refused"));
    }

    #[test]
    fn test_reset_breaker() {
        let board = board();
        for _ in 0..5 {
            board.record_failure("a", &record());
        }
        assert!(board.reset_breaker("a"));
        assert!(board.is_eligible("a"));
        assert!(!board.reset_breaker("missing"));
    }

    #[test]
    fn test_unknown_provider_is_not_eligible() {
        let board = board();
        assert!(!board.is_eligible("ghost"));
        assert_eq!(board.try_acquire("ghost"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_reports_permit_kind() {
        let board = board();
        assert_eq!(board.try_acquire("a"), Some(Permit::Call));
        for _ in 0..5 {
            board.record_failure("a", &record());
        }
        assert_eq!(board.try_acquire("a"), None);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(board.try_acquire("a"), Some(Permit::Probe));
        assert_eq!(board.try_acquire("a"), None);
        board.release_probe("a");
        assert_eq!(board.try_acquire("a"), Some(Permit::Probe));
    }

    #[tokio::test]
    async fn test_monitor_check_all() {
        let up = MockProvider::ok("up");
        let down = MockProvider::ok("down");
        down.availability().store(false, Ordering::SeqCst);

        let mut registry = ProviderRegistry::new();
        registry.register(BoxLlmProvider::new(up));
        registry.register(BoxLlmProvider::new(down));
        let registry = Arc::new(registry);

        let board = Arc::new(HealthBoard::new(1, CircuitBreakerConfig::default()));
        board.register("up");
        board.register("down");

        let monitor = HealthMonitor::new(registry, Arc::clone(&board), Duration::from_secs(60));
        let results = monitor.check_all().await;
        assert_eq!(
            results,
            vec![("up".to_string(), true), ("down".to_string(), false)]
        );
        assert!(board.is_healthy("up"));
        assert!(!board.is_healthy("down"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_loop_stops_on_cancel() {
        let provider = MockProvider::ok("a");
        let flag = provider.availability();
        flag.store(false, Ordering::SeqCst);
        let mut registry = ProviderRegistry::new();
        registry.register(BoxLlmProvider::new(provider));

        let board = Arc::new(HealthBoard::new(2, CircuitBreakerConfig::default()));
        board.register("a");
        let monitor = HealthMonitor::new(
            Arc::new(registry),
            Arc::clone(&board),
            Duration::from_secs(60),
        );

        let cancel = CancellationToken::new();
        let handle = monitor.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!board.is_healthy("a"));

        cancel.cancel();
        handle.await.unwrap();
    }
}
