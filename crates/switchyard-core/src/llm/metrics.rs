//! Per-provider invocation metrics.
//!
//! Counters, cumulative latency/tokens/cost, and bounded rolling windows
//! (recent latencies, recent errors, request timestamps for load balancing).
//! Written by the orchestrator after every attempt, read by selection.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

use switchyard_types::error::ErrorRecord;
use switchyard_types::metrics::ProviderMetricsSnapshot;

/// Rolling latency samples kept per provider.
pub const LATENCY_WINDOW: usize = 100;
/// Recent error messages kept per provider.
pub const ERROR_WINDOW: usize = 10;
/// Horizon of the load-balance request count.
pub const REQUEST_WINDOW: Duration = Duration::from_secs(300);

/// Recent latency above which the health score is penalized.
const LATENCY_PENALTY_FLOOR_MS: f64 = 1_000.0;
const LATENCY_PENALTY_SCALE_MS: f64 = 10_000.0;
const MAX_LATENCY_PENALTY: f64 = 0.5;

/// `total / count` in whole nanoseconds. `count` must be non-zero.
fn mean(total: Duration, count: u64) -> Duration {
    let nanos = total.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[derive(Debug, Clone, Default)]
pub struct ProviderMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_latency: Duration,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Configured price, used for cost-per-token before any usage is seen.
    pub cost_per_million_tokens: f64,
    recent_latencies: VecDeque<Duration>,
    recent_errors: VecDeque<String>,
    request_times: VecDeque<Instant>,
}

impl ProviderMetrics {
    pub fn new(cost_per_million_tokens: f64) -> Self {
        Self {
            cost_per_million_tokens,
            ..Self::default()
        }
    }

    fn record_request(&mut self, latency: Duration) {
        let now = Instant::now();
        self.total_requests += 1;
        self.total_latency += latency;

        if self.recent_latencies.len() == LATENCY_WINDOW {
            self.recent_latencies.pop_front();
        }
        self.recent_latencies.push_back(latency);

        self.request_times.push_back(now);
        self.prune_requests(now);
    }

    fn prune_requests(&mut self, now: Instant) {
        while self
            .request_times
            .front()
            .is_some_and(|t| now.duration_since(*t) > REQUEST_WINDOW)
        {
            self.request_times.pop_front();
        }
    }

    pub fn record_success(&mut self, latency: Duration, tokens: u64) {
        self.record_request(latency);
        self.successful_requests += 1;
        self.total_tokens += tokens;
        self.total_cost += tokens as f64 * self.cost_per_million_tokens / 1_000_000.0;
    }

    pub fn record_failure(&mut self, latency: Duration, error: &str) {
        self.record_request(latency);
        self.failed_requests += 1;
        if self.recent_errors.len() == ERROR_WINDOW {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(error.to_string());
    }

    /// 1.0 when no requests have been made.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    pub fn average_latency(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            mean(self.total_latency, self.total_requests)
        }
    }

    /// Mean of the rolling latency window; `None` without samples.
    pub fn recent_average_latency(&self) -> Option<Duration> {
        if self.recent_latencies.is_empty() {
            return None;
        }
        let sum: Duration = self.recent_latencies.iter().sum();
        Some(mean(sum, self.recent_latencies.len() as u64))
    }

    /// Observed cost per token, or the configured price before any usage.
    pub fn cost_per_token(&self) -> f64 {
        if self.total_tokens == 0 {
            self.cost_per_million_tokens / 1_000_000.0
        } else {
            self.total_cost / self.total_tokens as f64
        }
    }

    /// Success rate minus a penalty of up to 0.5 for slow recent responses.
    pub fn health_score(&self) -> f64 {
        let penalty = self
            .recent_average_latency()
            .map(|latency| {
                let ms = latency.as_secs_f64() * 1_000.0;
                ((ms - LATENCY_PENALTY_FLOOR_MS) / LATENCY_PENALTY_SCALE_MS)
                    .clamp(0.0, MAX_LATENCY_PENALTY)
            })
            .unwrap_or(0.0);
        self.success_rate() - penalty
    }

    /// Requests issued within [`REQUEST_WINDOW`] of `now`.
    pub fn recent_request_count(&self, now: Instant) -> usize {
        self.request_times
            .iter()
            .filter(|t| now.duration_since(**t) <= REQUEST_WINDOW)
            .count()
    }

    pub fn snapshot(&self, provider: &str) -> ProviderMetricsSnapshot {
        ProviderMetricsSnapshot {
            provider: provider.to_string(),
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            success_rate: self.success_rate(),
            average_latency_ms: self.average_latency().as_secs_f64() * 1_000.0,
            recent_average_latency_ms: self
                .recent_average_latency()
                .map(|d| d.as_secs_f64() * 1_000.0),
            total_tokens: self.total_tokens,
            total_cost: self.total_cost,
            cost_per_token: self.cost_per_token(),
            health_score: self.health_score(),
            recent_requests: self.recent_request_count(Instant::now()),
            recent_errors: self.recent_errors.iter().cloned().collect(),
        }
    }
}

/// Metrics of every provider behind a single read/write lock.
#[derive(Debug, Default)]
pub struct MetricsStore {
    inner: RwLock<HashMap<String, ProviderMetrics>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, cost_per_million_tokens: f64) {
        self.inner
            .write()
            .entry(name.to_string())
            .or_insert_with(|| ProviderMetrics::new(cost_per_million_tokens));
    }

    pub fn record_success(&self, name: &str, latency: Duration, tokens: u64) {
        self.inner
            .write()
            .entry(name.to_string())
            .or_default()
            .record_success(latency, tokens);
    }

    pub fn record_failure(&self, name: &str, latency: Duration, error: &ErrorRecord) {
        self.inner
            .write()
            .entry(name.to_string())
            .or_default()
            .record_failure(latency, &error.to_string());
    }

    /// Run `f` against the metrics map under the shared read lock.
    pub fn read<R>(&self, f: impl FnOnce(&HashMap<String, ProviderMetrics>) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn snapshot(&self, name: &str) -> Option<ProviderMetricsSnapshot> {
        self.inner.read().get(name).map(|m| m.snapshot(name))
    }

    /// Snapshots of all providers, sorted by name.
    pub fn snapshots(&self) -> Vec<ProviderMetricsSnapshot> {
        let mut all: Vec<_> = self
            .inner
            .read()
            .iter()
            .map(|(name, m)| m.snapshot(name))
            .collect();
        all.sort_by(|a, b| a.provider.cmp(&b.provider));
        all
    }
}
