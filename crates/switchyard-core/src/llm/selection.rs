//! Provider selection policies.
//!
//! Every policy receives the eligible providers in configured order
//! (primary, fallbacks, then the rest in registration order) plus the
//! metrics map, and returns one name. Ties always go to the earlier
//! provider in that order. An empty eligible set yields `None`.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::time::Instant;

use switchyard_types::config::SelectionPolicy;

use super::metrics::ProviderMetrics;

/// Inputs to one selection decision.
pub struct SelectionContext<'a> {
    pub eligible: &'a [String],
    pub metrics: &'a HashMap<String, ProviderMetrics>,
    pub now: Instant,
}

impl SelectionContext<'_> {
    /// Name of the provider minimizing `key`; earliest wins ties.
    fn argmin(&self, key: impl Fn(&ProviderMetrics) -> f64) -> Option<String> {
        let unsampled = ProviderMetrics::default();
        let mut best: Option<(&String, f64)> = None;
        for name in self.eligible {
            let value = key(self.metrics.get(name).unwrap_or(&unsampled));
            if best.is_none_or(|(_, current)| value < current) {
                best = Some((name, value));
            }
        }
        best.map(|(name, _)| name.clone())
    }
}

/// A pluggable selection policy.
pub trait SelectionStrategy: Send + Sync {
    fn policy(&self) -> SelectionPolicy;

    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String>;
}

/// Primary first if eligible, else the first eligible fallback.
pub struct Failover;

impl SelectionStrategy for Failover {
    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy::Failover
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String> {
        ctx.eligible.first().cloned()
    }
}

/// Rotates through eligible providers with a shared cursor.
#[derive(Default)]
pub struct RoundRobin {
    cursor: Mutex<usize>,
}

impl SelectionStrategy for RoundRobin {
    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy::RoundRobin
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String> {
        if ctx.eligible.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock();
        let index = *cursor % ctx.eligible.len();
        *cursor = (index + 1) % ctx.eligible.len();
        Some(ctx.eligible[index].clone())
    }
}

/// Lowest rolling-average latency. Unsampled providers count as infinitely
/// slow, so they only win when no sampled provider is eligible.
pub struct LowestLatency;

impl SelectionStrategy for LowestLatency {
    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy::LowestLatency
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String> {
        ctx.argmin(|m| {
            m.recent_average_latency()
                .map_or(f64::INFINITY, |d| d.as_secs_f64())
        })
    }
}

/// Lowest cost per token; free providers cost 0.
pub struct LowestCost;

impl SelectionStrategy for LowestCost {
    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy::LowestCost
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String> {
        ctx.argmin(ProviderMetrics::cost_per_token)
    }
}

/// Fewest requests within the last five minutes.
pub struct LoadBalance;

impl SelectionStrategy for LoadBalance {
    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy::LoadBalance
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String> {
        let now = ctx.now;
        ctx.argmin(|m| m.recent_request_count(now) as f64)
    }
}

/// Highest health score.
pub struct BestHealth;

impl SelectionStrategy for BestHealth {
    fn policy(&self) -> SelectionPolicy {
        SelectionPolicy::BestHealth
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Option<String> {
        ctx.argmin(|m| -m.health_score())
    }
}

/// Build the strategy for a configured policy.
pub fn strategy_for(policy: SelectionPolicy) -> Box<dyn SelectionStrategy> {
    match policy {
        SelectionPolicy::Failover => Box::new(Failover),
        SelectionPolicy::RoundRobin => Box::new(RoundRobin::default()),
        SelectionPolicy::LowestLatency => Box::new(LowestLatency),
        SelectionPolicy::LowestCost => Box::new(LowestCost),
        SelectionPolicy::LoadBalance => Box::new(LoadBalance),
        SelectionPolicy::BestHealth => Box::new(BestHealth),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn with_latency(ms: u64, samples: usize) -> ProviderMetrics {
        let mut m = ProviderMetrics::default();
        for _ in 0..samples {
            m.record_success(Duration::from_millis(ms), 0);
        }
        m
    }

    fn select(
        strategy: &dyn SelectionStrategy,
        eligible: &[String],
        metrics: &HashMap<String, ProviderMetrics>,
    ) -> Option<String> {
        strategy.select(&SelectionContext {
            eligible,
            metrics,
            now: Instant::now(),
        })
    }

    #[test]
    fn test_all_policies_return_none_when_empty() {
        let metrics = HashMap::new();
        for policy in [
            SelectionPolicy::Failover,
            SelectionPolicy::RoundRobin,
            SelectionPolicy::LowestLatency,
            SelectionPolicy::LowestCost,
            SelectionPolicy::LoadBalance,
            SelectionPolicy::BestHealth,
        ] {
            let strategy = strategy_for(policy);
            assert_eq!(strategy.policy(), policy);
            assert!(select(strategy.as_ref(), &[], &metrics).is_none());
        }
    }

    #[test]
    fn test_failover_takes_first() {
        let eligible = names(&["primary", "backup"]);
        assert_eq!(
            select(&Failover, &eligible, &HashMap::new()).as_deref(),
            Some("primary")
        );
    }

    #[test]
    fn test_round_robin_visits_each_once_per_cycle() {
        let eligible = names(&["a", "b", "c"]);
        let rr = RoundRobin::default();
        let metrics = HashMap::new();
        for _ in 0..3 {
            let mut cycle: Vec<String> = (0..3)
                .filter_map(|_| select(&rr, &eligible, &metrics))
                .collect();
            cycle.sort();
            assert_eq!(cycle, eligible);
        }
    }

    #[test]
    fn test_lowest_latency_prefers_faster() {
        let eligible = names(&["b", "a"]);
        let metrics = HashMap::from([
            ("a".to_string(), with_latency(50, 3)),
            ("b".to_string(), with_latency(500, 3)),
        ]);
        for _ in 0..10 {
            assert_eq!(
                select(&LowestLatency, &eligible, &metrics).as_deref(),
                Some("a")
            );
        }
    }

    #[test]
    fn test_lowest_latency_unsampled_loses_to_sampled() {
        let eligible = names(&["fresh", "slow"]);
        let metrics = HashMap::from([("slow".to_string(), with_latency(5_000, 1))]);
        assert_eq!(
            select(&LowestLatency, &eligible, &metrics).as_deref(),
            Some("slow")
        );
        let only_fresh = names(&["fresh"]);
        assert_eq!(
            select(&LowestLatency, &only_fresh, &metrics).as_deref(),
            Some("fresh")
        );
    }

    #[test]
    fn test_lowest_cost_prefers_free() {
        let eligible = names(&["cloud", "local"]);
        let metrics = HashMap::from([
            ("cloud".to_string(), ProviderMetrics::new(0.6)),
            ("local".to_string(), ProviderMetrics::new(0.0)),
        ]);
        assert_eq!(
            select(&LowestCost, &eligible, &metrics).as_deref(),
            Some("local")
        );
    }

    #[test]
    fn test_load_balance_prefers_least_recent_traffic() {
        let eligible = names(&["busy", "idle"]);
        let metrics = HashMap::from([
            ("busy".to_string(), with_latency(10, 5)),
            ("idle".to_string(), with_latency(10, 1)),
        ]);
        assert_eq!(
            select(&LoadBalance, &eligible, &metrics).as_deref(),
            Some("idle")
        );
    }

    #[test]
    fn test_best_health_prefers_higher_score() {
        let eligible = names(&["flaky", "solid"]);
        let mut flaky = ProviderMetrics::default();
        flaky.record_success(Duration::from_millis(10), 0);
        flaky.record_failure(Duration::from_millis(10), "boom");
        let metrics = HashMap::from([
            ("flaky".to_string(), flaky),
            ("solid".to_string(), with_latency(10, 2)),
        ]);
        assert_eq!(
            select(&BestHealth, &eligible, &metrics).as_deref(),
            Some("solid")
        );
    }
}
