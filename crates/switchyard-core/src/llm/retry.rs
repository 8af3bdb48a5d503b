//! Retry policy: backoff schedule and retry/fallback decisions.
//!
//! Delay for attempt `n` (1-based) is
//! `min(base_delay * exponential_base^(n-1), max_delay)`, optionally scaled
//! by a uniform jitter factor in `[0.5, 1.0]`.

use std::time::Duration;

use rand::Rng;

use switchyard_types::config::RetryConfig;
use switchyard_types::error::{ErrorCategory, ErrorRecord, ErrorSeverity};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Un-jittered delay before retrying after failed attempt `attempt`.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.config.exponential_base.powi(exponent);
        let millis = (self.config.base_delay_ms as f64 * factor).min(self.config.max_delay_ms as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }

    /// Delay before retrying after failed attempt `attempt`, jittered when
    /// enabled. Always within `[0, max_delay]`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_for(attempt);
        if self.config.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }

    /// Whether to retry the same provider after `attempt` failed with
    /// `error`.
    pub fn should_retry(&self, error: &ErrorRecord, attempt: u32, breaker_rejects: bool) -> bool {
        attempt < self.config.max_attempts && error.is_retryable() && !breaker_rejects
    }

    /// Whether to move on to the next candidate.
    ///
    /// Never with no candidates left, never for validation errors.
    /// Otherwise when the category allows it, when the provider's breaker
    /// has tripped, or when the error is High/Critical severity.
    pub fn should_fallback(&self, error: &ErrorRecord, breaker_open: bool, remaining: usize) -> bool {
        if remaining == 0 || error.category() == ErrorCategory::Validation {
            return false;
        }
        error.allows_fallback() || breaker_open || error.severity() >= ErrorSeverity::High
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            exponential_base: 2.0,
            jitter,
        })
    }

    #[test]
    fn test_exponential_schedule_is_capped() {
        let p = policy(false);
        let delays: Vec<u64> = (1..=6).map(|n| p.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000, 10_000]);
    }

    #[test]
    fn test_delay_monotonic_and_bounded() {
        let p = policy(false);
        let mut previous = Duration::ZERO;
        for attempt in 1..50 {
            let delay = p.delay_for(attempt);
            assert!(delay >= previous);
            assert!(delay <= Duration::from_millis(10_000));
            previous = delay;
        }
    }

    #[test]
    fn test_jitter_stays_within_half_to_full() {
        let p = policy(true);
        for attempt in 1..20 {
            let base = p.base_delay_for(attempt);
            for _ in 0..20 {
                let delay = p.delay_for(attempt);
                assert!(delay <= base);
                assert!(delay >= base.mul_f64(0.5));
                assert!(delay <= Duration::from_millis(10_000));
            }
        }
    }

    #[test]
    fn test_should_retry_rules() {
        let p = policy(false);
        let transient = ErrorRecord::new(ErrorCategory::Connection, "refused");
        assert!(p.should_retry(&transient, 1, false));
        assert!(p.should_retry(&transient, 2, false));
        assert!(!p.should_retry(&transient, 3, false), "attempt limit");
        assert!(!p.should_retry(&transient, 1, true), "breaker rejects");

        let auth = ErrorRecord::new(ErrorCategory::Authentication, "bad key");
        assert!(!p.should_retry(&auth, 1, false));

        let overflow = ErrorRecord::new(ErrorCategory::ContextOverflow, "too long");
        assert!(!p.should_retry(&overflow, 1, false));
    }

    #[test]
    fn test_should_fallback_rules() {
        let p = policy(false);
        let validation = ErrorRecord::new(ErrorCategory::Validation, "bad temperature");
        assert!(!p.should_fallback(&validation, true, 3));

        let auth = ErrorRecord::new(ErrorCategory::Authentication, "bad key");
        assert!(p.should_fallback(&auth, false, 1));
        assert!(!p.should_fallback(&auth, false, 0), "nothing left");

        let unknown = ErrorRecord::new(ErrorCategory::Unknown, "??");
        assert!(p.should_fallback(&unknown, false, 2));
    }
}
