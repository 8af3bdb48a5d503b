//! Category-specific recovery strategies.
//!
//! Run after classification and before the retry/fallback decision. Each
//! strategy turns an error into a hint for the next attempt: a truncated
//! message list, a wait, a longer timeout, or "move on now".

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;

use switchyard_types::config::{RecoveryConfig, TruncationMethod};
use switchyard_types::error::{ErrorCategory, ErrorRecord};
use switchyard_types::llm::Message;

use crate::context::estimator::TokenEstimator;

/// Hint produced by a recovery strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Use this shorter message list from now on.
    Truncate {
        messages: Vec<Message>,
        target_tokens: u32,
    },
    /// Wait this long before the next attempt.
    Wait(Duration),
    /// Give the next attempt this timeout.
    ExtendTimeout(Duration),
    /// Skip further attempts on this provider.
    Fallback,
    None,
}

/// What a strategy may look at.
pub struct RecoveryContext<'a> {
    pub messages: &'a [Message],
    pub context_window: u32,
    pub current_timeout: Duration,
}

pub trait RecoveryStrategy: Send + Sync {
    fn recover(&self, error: &ErrorRecord, ctx: &RecoveryContext<'_>) -> RecoveryAction;
}

/// ContextOverflow: cut the outgoing messages to `ratio` of the window.
pub struct TruncateContext {
    pub ratio: f64,
    pub method: TruncationMethod,
    pub estimator: TokenEstimator,
}

impl TruncateContext {
    /// Keep messages in `order` while they fit; the returned list is in the
    /// original order.
    fn fill(
        &self,
        messages: &[Message],
        order: impl Iterator<Item = usize>,
        mut keep: Vec<bool>,
        mut used: u32,
        target: u32,
    ) -> Vec<Message> {
        for i in order {
            if keep[i] {
                continue;
            }
            let tokens = self.estimator.estimate_message(&messages[i]);
            if used.saturating_add(tokens) > target {
                break;
            }
            used += tokens;
            keep[i] = true;
        }
        messages
            .iter()
            .zip(keep)
            .filter(|(_, k)| *k)
            .map(|(m, _)| m.clone())
            .collect()
    }

    pub fn truncate(&self, messages: &[Message], target: u32) -> Vec<Message> {
        let n = messages.len();
        let none = vec![false; n];
        let truncated = match self.method {
            TruncationMethod::Head => self.fill(messages, 0..n, none, 0, target),
            TruncationMethod::Tail => self.fill(messages, (0..n).rev(), none, 0, target),
            TruncationMethod::Smart => {
                let keep: Vec<bool> = messages.iter().map(Message::is_system).collect();
                let used = messages
                    .iter()
                    .filter(|m| m.is_system())
                    .map(|m| self.estimator.estimate_message(m))
                    .sum();
                self.fill(messages, (0..n).rev(), keep, used, target)
            }
        };
        // An empty request is never useful; keep the newest message at least.
        if truncated.iter().all(Message::is_system) {
            if let Some(last) = messages.last().filter(|m| !m.is_system()) {
                let mut out = truncated;
                out.push(last.clone());
                return out;
            }
        }
        truncated
    }
}

impl RecoveryStrategy for TruncateContext {
    fn recover(&self, error: &ErrorRecord, ctx: &RecoveryContext<'_>) -> RecoveryAction {
        let window = error
            .detail("max_tokens")
            .and_then(|v| v.as_u64())
            .map_or(ctx.context_window, |v| v.min(u64::from(u32::MAX)) as u32);
        let target_tokens = (f64::from(window) * self.ratio) as u32;
        let messages = self.truncate(ctx.messages, target_tokens);
        if messages.len() == ctx.messages.len() {
            return RecoveryAction::None;
        }
        RecoveryAction::Truncate {
            messages,
            target_tokens,
        }
    }
}

/// RateLimit: provider retry-after (or the default) plus uniform jitter.
pub struct WaitForRateLimit {
    pub default_wait: Duration,
    pub max_jitter: Duration,
}

impl WaitForRateLimit {
    pub fn base_wait(&self, error: &ErrorRecord) -> Duration {
        error
            .detail("retry_after_ms")
            .and_then(|v| v.as_u64())
            .map_or(self.default_wait, Duration::from_millis)
    }
}

impl RecoveryStrategy for WaitForRateLimit {
    fn recover(&self, error: &ErrorRecord, _ctx: &RecoveryContext<'_>) -> RecoveryAction {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        RecoveryAction::Wait(self.base_wait(error) + jitter)
    }
}

/// Timeout: grow the per-attempt timeout, capped.
pub struct ExtendTimeout {
    pub multiplier: f64,
    pub max_timeout: Duration,
}

impl RecoveryStrategy for ExtendTimeout {
    fn recover(&self, _error: &ErrorRecord, ctx: &RecoveryContext<'_>) -> RecoveryAction {
        let extended = ctx.current_timeout.mul_f64(self.multiplier).min(self.max_timeout);
        if extended <= ctx.current_timeout {
            return RecoveryAction::None;
        }
        RecoveryAction::ExtendTimeout(extended)
    }
}

/// Authentication / QuotaExceeded: no point retrying this provider.
pub struct ForceFallback;

impl RecoveryStrategy for ForceFallback {
    fn recover(&self, _error: &ErrorRecord, _ctx: &RecoveryContext<'_>) -> RecoveryAction {
        RecoveryAction::Fallback
    }
}

/// Recovery strategies keyed by error category.
pub struct RecoveryRegistry {
    strategies: HashMap<ErrorCategory, Box<dyn RecoveryStrategy>>,
}

impl RecoveryRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// The standard strategy set.
    pub fn from_config(config: &RecoveryConfig, estimator: TokenEstimator) -> Self {
        let mut registry = Self::empty();
        registry.register(
            ErrorCategory::ContextOverflow,
            TruncateContext {
                ratio: config.truncation_ratio,
                method: config.truncation_method,
                estimator,
            },
        );
        registry.register(
            ErrorCategory::RateLimit,
            WaitForRateLimit {
                default_wait: Duration::from_secs(config.rate_limit_wait_secs),
                max_jitter: Duration::from_secs(config.rate_limit_jitter_secs),
            },
        );
        registry.register(
            ErrorCategory::Timeout,
            ExtendTimeout {
                multiplier: config.timeout_multiplier,
                max_timeout: Duration::from_secs(config.max_timeout_secs),
            },
        );
        registry.register(ErrorCategory::Authentication, ForceFallback);
        registry.register(ErrorCategory::QuotaExceeded, ForceFallback);
        registry
    }

    pub fn register(&mut self, category: ErrorCategory, strategy: impl RecoveryStrategy + 'static) {
        self.strategies.insert(category, Box::new(strategy));
    }

    pub fn recover(&self, error: &ErrorRecord, ctx: &RecoveryContext<'_>) -> RecoveryAction {
        self.strategies
            .get(&error.category())
            .map_or(RecoveryAction::None, |s| s.recover(error, ctx))
    }
}
