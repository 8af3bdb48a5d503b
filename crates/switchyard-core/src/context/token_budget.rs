//! Token budget thresholds for a conversation.

use switchyard_types::config::ContextConfig;

/// Budget of one conversation.
///
/// - `warning_tokens` (default 90% of max): above this an optimization pass runs
/// - `target_tokens` (default 80% of max): what an optimization pass aims for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    pub max_tokens: u32,
    pub target_tokens: u32,
    pub warning_tokens: u32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32, target_ratio: f64, warning_ratio: f64) -> Self {
        Self {
            max_tokens,
            target_tokens: (f64::from(max_tokens) * target_ratio) as u32,
            warning_tokens: (f64::from(max_tokens) * warning_ratio) as u32,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            target_tokens: config.target_tokens(),
            warning_tokens: config.warning_tokens(),
        }
    }

    /// Tokens left before `max_tokens` given current usage.
    pub fn remaining(&self, used: u32) -> u32 {
        self.max_tokens.saturating_sub(used)
    }

    /// Whether a conversation of `tokens` must be optimized.
    pub fn should_optimize(&self, tokens: u32) -> bool {
        tokens > self.warning_tokens
    }
}
