//! Heuristic token estimation.
//!
//! Roughly 4 characters per token, rounded up. Text containing
//! reasoning-style vocabulary tends to tokenize denser, so it gets a 20%
//! overhead. Each message adds a small fixed overhead for its role framing.

use switchyard_types::llm::{Message, MessageRole};

const CHARS_PER_TOKEN: usize = 4;
const REASONING_OVERHEAD: f64 = 1.2;

const REASONING_KEYWORDS: &[&str] = &[
    "step",
    "analyze",
    "analyse",
    "reason",
    "think",
    "explain",
    "therefore",
    "because",
    "evaluate",
    "compare",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Estimated tokens of raw text.
    pub fn estimate_text(&self, text: &str) -> u32 {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        let base = chars.div_ceil(CHARS_PER_TOKEN) as f64;
        let lowered = text.to_lowercase();
        let tokens = if REASONING_KEYWORDS.iter().any(|k| lowered.contains(k)) {
            (base * REASONING_OVERHEAD).ceil()
        } else {
            base
        };
        tokens.min(f64::from(u32::MAX)) as u32
    }

    /// Fixed framing overhead per message role.
    pub fn role_overhead(&self, role: MessageRole) -> u32 {
        match role {
            MessageRole::System => 8,
            MessageRole::User | MessageRole::Assistant => 4,
        }
    }

    pub fn estimate_message(&self, message: &Message) -> u32 {
        self.estimate_text(&message.content)
            .saturating_add(self.role_overhead(message.role))
    }

    pub fn estimate_messages(&self, messages: &[Message]) -> u32 {
        messages
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(self.estimate_message(m)))
    }
}
