//! Context optimizer: fits a message history into a token target.
//!
//! Strategies work on message indices and always emit the kept originals
//! in their original order. With `preserve_system`, every original system
//! message is kept even when that overshoots the target; synthetic summary
//! messages from earlier passes are not pinned and may be folded into a new
//! summary. A pass never returns more tokens than it was given.

use std::cmp::Ordering;

use switchyard_types::config::ContextConfig;
use switchyard_types::conversation::{ContextOptimization, ImportanceLevel, OptimizationStrategy};
use switchyard_types::llm::Message;

use super::estimator::TokenEstimator;
use super::importance::ImportanceScorer;
use super::summarizer::{ExtractiveSummarizer, split_for_summary};

/// Histories this short are never optimized.
const MIN_MESSAGES_TO_OPTIMIZE: usize = 2;
/// Up to this many non-system messages a plain sliding window is enough.
const SHORT_CONVERSATION: usize = 20;
/// Above this many messages the hybrid strategy is preferred.
const LONG_CONVERSATION: usize = 40;
/// A message above this many tokens counts as long.
const LONG_MESSAGE_TOKENS: u32 = 150;
const LONG_MESSAGE_SHARE: f64 = 0.3;

/// Result of one optimization pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedContext {
    pub messages: Vec<Message>,
    pub report: ContextOptimization,
}

#[derive(Debug, Clone)]
pub struct ContextOptimizer {
    estimator: TokenEstimator,
    scorer: ImportanceScorer,
    summarizer: ExtractiveSummarizer,
    preserve_system: bool,
    keep_recent: usize,
    hybrid_keep_recent: usize,
}

impl ContextOptimizer {
    pub fn new(config: &ContextConfig) -> Self {
        let estimator = TokenEstimator::new();
        Self {
            estimator,
            scorer: ImportanceScorer::new(),
            summarizer: ExtractiveSummarizer::new(estimator, config.summary_max_tokens),
            preserve_system: config.preserve_system,
            keep_recent: config.keep_recent,
            hybrid_keep_recent: config.hybrid_keep_recent,
        }
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    fn is_pinned(&self, message: &Message) -> bool {
        self.preserve_system && message.is_system() && !message.is_summary()
    }

    /// Pick a strategy from conversation length and message sizes.
    pub fn suggest_strategy(&self, messages: &[Message]) -> OptimizationStrategy {
        let non_system: Vec<&Message> = messages.iter().filter(|m| !m.is_system()).collect();
        if non_system.len() <= SHORT_CONVERSATION {
            return OptimizationStrategy::SlidingWindow;
        }
        let long = non_system
            .iter()
            .filter(|m| self.estimator.estimate_message(m) > LONG_MESSAGE_TOKENS)
            .count();
        if long as f64 / non_system.len() as f64 > LONG_MESSAGE_SHARE {
            OptimizationStrategy::Importance
        } else if messages.len() > LONG_CONVERSATION {
            OptimizationStrategy::Hybrid
        } else {
            OptimizationStrategy::Summarize
        }
    }

    /// Fit `messages` into `target_tokens` with `strategy`, or the suggested
    /// strategy when `None`.
    pub fn optimize(
        &self,
        messages: &[Message],
        target_tokens: u32,
        strategy: Option<OptimizationStrategy>,
    ) -> OptimizedContext {
        let strategy = strategy.unwrap_or_else(|| self.suggest_strategy(messages));
        let original_tokens = self.estimator.estimate_messages(messages);

        if messages.len() <= MIN_MESSAGES_TO_OPTIMIZE {
            return self.unchanged(messages, strategy, original_tokens);
        }

        let (optimized, summarized) = match strategy {
            OptimizationStrategy::Fifo => (self.select(messages, &self.fifo(messages, target_tokens)), 0),
            OptimizationStrategy::SlidingWindow => (
                self.select(messages, &self.sliding_window(messages, target_tokens)),
                0,
            ),
            OptimizationStrategy::Importance => (
                self.select(messages, &self.importance(messages, target_tokens)),
                0,
            ),
            OptimizationStrategy::Summarize => self.summarize(messages, self.keep_recent),
            OptimizationStrategy::Hybrid => self.hybrid(messages, target_tokens),
        };

        let optimized_tokens = self.estimator.estimate_messages(&optimized);
        if optimized_tokens > original_tokens {
            tracing::debug!(
                %strategy,
                original_tokens,
                optimized_tokens,
                "Optimization would grow the context, keeping original"
            );
            return self.unchanged(messages, strategy, original_tokens);
        }

        let preserved = optimized
            .iter()
            .filter(|m| messages.contains(m))
            .count();
        let mut report = ContextOptimization::new(strategy, original_tokens, optimized_tokens);
        report.preserved_messages = preserved;
        report.summarized_messages = summarized;
        report.removed_messages = messages.len().saturating_sub(preserved + summarized);

        tracing::debug!(
            %strategy,
            original_tokens,
            optimized_tokens,
            removed = report.removed_messages,
            summarized,
            "Context optimized"
        );

        OptimizedContext {
            messages: optimized,
            report,
        }
    }

    fn unchanged(
        &self,
        messages: &[Message],
        strategy: OptimizationStrategy,
        tokens: u32,
    ) -> OptimizedContext {
        let mut report = ContextOptimization::new(strategy, tokens, tokens);
        report.preserved_messages = messages.len();
        OptimizedContext {
            messages: messages.to_vec(),
            report,
        }
    }

    fn select(&self, messages: &[Message], keep: &[bool]) -> Vec<Message> {
        messages
            .iter()
            .zip(keep)
            .filter(|(_, keep)| **keep)
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// Pinned messages are kept up front; returns the keep mask and the
    /// budget they used.
    fn pin(&self, messages: &[Message]) -> (Vec<bool>, u32) {
        let mut used = 0u32;
        let keep = messages
            .iter()
            .map(|m| {
                let pinned = self.is_pinned(m);
                if pinned {
                    used = used.saturating_add(self.estimator.estimate_message(m));
                }
                pinned
            })
            .collect();
        (keep, used)
    }

    /// Earliest messages first, stopping at the first one that does not fit.
    fn fifo(&self, messages: &[Message], target: u32) -> Vec<bool> {
        let (mut keep, mut used) = self.pin(messages);
        for (i, message) in messages.iter().enumerate() {
            if keep[i] {
                continue;
            }
            let tokens = self.estimator.estimate_message(message);
            if used.saturating_add(tokens) > target {
                break;
            }
            used += tokens;
            keep[i] = true;
        }
        keep
    }

    /// Most recent messages first, working backward until one does not fit.
    fn sliding_window(&self, messages: &[Message], target: u32) -> Vec<bool> {
        let (mut keep, mut used) = self.pin(messages);
        for (i, message) in messages.iter().enumerate().rev() {
            if keep[i] {
                continue;
            }
            let tokens = self.estimator.estimate_message(message);
            if used.saturating_add(tokens) > target {
                break;
            }
            used += tokens;
            keep[i] = true;
        }
        keep
    }

    /// Highest importance first (then higher score, then more recent),
    /// greedily keeping every message that still fits.
    fn importance(&self, messages: &[Message], target: u32) -> Vec<bool> {
        let (mut keep, mut used) = self.pin(messages);
        let mut ranked: Vec<(usize, ImportanceLevel, f64)> = messages
            .iter()
            .enumerate()
            .filter(|(i, _)| !keep[*i])
            .map(|(i, m)| (i, self.scorer.classify(m), self.scorer.score(m)))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal))
                .then_with(|| b.0.cmp(&a.0))
        });
        for (i, _, _) in ranked {
            let tokens = self.estimator.estimate_message(&messages[i]);
            if used.saturating_add(tokens) <= target {
                used += tokens;
                keep[i] = true;
            }
        }
        keep
    }

    /// Keep the newest `keep_recent` verbatim and replace the older
    /// unpinned messages with one summary. Returns the new list and the
    /// number of messages folded into the summary.
    fn summarize(&self, messages: &[Message], keep_recent: usize) -> (Vec<Message>, usize) {
        let (older, recent) = split_for_summary(messages, keep_recent);

        let (pinned, folded): (Vec<&Message>, Vec<&Message>) =
            older.iter().partition(|m| self.is_pinned(m));
        if folded.is_empty() {
            return (messages.to_vec(), 0);
        }

        let folded: Vec<Message> = folded.into_iter().cloned().collect();
        let mut out: Vec<Message> = pinned.into_iter().cloned().collect();
        out.push(self.summarizer.summary_message(&folded));
        out.extend(recent.iter().cloned());
        (out, folded.len())
    }

    fn hybrid(&self, messages: &[Message], target: u32) -> (Vec<Message>, usize) {
        let (summarized, folded) = self.summarize(messages, self.hybrid_keep_recent);
        if self.estimator.estimate_messages(&summarized) <= target {
            return (summarized, folded);
        }
        let keep = self.importance(&summarized, target);
        (self.select(&summarized, &keep), folded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimizer() -> ContextOptimizer {
        ContextOptimizer::new(&ContextConfig::default())
    }

    fn chat(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question number {i}"))
                } else {
                    Message::assistant(format!("answer number {i}"))
                }
            })
            .collect()
    }

    fn with_system(mut messages: Vec<Message>) -> Vec<Message> {
        messages.insert(0, Message::system("You are a terse assistant."));
        messages
    }

    fn is_subsequence(sub: &[Message], full: &[Message]) -> bool {
        let mut it = full.iter();
        sub.iter()
            .filter(|m| !m.is_summary())
            .all(|m| it.any(|f| f == m))
    }

    const ALL: [OptimizationStrategy; 5] = [
        OptimizationStrategy::Fifo,
        OptimizationStrategy::SlidingWindow,
        OptimizationStrategy::Importance,
        OptimizationStrategy::Summarize,
        OptimizationStrategy::Hybrid,
    ];

    #[test]
    fn test_never_grows_and_keeps_system_and_order() {
        let opt = optimizer();
        let messages = with_system(chat(50));
        for strategy in ALL {
            for target in [0, 40, 150, 400, 10_000] {
                let result = opt.optimize(&messages, target, Some(strategy));
                assert!(
                    result.report.optimized_tokens <= result.report.original_tokens,
                    "{strategy} at {target}"
                );
                assert_eq!(
                    result.messages[0].content, "You are a terse assistant.",
                    "{strategy} at {target}"
                );
                assert!(is_subsequence(&result.messages, &messages), "{strategy}");
            }
        }
    }

    #[test]
    fn test_two_messages_untouched() {
        let opt = optimizer();
        let messages = chat(2);
        for strategy in ALL {
            let result = opt.optimize(&messages, 0, Some(strategy));
            assert_eq!(result.messages, messages);
            assert_eq!(result.report.removed_messages, 0);
        }
    }

    #[test]
    fn test_fifo_keeps_earliest() {
        let opt = optimizer();
        let messages = chat(10);
        let per = opt.estimator().estimate_message(&messages[0]);
        let result = opt.optimize(&messages, per * 3 + 1, Some(OptimizationStrategy::Fifo));
        assert_eq!(result.messages[0], messages[0]);
        assert!(result.messages.len() <= 3);
        assert!(result.report.optimized_tokens <= per * 3 + 1);
    }

    #[test]
    fn test_sliding_window_keeps_latest() {
        let opt = optimizer();
        let messages = with_system(chat(30));
        let result = opt.optimize(&messages, 60, Some(OptimizationStrategy::SlidingWindow));
        assert!(result.messages[0].is_system());
        assert_eq!(result.messages.last(), messages.last());
        assert!(result.report.optimized_tokens <= 60);
        assert!(result.report.removed_messages > 0);
    }

    #[test]
    fn test_system_kept_even_over_budget() {
        let opt = optimizer();
        let messages = with_system(chat(5));
        let result = opt.optimize(&messages, 1, Some(OptimizationStrategy::SlidingWindow));
        assert_eq!(result.messages.len(), 1);
        assert!(result.messages[0].is_system());
    }

    #[test]
    fn test_importance_prefers_important_messages() {
        let opt = optimizer();
        let messages = vec![
            Message::user("ok thanks"),
            Message::user("Important: remember the deadline is Friday, it must not slip!"),
            Message::assistant("cool"),
            Message::user("lol"),
        ];
        let budget = opt.estimator().estimate_message(&messages[1]);
        let result = opt.optimize(&messages, budget, Some(OptimizationStrategy::Importance));
        assert_eq!(result.messages, vec![messages[1].clone()]);
    }

    #[test]
    fn test_summarize_keeps_recent_and_adds_summary() {
        let opt = optimizer();
        let messages = with_system(chat(40));
        let result = opt.optimize(&messages, 10_000, Some(OptimizationStrategy::Summarize));
        // system + summary + 15 recent
        assert_eq!(result.messages.len(), 17);
        assert!(result.messages[0].content.starts_with("You are"));
        assert!(result.messages[1].is_summary());
        assert_eq!(&result.messages[2..], &messages[messages.len() - 15..]);
        assert_eq!(result.report.summarized_messages, 25);
    }

    #[test]
    fn test_hybrid_sixty_messages_thousand_token_budget() {
        let opt = optimizer();
        let messages = chat(60);
        let result = opt.optimize(&messages, 1_000, Some(OptimizationStrategy::Hybrid));
        assert!(result.messages.len() <= 25);
        assert_eq!(result.messages.iter().filter(|m| m.is_summary()).count(), 1);
        assert_eq!(
            &result.messages[result.messages.len() - 20..],
            &messages[40..]
        );
        assert!(result.report.optimized_tokens <= 1_000);
    }

    #[test]
    fn test_resummarizing_folds_previous_summary() {
        let opt = optimizer();
        let first = opt.optimize(&chat(60), 10_000, Some(OptimizationStrategy::Summarize));
        let mut grown = first.messages.clone();
        grown.extend(chat(30));
        let second = opt.optimize(&grown, 10_000, Some(OptimizationStrategy::Summarize));
        assert_eq!(second.messages.iter().filter(|m| m.is_summary()).count(), 1);
    }

    #[test]
    fn test_resummarizing_keeps_earliest_question() {
        let opt = optimizer();
        let mut messages = vec![
            Message::user("How do I rotate the zebracredential?"),
            Message::assistant("Run the rotation job from the admin console."),
        ];
        messages.extend(chat(40));
        let first = opt.optimize(&messages, 10_000, Some(OptimizationStrategy::Summarize));

        let mut grown = first.messages.clone();
        grown.extend(chat(40));
        let second = opt.optimize(&grown, 10_000, Some(OptimizationStrategy::Summarize));

        let summaries: Vec<&Message> = second.messages.iter().filter(|m| m.is_summary()).collect();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].content.contains("How do I rotate the zebracredential?"));
        assert!(summaries[0].content.contains("Run the rotation job from the admin console."));
    }

    #[test]
    fn test_suggest_strategy() {
        let opt = optimizer();
        assert_eq!(
            opt.suggest_strategy(&with_system(chat(20))),
            OptimizationStrategy::SlidingWindow
        );
        assert_eq!(opt.suggest_strategy(&chat(30)), OptimizationStrategy::Summarize);
        assert_eq!(opt.suggest_strategy(&chat(60)), OptimizationStrategy::Hybrid);

        let long: Vec<Message> = (0..30)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user("x".repeat(800))
                } else {
                    Message::assistant("short")
                }
            })
            .collect();
        assert_eq!(opt.suggest_strategy(&long), OptimizationStrategy::Importance);
    }
}
