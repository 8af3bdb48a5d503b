//! Context-window budgeting.
//!
//! - `TokenBudget`: target and warning thresholds of a token budget
//! - `TokenEstimator`: heuristic token counts from character counts
//! - `ImportanceScorer`: relevance buckets used for retention decisions
//! - `summarizer`: extractive summaries of pruned history
//! - `ContextOptimizer`: the FIFO/sliding-window/importance/summarize/hybrid strategies

pub mod estimator;
pub mod importance;
pub mod optimizer;
pub mod summarizer;
pub mod token_budget;
