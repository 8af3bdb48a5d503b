//! Shared domain types for switchyard.
//!
//! This crate contains the types exchanged between the resilience core, the
//! infrastructure adapters and the CLI: messages, provider descriptors,
//! the error taxonomy, configuration, conversations and metric snapshots.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod metrics;
