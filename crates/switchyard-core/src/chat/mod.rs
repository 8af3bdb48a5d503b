//! Conversation lifecycle.
//!
//! `ConversationStore` owns per-conversation history and keeps it inside the
//! token budget; `SnapshotRepository` is the persistence port that the
//! infrastructure layer implements.

pub mod snapshot;
pub mod store;
