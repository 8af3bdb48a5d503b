//! Conversation, snapshot and context optimization types.
//!
//! A conversation is an ordered message history (oldest first) plus an
//! optional system message. Order is never changed, only pruned or
//! summarized by the context optimizer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::{Message, MessageRole};

/// Lifecycle metadata of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Completed user/assistant exchanges, including optimized-away ones.
    pub exchange_count: u32,
}

impl ConversationMetadata {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_updated: now,
            exchange_count: 0,
        }
    }
}

/// A multi-turn conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<Message>,
    /// Non-system history plus synthetic summary messages, oldest first.
    pub messages: Vec<Message>,
    pub metadata: ConversationMetadata,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system_message: None,
            messages: Vec::new(),
            metadata: ConversationMetadata::now(),
        }
    }

    /// Full ordered history, system message first.
    pub fn history(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system_message {
            out.push(system.clone());
        }
        out.extend(self.messages.iter().cloned());
        out
    }

    pub fn len(&self) -> usize {
        self.messages.len() + usize::from(self.system_message.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn touch(&mut self) {
        self.metadata.last_updated = Utc::now();
    }

    /// Replace the history with an optimized message list, pulling the
    /// leading configured system message back out.
    pub fn replace_history(&mut self, history: Vec<Message>) {
        let mut messages = history.into_iter().peekable();
        if let Some(current) = &self.system_message {
            if messages.peek() == Some(current) {
                messages.next();
            }
        }
        self.messages = messages.collect();
    }
}

/// Whole-conversation dump written to durable storage.
///
/// `messages` holds the full history (system message first) as
/// `{role, content}` records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    pub conversation_id: String,
    pub messages: Vec<SnapshotMessage>,
    pub metadata: ConversationMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    pub role: MessageRole,
    pub content: String,
}

impl From<&Conversation> for ConversationSnapshot {
    fn from(conversation: &Conversation) -> Self {
        Self {
            conversation_id: conversation.id.clone(),
            messages: conversation
                .history()
                .into_iter()
                .map(|m| SnapshotMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            metadata: conversation.metadata.clone(),
        }
    }
}

impl From<ConversationSnapshot> for Conversation {
    fn from(snapshot: ConversationSnapshot) -> Self {
        let mut messages: Vec<Message> = snapshot
            .messages
            .into_iter()
            .map(|m| Message {
                role: m.role,
                content: m.content,
                timestamp: None,
            })
            .collect();
        let system_message = if messages
            .first()
            .is_some_and(|m| m.is_system() && !m.is_summary())
        {
            Some(messages.remove(0))
        } else {
            None
        };
        Self {
            id: snapshot.conversation_id,
            system_message,
            messages,
            metadata: snapshot.metadata,
        }
    }
}

/// Context optimization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStrategy {
    Fifo,
    SlidingWindow,
    Importance,
    Summarize,
    Hybrid,
}

impl fmt::Display for OptimizationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStrategy::Fifo => write!(f, "fifo"),
            OptimizationStrategy::SlidingWindow => write!(f, "sliding_window"),
            OptimizationStrategy::Importance => write!(f, "importance"),
            OptimizationStrategy::Summarize => write!(f, "summarize"),
            OptimizationStrategy::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl FromStr for OptimizationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fifo" => Ok(OptimizationStrategy::Fifo),
            "sliding_window" => Ok(OptimizationStrategy::SlidingWindow),
            "importance" => Ok(OptimizationStrategy::Importance),
            "summarize" => Ok(OptimizationStrategy::Summarize),
            "hybrid" => Ok(OptimizationStrategy::Hybrid),
            other => Err(format!("invalid optimization strategy: '{other}'")),
        }
    }
}

/// Relevance bucket of a message. Ordered: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportanceLevel {
    Low,
    Medium,
    High,
    /// System messages.
    Critical,
}

/// Report produced by one optimization pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextOptimization {
    pub strategy: OptimizationStrategy,
    pub original_tokens: u32,
    pub optimized_tokens: u32,
    /// `optimized / original`; 1.0 when nothing was there to compress.
    pub compression_ratio: f64,
    pub preserved_messages: usize,
    pub summarized_messages: usize,
    pub removed_messages: usize,
}

impl ContextOptimization {
    pub fn new(
        strategy: OptimizationStrategy,
        original_tokens: u32,
        optimized_tokens: u32,
    ) -> Self {
        let compression_ratio = if original_tokens == 0 {
            1.0
        } else {
            f64::from(optimized_tokens) / f64::from(original_tokens)
        };
        Self {
            strategy,
            original_tokens,
            optimized_tokens,
            compression_ratio,
            preserved_messages: 0,
            summarized_messages: 0,
            removed_messages: 0,
        }
    }

    pub fn tokens_saved(&self) -> u32 {
        self.original_tokens.saturating_sub(self.optimized_tokens)
    }
}
