//! In-memory conversation store.
//!
//! One `tokio::sync::Mutex` per conversation serializes appends and
//! optimization passes in arrival order; different conversations never
//! contend. Snapshots are written on every mutation when a repository is
//! attached, best-effort: a failed write is logged and the mutation stands.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use switchyard_types::config::{ContextConfig, SessionConfig};
use switchyard_types::conversation::{Conversation, ContextOptimization, ConversationSnapshot};
use switchyard_types::error::RepositoryError;
use switchyard_types::llm::Message;

use super::snapshot::BoxSnapshotRepository;
use crate::context::optimizer::ContextOptimizer;
use crate::context::token_budget::TokenBudget;

pub struct ConversationStore {
    conversations: DashMap<String, Arc<Mutex<Conversation>>>,
    optimizer: ContextOptimizer,
    budget: TokenBudget,
    idle_timeout: TimeDelta,
    snapshots: Option<BoxSnapshotRepository>,
}

impl ConversationStore {
    pub fn new(context: &ContextConfig, sessions: &SessionConfig) -> Self {
        let idle_secs = i64::try_from(sessions.idle_timeout_secs).unwrap_or(i64::MAX);
        Self {
            conversations: DashMap::new(),
            optimizer: ContextOptimizer::new(context),
            budget: TokenBudget::from_config(context),
            idle_timeout: TimeDelta::try_seconds(idle_secs).unwrap_or(TimeDelta::MAX),
            snapshots: None,
        }
    }

    /// Persist every mutation to `repository`.
    pub fn with_snapshots(mut self, repository: BoxSnapshotRepository) -> Self {
        self.snapshots = Some(repository);
        self
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    pub fn optimizer(&self) -> &ContextOptimizer {
        &self.optimizer
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Known conversation ids, sorted.
    pub fn conversation_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .conversations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    fn entry(&self, id: &str) -> Arc<Mutex<Conversation>> {
        Arc::clone(
            self.conversations
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(id))))
                .value(),
        )
    }

    fn existing(&self, id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.conversations.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Append one user/assistant exchange, creating the conversation on
    /// first use. Returns the optimization report when the append pushed the
    /// conversation over its warning threshold.
    pub async fn append_exchange(
        &self,
        id: &str,
        user: impl Into<String>,
        assistant: impl Into<String>,
    ) -> Option<ContextOptimization> {
        let conversation = self.entry(id);
        let mut conversation = conversation.lock().await;
        conversation.messages.push(Message::user(user));
        conversation.messages.push(Message::assistant(assistant));
        conversation.metadata.exchange_count += 1;
        let report = self.fit_to_budget(&mut conversation);
        conversation.touch();
        self.persist(&conversation).await;
        report
    }

    /// Set (or replace) the conversation's system message.
    pub async fn set_system_message(&self, id: &str, text: impl Into<String>) {
        let conversation = self.entry(id);
        let mut conversation = conversation.lock().await;
        conversation.system_message = Some(Message::system(text));
        conversation.touch();
        self.persist(&conversation).await;
    }

    /// Ordered history, system message first. `None` for unknown ids.
    pub async fn get_history(&self, id: &str) -> Option<Vec<Message>> {
        let conversation = self.existing(id)?;
        let history = conversation.lock().await.history();
        Some(history)
    }

    pub async fn get(&self, id: &str) -> Option<Conversation> {
        let conversation = self.existing(id)?;
        let copy = conversation.lock().await.clone();
        Some(copy)
    }

    /// Drop a conversation and its snapshot. Returns whether it existed.
    pub async fn clear(&self, id: &str) -> bool {
        let existed = self.conversations.remove(id).is_some();
        self.delete_snapshot(id).await;
        if existed {
            tracing::info!(conversation = %id, "Conversation cleared");
        }
        existed
    }

    /// Remove conversations idle for longer than the configured window.
    pub async fn cleanup_idle(&self) -> Vec<String> {
        self.cleanup_idle_at(Utc::now()).await
    }

    /// [`cleanup_idle`](Self::cleanup_idle) against an explicit clock.
    pub async fn cleanup_idle_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let Some(cutoff) = now.checked_sub_signed(self.idle_timeout) else {
            return Vec::new();
        };
        let mut removed = Vec::new();
        self.conversations.retain(|id, conversation| {
            // A locked conversation is in use, hence not idle.
            let idle = conversation
                .try_lock()
                .is_ok_and(|c| c.metadata.last_updated < cutoff);
            if idle {
                removed.push(id.clone());
            }
            !idle
        });
        for id in &removed {
            self.delete_snapshot(id).await;
        }
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "Removed idle conversations");
        }
        removed
    }

    /// Load every stored snapshot. Conversations already in memory win.
    pub async fn restore(&self) -> Result<usize, RepositoryError> {
        let Some(repository) = &self.snapshots else {
            return Ok(0);
        };
        let snapshots = repository.load_all().await?;
        let mut restored = 0;
        for snapshot in snapshots {
            let conversation = Conversation::from(snapshot);
            let id = conversation.id.clone();
            if !self.conversations.contains_key(&id) {
                self.conversations
                    .insert(id, Arc::new(Mutex::new(conversation)));
                restored += 1;
            }
        }
        tracing::info!(restored, "Conversations restored from snapshots");
        Ok(restored)
    }

    /// Run [`cleanup_idle`](Self::cleanup_idle) every `interval` until
    /// `cancel` fires.
    pub fn spawn_cleanup(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; nothing is idle at startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Conversation cleanup stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.cleanup_idle().await;
                    }
                }
            }
        })
    }

    fn fit_to_budget(&self, conversation: &mut Conversation) -> Option<ContextOptimization> {
        let history = conversation.history();
        let tokens = self.optimizer.estimator().estimate_messages(&history);
        if !self.budget.should_optimize(tokens) {
            return None;
        }
        let optimized = self
            .optimizer
            .optimize(&history, self.budget.target_tokens, None);
        tracing::info!(
            conversation = %conversation.id,
            strategy = %optimized.report.strategy,
            original_tokens = optimized.report.original_tokens,
            optimized_tokens = optimized.report.optimized_tokens,
            "Conversation over budget, optimized"
        );
        conversation.replace_history(optimized.messages);
        Some(optimized.report)
    }

    async fn persist(&self, conversation: &Conversation) {
        let Some(repository) = &self.snapshots else {
            return;
        };
        let snapshot = ConversationSnapshot::from(conversation);
        if let Err(e) = repository.save(&snapshot).await {
            tracing::warn!(conversation = %conversation.id, error = %e, "Snapshot write failed");
        }
    }

    async fn delete_snapshot(&self, id: &str) {
        let Some(repository) = &self.snapshots else {
            return;
        };
        if let Err(e) = repository.delete(id).await {
            tracing::warn!(conversation = %id, error = %e, "Snapshot delete failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use switchyard_types::conversation::OptimizationStrategy;
    use switchyard_types::llm::MessageRole;

    use super::*;
    use crate::chat::snapshot::memory::MemorySnapshotRepository;

    fn store() -> ConversationStore {
        ConversationStore::new(&ContextConfig::default(), &SessionConfig::default())
    }

    fn padded(text: String) -> String {
        format!("{text:<100}")
    }

    #[tokio::test]
    async fn test_append_then_history_round_trip() {
        let store = store();
        store.set_system_message("c1", "Be brief.").await;
        store.append_exchange("c1", "hi", "hello").await;
        store.append_exchange("c1", "how are you", "fine").await;

        let history = store.get_history("c1").await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["Be brief.", "hi", "hello", "how are you", "fine"]);
        assert_eq!(history[0].role, MessageRole::System);
        assert_eq!(store.get("c1").await.unwrap().metadata.exchange_count, 2);
        assert!(store.get_history("unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_append_over_warning_threshold_optimizes() {
        let context = ContextConfig {
            max_tokens: 200,
            ..ContextConfig::default()
        };
        let store = ConversationStore::new(&context, &SessionConfig::default());

        // every message is 100 chars: 25 tokens + 4 role overhead
        for i in 0..3 {
            let report = store
                .append_exchange("c1", padded(format!("user {i}")), padded(format!("bot {i}")))
                .await;
            assert!(report.is_none());
        }
        let report = store
            .append_exchange("c1", padded("user 3".into()), padded("bot 3".into()))
            .await
            .unwrap();
        assert_eq!(report.strategy, OptimizationStrategy::SlidingWindow);
        assert_eq!(report.original_tokens, 232);
        assert!(report.optimized_tokens <= store.budget().target_tokens);

        let history = store.get_history("c1").await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history.last().unwrap().content, padded("bot 3".into()));
        assert_eq!(history[0].content, padded("bot 1".into()));
    }

    #[tokio::test]
    async fn test_cleanup_idle_is_idempotent() {
        let store = store();
        store.append_exchange("old", "a", "b").await;
        store.append_exchange("fresh", "a", "b").await;
        {
            let old = store.existing("old").unwrap();
            old.lock().await.metadata.last_updated = Utc::now() - TimeDelta::hours(48);
        }

        assert_eq!(store.cleanup_idle().await, vec!["old".to_string()]);
        assert!(store.cleanup_idle().await.is_empty());
        assert_eq!(store.conversation_ids(), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_busy_conversation_is_not_idle() {
        let store = store();
        store.append_exchange("busy", "a", "b").await;
        let busy = store.existing("busy").unwrap();
        let _guard = busy.lock().await;
        let later = Utc::now() + TimeDelta::days(3);
        assert!(store.cleanup_idle_at(later).await.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_removes_conversation_and_snapshot() {
        let repo = MemorySnapshotRepository::default();
        let store = store().with_snapshots(BoxSnapshotRepository::new(repo.clone()));
        store.append_exchange("c1", "a", "b").await;
        assert!(repo.rows.lock().contains_key("c1"));

        assert!(store.clear("c1").await);
        assert!(!store.clear("c1").await);
        assert!(repo.rows.lock().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_restore_into_new_store() {
        let repo = MemorySnapshotRepository::default();
        let first = store().with_snapshots(BoxSnapshotRepository::new(repo.clone()));
        first.set_system_message("c1", "sys").await;
        first.append_exchange("c1", "question", "answer").await;

        let snapshot = repo.rows.lock().get("c1").cloned().unwrap();
        assert_eq!(snapshot.messages.len(), 3);
        assert_eq!(snapshot.metadata.exchange_count, 1);

        let second = store().with_snapshots(BoxSnapshotRepository::new(repo.clone()));
        assert_eq!(second.restore().await.unwrap(), 1);
        let history = second.get_history("c1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].is_system());
        assert_eq!(history[2].content, "answer");
    }

    #[tokio::test]
    async fn test_snapshot_failure_does_not_fail_append() {
        let repo = MemorySnapshotRepository::default();
        repo.broken.store(true, Ordering::SeqCst);
        let store = store().with_snapshots(BoxSnapshotRepository::new(repo.clone()));
        store.append_exchange("c1", "a", "b").await;
        assert_eq!(store.get_history("c1").await.unwrap().len(), 2);
        assert!(store.restore().await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_serialized() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .append_exchange("shared", format!("q{i}"), format!("a{i}"))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = store.get_history("shared").await.unwrap();
        assert_eq!(history.len(), 20);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[1].content, pair[0].content.replacen('q', "a", 1));
        }
        assert_eq!(store.get("shared").await.unwrap().metadata.exchange_count, 10);
    }
}
