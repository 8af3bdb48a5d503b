//! Conversation snapshot port.
//!
//! Whole-conversation dumps keyed by conversation id. Implementations live in
//! switchyard-infra (e.g. `SqliteSnapshotRepository`). Uses the same RPITIT +
//! boxed-wrapper split as `LlmProvider` so the store can hold any backend.

use std::future::Future;
use std::pin::Pin;

use switchyard_types::conversation::ConversationSnapshot;
use switchyard_types::error::RepositoryError;

/// Durable storage for conversation snapshots.
pub trait SnapshotRepository: Send + Sync {
    /// Insert or replace the snapshot of one conversation.
    fn save(
        &self,
        snapshot: &ConversationSnapshot,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn load(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Option<ConversationSnapshot>, RepositoryError>> + Send;

    /// Delete a snapshot. Deleting a missing snapshot is not an error.
    fn delete(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Every stored snapshot, used to restore sessions on startup.
    fn load_all(
        &self,
    ) -> impl Future<Output = Result<Vec<ConversationSnapshot>, RepositoryError>> + Send;
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe version of [`SnapshotRepository`].
pub trait SnapshotRepositoryDyn: Send + Sync {
    fn save_boxed<'a>(
        &'a self,
        snapshot: &'a ConversationSnapshot,
    ) -> BoxFuture<'a, Result<(), RepositoryError>>;

    fn load_boxed<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ConversationSnapshot>, RepositoryError>>;

    fn delete_boxed<'a>(&'a self, conversation_id: &'a str)
    -> BoxFuture<'a, Result<(), RepositoryError>>;

    fn load_all_boxed(&self) -> BoxFuture<'_, Result<Vec<ConversationSnapshot>, RepositoryError>>;
}

impl<T: SnapshotRepository> SnapshotRepositoryDyn for T {
    fn save_boxed<'a>(
        &'a self,
        snapshot: &'a ConversationSnapshot,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(self.save(snapshot))
    }

    fn load_boxed<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ConversationSnapshot>, RepositoryError>> {
        Box::pin(self.load(conversation_id))
    }

    fn delete_boxed<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<(), RepositoryError>> {
        Box::pin(self.delete(conversation_id))
    }

    fn load_all_boxed(&self) -> BoxFuture<'_, Result<Vec<ConversationSnapshot>, RepositoryError>> {
        Box::pin(self.load_all())
    }
}

/// Type-erased snapshot repository.
pub struct BoxSnapshotRepository {
    inner: Box<dyn SnapshotRepositoryDyn>,
}

impl BoxSnapshotRepository {
    pub fn new<T: SnapshotRepository + 'static>(repository: T) -> Self {
        Self {
            inner: Box::new(repository),
        }
    }

    pub async fn save(&self, snapshot: &ConversationSnapshot) -> Result<(), RepositoryError> {
        self.inner.save_boxed(snapshot).await
    }

    pub async fn load(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>, RepositoryError> {
        self.inner.load_boxed(conversation_id).await
    }

    pub async fn delete(&self, conversation_id: &str) -> Result<(), RepositoryError> {
        self.inner.delete_boxed(conversation_id).await
    }

    pub async fn load_all(&self) -> Result<Vec<ConversationSnapshot>, RepositoryError> {
        self.inner.load_all_boxed().await
    }
}

impl std::fmt::Debug for BoxSnapshotRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxSnapshotRepository").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory repository for store tests.

    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default, Clone)]
    pub(crate) struct MemorySnapshotRepository {
        pub(crate) rows: Arc<Mutex<BTreeMap<String, ConversationSnapshot>>>,
        pub(crate) broken: Arc<AtomicBool>,
    }

    impl MemorySnapshotRepository {
        fn check(&self) -> Result<(), RepositoryError> {
            if self.broken.load(Ordering::SeqCst) {
                Err(RepositoryError::Connection)
            } else {
                Ok(())
            }
        }
    }

    impl SnapshotRepository for MemorySnapshotRepository {
        fn save(
            &self,
            snapshot: &ConversationSnapshot,
        ) -> impl Future<Output = Result<(), RepositoryError>> + Send {
            let result = self.check().map(|()| {
                self.rows
                    .lock()
                    .insert(snapshot.conversation_id.clone(), snapshot.clone());
            });
            async move { result }
        }

        fn load(
            &self,
            conversation_id: &str,
        ) -> impl Future<Output = Result<Option<ConversationSnapshot>, RepositoryError>> + Send
        {
            let result = self
                .check()
                .map(|()| self.rows.lock().get(conversation_id).cloned());
            async move { result }
        }

        fn delete(
            &self,
            conversation_id: &str,
        ) -> impl Future<Output = Result<(), RepositoryError>> + Send {
            let result = self.check().map(|()| {
                self.rows.lock().remove(conversation_id);
            });
            async move { result }
        }

        fn load_all(
            &self,
        ) -> impl Future<Output = Result<Vec<ConversationSnapshot>, RepositoryError>> + Send {
            let result = self
                .check()
                .map(|()| self.rows.lock().values().cloned().collect());
            async move { result }
        }
    }
}
