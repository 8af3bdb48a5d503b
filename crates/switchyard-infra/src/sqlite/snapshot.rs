//! SQLite conversation snapshot repository.
//!
//! Implements `SnapshotRepository` from `switchyard-core`. Each conversation
//! is one row; the whole snapshot is stored as JSON text and replaced on
//! every save.

use chrono::{DateTime, Utc};
use sqlx::Row;

use switchyard_core::chat::snapshot::SnapshotRepository;
use switchyard_types::conversation::ConversationSnapshot;
use switchyard_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SnapshotRepository`.
pub struct SqliteSnapshotRepository {
    pool: DatabasePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct SnapshotRow {
    conversation_id: String,
    payload: String,
    updated_at: String,
}

impl SnapshotRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            conversation_id: row.try_get("conversation_id")?,
            payload: row.try_get("payload")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_snapshot(self) -> Result<ConversationSnapshot, RepositoryError> {
        let mut snapshot: ConversationSnapshot = serde_json::from_str(&self.payload)
            .map_err(|e| RepositoryError::Serialization(format!("invalid snapshot payload: {e}")))?;
        // The key column is authoritative.
        snapshot.conversation_id = self.conversation_id;
        snapshot.metadata.last_updated = parse_datetime(&self.updated_at)?;
        Ok(snapshot)
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl SnapshotRepository for SqliteSnapshotRepository {
    async fn save(&self, snapshot: &ConversationSnapshot) -> Result<(), RepositoryError> {
        let payload = serde_json::to_string(snapshot)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO conversation_snapshots
                   (conversation_id, payload, message_count, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (conversation_id) DO UPDATE SET
                   payload = excluded.payload,
                   message_count = excluded.message_count,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&snapshot.conversation_id)
        .bind(&payload)
        .bind(snapshot.messages.len() as i64)
        .bind(format_datetime(&snapshot.metadata.created_at))
        .bind(format_datetime(&snapshot.metadata.last_updated))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn load(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT conversation_id, payload, updated_at FROM conversation_snapshots WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let row = SnapshotRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(row.into_snapshot()?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM conversation_snapshots WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ConversationSnapshot>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT conversation_id, payload, updated_at FROM conversation_snapshots ORDER BY updated_at",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            let row = SnapshotRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            match row.into_snapshot() {
                Ok(snapshot) => snapshots.push(snapshot),
                // One corrupt row must not block restoring the others.
                Err(err) => tracing::warn!("skipping unreadable snapshot: {err}"),
            }
        }
        Ok(snapshots)
    }
}
