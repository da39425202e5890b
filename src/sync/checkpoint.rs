//! Sync checkpoint persistence
//!
//! One durable cursor per synchronized collection, kept apart from the task
//! store so each collection can own an independent cursor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sqlx::SqlitePool;

use super::types::Timestamp;
use crate::error::Result;

/// Key-value capability for sync cursors
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Stored cursor of `collection`, if it was ever synced
    async fn load(&self, collection: &str) -> Result<Option<Timestamp>>;

    /// Overwrite the cursor of `collection`
    async fn save(&self, collection: &str, cursor: Timestamp) -> Result<()>;
}

/// Cursor of a single collection
#[derive(Clone)]
pub struct Checkpoint {
    store: Arc<dyn CheckpointStore>,
    collection: String,
}

impl Checkpoint {
    pub fn new(store: Arc<dyn CheckpointStore>, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Current cursor, or the epoch for a never-synced collection
    pub async fn current(&self) -> Result<Timestamp> {
        Ok(self
            .store
            .load(&self.collection)
            .await?
            .unwrap_or_else(Timestamp::epoch))
    }

    /// Move the cursor forward to `to`.
    ///
    /// The cursor never moves backwards; a regressing value is ignored.
    /// Returns the cursor in effect afterwards.
    pub async fn advance(&self, to: Timestamp) -> Result<Timestamp> {
        let current = self.current().await?;
        if to < current {
            tracing::warn!(
                collection = %self.collection,
                current = %current,
                proposed = %to,
                "Ignoring checkpoint regression"
            );
            return Ok(current);
        }

        if to > current {
            self.store.save(&self.collection, to).await?;
        }
        Ok(to)
    }
}

/// SQLite-backed cursors in the `sync_checkpoints` table
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, collection: &str) -> Result<Option<Timestamp>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT cursor FROM sync_checkpoints WHERE collection = ?")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(cursor,)| match Timestamp::parse(&cursor) {
            Ok(ts) => Some(ts),
            Err(_) => {
                tracing::warn!("Discarding unreadable checkpoint for {}: {}", collection, cursor);
                None
            }
        }))
    }

    async fn save(&self, collection: &str, cursor: Timestamp) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_checkpoints (collection, cursor, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(collection) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(cursor.to_canonical())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Process-local cursors
#[derive(Default)]
pub struct MemoryCheckpointStore {
    cursors: RwLock<HashMap<String, Timestamp>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, collection: &str) -> Result<Option<Timestamp>> {
        Ok(self.cursors.read().get(collection).copied())
    }

    async fn save(&self, collection: &str, cursor: Timestamp) -> Result<()> {
        self.cursors.write().insert(collection.to_string(), cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    fn ts(s: &str) -> Timestamp {
        Timestamp::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_to_epoch() {
        let checkpoint = Checkpoint::new(Arc::new(MemoryCheckpointStore::new()), "tasks");
        assert_eq!(checkpoint.current().await.unwrap(), Timestamp::epoch());
    }

    #[tokio::test]
    async fn test_advance_never_regresses() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let checkpoint = Checkpoint::new(store.clone(), "tasks");

        checkpoint.advance(ts("2025-01-02T00:00:00.000Z")).await.unwrap();
        let kept = checkpoint.advance(ts("2025-01-01T00:00:00.000Z")).await.unwrap();

        assert_eq!(kept, ts("2025-01-02T00:00:00.000Z"));
        assert_eq!(
            store.load("tasks").await.unwrap(),
            Some(ts("2025-01-02T00:00:00.000Z"))
        );
    }

    #[tokio::test]
    async fn test_collections_are_independent() {
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let tasks = Checkpoint::new(store.clone(), "tasks");
        let plans = Checkpoint::new(store.clone(), "plans");

        tasks.advance(ts("2025-03-01T00:00:00.000Z")).await.unwrap();

        assert_eq!(plans.current().await.unwrap(), Timestamp::epoch());
        assert_eq!(tasks.current().await.unwrap(), ts("2025-03-01T00:00:00.000Z"));
    }

    #[tokio::test]
    async fn test_sqlite_cursor_persists_as_text() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let store = SqliteCheckpointStore::new(pool.clone());

        assert!(store.load("tasks").await.unwrap().is_none());
        store.save("tasks", ts("2025-01-01T00:00:00Z")).await.unwrap();

        let raw: (String,) =
            sqlx::query_as("SELECT cursor FROM sync_checkpoints WHERE collection = 'tasks'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(raw.0, "2025-01-01T00:00:00.000Z");

        let reopened = SqliteCheckpointStore::new(pool);
        assert_eq!(
            reopened.load("tasks").await.unwrap(),
            Some(ts("2025-01-01T00:00:00.000Z"))
        );
    }

    #[tokio::test]
    async fn test_sqlite_unreadable_cursor_is_absent() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        sqlx::query(
            "INSERT INTO sync_checkpoints (collection, cursor, updated_at) VALUES ('tasks', 'garbage', '')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let checkpoint = Checkpoint::new(Arc::new(SqliteCheckpointStore::new(pool)), "tasks");
        assert_eq!(checkpoint.current().await.unwrap(), Timestamp::epoch());
    }
}
