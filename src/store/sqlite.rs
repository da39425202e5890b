//! SQLite storage for tasks
//!
//! Documents are stored as JSON alongside the indexed columns the sync
//! engine and the UI filter on.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::{SubscriberSet, Subscription, TaskPatch, TaskQuery, TaskSort, TaskStore};
use crate::error::{Result, SyncError};
use crate::sync::types::Task;

/// Repository for task persistence
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
    subscribers: SubscriberSet,
}

impl SqliteTaskStore {
    /// Create a store over a pool whose schema is already initialized
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            subscribers: SubscriberSet::new(),
        }
    }

    async fn query(&self, query: &TaskQuery, sort: Option<TaskSort>) -> Result<Vec<Task>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT doc FROM tasks WHERE 1 = 1");

        if let Some(user_id) = &query.user_id {
            qb.push(" AND user_id = ").push_bind(user_id.clone());
        }
        if let Some(plan_id) = &query.plan_id {
            qb.push(" AND plan_id = ").push_bind(plan_id.clone());
        }
        if let Some(since) = query.updated_after {
            qb.push(" AND updated_at > ").push_bind(since.to_canonical());
        }
        if let Some(deleted) = query.deleted {
            qb.push(" AND deleted = ").push_bind(deleted as i64);
        }

        qb.push(match sort {
            Some(TaskSort::UpdatedAtAsc) => " ORDER BY updated_at ASC, id ASC",
            Some(TaskSort::UpdatedAtDesc) => " ORDER BY updated_at DESC, id ASC",
            Some(TaskSort::CreatedAtAsc) => " ORDER BY created_at ASC, id ASC",
            None => " ORDER BY id ASC",
        });

        let rows: Vec<(String,)> = qb.build_query_as().fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(doc,)| serde_json::from_str(&doc).map_err(SyncError::from))
            .collect()
    }

    /// Re-run every live query and publish the results
    async fn notify(&self) {
        for (id, query) in self.subscribers.queries() {
            match self.query(&query, None).await {
                Ok(tasks) => self.subscribers.publish(id, tasks),
                Err(e) => tracing::warn!("Failed to refresh task subscription {}: {}", id, e),
            }
        }
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn find_one(&self, id: &str) -> Result<Option<Task>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT doc FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(doc,)| serde_json::from_str(&doc).map_err(SyncError::from))
            .transpose()
    }

    async fn find(&self, query: &TaskQuery, sort: Option<TaskSort>) -> Result<Vec<Task>> {
        self.query(query, sort).await
    }

    async fn insert(&self, task: Task) -> Result<()> {
        let doc = serde_json::to_string(&task)?;

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (id, user_id, plan_id, created_at, updated_at, deleted, doc)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.user_id)
        .bind(&task.plan_id)
        .bind(task.created_at.to_canonical())
        .bind(task.updated_at.to_canonical())
        .bind(task.deleted as i64)
        .bind(&doc)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(SyncError::DuplicateId(task.id));
            }
            Err(e) => return Err(e.into()),
        }

        self.notify().await;
        Ok(())
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> = sqlx::query_as("SELECT doc FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let (doc,) = row.ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        let mut task: Task = serde_json::from_str(&doc)?;
        patch.apply(&mut task);
        let doc = serde_json::to_string(&task)?;

        sqlx::query(
            r#"
            UPDATE tasks
            SET user_id = ?, plan_id = ?, created_at = ?, updated_at = ?, deleted = ?, doc = ?
            WHERE id = ?
            "#,
        )
        .bind(&task.user_id)
        .bind(&task.plan_id)
        .bind(task.created_at.to_canonical())
        .bind(task.updated_at.to_canonical())
        .bind(task.deleted as i64)
        .bind(&doc)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.notify().await;
        Ok(())
    }

    async fn subscribe(&self, query: TaskQuery) -> Result<Subscription> {
        let initial = self.query(&query, None).await?;
        Ok(self.subscribers.register(query, initial))
    }
}
