//! Local task store
//!
//! The engine and the UI collaborators reach the local collection only
//! through [`TaskStore`]: point lookup, predicate queries with sort, insert,
//! partial update and live subscriptions.
//!
//! Subscriptions always deliver the complete current result set for their
//! query, never deltas.

mod memory;
mod sqlite;
mod subscription;

pub use memory::MemoryTaskStore;
pub use sqlite::SqliteTaskStore;
pub use subscription::{SubscriberSet, Subscription};

use async_trait::async_trait;

use crate::error::Result;
use crate::sync::types::{ChecklistItem, Position, Task, Timestamp};

/// Local document store contract
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Look up a task by id
    async fn find_one(&self, id: &str) -> Result<Option<Task>>;

    /// All tasks matching `query`; ordered by id when no sort is given
    async fn find(&self, query: &TaskQuery, sort: Option<TaskSort>) -> Result<Vec<Task>>;

    /// Insert a new task; fails with `DuplicateId` if the id exists
    async fn insert(&self, task: Task) -> Result<()>;

    /// Merge `patch` into an existing task; fails with `NotFound` otherwise
    async fn update(&self, id: &str, patch: TaskPatch) -> Result<()>;

    /// Watch the full result set of `query`
    async fn subscribe(&self, query: TaskQuery) -> Result<Subscription>;
}

/// Predicate for [`TaskStore::find`] and [`TaskStore::subscribe`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskQuery {
    pub user_id: Option<String>,
    pub plan_id: Option<String>,
    /// Strictly greater than this instant
    pub updated_after: Option<Timestamp>,
    /// `Some(false)` hides tombstones, `None` matches both
    pub deleted: Option<bool>,
}

impl TaskQuery {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        }
    }

    pub fn in_plan(mut self, plan_id: &str) -> Self {
        self.plan_id = Some(plan_id.to_string());
        self
    }

    pub fn updated_after(mut self, since: Timestamp) -> Self {
        self.updated_after = Some(since);
        self
    }

    /// Exclude soft-deleted tasks
    pub fn live(mut self) -> Self {
        self.deleted = Some(false);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.user_id.as_ref().map_or(true, |u| &task.user_id == u)
            && self.plan_id.as_ref().map_or(true, |p| &task.plan_id == p)
            && self.updated_after.map_or(true, |since| task.updated_at > since)
            && self.deleted.map_or(true, |d| task.deleted == d)
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSort {
    UpdatedAtAsc,
    UpdatedAtDesc,
    CreatedAtAsc,
}

impl TaskSort {
    pub(crate) fn sort(self, tasks: &mut [Task]) {
        match self {
            TaskSort::UpdatedAtAsc => {
                tasks.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)))
            }
            TaskSort::UpdatedAtDesc => {
                tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)))
            }
            TaskSort::CreatedAtAsc => {
                tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            }
        }
    }
}

/// Partial update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub user_id: Option<String>,
    pub plan_id: Option<String>,
    pub title: Option<String>,
    pub position: Option<Position>,
    pub checklist: Option<Vec<ChecklistItem>>,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    /// `Some(None)` clears the origin device
    pub client_id: Option<Option<String>>,
    pub deleted: Option<bool>,
}

impl TaskPatch {
    /// A patch that overwrites every field with `task`'s values
    pub fn replace_with(task: Task) -> Self {
        Self {
            user_id: Some(task.user_id),
            plan_id: Some(task.plan_id),
            title: Some(task.title),
            position: Some(task.position),
            checklist: Some(task.checklist),
            created_at: Some(task.created_at),
            updated_at: Some(task.updated_at),
            client_id: Some(task.client_id),
            deleted: Some(task.deleted),
        }
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(user_id) = self.user_id {
            task.user_id = user_id;
        }
        if let Some(plan_id) = self.plan_id {
            task.plan_id = plan_id;
        }
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(position) = self.position {
            task.position = position;
        }
        if let Some(checklist) = self.checklist {
            task.checklist = checklist;
        }
        if let Some(created_at) = self.created_at {
            task.created_at = created_at;
        }
        if let Some(updated_at) = self.updated_at {
            task.updated_at = updated_at;
        }
        if let Some(client_id) = self.client_id {
            task.client_id = client_id;
        }
        if let Some(deleted) = self.deleted {
            task.deleted = deleted;
        }
    }
}
