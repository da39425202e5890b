//! Local task mutations
//!
//! Everything the board UI changes goes through [`TaskService`]. Each write
//! bumps `updatedAt` monotonically and stamps this device's client id, which
//! is what makes the change visible to the next push.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::session::ActiveUser;
use crate::store::{Subscription, TaskPatch, TaskQuery, TaskSort, TaskStore};
use crate::sync::types::{ChecklistItem, ChecklistStatus, Position, Task, Timestamp};

const DEFAULT_ANCHOR: &str = "center";

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    client_id: String,
    user: ActiveUser,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>, client_id: &str, user: ActiveUser) -> Self {
        Self {
            store,
            client_id: client_id.to_string(),
            user,
        }
    }

    /// Live, non-deleted tasks of the active user on `plan_id`, oldest first
    pub async fn list(&self, plan_id: &str) -> Result<Vec<Task>> {
        let query = TaskQuery::for_user(&self.user_id()?).in_plan(plan_id).live();
        self.store.find(&query, Some(TaskSort::CreatedAtAsc)).await
    }

    /// Subscribe to the active user's live tasks across all plans
    pub async fn watch(&self) -> Result<Subscription> {
        self.store
            .subscribe(TaskQuery::for_user(&self.user_id()?).live())
            .await
    }

    pub async fn create_task(
        &self,
        plan_id: &str,
        title: &str,
        position: Position,
        checklist: Vec<ChecklistItem>,
    ) -> Result<Task> {
        let user_id = self.user_id()?;
        let title = normalize_title(title)?;
        let position = normalize_position(position)?;
        let now = Timestamp::now();

        let task = Task {
            id: Uuid::new_v4().to_string(),
            user_id,
            plan_id: plan_id.to_string(),
            title,
            position,
            checklist,
            created_at: now,
            updated_at: now,
            client_id: Some(self.client_id.clone()),
            deleted: false,
        };

        self.store.insert(task.clone()).await?;
        debug!(task_id = %task.id, plan_id = %task.plan_id, "Created task");
        Ok(task)
    }

    /// Replace title and checklist, as the edit dialog does
    pub async fn update_task(
        &self,
        id: &str,
        title: &str,
        checklist: Vec<ChecklistItem>,
    ) -> Result<Task> {
        let title = normalize_title(title)?;
        self.modify(id, |_, patch| {
            patch.title = Some(title);
            patch.checklist = Some(checklist);
            Ok(())
        })
        .await
    }

    pub async fn move_task(&self, id: &str, position: Position) -> Result<Task> {
        let position = normalize_position(position)?;
        self.modify(id, |_, patch| {
            patch.position = Some(position);
            Ok(())
        })
        .await
    }

    pub async fn add_checklist_item(&self, id: &str, text: &str) -> Result<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::InvalidTask("checklist item text is empty".to_string()));
        }
        let item = ChecklistItem::new(text);
        self.modify(id, |task, patch| {
            let mut checklist = task.checklist.clone();
            checklist.push(item);
            patch.checklist = Some(checklist);
            Ok(())
        })
        .await
    }

    pub async fn remove_checklist_item(&self, id: &str, item_id: &str) -> Result<Task> {
        self.modify(id, |task, patch| {
            let checklist = task
                .checklist
                .iter()
                .filter(|item| item.id != item_id)
                .cloned()
                .collect();
            patch.checklist = Some(checklist);
            Ok(())
        })
        .await
    }

    pub async fn set_checklist_status(
        &self,
        id: &str,
        item_id: &str,
        status: ChecklistStatus,
    ) -> Result<Task> {
        self.modify(id, |task, patch| {
            let mut checklist = task.checklist.clone();
            let item = checklist
                .iter_mut()
                .find(|item| item.id == item_id)
                .ok_or_else(|| SyncError::NotFound(format!("{}/{}", task.id, item_id)))?;
            item.status = Some(status);
            patch.checklist = Some(checklist);
            Ok(())
        })
        .await
    }

    /// Tombstone the task so the deletion replicates
    pub async fn soft_delete(&self, id: &str) -> Result<Task> {
        self.modify(id, |_, patch| {
            patch.deleted = Some(true);
            Ok(())
        })
        .await
    }

    fn user_id(&self) -> Result<String> {
        self.user
            .current()
            .ok_or_else(|| SyncError::InvalidTask("no active user".to_string()))
    }

    /// Load, let `edit` fill a patch, then stamp and write it
    async fn modify<F>(&self, id: &str, edit: F) -> Result<Task>
    where
        F: FnOnce(&Task, &mut TaskPatch) -> Result<()>,
    {
        let mut task = self
            .store
            .find_one(id)
            .await?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

        let mut patch = TaskPatch::default();
        edit(&task, &mut patch)?;
        patch.updated_at = Some(next_timestamp(task.updated_at));
        patch.client_id = Some(Some(self.client_id.clone()));

        self.store.update(id, patch.clone()).await?;
        patch.apply(&mut task);
        debug!(task_id = %id, updated_at = %task.updated_at, "Updated task");
        Ok(task)
    }
}

/// Never earlier than the previous write, even if the clock went backwards
fn next_timestamp(previous: Timestamp) -> Timestamp {
    Timestamp::now().max(previous)
}

fn normalize_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(SyncError::InvalidTask("title is empty".to_string()));
    }
    Ok(title.to_string())
}

fn normalize_position(mut position: Position) -> Result<Position> {
    if !position.is_normalized() {
        return Err(SyncError::InvalidTask(format!(
            "position ({}, {}) is outside the plan",
            position.x, position.y
        )));
    }
    if position.anchor.is_none() {
        position.anchor = Some(DEFAULT_ANCHOR.to_string());
    }
    Ok(position)
}
