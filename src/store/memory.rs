//! In-memory task store
//!
//! Non-persistent implementation of [`TaskStore`], used for ephemeral
//! sessions and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{SubscriberSet, Subscription, TaskPatch, TaskQuery, TaskSort, TaskStore};
use crate::error::{Result, SyncError};
use crate::sync::types::Task;

#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<BTreeMap<String, Task>>,
    subscribers: SubscriberSet,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tasks, tombstones included
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn query(&self, query: &TaskQuery, sort: Option<TaskSort>) -> Vec<Task> {
        let mut found: Vec<Task> = self
            .tasks
            .read()
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();

        if let Some(sort) = sort {
            sort.sort(&mut found);
        }
        found
    }

    fn notify(&self) {
        for (id, query) in self.subscribers.queries() {
            self.subscribers.publish(id, self.query(&query, None));
        }
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn find_one(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.tasks.read().get(id).cloned())
    }

    async fn find(&self, query: &TaskQuery, sort: Option<TaskSort>) -> Result<Vec<Task>> {
        Ok(self.query(query, sort))
    }

    async fn insert(&self, task: Task) -> Result<()> {
        {
            let mut tasks = self.tasks.write();
            if tasks.contains_key(&task.id) {
                return Err(SyncError::DuplicateId(task.id));
            }
            tasks.insert(task.id.clone(), task);
        }
        self.notify();
        Ok(())
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<()> {
        {
            let mut tasks = self.tasks.write();
            let task = tasks
                .get_mut(id)
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
            patch.apply(task);
        }
        self.notify();
        Ok(())
    }

    async fn subscribe(&self, query: TaskQuery) -> Result<Subscription> {
        let initial = self.query(&query, None);
        Ok(self.subscribers.register(query, initial))
    }
}
