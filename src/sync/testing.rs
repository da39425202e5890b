//! Test doubles for the sync engine

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use tokio::sync::Notify;

use super::remote::RemoteSync;
use super::types::{Conflict, PullRequest, PullResponse, PushRequest, PushResponse, Task};
use crate::error::{Result, SyncError};
use crate::store::{MemoryTaskStore, Subscription, TaskPatch, TaskQuery, TaskSort, TaskStore};

/// Scripted remote that records every request
#[derive(Default)]
pub struct MockRemote {
    pulls: Mutex<VecDeque<PullResponse>>,
    conflicts: Mutex<VecDeque<Vec<Conflict>>>,
    pull_requests: Mutex<Vec<PullRequest>>,
    push_requests: Mutex<Vec<PushRequest>>,
    calls: Mutex<Vec<&'static str>>,
    fail_pull: AtomicBool,
    fail_push: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response for the next pull; an empty queue answers with no documents
    pub fn queue_pull(&self, response: PullResponse) {
        self.pulls.lock().push_back(response);
    }

    pub fn queue_conflicts(&self, conflicts: Vec<Conflict>) {
        self.conflicts.lock().push_back(conflicts);
    }

    pub fn fail_next_pull(&self) {
        self.fail_pull.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_push(&self) {
        self.fail_push.store(true, Ordering::SeqCst);
    }

    /// Make every pull wait until the returned gate is notified
    pub fn hold_pulls(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }

    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.push_requests.lock().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn unavailable() -> SyncError {
        SyncError::Remote {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "offline".to_string(),
        }
    }
}

#[async_trait]
impl RemoteSync for MockRemote {
    async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
        self.calls.lock().push("pull");
        self.pull_requests.lock().push(request.clone());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_pull.swap(false, Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.pulls.lock().pop_front().unwrap_or_default())
    }

    async fn push(&self, request: &PushRequest) -> Result<PushResponse> {
        self.calls.lock().push("push");
        self.push_requests.lock().push(request.clone());

        if self.fail_push.swap(false, Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(PushResponse {
            conflicts: self.conflicts.lock().pop_front().unwrap_or_default(),
        })
    }
}

/// Memory store whose insert fails for one id
pub struct FailingInsertStore {
    inner: MemoryTaskStore,
    failing_id: String,
}

impl FailingInsertStore {
    pub fn new(failing_id: &str) -> Self {
        Self {
            inner: MemoryTaskStore::new(),
            failing_id: failing_id.to_string(),
        }
    }
}

#[async_trait]
impl TaskStore for FailingInsertStore {
    async fn find_one(&self, id: &str) -> Result<Option<Task>> {
        self.inner.find_one(id).await
    }

    async fn find(&self, query: &TaskQuery, sort: Option<TaskSort>) -> Result<Vec<Task>> {
        self.inner.find(query, sort).await
    }

    async fn insert(&self, task: Task) -> Result<()> {
        if task.id == self.failing_id {
            return Err(SyncError::InvalidTask(format!("rejected {}", task.id)));
        }
        self.inner.insert(task).await
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<()> {
        self.inner.update(id, patch).await
    }

    async fn subscribe(&self, query: TaskQuery) -> Result<Subscription> {
        self.inner.subscribe(query).await
    }
}
