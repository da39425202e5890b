//! Live query subscriptions
//!
//! Each subscription owns a `watch` channel carrying the full matching
//! result set. Stores re-evaluate every registered query after a write and
//! publish the new set.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::TaskQuery;
use crate::sync::types::Task;

struct Entry {
    id: u64,
    query: TaskQuery,
    tx: watch::Sender<Vec<Task>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

/// Registered subscriptions of one store
#[derive(Clone, Default)]
pub struct SubscriberSet {
    inner: Arc<Mutex<Registry>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `query` with its current result set
    pub fn register(&self, query: TaskQuery, initial: Vec<Task>) -> Subscription {
        let (tx, rx) = watch::channel(initial);
        let mut registry = self.inner.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push(Entry { id, query, tx });

        Subscription {
            id,
            rx,
            registry: self.clone(),
        }
    }

    /// Ids and queries of the live subscriptions
    pub fn queries(&self) -> Vec<(u64, TaskQuery)> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|e| (e.id, e.query.clone()))
            .collect()
    }

    /// Replace the result set seen by subscription `id`
    pub fn publish(&self, id: u64, tasks: Vec<Task>) {
        let registry = self.inner.lock();
        if let Some(entry) = registry.entries.iter().find(|e| e.id == id) {
            entry.tx.send_replace(tasks);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: u64) {
        self.inner.lock().entries.retain(|e| e.id != id);
    }
}

/// Cancellable handle on a live query.
///
/// Dropping the handle cancels it.
pub struct Subscription {
    id: u64,
    rx: watch::Receiver<Vec<Task>>,
    registry: SubscriberSet,
}

impl Subscription {
    /// The latest result set
    pub fn current(&self) -> Vec<Task> {
        self.rx.borrow().clone()
    }

    /// Wait for the next emission and return the full result set
    pub async fn next(&mut self) -> Option<Vec<Task>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
