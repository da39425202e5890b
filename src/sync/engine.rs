//! Sync engine
//!
//! Runs pull-then-push cycles against the remote service for one user's
//! task collection:
//!
//! 1. Pull fetches everything changed since the checkpoint and upserts it
//!    locally (last writer wins on `updatedAt`, ties go to the other device)
//! 2. Push sends local documents newer than the checkpoint, oldest first,
//!    and merges back any conflicts the server reports
//!
//! A single [`SyncState`] guards both phases, so at most one phase is in
//! flight per engine and a reentrant call is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::checkpoint::{Checkpoint, CheckpointStore};
use super::merge::merge_task;
use super::remote::RemoteSync;
use super::trigger::{self, Connectivity};
use super::types::{PullRequest, PushRequest, Task, Timestamp};
use crate::error::Result;
use crate::session::ActiveUser;
use crate::store::{TaskPatch, TaskQuery, TaskSort, TaskStore};

/// Checkpoint key of the task collection
pub const TASKS_COLLECTION: &str = "tasks";

/// Maximum documents requested per pull
pub const DEFAULT_PULL_LIMIT: u32 = 500;

/// Per-instance engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Stable identifier of this device
    pub client_id: String,
    pub collection: String,
    pub pull_limit: u32,
}

impl EngineConfig {
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            collection: TASKS_COLLECTION.to_string(),
            pull_limit: DEFAULT_PULL_LIMIT,
        }
    }
}

/// What the engine is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Pulling,
    Pushing,
}

/// Result of a single pull or push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Another phase was already in flight
    Busy,
    NoActiveUser,
    /// No local change newer than the checkpoint
    UpToDate,
    Pulled {
        received: usize,
        applied: usize,
        checkpoint: Timestamp,
    },
    Pushed {
        sent: usize,
        conflicts: usize,
        checkpoint: Timestamp,
    },
}

struct Timer {
    stop_tx: watch::Sender<bool>,
    _handle: JoinHandle<()>,
}

/// Releases the state back to `Idle` when the phase ends, error or not
struct PhaseGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock() = SyncState::Idle;
    }
}

pub struct SyncEngine {
    config: EngineConfig,
    store: Arc<dyn TaskStore>,
    remote: Arc<dyn RemoteSync>,
    checkpoint: Checkpoint,
    user: ActiveUser,
    connectivity: Connectivity,
    state: Mutex<SyncState>,
    stopped: AtomicBool,
    timer: Mutex<Option<Timer>>,
}

impl SyncEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn TaskStore>,
        remote: Arc<dyn RemoteSync>,
        checkpoints: Arc<dyn CheckpointStore>,
        user: ActiveUser,
        connectivity: Connectivity,
    ) -> Self {
        let checkpoint = Checkpoint::new(checkpoints, &config.collection);

        Self {
            config,
            store,
            remote,
            checkpoint,
            user,
            connectivity,
            state: Mutex::new(SyncState::Idle),
            stopped: AtomicBool::new(false),
            timer: Mutex::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock()
    }

    /// Whether a schedule is registered
    pub fn is_running(&self) -> bool {
        self.timer.lock().is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Run a cycle now, then every `interval` and on every reconnect.
    ///
    /// Calling `start` on an engine that is already scheduled, or that was
    /// stopped, does nothing.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let mut timer = self.timer.lock();
        if timer.is_some() {
            debug!("Sync engine already scheduled");
            return;
        }
        if self.is_stopped() {
            debug!("Sync engine was stopped; create a new one to resume");
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Cannot schedule sync outside a Tokio runtime: {}", e);
                return;
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = runtime.spawn(trigger::run_schedule(
            Arc::clone(self),
            interval,
            self.connectivity.watch(),
            stop_rx,
        ));

        info!(
            client_id = %self.config.client_id,
            interval_ms = interval.as_millis() as u64,
            "Sync engine started"
        );
        *timer = Some(Timer {
            stop_tx,
            _handle: handle,
        });
    }

    /// Suppress future cycles and cancel the schedule.
    ///
    /// A cycle already in flight runs to completion and may still write to
    /// the local store after this returns.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(timer) = self.timer.lock().take() {
            let _ = timer.stop_tx.send(true);
            info!(client_id = %self.config.client_id, "Sync engine stopped");
        }
    }

    /// One pull-then-push cycle. Failures are logged and swallowed.
    pub async fn sync_once(&self) {
        match self.pull().await {
            Ok(PhaseOutcome::NoActiveUser) => {
                debug!("No active user, skipping sync cycle");
                return;
            }
            Ok(outcome) => debug!(?outcome, "Pull finished"),
            Err(e) => {
                warn!(error = %e, "Pull failed; retrying next cycle");
                return;
            }
        }

        match self.push().await {
            Ok(outcome) => debug!(?outcome, "Push finished"),
            Err(e) => warn!(error = %e, "Push failed; retrying next cycle"),
        }
    }

    /// Fetch remote changes since the checkpoint and upsert them locally
    pub async fn pull(&self) -> Result<PhaseOutcome> {
        let Some(_guard) = self.try_enter(SyncState::Pulling) else {
            debug!("Sync phase in flight, skipping pull");
            return Ok(PhaseOutcome::Busy);
        };
        let Some(user_id) = self.user.current() else {
            return Ok(PhaseOutcome::NoActiveUser);
        };

        let since = self.checkpoint.current().await?;
        let response = self
            .remote
            .pull(&PullRequest {
                user_id: user_id.clone(),
                since,
                limit: self.config.pull_limit,
            })
            .await?;

        let received = response.docs.len();
        let mut applied = 0;
        // A store failure aborts the rest of the batch; the checkpoint stays put
        for doc in response.docs {
            if self.upsert_remote(doc).await? {
                applied += 1;
            }
        }

        let checkpoint = match response.checkpoint {
            Some(next) => self.checkpoint.advance(next).await?,
            None => since,
        };

        debug!(
            user_id = %user_id,
            collection = %self.config.collection,
            received,
            applied,
            checkpoint = %checkpoint,
            "Pulled remote changes"
        );

        Ok(PhaseOutcome::Pulled {
            received,
            applied,
            checkpoint,
        })
    }

    /// Send local changes newer than the checkpoint and merge back conflicts
    pub async fn push(&self) -> Result<PhaseOutcome> {
        let Some(_guard) = self.try_enter(SyncState::Pushing) else {
            debug!("Sync phase in flight, skipping push");
            return Ok(PhaseOutcome::Busy);
        };
        let Some(user_id) = self.user.current() else {
            return Ok(PhaseOutcome::NoActiveUser);
        };

        let since = self.checkpoint.current().await?;
        let docs = self
            .store
            .find(
                &TaskQuery::for_user(&user_id).updated_after(since),
                Some(TaskSort::UpdatedAtAsc),
            )
            .await?;

        let Some(newest) = docs.last().map(|doc| doc.updated_at) else {
            return Ok(PhaseOutcome::UpToDate);
        };
        let sent = docs.len();

        let response = self
            .remote
            .push(&PushRequest {
                user_id: user_id.clone(),
                docs,
            })
            .await?;

        let conflicts = response.conflicts.len();
        for conflict in response.conflicts {
            if self.store.find_one(&conflict.id).await?.is_none() {
                debug!("Conflict for unknown task {}, skipping", conflict.id);
                continue;
            }
            let merged = merge_task(&conflict.server, &conflict.client);
            self.store
                .update(&conflict.id, TaskPatch::replace_with(merged))
                .await?;
        }

        // Advance past everything just sent, conflicted or not
        let checkpoint = self.checkpoint.advance(newest).await?;

        debug!(
            user_id = %user_id,
            collection = %self.config.collection,
            sent,
            conflicts,
            checkpoint = %checkpoint,
            "Pushed local changes"
        );

        Ok(PhaseOutcome::Pushed {
            sent,
            conflicts,
            checkpoint,
        })
    }

    fn try_enter(&self, phase: SyncState) -> Option<PhaseGuard<'_>> {
        let mut state = self.state.lock();
        if *state != SyncState::Idle {
            return None;
        }
        *state = phase;
        Some(PhaseGuard { state: &self.state })
    }

    /// Insert or replace one pulled document. Returns whether it was written.
    async fn upsert_remote(&self, remote: Task) -> Result<bool> {
        match self.store.find_one(&remote.id).await? {
            None => {
                self.store.insert(remote).await?;
                Ok(true)
            }
            Some(local) if self.remote_wins(&remote, &local) => {
                let id = remote.id.clone();
                self.store.update(&id, TaskPatch::replace_with(remote)).await?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Last writer wins; an exact tie goes to the copy written by another device
    fn remote_wins(&self, remote: &Task, local: &Task) -> bool {
        remote.updated_at > local.updated_at
            || (remote.updated_at == local.updated_at
                && remote.client_id.as_deref() != Some(self.config.client_id.as_str()))
    }
}
