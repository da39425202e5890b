//! Sync module for offline-first task synchronization
//!
//! Provides:
//! - Timestamp-cursor change tracking per collection
//! - Pull/push reconciliation with the central server
//! - Checklist-preserving conflict merge
//! - Interval and reconnect scheduling
//!
//! # Sync Protocol
//!
//! 1. Client sends `PullRequest` with its checkpoint and receives documents
//!    changed since then plus a new checkpoint
//! 2. Client upserts them: newer `updatedAt` wins, an exact tie goes to the
//!    copy written by another device
//! 3. Client sends `PushRequest` with local documents newer than the
//!    checkpoint, oldest first
//! 4. Server answers with conflicts; the client merges each pair and stores
//!    the result, then advances the checkpoint to the newest document sent
//!
//! # Conflict Resolution
//!
//! - Server wins for task-level fields
//! - Checklists are unioned by item id, client fields overlaying server fields

mod checkpoint;
mod engine;
mod merge;
mod remote;
mod supervisor;
mod trigger;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
pub use engine::{
    EngineConfig, PhaseOutcome, SyncEngine, SyncState, DEFAULT_PULL_LIMIT, TASKS_COLLECTION,
};
pub use merge::{merge_checklists, merge_task};
pub use remote::{HttpRemote, RemoteSync};
pub use supervisor::{EngineFactory, SyncSupervisor};
pub use trigger::{monitor_reachability, Connectivity};
pub use types::{
    ChecklistItem, ChecklistStatus, Conflict, Position, PullRequest, PullResponse, PushRequest,
    PushResponse, Task, Timestamp,
};
