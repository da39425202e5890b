//! Per-session engine lifecycle
//!
//! Exactly one engine may drive a local store at a time. The supervisor
//! follows the active user and replaces the engine whenever the identity
//! changes, stopping the previous one first.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

use super::checkpoint::CheckpointStore;
use super::engine::{EngineConfig, SyncEngine};
use super::remote::RemoteSync;
use super::trigger::Connectivity;
use crate::session::ActiveUser;
use crate::store::TaskStore;

/// Shared collaborators every engine of this device is built from
#[derive(Clone)]
pub struct EngineFactory {
    pub config: EngineConfig,
    pub store: Arc<dyn TaskStore>,
    pub remote: Arc<dyn RemoteSync>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub user: ActiveUser,
    pub connectivity: Connectivity,
}

impl EngineFactory {
    pub fn build(&self) -> SyncEngine {
        SyncEngine::new(
            self.config.clone(),
            self.store.clone(),
            self.remote.clone(),
            self.checkpoints.clone(),
            self.user.clone(),
            self.connectivity.clone(),
        )
    }
}

pub struct SyncSupervisor {
    factory: EngineFactory,
    interval: Duration,
    current: Mutex<Option<Arc<SyncEngine>>>,
}

impl SyncSupervisor {
    pub fn new(factory: EngineFactory, interval: Duration) -> Self {
        Self {
            factory,
            interval,
            current: Mutex::new(None),
        }
    }

    /// The engine of the current session, if any
    pub fn current(&self) -> Option<Arc<SyncEngine>> {
        self.current.lock().clone()
    }

    /// Stop the running engine and start a fresh one if someone is signed in
    pub fn refresh(&self) {
        let mut current = self.current.lock();
        if let Some(engine) = current.take() {
            engine.stop();
        }

        match self.factory.user.current() {
            Some(user_id) => {
                info!(user_id = %user_id, "Starting sync session");
                let engine = Arc::new(self.factory.build());
                engine.start(self.interval);
                *current = Some(engine);
            }
            None => info!("No active user, sync idle"),
        }
    }

    /// Follow the active user until `shutdown` fires, then stop the engine
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut user = self.factory.user.watch();
        user.borrow_and_update();
        self.refresh();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                changed = user.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    user.borrow_and_update();
                    self.refresh();
                }
            }
        }

        self.shutdown();
    }

    pub fn shutdown(&self) {
        if let Some(engine) = self.current.lock().take() {
            engine.stop();
        }
    }
}
