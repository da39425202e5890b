//! Active user identity
//!
//! All sync work is scoped to the user currently signed in on this device.
//! The identity is observable so the supervisor can tear down and recreate
//! the engine when it changes.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared, observable "who is signed in" value
#[derive(Clone)]
pub struct ActiveUser {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl ActiveUser {
    /// Nobody signed in
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn signed_in(user_id: &str) -> Self {
        let user = Self::new();
        user.set(user_id);
        user
    }

    pub fn set(&self, user_id: &str) {
        self.tx.send_if_modified(|current| {
            if current.as_deref() == Some(user_id) {
                return false;
            }
            *current = Some(user_id.to_string());
            true
        });
    }

    pub fn clear(&self) {
        self.tx.send_if_modified(|current| current.take().is_some());
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every identity change
    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for ActiveUser {
    fn default() -> Self {
        Self::new()
    }
}
