//! Planboard sync
//!
//! Offline-first synchronization of plan tasks between a local SQLite
//! collection and a central sync service.

pub mod client_id;
pub mod config;
pub mod db;
pub mod error;
pub mod session;
pub mod store;
pub mod sync;
pub mod tasks;

pub use error::{Result, SyncError};
