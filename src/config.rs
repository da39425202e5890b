//! Configuration management for the Planboard sync daemon

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::sync::DEFAULT_PULL_LIMIT;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Empty (the default) disables sync entirely
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub interval_ms: u64,
    pub pull_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub user_id: Option<String>,
}

impl RemoteConfig {
    pub fn enabled(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            remote: RemoteConfig {
                base_url: String::new(),
                timeout_secs: 30,
            },
            sync: SyncConfig {
                interval_ms: 8000,
                pull_limit: DEFAULT_PULL_LIMIT,
            },
            database: DatabaseConfig {
                url: "sqlite:./planboard.db".to_string(),
            },
            session: SessionConfig { user_id: None },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or unparseable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        Config {
            remote: RemoteConfig {
                base_url: lookup("SYNC_API_BASE").unwrap_or(defaults.remote.base_url),
                timeout_secs: lookup("SYNC_HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.remote.timeout_secs),
            },
            sync: SyncConfig {
                interval_ms: lookup("SYNC_INTERVAL_MS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.sync.interval_ms),
                pull_limit: lookup("SYNC_PULL_LIMIT")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.sync.pull_limit),
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            session: SessionConfig {
                user_id: lookup("SYNC_USER_ID").filter(|v| !v.trim().is_empty()),
            },
        }
    }
}
