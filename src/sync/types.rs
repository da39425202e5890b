//! Sync data types
//!
//! Defines the synchronized task document and the wire shapes of the
//! pull/push protocol:
//! - Task documents with checklist items and soft-delete tombstones
//! - Millisecond-precision UTC timestamps used as sync cursors
//! - Pull and push request/response bodies

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// A UTC instant truncated to milliseconds.
///
/// Serializes as `2025-01-01T00:00:00.000Z`, a form whose byte order
/// matches its chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The earliest cursor, used when a collection has never been synced
    pub fn epoch() -> Self {
        Self(Utc.timestamp_opt(0, 0).single().unwrap_or_default())
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(3))
    }

    /// Parse any RFC 3339 timestamp, normalizing it to UTC milliseconds
    pub fn parse(s: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self::from_datetime(dt.with_timezone(&Utc)))
            .map_err(|_| SyncError::InvalidTimestamp(s.to_string()))
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Canonical text form, as stored and transmitted
    pub fn to_canonical(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical())
    }
}

impl FromStr for Timestamp {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Normalized placement of a task on its plan, each axis in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, anchor: None }
    }

    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }
}

/// Progress of a single checklist item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
    NotStarted,
    InProgress,
    Blocked,
    FinalCheck,
    Done,
}

impl Default for ChecklistStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

/// A checklist entry inside a task.
///
/// `text` and `status` are optional on the wire so partial items sent by
/// other clients survive a merge; fields this crate does not know about
/// are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ChecklistStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChecklistItem {
    /// Create a not-started item with a fresh id
    pub fn new(text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: Some(text.to_string()),
            status: Some(ChecklistStatus::NotStarted),
            extra: Map::new(),
        }
    }
}

/// The synchronized task document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub title: String,
    pub position: Position,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Device that made the latest write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Soft-delete tombstone
    #[serde(rename = "_deleted", default)]
    pub deleted: bool,
}

/// Request body for `POST /sync/pull`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub user_id: String,
    pub since: Timestamp,
    pub limit: u32,
}

/// Response body for `POST /sync/pull`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub docs: Vec<Task>,
    /// New cursor; absent means "keep the current one"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Timestamp>,
}

/// Request body for `POST /sync/push`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub user_id: String,
    pub docs: Vec<Task>,
}

/// Response body for `POST /sync/push`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
}

/// A document the server rejected or superseded during push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: String,
    pub server: Task,
    pub client: Task,
}
