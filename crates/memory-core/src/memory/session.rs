//! Session, append-only per-project records, and the personal primer
//! (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ids::{MemoryId, ProjectId, SessionId};

/// `(session_id, project_id, message_count, first_session_completed,
/// last_active, metadata)` (spec §3). Created on the first `/context` call
/// for a pair; incremented by `/process`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: SessionId,
    pub project_id: ProjectId,
    #[serde(default)]
    pub message_count: u32,
    #[serde(default)]
    pub first_session_completed: bool,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Per-session number within the project, assigned at creation. Used by
    /// the Lifecycle Manager / retrieval engine for `session_created`,
    /// `last_surfaced`, etc.
    pub session_number: u32,

    /// Ids already injected into this session's context window (spec §4.2
    /// "Per-session deduplication"). Confined to this one owner (the
    /// Engine), per spec §9's "Shared mutable state" design note; never
    /// serialized back out through the HTTP surface.
    #[serde(skip)]
    pub already_injected: HashSet<MemoryId>,
}

impl Session {
    pub fn new(session_id: SessionId, project_id: ProjectId, session_number: u32, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            project_id,
            message_count: 0,
            first_session_completed: false,
            last_active: now,
            metadata: serde_json::Value::Null,
            session_number,
            already_injected: HashSet::new(),
        }
    }

    pub fn is_brand_new(&self) -> bool {
        self.message_count == 0
    }
}

/// Append-only per project, ordered by `created_at`. Latest-wins for the
/// primer-worthy `summary` text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: MemoryId,
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub session_number: u32,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only per project, ordered by `created_at`. Latest-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    pub id: MemoryId,
    pub project_id: ProjectId,
    pub snapshot: String,
    pub created_at: DateTime<Utc>,
}

/// One record per Lifecycle Manager pass (spec §4.3 item 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementLog {
    pub id: MemoryId,
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub processed: u32,
    pub superseded: u32,
    pub resolved: u32,
    pub action_cleared: u32,
    pub linked: u32,
    pub files_touched: Vec<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
    /// Free-text notes, e.g. unrecognized manager report lines (spec §9,
    /// "unrecognized lines are logged but non-fatal").
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Singleton per installation (scope = global). The only file the Lifecycle
/// Manager may *create*; every other write path is an update (spec §4.3
/// item 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalPrimer {
    pub markdown: String,
    pub updated_at: DateTime<Utc>,
}

impl PersonalPrimer {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            markdown: String::new(),
            updated_at: now,
        }
    }
}
