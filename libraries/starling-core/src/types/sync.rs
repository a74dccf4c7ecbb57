//! Persisted sync bookkeeping types
//!
//! These mirror rows of the `sync_history` and `sync_conflicts` tables. The
//! in-memory session types (progress, configuration) live in `starling-sync`;
//! only what outlives a session is defined here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of one sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl SyncRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// One row of the append-only sync history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub id: i64,
    /// Session id (uuid) assigned when the run started
    pub session_id: String,
    /// What was synchronized ("repositories")
    pub sync_type: String,
    pub status: SyncRunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_items: i64,
    pub processed: i64,
    pub added: i64,
    pub updated: i64,
    pub deleted: i64,
    pub skipped: i64,
    pub failed: i64,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

/// A persisted field-level conflict
///
/// Written when the conflict strategy requires an external decision
/// (`resolution` is `None` while pending) or for audit when a merge touched a
/// record that also had recent local edits (`resolution` = `"merged"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: i64,
    pub github_id: i64,
    pub full_name: String,
    pub field_name: String,
    pub local_value: serde_json::Value,
    pub remote_value: serde_json::Value,
    /// `None` means pending an external decision
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Conflict data as produced by the resolver, before it has a row id
#[derive(Debug, Clone, PartialEq)]
pub struct NewConflict {
    pub github_id: i64,
    pub full_name: String,
    pub field_name: String,
    pub local_value: serde_json::Value,
    pub remote_value: serde_json::Value,
    /// Pre-filled for informational (audit) conflicts, `None` for pending ones
    pub resolution: Option<String>,
}
