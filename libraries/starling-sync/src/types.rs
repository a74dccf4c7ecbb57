use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How much of the remote set is compared on each run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Field-compare every remote item, ignoring timestamps
    Full,
    /// Trust the source's update timestamp to skip unchanged items
    Incremental,
    /// Timestamp short-circuit, but field-compare when the set is small
    /// enough to afford it
    Smart,
}

/// What happens when a changed record also carries local edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Leave all fields as they are locally; nothing is recorded
    KeepLocal,
    /// Overwrite remote-owned fields unconditionally
    KeepRemote,
    /// Update remote-owned fields, preserve local annotations, record an
    /// informational conflict when both sides changed since the last sync
    Merge,
    /// Leave the record untouched and record a pending conflict for an
    /// external decision
    AskUser,
}

/// What to do with a record whose remote item disappeared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Soft-mark the record absent, keeping annotations (default)
    MarkAbsent,
    /// Hard-delete the record
    Delete,
}

/// Configuration for one sync session
///
/// Immutable for the duration of a session; may be replaced between sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub conflict_strategy: ConflictStrategy,
    pub removal_policy: RemovalPolicy,
    /// Remote page size
    pub batch_size: u32,
    /// Transient-error retries per page/item
    pub max_retries: u32,
    /// Delay between transient-error retries
    pub retry_delay: Duration,
    /// Overall session deadline
    pub timeout: Duration,
    /// Whether release sub-resources are synced as well
    pub sync_releases: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Smart,
            conflict_strategy: ConflictStrategy::Merge,
            removal_policy: RemovalPolicy::MarkAbsent,
            batch_size: 50,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
            sync_releases: true,
        }
    }
}

/// Session state as observed by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Whether a session is currently active (running or paused)
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

/// Progress snapshot for an ongoing (or just-finished) sync session
///
/// Published as a whole through a watch channel, one snapshot per processed
/// item, so a concurrent poller never observes a torn update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProgress {
    pub status: SessionStatus,
    pub session_id: String,
    pub total_items: usize,
    pub processed_items: usize,
    pub added_items: usize,
    pub updated_items: usize,
    pub deleted_items: usize,
    pub skipped_items: usize,
    pub failed_items: usize,
    pub conflicts: usize,
    pub current_item: Option<String>,
    pub started_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl SyncProgress {
    pub fn start(session_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::Running,
            session_id,
            total_items: 0,
            processed_items: 0,
            added_items: 0,
            updated_items: 0,
            deleted_items: 0,
            skipped_items: 0,
            failed_items: 0,
            conflicts: 0,
            current_item: None,
            started_at,
            error_message: None,
        }
    }

    /// Completion percentage over the remote item set
    pub fn percentage(&self) -> f32 {
        if self.total_items == 0 {
            return 0.0;
        }
        (self.processed_items as f32 / self.total_items as f32) * 100.0
    }

    /// Estimated remaining time, derived from the average per-item duration
    /// so far. `None` until at least one item has been processed.
    pub fn estimated_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.processed_items == 0 || self.total_items <= self.processed_items {
            return None;
        }
        let elapsed = (now - self.started_at).to_std().ok()?;
        let per_item = elapsed / self.processed_items as u32;
        let remaining = (self.total_items - self.processed_items) as u32;
        Some(per_item * remaining)
    }
}
