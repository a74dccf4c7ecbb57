//! Starred repository types
//!
//! `RepoRecord` is the local mirror of one starred repository. Its columns
//! split into two disjoint sets:
//!
//! - **Remote-owned** fields come from the source of truth and are free to be
//!   overwritten on every sync (`full_name`, `description`, `stars_count`, ...).
//! - **Local-owned** fields are user annotations (`notes`, `rating`) and are
//!   never written by the sync engine, regardless of conflict strategy.
//!
//! The partition is static; [`REMOTE_OWNED_FIELDS`] and [`LOCAL_OWNED_FIELDS`]
//! list the column names and the storage layer enforces the split by never
//! mentioning local-owned columns in its remote-update statements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable external identifier of a repository (the sole join key between the
/// remote and local worlds).
pub type GithubId = i64;

/// Column names owned by the remote source, compared field-by-field by the
/// differ and overwritten on sync.
pub const REMOTE_OWNED_FIELDS: &[&str] = &[
    "full_name",
    "description",
    "html_url",
    "language",
    "topics",
    "stars_count",
    "forks_count",
    "archived",
    "license",
];

/// Column names owned by the user surface; the sync engine never writes them.
pub const LOCAL_OWNED_FIELDS: &[&str] = &["notes", "rating"];

/// Local mirror of one starred repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoRecord {
    /// Local row id
    pub id: i64,
    /// Immutable external identifier, unique
    pub github_id: GithubId,

    // Remote-owned fields
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub stars_count: i64,
    pub forks_count: i64,
    pub archived: bool,
    pub license: Option<String>,

    // Local-owned fields (user annotations)
    pub notes: Option<String>,
    pub rating: Option<i64>,

    // Sync bookkeeping
    /// Update timestamp reported by the source on the last applied sync
    pub last_remote_update: Option<DateTime<Utc>>,
    /// When the sync engine last wrote this record
    pub last_synced_at: Option<DateTime<Utc>>,
    /// When a user surface last touched a local-owned field
    pub local_modified_at: Option<DateTime<Utc>>,
    /// Set when the remote source no longer lists this repository
    pub absent: bool,
    pub absent_since: Option<DateTime<Utc>>,
}

impl RepoRecord {
    /// Whether a user surface touched a local-owned field after the last sync
    /// wrote this record. This is what makes a simultaneous remote change
    /// "notable" under the merge strategy.
    pub fn locally_modified_since_sync(&self) -> bool {
        match (self.local_modified_at, self.last_synced_at) {
            (Some(modified), Some(synced)) => modified > synced,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// One starred repository as yielded by the remote source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRepo {
    pub github_id: GithubId,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    pub language: Option<String>,
    pub topics: Vec<String>,
    pub stars_count: i64,
    pub forks_count: i64,
    pub archived: bool,
    pub license: Option<String>,
    /// Last-modified timestamp reported by the source
    pub updated_at: DateTime<Utc>,
    /// When the user starred this repository, if the source reports it
    pub starred_at: Option<DateTime<Utc>>,
}
