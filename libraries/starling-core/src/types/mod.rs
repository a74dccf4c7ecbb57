//! Domain types for Starling

mod repo;
mod sync;

pub use repo::{GithubId, RemoteRepo, RepoRecord, LOCAL_OWNED_FIELDS, REMOTE_OWNED_FIELDS};
pub use sync::{ConflictRecord, NewConflict, SyncHistoryEntry, SyncRunStatus};
