//! Starling Core
//!
//! Platform-agnostic domain types and error handling for Starling.
//!
//! This crate defines:
//! - **Domain Types**: `RepoRecord` (the local mirror of a starred
//!   repository) and `RemoteRepo` (one item as reported by the remote source)
//! - **Field Ownership**: the static partition between remote-owned fields
//!   (safe to overwrite on every sync) and local-owned fields (user
//!   annotations, never overwritten)
//! - **Error Handling**: unified `StarlingError` and `Result` types

#![forbid(unsafe_code)]

pub mod error;
pub mod types;

pub use error::{Result, StarlingError};
pub use types::{
    ConflictRecord, GithubId, NewConflict, RemoteRepo, RepoRecord, SyncHistoryEntry,
    SyncRunStatus, LOCAL_OWNED_FIELDS, REMOTE_OWNED_FIELDS,
};
