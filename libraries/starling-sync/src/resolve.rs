//! Conflict resolver
//!
//! Given the field diffs for one changed record, decides what to write and
//! which conflict rows to persist. Local-owned and remote-owned fields are
//! disjoint by construction, so a "conflict" under the merge strategy is a
//! notable simultaneous local+remote change surfaced for audit, not a true
//! write-write collision.

use crate::diff::FieldDiff;
use crate::types::ConflictStrategy;
use starling_core::types::{NewConflict, RemoteRepo, RepoRecord};

/// Resolution outcome written for informational merge conflicts
pub const RESOLUTION_MERGED: &str = "merged";

/// What the session should do with the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveAction {
    /// Overwrite remote-owned fields with the remote values
    ApplyRemote,
    /// Leave the record untouched (skipped by policy)
    KeepLocal,
    /// Leave the record untouched pending an external decision
    PendingUser,
}

/// Result of resolving one changed record
#[derive(Debug, Clone)]
pub struct Resolution {
    pub action: ResolveAction,
    pub conflicts: Vec<NewConflict>,
}

fn conflicts_from_diffs(
    local: &RepoRecord,
    diffs: &[FieldDiff],
    resolution: Option<&str>,
) -> Vec<NewConflict> {
    diffs
        .iter()
        .map(|d| NewConflict {
            github_id: local.github_id,
            full_name: local.full_name.clone(),
            field_name: d.field.to_string(),
            local_value: d.local.clone(),
            remote_value: d.remote.clone(),
            resolution: resolution.map(String::from),
        })
        .collect()
}

/// Decide the final values for one changed record
///
/// Local-owned fields are never part of `diffs` and are untouched by every
/// strategy; only remote-owned fields are at stake here.
pub fn resolve(
    local: &RepoRecord,
    _remote: &RemoteRepo,
    diffs: &[FieldDiff],
    strategy: ConflictStrategy,
) -> Resolution {
    match strategy {
        ConflictStrategy::KeepLocal => Resolution {
            action: ResolveAction::KeepLocal,
            conflicts: Vec::new(),
        },
        ConflictStrategy::KeepRemote => Resolution {
            action: ResolveAction::ApplyRemote,
            conflicts: Vec::new(),
        },
        ConflictStrategy::Merge => {
            // The merge is informational: record it only when a user surface
            // touched the record after the last sync wrote it.
            let conflicts = if local.locally_modified_since_sync() {
                conflicts_from_diffs(local, diffs, Some(RESOLUTION_MERGED))
            } else {
                Vec::new()
            };
            Resolution {
                action: ResolveAction::ApplyRemote,
                conflicts,
            }
        }
        ConflictStrategy::AskUser => Resolution {
            action: ResolveAction::PendingUser,
            conflicts: conflicts_from_diffs(local, diffs, None),
        },
    }
}
