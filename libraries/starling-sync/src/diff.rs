//! Differ: classifies remote items against the local mirror
//!
//! Pure and synchronous. Equality checks use the source's update timestamp as
//! a cheap short-circuit and fall back to comparing the static set of
//! remote-owned fields, which covers sources whose timestamp granularity is
//! coarser than their actual change frequency.

use crate::types::SyncMode;
use serde_json::{json, Value};
use starling_core::types::{GithubId, RemoteRepo, RepoRecord};
use std::collections::HashSet;

/// Under `Smart` mode, sets this small get a full field comparison even when
/// the timestamp says nothing changed.
pub const SMART_COMPARE_LIMIT: usize = 500;

/// A single remote-owned field whose value differs between the two sides
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub field: &'static str,
    pub local: Value,
    pub remote: Value,
}

/// Classification of one remote item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemClass {
    /// No local record (or only a record marked absent, which is treated as
    /// a fresh addition rather than a resurrection)
    Added,
    /// Local record exists and at least one remote-owned field differs
    Changed(Vec<FieldDiff>),
    /// Nothing to do
    Unchanged,
}

fn push_if_ne(diffs: &mut Vec<FieldDiff>, field: &'static str, local: Value, remote: Value) {
    if local != remote {
        diffs.push(FieldDiff { field, local, remote });
    }
}

/// Field-level diff restricted to remote-owned fields
pub fn remote_field_diffs(local: &RepoRecord, remote: &RemoteRepo) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    push_if_ne(&mut diffs, "full_name", json!(local.full_name), json!(remote.full_name));
    push_if_ne(&mut diffs, "description", json!(local.description), json!(remote.description));
    push_if_ne(&mut diffs, "html_url", json!(local.html_url), json!(remote.html_url));
    push_if_ne(&mut diffs, "language", json!(local.language), json!(remote.language));
    push_if_ne(&mut diffs, "topics", json!(local.topics), json!(remote.topics));
    push_if_ne(&mut diffs, "stars_count", json!(local.stars_count), json!(remote.stars_count));
    push_if_ne(&mut diffs, "forks_count", json!(local.forks_count), json!(remote.forks_count));
    push_if_ne(&mut diffs, "archived", json!(local.archived), json!(remote.archived));
    push_if_ne(&mut diffs, "license", json!(local.license), json!(remote.license));
    diffs
}

/// Classify one remote item against its local counterpart (if any)
///
/// `remote_total` is the size of the full remote set, used by `Smart` mode to
/// decide whether a field comparison is affordable.
pub fn classify(
    local: Option<&RepoRecord>,
    remote: &RemoteRepo,
    mode: SyncMode,
    remote_total: usize,
) -> ItemClass {
    let Some(local) = local else {
        return ItemClass::Added;
    };

    // A reappearing identifier is a fresh addition; stale local-owned fields
    // must not come back with it.
    if local.absent {
        return ItemClass::Added;
    }

    let timestamp_unchanged = matches!(
        local.last_remote_update,
        Some(last) if remote.updated_at <= last
    );

    let compare_fields = match mode {
        SyncMode::Full => true,
        SyncMode::Incremental => !timestamp_unchanged,
        SyncMode::Smart => !timestamp_unchanged || remote_total <= SMART_COMPARE_LIMIT,
    };

    if !compare_fields {
        return ItemClass::Unchanged;
    }

    let diffs = remote_field_diffs(local, remote);
    if diffs.is_empty() {
        ItemClass::Unchanged
    } else {
        ItemClass::Changed(diffs)
    }
}

/// Identifiers present locally (and not already marked absent) but missing
/// from the full remote enumeration
pub fn removed_ids(locals: &[RepoRecord], remote_ids: &HashSet<GithubId>) -> Vec<GithubId> {
    locals
        .iter()
        .filter(|r| !r.absent && !remote_ids.contains(&r.github_id))
        .map(|r| r.github_id)
        .collect()
}
