//! Conflict record storage
//!
//! Pending conflicts (`resolution IS NULL`) wait for an external decision;
//! resolved and informational rows are kept for audit until an explicit
//! cleanup call removes them.

use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use starling_core::types::{ConflictRecord, NewConflict};

fn map_row(row: &SqliteRow) -> Result<ConflictRecord> {
    let local_value: Option<String> = row.try_get("local_value")?;
    let remote_value: Option<String> = row.try_get("remote_value")?;

    let parse = |value: Option<String>| -> Result<serde_json::Value> {
        match value {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(serde_json::Value::Null),
        }
    };

    Ok(ConflictRecord {
        id: row.try_get("id")?,
        github_id: row.try_get("github_id")?,
        full_name: row.try_get("full_name")?,
        field_name: row.try_get("field_name")?,
        local_value: parse(local_value)?,
        remote_value: parse(remote_value)?,
        resolution: row.try_get("resolution")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

/// Append one conflict row, returning its id
pub async fn append(pool: &SqlitePool, conflict: &NewConflict, now: DateTime<Utc>) -> Result<i64> {
    let local_json = serde_json::to_string(&conflict.local_value)?;
    let remote_json = serde_json::to_string(&conflict.remote_value)?;
    // Informational conflicts (e.g. "merged") are born resolved
    let resolved_at = conflict.resolution.as_ref().map(|_| now);

    let result = sqlx::query(
        "INSERT INTO sync_conflicts (
            github_id, full_name, field_name, local_value, remote_value,
            resolution, created_at, resolved_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(conflict.github_id)
    .bind(&conflict.full_name)
    .bind(&conflict.field_name)
    .bind(local_json)
    .bind(remote_json)
    .bind(&conflict.resolution)
    .bind(now)
    .bind(resolved_at)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// All conflicts still pending an external decision, newest first
pub async fn list_unresolved(pool: &SqlitePool) -> Result<Vec<ConflictRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM sync_conflicts WHERE resolution IS NULL ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_row).collect()
}

/// Get one conflict by id
pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<ConflictRecord>> {
    let row = sqlx::query("SELECT * FROM sync_conflicts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_row).transpose()
}

/// Record the outcome of a pending conflict
///
/// Idempotent: resolving an already-resolved conflict with the same outcome
/// is a no-op; the stored resolution is never overwritten.
pub async fn resolve(pool: &SqlitePool, id: i64, resolution: &str, now: DateTime<Utc>) -> Result<ConflictRecord> {
    sqlx::query(
        "UPDATE sync_conflicts SET resolution = ?, resolved_at = ?
         WHERE id = ? AND resolution IS NULL",
    )
    .bind(resolution)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    get_by_id(pool, id)
        .await?
        .ok_or_else(|| StorageError::not_found("conflict", id.to_string()))
}

/// Delete resolved conflicts older than the cutoff (explicit retention cleanup)
pub async fn delete_resolved_before(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM sync_conflicts WHERE resolution IS NOT NULL AND created_at < ?",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
