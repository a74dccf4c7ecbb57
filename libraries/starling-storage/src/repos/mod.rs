//! Starred-repository storage
//!
//! The sync engine only ever writes remote-owned columns (plus sync
//! bookkeeping) through [`upsert_remote`]; local-owned columns (`notes`,
//! `rating`) are written exclusively through [`set_local_fields`]. This is
//! where the field-ownership partition is enforced.

use crate::error::{Result, StorageError};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use starling_core::types::{GithubId, RemoteRepo, RepoRecord};

fn map_row(row: &SqliteRow) -> Result<RepoRecord> {
    let topics_json: String = row.try_get("topics")?;
    let topics: Vec<String> = serde_json::from_str(&topics_json)?;

    Ok(RepoRecord {
        id: row.try_get("id")?,
        github_id: row.try_get("github_id")?,
        full_name: row.try_get("full_name")?,
        description: row.try_get("description")?,
        html_url: row.try_get("html_url")?,
        language: row.try_get("language")?,
        topics,
        stars_count: row.try_get("stars_count")?,
        forks_count: row.try_get("forks_count")?,
        archived: row.try_get("archived")?,
        license: row.try_get("license")?,
        notes: row.try_get("notes")?,
        rating: row.try_get("rating")?,
        last_remote_update: row.try_get("last_remote_update")?,
        last_synced_at: row.try_get("last_synced_at")?,
        local_modified_at: row.try_get("local_modified_at")?,
        absent: row.try_get("absent")?,
        absent_since: row.try_get("absent_since")?,
    })
}

/// Look up a record by its external identifier
pub async fn find_by_github_id(pool: &SqlitePool, github_id: GithubId) -> Result<Option<RepoRecord>> {
    let row = sqlx::query("SELECT * FROM repos WHERE github_id = ?")
        .bind(github_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_row).transpose()
}

/// Get all records, absent ones included
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<RepoRecord>> {
    let rows = sqlx::query("SELECT * FROM repos ORDER BY full_name")
        .fetch_all(pool)
        .await?;

    rows.iter().map(map_row).collect()
}

/// Insert or update the remote-owned side of a record
///
/// Writes remote-owned columns and sync bookkeeping only; local-owned columns
/// are untouched on update. A present remote item is by definition not
/// absent, so the absent flag is cleared.
pub async fn upsert_remote(
    pool: &SqlitePool,
    remote: &RemoteRepo,
    now: DateTime<Utc>,
) -> Result<RepoRecord> {
    let topics_json = serde_json::to_string(&remote.topics)?;

    sqlx::query(
        "INSERT INTO repos (
            github_id, full_name, description, html_url, language, topics,
            stars_count, forks_count, archived, license,
            last_remote_update, last_synced_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(github_id) DO UPDATE SET
            full_name = excluded.full_name,
            description = excluded.description,
            html_url = excluded.html_url,
            language = excluded.language,
            topics = excluded.topics,
            stars_count = excluded.stars_count,
            forks_count = excluded.forks_count,
            archived = excluded.archived,
            license = excluded.license,
            last_remote_update = excluded.last_remote_update,
            last_synced_at = excluded.last_synced_at,
            absent = 0,
            absent_since = NULL",
    )
    .bind(remote.github_id)
    .bind(&remote.full_name)
    .bind(&remote.description)
    .bind(&remote.html_url)
    .bind(&remote.language)
    .bind(topics_json)
    .bind(remote.stars_count)
    .bind(remote.forks_count)
    .bind(remote.archived)
    .bind(&remote.license)
    .bind(remote.updated_at)
    .bind(now)
    .execute(pool)
    .await?;

    find_by_github_id(pool, remote.github_id)
        .await?
        .ok_or_else(|| StorageError::not_found("repo", remote.github_id.to_string()))
}

/// Write local-owned fields (user-surface operation)
///
/// Bumps `local_modified_at`, which is what the merge strategy later uses to
/// decide whether a simultaneous remote change is worth surfacing.
pub async fn set_local_fields(
    pool: &SqlitePool,
    github_id: GithubId,
    notes: Option<&str>,
    rating: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE repos SET notes = ?, rating = ?, local_modified_at = ? WHERE github_id = ?",
    )
    .bind(notes)
    .bind(rating)
    .bind(now)
    .bind(github_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("repo", github_id.to_string()));
    }

    Ok(())
}

/// Clear local-owned fields and the absent flag
///
/// Used when an identifier reappears after having been marked absent: the
/// record is treated as a fresh addition, not a resurrection of stale
/// annotations.
pub async fn reset_local_fields(pool: &SqlitePool, github_id: GithubId) -> Result<()> {
    sqlx::query(
        "UPDATE repos SET
            notes = NULL, rating = NULL, local_modified_at = NULL,
            absent = 0, absent_since = NULL
         WHERE github_id = ?",
    )
    .bind(github_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Apply a single remote-owned field value to a record
///
/// Used when a pending conflict is resolved in favor of the remote side. The
/// field name must be one of [`starling_core::REMOTE_OWNED_FIELDS`];
/// local-owned fields are rejected.
pub async fn apply_remote_field(
    pool: &SqlitePool,
    github_id: GithubId,
    field: &str,
    value: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<()> {
    let sql = match field {
        "full_name" => "UPDATE repos SET full_name = ?, last_synced_at = ? WHERE github_id = ?",
        "description" => "UPDATE repos SET description = ?, last_synced_at = ? WHERE github_id = ?",
        "html_url" => "UPDATE repos SET html_url = ?, last_synced_at = ? WHERE github_id = ?",
        "language" => "UPDATE repos SET language = ?, last_synced_at = ? WHERE github_id = ?",
        "topics" => "UPDATE repos SET topics = ?, last_synced_at = ? WHERE github_id = ?",
        "stars_count" => "UPDATE repos SET stars_count = ?, last_synced_at = ? WHERE github_id = ?",
        "forks_count" => "UPDATE repos SET forks_count = ?, last_synced_at = ? WHERE github_id = ?",
        "archived" => "UPDATE repos SET archived = ?, last_synced_at = ? WHERE github_id = ?",
        "license" => "UPDATE repos SET license = ?, last_synced_at = ? WHERE github_id = ?",
        other => {
            return Err(StorageError::not_found("remote-owned field", other));
        }
    };

    let query = sqlx::query(sql);
    // Bind with the column's native type
    let query = match value {
        serde_json::Value::Null => query.bind(Option::<String>::None),
        serde_json::Value::Bool(b) => query.bind(*b),
        serde_json::Value::Number(n) => query.bind(n.as_i64()),
        serde_json::Value::String(s) => query.bind(s.clone()),
        // Lists (topics) are stored as JSON text
        other => query.bind(serde_json::to_string(other)?),
    };

    let result = query.bind(now).bind(github_id).execute(pool).await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("repo", github_id.to_string()));
    }

    Ok(())
}

/// Soft-mark a record as absent from the remote source
///
/// Returns `false` if the record was already marked, so a removal is only
/// ever counted once.
pub async fn mark_absent(pool: &SqlitePool, github_id: GithubId, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE repos SET absent = 1, absent_since = ? WHERE github_id = ? AND absent = 0",
    )
    .bind(now)
    .bind(github_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Hard-delete a record
pub async fn delete(pool: &SqlitePool, github_id: GithubId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM repos WHERE github_id = ?")
        .bind(github_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Count all records
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM repos")
        .fetch_one(pool)
        .await?;

    Ok(row.try_get("count")?)
}
