//! Sync history storage
//!
//! One append-only row per completed, failed, or cancelled sync session.
//! Read back for statistics and audit; never updated in place.

use crate::error::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use starling_core::types::{SyncHistoryEntry, SyncRunStatus};

fn map_row(row: &SqliteRow) -> Result<SyncHistoryEntry> {
    let status: String = row.try_get("status")?;

    Ok(SyncHistoryEntry {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        sync_type: row.try_get("sync_type")?,
        status: SyncRunStatus::from_str(&status).unwrap_or(SyncRunStatus::Failed),
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        total_items: row.try_get("total_items")?,
        processed: row.try_get("processed")?,
        added: row.try_get("added")?,
        updated: row.try_get("updated")?,
        deleted: row.try_get("deleted")?,
        skipped: row.try_get("skipped")?,
        failed: row.try_get("failed")?,
        duration_ms: row.try_get("duration_ms")?,
        error_message: row.try_get("error_message")?,
    })
}

/// Append one history entry, returning its row id
pub async fn append(pool: &SqlitePool, entry: &SyncHistoryEntry) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO sync_history (
            session_id, sync_type, status, started_at, finished_at,
            total_items, processed, added, updated, deleted, skipped, failed,
            duration_ms, error_message
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.session_id)
    .bind(&entry.sync_type)
    .bind(entry.status.as_str())
    .bind(entry.started_at)
    .bind(entry.finished_at)
    .bind(entry.total_items)
    .bind(entry.processed)
    .bind(entry.added)
    .bind(entry.updated)
    .bind(entry.deleted)
    .bind(entry.skipped)
    .bind(entry.failed)
    .bind(entry.duration_ms)
    .bind(&entry.error_message)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// List history entries, most recent first
pub async fn list(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<SyncHistoryEntry>> {
    let rows = sqlx::query(
        "SELECT * FROM sync_history ORDER BY started_at DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(map_row).collect()
}

/// The most recent history entry, if any
pub async fn latest(pool: &SqlitePool) -> Result<Option<SyncHistoryEntry>> {
    let row = sqlx::query("SELECT * FROM sync_history ORDER BY started_at DESC, id DESC LIMIT 1")
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(map_row).transpose()
}
