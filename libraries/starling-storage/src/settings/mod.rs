//! Key/value settings storage
//!
//! Settings are stored as JSON-serialized values for flexibility. The sync
//! scheduler persists its configuration here under [`SETTING_SCHEDULER`].

use crate::error::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

/// Scheduler configuration (JSON-serialized `SchedulerConfig`)
pub const SETTING_SCHEDULER: &str = "sync.scheduler";

/// Get a single setting value
///
/// Returns `Ok(Some(value))` if the setting exists, `Ok(None)` if not found
pub async fn get(pool: &SqlitePool, key: &str) -> Result<Option<serde_json::Value>> {
    let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let json: String = row.try_get("value")?;
            Ok(Some(serde_json::from_str(&json)?))
        }
        None => Ok(None),
    }
}

/// Set a setting value, inserting or replacing
pub async fn set(pool: &SqlitePool, key: &str, value: &serde_json::Value) -> Result<()> {
    let json = serde_json::to_string(value)?;
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(json)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}
