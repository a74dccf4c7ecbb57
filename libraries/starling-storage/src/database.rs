/// Database connection and migrations
use crate::error::{Result, StorageError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Create a connection pool for the given database URL, creating the file if
/// it does not exist yet.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

    Ok(pool)
}

/// Run database migrations
///
/// Migrations are embedded for reliability across different execution
/// contexts; each file is idempotent (`IF NOT EXISTS`).
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    const MIGRATIONS: &[&str] = &[
        include_str!("../migrations/20250601000001_create_repos.sql"),
        include_str!("../migrations/20250601000002_create_sync_history.sql"),
        include_str!("../migrations/20250601000003_create_sync_conflicts.sql"),
        include_str!("../migrations/20250601000004_create_settings.sql"),
    ];

    for migration in MIGRATIONS {
        // Each migration file may hold several statements
        for statement in migration.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| StorageError::Migration(e.to_string()))?;
        }
    }

    Ok(())
}
