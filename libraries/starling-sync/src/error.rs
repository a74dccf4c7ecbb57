use crate::source::SourceError;
use thiserror::Error;

/// Errors that can occur during sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] starling_storage::StorageError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sync already in progress")]
    AlreadyRunning,

    #[error("Sync not running")]
    NotRunning,

    #[error("Sync timed out")]
    Timeout,

    #[error("Sync was cancelled")]
    Cancelled,

    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
