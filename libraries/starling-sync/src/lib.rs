mod diff;
mod error;
mod resolve;
mod scheduler;
mod service;
mod source;
mod types;

// Public exports
pub use error::{Result, SyncError};
pub use resolve::RESOLUTION_MERGED;
pub use scheduler::{SchedulerConfig, SchedulerStatus, SyncScheduler, SyncStatistics, STATISTICS_WINDOW};
pub use service::{ConflictResolution, SyncService};
pub use source::{RateLimit, RemotePage, RemoteSource, SourceError};
pub use types::{
    ConflictStrategy, RemovalPolicy, SessionStatus, SyncConfig, SyncMode, SyncProgress,
};
