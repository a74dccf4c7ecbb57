//! Remote source seam
//!
//! The engine consumes an abstract fetch capability; the concrete API client
//! (transport, authentication, caching) lives elsewhere and implements
//! [`RemoteSource`]. Rate limiting is a pause signal, not a failure: the
//! session sleeps until the indicated reset time and continues.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use starling_core::types::{GithubId, RemoteRepo};
use std::collections::HashSet;
use thiserror::Error;

/// Rate-limit metadata reported alongside a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests left in the current window
    pub remaining: u32,
    /// When the window resets
    pub reset_at: DateTime<Utc>,
}

/// One page of remote items
#[derive(Debug, Clone)]
pub struct RemotePage {
    pub items: Vec<RemoteRepo>,
    /// Opaque continuation token; `None` on the last page
    pub next_page: Option<String>,
    pub rate_limit: Option<RateLimit>,
}

/// Errors reported by a remote source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Recoverable failure (network blip, single fetch failure); retried
    #[error("Transient source error: {0}")]
    Transient(String),

    /// Not an error in the session's eyes: pause until `reset_at`, resume
    #[error("Rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Unrecoverable authorization failure; aborts the session
    #[error("Authorization failed: {0}")]
    Unauthorized(String),

    /// Unrecoverable quota exhaustion; aborts the session
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),
}

impl SourceError {
    /// Systemic errors abort the session instead of being retried
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::QuotaExhausted(_))
    }
}

/// Abstract remote source of starred repositories
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch one page of the current remote set
    async fn list_page(
        &self,
        page: Option<String>,
        batch_size: u32,
    ) -> std::result::Result<RemotePage, SourceError>;

    /// Enumerate every identifier currently present remotely
    ///
    /// Called once per session in every mode; removals cannot be detected
    /// from a partial fetch.
    async fn enumerate_ids(&self) -> std::result::Result<HashSet<GithubId>, SourceError>;
}
