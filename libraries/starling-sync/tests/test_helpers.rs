//! Test helpers and fixtures for sync integration tests
//!
//! Sessions run against REAL SQLite files (not in-memory) and a scripted
//! in-process remote source, so storage behavior and retry paths are
//! exercised end to end without any network.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use starling_core::types::{GithubId, RemoteRepo};
use starling_sync::{RemotePage, RemoteSource, SourceError, SyncConfig, SyncService};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Test database wrapper that cleans up on drop
pub struct TestDb {
    pub pool: SqlitePool,
    _temp_dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let db_url = format!("sqlite://{}", db_path.display());

        let pool = starling_storage::create_pool(&db_url)
            .await
            .expect("Failed to create pool");
        starling_storage::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        Self {
            pool,
            _temp_dir: temp_dir,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// A fixed instant, handy as a deterministic remote timestamp
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

/// Test fixture: a remote repository item
pub fn repo(github_id: i64, full_name: &str, stars: i64, updated_at: DateTime<Utc>) -> RemoteRepo {
    RemoteRepo {
        github_id,
        full_name: full_name.to_string(),
        description: Some("A test repository".to_string()),
        html_url: format!("https://github.com/{full_name}"),
        language: Some("Rust".to_string()),
        topics: vec!["testing".to_string()],
        stars_count: stars,
        forks_count: 0,
        archived: false,
        license: Some("MIT".to_string()),
        updated_at,
        starred_at: None,
    }
}

/// Scripted remote source
///
/// Serves the current item list in pages and can inject transient failures,
/// a one-shot rate limit, a systemic auth failure, or a per-page delay.
#[derive(Default)]
pub struct FakeSource {
    items: Mutex<Vec<RemoteRepo>>,
    transient_page_failures: AtomicU32,
    transient_enumerate_failures: AtomicU32,
    rate_limit_once: Mutex<Option<DateTime<Utc>>>,
    unauthorized: Mutex<Option<String>>,
    page_delay: Mutex<Option<Duration>>,
    pub list_calls: AtomicU32,
    pub enumerate_calls: AtomicU32,
}

impl FakeSource {
    pub fn new(items: Vec<RemoteRepo>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
            ..Self::default()
        })
    }

    pub fn set_items(&self, items: Vec<RemoteRepo>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn remove_item(&self, github_id: GithubId) {
        self.items.lock().unwrap().retain(|r| r.github_id != github_id);
    }

    pub fn update_item(&self, github_id: GithubId, f: impl FnOnce(&mut RemoteRepo)) {
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.iter_mut().find(|r| r.github_id == github_id) {
            f(item);
        }
    }

    /// Fail the next `n` page fetches with a transient error
    pub fn fail_next_pages(&self, n: u32) {
        self.transient_page_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` enumerations with a transient error
    pub fn fail_next_enumerations(&self, n: u32) {
        self.transient_enumerate_failures.store(n, Ordering::SeqCst);
    }

    /// Report a rate limit on the next page fetch only
    pub fn rate_limit_once(&self, reset_at: DateTime<Utc>) {
        *self.rate_limit_once.lock().unwrap() = Some(reset_at);
    }

    /// Every call fails with an authorization error from now on
    pub fn set_unauthorized(&self, message: &str) {
        *self.unauthorized.lock().unwrap() = Some(message.to_string());
    }

    /// Sleep this long inside every page fetch (for cancellation/pause tests)
    pub fn set_page_delay(&self, delay: Duration) {
        *self.page_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn list_page(
        &self,
        page: Option<String>,
        batch_size: u32,
    ) -> Result<RemotePage, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.page_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.unauthorized.lock().unwrap().clone() {
            return Err(SourceError::Unauthorized(message));
        }
        if let Some(reset_at) = self.rate_limit_once.lock().unwrap().take() {
            return Err(SourceError::RateLimited { reset_at });
        }
        if self.transient_page_failures.load(Ordering::SeqCst) > 0 {
            self.transient_page_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(SourceError::Transient("connection reset".to_string()));
        }

        let items = self.items.lock().unwrap().clone();
        let start: usize = page.and_then(|p| p.parse().ok()).unwrap_or(0);
        let end = (start + batch_size as usize).min(items.len());
        let next_page = (end < items.len()).then(|| end.to_string());

        Ok(RemotePage {
            items: items[start..end].to_vec(),
            next_page,
            rate_limit: None,
        })
    }

    async fn enumerate_ids(&self) -> Result<HashSet<GithubId>, SourceError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.unauthorized.lock().unwrap().clone() {
            return Err(SourceError::Unauthorized(message));
        }
        if self.transient_enumerate_failures.load(Ordering::SeqCst) > 0 {
            self.transient_enumerate_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(SourceError::Transient("connection reset".to_string()));
        }

        Ok(self.items.lock().unwrap().iter().map(|r| r.github_id).collect())
    }
}

/// A config with retry/timeout values small enough for tests
pub fn fast_config() -> SyncConfig {
    SyncConfig {
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(10),
        ..SyncConfig::default()
    }
}

/// Database, service and scripted source wired together
pub async fn service_with(items: Vec<RemoteRepo>) -> (TestDb, Arc<SyncService>, Arc<FakeSource>) {
    let db = TestDb::new().await;
    let source = FakeSource::new(items);
    let service = Arc::new(SyncService::new(db.pool.clone(), source.clone()));
    (db, service, source)
}
