//! Sync session orchestration
//!
//! `SyncService` runs one end-to-end synchronization at a time: fetch pages
//! from the remote source, diff them against the local mirror, resolve
//! conflicts, persist, and record history. Only one session may be active
//! process-wide; a second `sync()` call is rejected, not queued.
//!
//! Each record's persistence is atomic, but the session as a whole is not
//! transactional: partial progress survives a mid-session failure or
//! cancellation so a retry resumes close to where it left off.

use crate::diff::{self, ItemClass};
use crate::error::{Result, SyncError};
use crate::resolve::{self, ResolveAction};
use crate::source::{RemotePage, RemoteSource, SourceError};
use crate::types::{RemovalPolicy, SessionStatus, SyncConfig, SyncMode, SyncProgress};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use starling_core::types::{
    ConflictRecord, GithubId, RemoteRepo, RepoRecord, SyncHistoryEntry, SyncRunStatus,
};
use starling_storage::{conflicts, history, repos, StorageError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// External decision for a pending conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    KeepLocal,
    KeepRemote,
}

/// How one item ended up
enum ItemOutcome {
    Added,
    Updated { conflicts: usize },
    Skipped { conflicts: usize },
}

/// How the whole run ended
enum RunEnd {
    Completed,
    Cancelled,
    Failed(String),
}

/// Orchestrates sync sessions against one store and one remote source
pub struct SyncService {
    pool: SqlitePool,
    source: Arc<dyn RemoteSource>,
    status: Mutex<SessionStatus>,
    cancel: AtomicBool,
    pause: AtomicBool,
    progress_tx: watch::Sender<Option<SyncProgress>>,
}

impl SyncService {
    pub fn new(pool: SqlitePool, source: Arc<dyn RemoteSource>) -> Self {
        let (progress_tx, _) = watch::channel(None);
        Self {
            pool,
            source,
            status: Mutex::new(SessionStatus::Idle),
            cancel: AtomicBool::new(false),
            pause: AtomicBool::new(false),
            progress_tx,
        }
    }

    /// Run one sync session to completion
    ///
    /// Blocking from the caller's point of view: resolves once the session
    /// has reached a terminal state, with the history entry that was
    /// persisted for it. Returns `AlreadyRunning` without queuing if a
    /// session is active.
    pub async fn sync(&self, config: &SyncConfig, force_full: bool) -> Result<SyncHistoryEntry> {
        {
            let mut status = self.status.lock().await;
            if status.is_active() {
                return Err(SyncError::AlreadyRunning);
            }
            *status = SessionStatus::Running;
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.pause.store(false, Ordering::SeqCst);

        let session_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = std::time::Instant::now();
        let mode = if force_full { SyncMode::Full } else { config.mode };

        let mut progress = SyncProgress::start(session_id.clone(), started_at);
        self.publish(&progress);

        info!("Starting sync session {} (mode: {:?})", session_id, mode);

        let end = match tokio::time::timeout(
            config.timeout,
            self.run_inner(config, mode, &mut progress),
        )
        .await
        {
            Ok(Ok(end)) => end,
            Ok(Err(e)) => {
                error!("Sync session {} failed: {}", session_id, e);
                RunEnd::Failed(e.to_string())
            }
            Err(_) => {
                error!(
                    "Sync session {} exceeded its {:?} deadline",
                    session_id, config.timeout
                );
                RunEnd::Failed(SyncError::Timeout.to_string())
            }
        };

        let (run_status, session_status, error_message) = match end {
            RunEnd::Completed => (SyncRunStatus::Completed, SessionStatus::Completed, None),
            RunEnd::Cancelled => (SyncRunStatus::Cancelled, SessionStatus::Cancelled, None),
            RunEnd::Failed(msg) => (SyncRunStatus::Failed, SessionStatus::Failed, Some(msg)),
        };

        // Freeze the final snapshot; a poller during an aborted run sees the
        // progress at the point of abort, it never silently disappears.
        progress.status = session_status;
        progress.current_item = None;
        progress.error_message = error_message.clone();
        self.publish(&progress);

        let entry = SyncHistoryEntry {
            id: 0,
            session_id: session_id.clone(),
            sync_type: "repositories".to_string(),
            status: run_status,
            started_at,
            finished_at: Some(Utc::now()),
            total_items: progress.total_items as i64,
            processed: progress.processed_items as i64,
            added: progress.added_items as i64,
            updated: progress.updated_items as i64,
            deleted: progress.deleted_items as i64,
            skipped: progress.skipped_items as i64,
            failed: progress.failed_items as i64,
            duration_ms: Some(start.elapsed().as_millis() as i64),
            error_message,
        };

        if let Err(e) = history::append(&self.pool, &entry).await {
            error!("Failed to persist history for session {}: {}", session_id, e);
        }

        *self.status.lock().await = session_status;

        info!(
            "Sync session {} {}: processed={}, added={}, updated={}, deleted={}, skipped={}, failed={}",
            session_id,
            run_status.as_str(),
            entry.processed,
            entry.added,
            entry.updated,
            entry.deleted,
            entry.skipped,
            entry.failed
        );

        Ok(entry)
    }

    async fn run_inner(
        &self,
        config: &SyncConfig,
        mode: SyncMode,
        progress: &mut SyncProgress,
    ) -> Result<RunEnd> {
        // Removals cannot be detected from a partial fetch, so the full id
        // set is enumerated once per session in every mode. It doubles as
        // the progress total.
        let remote_ids = self.enumerate_with_retry(config).await?;
        let remote_total = remote_ids.len();
        progress.total_items = remote_total;
        self.publish(progress);

        let locals = repos::list_all(&self.pool).await?;
        let local_index: HashMap<GithubId, RepoRecord> =
            locals.iter().map(|r| (r.github_id, r.clone())).collect();

        let mut page_token: Option<String> = None;
        loop {
            if self.cancelled() {
                return Ok(RunEnd::Cancelled);
            }

            let page = self.fetch_page_with_retry(config, page_token.clone()).await?;

            for item in &page.items {
                // Checked per item, not per page, so cancellation latency is
                // bounded by one item's processing time.
                if self.cancelled() {
                    return Ok(RunEnd::Cancelled);
                }
                if self.wait_while_paused(progress).await {
                    return Ok(RunEnd::Cancelled);
                }

                progress.current_item = Some(item.full_name.clone());

                match self.process_item(config, mode, remote_total, &local_index, item).await {
                    Ok(ItemOutcome::Added) => progress.added_items += 1,
                    Ok(ItemOutcome::Updated { conflicts }) => {
                        progress.updated_items += 1;
                        progress.conflicts += conflicts;
                    }
                    Ok(ItemOutcome::Skipped { conflicts }) => {
                        progress.skipped_items += 1;
                        progress.conflicts += conflicts;
                    }
                    Err(e) => {
                        warn!("Processing {} failed: {}", item.full_name, e);
                        progress.failed_items += 1;
                    }
                }

                progress.processed_items += 1;
                // Exactly one snapshot per processed item
                self.publish(progress);
            }

            // Window exhausted: wait it out before asking for the next page
            if let Some(limit) = page.rate_limit.filter(|l| l.remaining == 0) {
                info!("Rate-limit window exhausted; pausing until {}", limit.reset_at);
                self.sleep_until(limit.reset_at).await;
            }

            page_token = page.next_page;
            if page_token.is_none() {
                break;
            }
        }

        // Removal pass: present locally, absent from the remote enumeration.
        // Already-absent records were filtered out, so a removal is marked
        // exactly once, never duplicated across sessions.
        for github_id in diff::removed_ids(&locals, &remote_ids) {
            if self.cancelled() {
                return Ok(RunEnd::Cancelled);
            }
            match self.remove_item(config, github_id).await {
                Ok(true) => {
                    progress.deleted_items += 1;
                    self.publish(progress);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Removal of {} failed: {}", github_id, e);
                    progress.failed_items += 1;
                    self.publish(progress);
                }
            }
        }

        Ok(RunEnd::Completed)
    }

    /// Diff, resolve, and persist one remote item
    async fn process_item(
        &self,
        config: &SyncConfig,
        mode: SyncMode,
        remote_total: usize,
        local_index: &HashMap<GithubId, RepoRecord>,
        item: &RemoteRepo,
    ) -> Result<ItemOutcome> {
        let now = Utc::now();

        let Some(local) = local_index.get(&item.github_id) else {
            self.store_with_retry(config, item, now).await?;
            return Ok(ItemOutcome::Added);
        };

        match diff::classify(Some(local), item, mode, remote_total) {
            ItemClass::Added => {
                // Reappearing identifier: persist the remote side, then wipe
                // the stale annotations so this reads as a fresh addition.
                self.store_with_retry(config, item, now).await?;
                if local.absent {
                    repos::reset_local_fields(&self.pool, item.github_id).await?;
                }
                Ok(ItemOutcome::Added)
            }
            ItemClass::Unchanged => Ok(ItemOutcome::Skipped { conflicts: 0 }),
            ItemClass::Changed(diffs) => {
                let resolution = resolve::resolve(local, item, &diffs, config.conflict_strategy);
                let conflict_count = resolution.conflicts.len();

                match resolution.action {
                    ResolveAction::ApplyRemote => {
                        self.store_with_retry(config, item, now).await?;
                        for conflict in &resolution.conflicts {
                            conflicts::append(&self.pool, conflict, now).await?;
                        }
                        Ok(ItemOutcome::Updated {
                            conflicts: conflict_count,
                        })
                    }
                    ResolveAction::KeepLocal => {
                        // Explicit suppression, not silent
                        debug!("{}: remote change skipped by policy (keep_local)", item.full_name);
                        Ok(ItemOutcome::Skipped { conflicts: 0 })
                    }
                    ResolveAction::PendingUser => {
                        for conflict in &resolution.conflicts {
                            conflicts::append(&self.pool, conflict, now).await?;
                        }
                        debug!(
                            "{}: {} field(s) pending user decision",
                            item.full_name, conflict_count
                        );
                        Ok(ItemOutcome::Skipped {
                            conflicts: conflict_count,
                        })
                    }
                }
            }
        }
    }

    /// Apply the configured removal policy to one disappeared record
    async fn remove_item(&self, config: &SyncConfig, github_id: GithubId) -> Result<bool> {
        let removed = match config.removal_policy {
            RemovalPolicy::MarkAbsent => repos::mark_absent(&self.pool, github_id, Utc::now()).await?,
            RemovalPolicy::Delete => repos::delete(&self.pool, github_id).await?,
        };
        if removed {
            debug!("{}: no longer present remotely", github_id);
        }
        Ok(removed)
    }

    async fn store_with_retry(
        &self,
        config: &SyncConfig,
        item: &RemoteRepo,
        now: DateTime<Utc>,
    ) -> Result<RepoRecord> {
        let mut attempt = 0;
        loop {
            match repos::upsert_remote(&self.pool, item, now).await {
                Ok(record) => return Ok(record),
                Err(e) => {
                    attempt += 1;
                    if attempt > config.max_retries {
                        return Err(e.into());
                    }
                    debug!(
                        "Store write for {} failed (attempt {}/{}): {}",
                        item.full_name, attempt, config.max_retries, e
                    );
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }

    async fn fetch_page_with_retry(
        &self,
        config: &SyncConfig,
        token: Option<String>,
    ) -> Result<RemotePage> {
        let mut attempt = 0;
        loop {
            match self.source.list_page(token.clone(), config.batch_size).await {
                Ok(page) => return Ok(page),
                Err(SourceError::RateLimited { reset_at }) => {
                    // A pause signal, not a failure: wait and retry the same
                    // page without consuming a retry attempt.
                    info!("Rate limited; pausing until {}", reset_at);
                    self.sleep_until(reset_at).await;
                }
                Err(e) if e.is_systemic() => return Err(e.into()),
                Err(e) => {
                    attempt += 1;
                    if attempt > config.max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Page fetch failed (attempt {}/{}): {}",
                        attempt, config.max_retries, e
                    );
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }

    async fn enumerate_with_retry(&self, config: &SyncConfig) -> Result<HashSet<GithubId>> {
        let mut attempt = 0;
        loop {
            match self.source.enumerate_ids().await {
                Ok(ids) => return Ok(ids),
                Err(SourceError::RateLimited { reset_at }) => {
                    info!("Rate limited; pausing until {}", reset_at);
                    self.sleep_until(reset_at).await;
                }
                Err(e) if e.is_systemic() => return Err(e.into()),
                Err(e) => {
                    attempt += 1;
                    if attempt > config.max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Identifier enumeration failed (attempt {}/{}): {}",
                        attempt, config.max_retries, e
                    );
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        if let Ok(wait) = (deadline - Utc::now()).to_std() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Returns true if the session was cancelled while paused
    async fn wait_while_paused(&self, progress: &mut SyncProgress) -> bool {
        if !self.pause.load(Ordering::SeqCst) {
            return false;
        }

        progress.status = SessionStatus::Paused;
        self.publish(progress);
        *self.status.lock().await = SessionStatus::Paused;

        while self.pause.load(Ordering::SeqCst) {
            if self.cancel.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        progress.status = SessionStatus::Running;
        self.publish(progress);
        *self.status.lock().await = SessionStatus::Running;
        false
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn publish(&self, progress: &SyncProgress) {
        self.progress_tx.send_replace(Some(progress.clone()));
    }

    // === Caller-facing surface ===

    /// Latest progress snapshot; `None` before the first session starts.
    /// After a finished or aborted run this returns the frozen final state.
    pub fn get_progress(&self) -> Option<SyncProgress> {
        self.progress_tx.borrow().clone()
    }

    /// Subscribe to progress snapshots, one per processed item
    ///
    /// Dropping the receiver is the unsubscribe.
    pub fn subscribe(&self) -> watch::Receiver<Option<SyncProgress>> {
        self.progress_tx.subscribe()
    }

    /// Current session status
    pub async fn status(&self) -> SessionStatus {
        *self.status.lock().await
    }

    /// Request cooperative cancellation of the active session
    ///
    /// At most one more item is processed before the session reaches
    /// `Cancelled`. Already-applied writes are not rolled back.
    pub async fn cancel(&self) -> Result<()> {
        if !self.status.lock().await.is_active() {
            return Err(SyncError::NotRunning);
        }
        info!("Cancelling sync");
        self.cancel.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Pause the active session at the next item boundary
    pub async fn pause(&self) -> Result<()> {
        if !self.status.lock().await.is_active() {
            return Err(SyncError::NotRunning);
        }
        info!("Pausing sync");
        self.pause.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Resume a paused session
    pub async fn resume(&self) -> Result<()> {
        if !self.status.lock().await.is_active() {
            return Err(SyncError::NotRunning);
        }
        info!("Resuming sync");
        self.pause.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Persisted history entries, most recent first
    pub async fn get_history(&self, limit: i64, offset: i64) -> Result<Vec<SyncHistoryEntry>> {
        Ok(history::list(&self.pool, limit, offset).await?)
    }

    /// Conflicts still pending an external decision
    pub async fn get_unresolved_conflicts(&self) -> Result<Vec<ConflictRecord>> {
        Ok(conflicts::list_unresolved(&self.pool).await?)
    }

    /// Resolve a pending conflict
    ///
    /// Separate from any sync session and idempotent: resolving an
    /// already-resolved conflict returns it unchanged.
    pub async fn resolve_conflict(
        &self,
        id: i64,
        resolution: ConflictResolution,
    ) -> Result<ConflictRecord> {
        let Some(existing) = conflicts::get_by_id(&self.pool, id).await? else {
            return Err(StorageError::not_found("conflict", id.to_string()).into());
        };
        if existing.resolution.is_some() {
            return Ok(existing);
        }

        let now = Utc::now();
        let label = match resolution {
            ConflictResolution::KeepLocal => "keep_local",
            ConflictResolution::KeepRemote => "keep_remote",
        };

        if resolution == ConflictResolution::KeepRemote {
            repos::apply_remote_field(
                &self.pool,
                existing.github_id,
                &existing.field_name,
                &existing.remote_value,
                now,
            )
            .await?;
        }

        Ok(conflicts::resolve(&self.pool, id, label, now).await?)
    }
}
