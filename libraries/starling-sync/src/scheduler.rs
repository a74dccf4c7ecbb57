//! Periodic sync scheduling
//!
//! A background loop triggers sync sessions on a fixed interval, deferring
//! runs that land inside a configured quiet window and retrying failed runs
//! a bounded number of times. Manual triggers go through the same path as
//! scheduled runs, so retry accounting and history stay uniform.

use crate::error::{Result, SyncError};
use crate::service::SyncService;
use crate::types::SyncConfig;
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use starling_core::types::{SyncHistoryEntry, SyncRunStatus};
use starling_storage::settings::{self, SETTING_SCHEDULER};
use starling_storage::history;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// History rows considered when computing [`SyncStatistics`]
pub const STATISTICS_WINDOW: i64 = 100;

/// Scheduler configuration, persisted under the `sync.scheduler` setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Interval between scheduled runs
    pub interval: Duration,
    /// Run a sync immediately when the scheduler starts
    pub sync_on_startup: bool,
    /// Retry a failed scheduled run before giving up until the next interval
    pub retry_on_failure: bool,
    pub max_retry_attempts: u32,
    /// Delay between retry attempts
    pub retry_delay: Duration,
    /// Start of the quiet window (local wall-clock); runs landing inside it
    /// are deferred until the window ends
    pub quiet_start: Option<NaiveTime>,
    /// End of the quiet window; may be earlier than `quiet_start`, in which
    /// case the window crosses midnight
    pub quiet_end: Option<NaiveTime>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(6 * 60 * 60),
            sync_on_startup: false,
            retry_on_failure: true,
            max_retry_attempts: 3,
            retry_delay: Duration::from_secs(10 * 60),
            quiet_start: None,
            quiet_end: None,
        }
    }
}

/// Scheduler state as observed by callers
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub running: bool,
    pub syncing: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_result: Option<SyncRunStatus>,
    pub next_run: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

/// Aggregates over the most recent history window
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatistics {
    pub total_runs: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    pub cancelled_runs: usize,
    /// Successful share of all runs in the window, 0.0 when empty
    pub success_rate: f32,
    pub average_duration_ms: Option<i64>,
    pub total_added: i64,
    pub total_updated: i64,
    pub total_deleted: i64,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct SchedState {
    syncing: bool,
    last_run: Option<DateTime<Utc>>,
    last_result: Option<SyncRunStatus>,
    next_run: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

struct Shared {
    service: Arc<SyncService>,
    pool: SqlitePool,
    config: RwLock<SchedulerConfig>,
    sync_config: RwLock<SyncConfig>,
    state: Mutex<SchedState>,
}

/// Drives scheduled sync sessions against one [`SyncService`]
pub struct SyncScheduler {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SyncScheduler {
    pub fn new(pool: SqlitePool, service: Arc<SyncService>, sync_config: SyncConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                service,
                pool,
                config: RwLock::new(SchedulerConfig::default()),
                sync_config: RwLock::new(sync_config),
                state: Mutex::new(SchedState::default()),
            }),
            handle: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// Load a previously persisted configuration, keeping defaults when none
    /// was stored or the stored value no longer deserializes
    pub async fn restore_config(&self) -> Result<SchedulerConfig> {
        if let Some(value) = settings::get(&self.shared.pool, SETTING_SCHEDULER).await? {
            match serde_json::from_value::<SchedulerConfig>(value) {
                Ok(config) => {
                    *self.shared.config.write().await = config.clone();
                    return Ok(config);
                }
                Err(e) => warn!("Stored scheduler configuration is unreadable: {}", e),
            }
        }
        Ok(self.shared.config.read().await.clone())
    }

    /// Replace and persist the scheduler configuration
    ///
    /// A running loop picks up the new interval after its current sleep.
    pub async fn configure(&self, config: SchedulerConfig) -> Result<()> {
        if config.interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "scheduler interval must be non-zero".to_string(),
            ));
        }
        if config.quiet_start.is_some() != config.quiet_end.is_some() {
            return Err(SyncError::InvalidConfig(
                "quiet hours need both a start and an end".to_string(),
            ));
        }

        let value = serde_json::to_value(&config)
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        settings::set(&self.shared.pool, SETTING_SCHEDULER, &value).await?;
        *self.shared.config.write().await = config;
        Ok(())
    }

    pub async fn get_config(&self) -> SchedulerConfig {
        self.shared.config.read().await.clone()
    }

    /// Replace the per-session sync configuration used by scheduled runs
    pub async fn set_sync_config(&self, config: SyncConfig) {
        *self.shared.sync_config.write().await = config;
    }

    /// Start the background loop
    ///
    /// No-op when disabled by configuration; an error when already started.
    pub async fn start(&self) -> Result<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Err(SyncError::AlreadyRunning);
        }
        if !self.shared.config.read().await.enabled {
            info!("Scheduler disabled by configuration; not starting");
            return Ok(());
        }

        self.shutdown_tx.send_replace(false);
        let shared = Arc::clone(&self.shared);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *handle = Some(tokio::spawn(run_loop(shared, shutdown_rx)));
        info!("Sync scheduler started");
        Ok(())
    }

    /// Stop the background loop, waiting for it to exit
    ///
    /// A sync session already in flight is left to finish on its own.
    pub async fn stop(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            self.shutdown_tx.send_replace(true);
            if let Err(e) = handle.await {
                warn!("Scheduler loop ended abnormally: {}", e);
            }
            self.shared.state.lock().await.next_run = None;
            info!("Sync scheduler stopped");
        }
    }

    /// Trigger a sync now, outside the schedule
    ///
    /// Shares the retry path with scheduled runs. Rejected with
    /// `AlreadyRunning` when a session is active.
    pub async fn trigger(&self, force_full: bool) -> Result<SyncHistoryEntry> {
        if self.shared.service.status().await.is_active() {
            return Err(SyncError::AlreadyRunning);
        }
        run_once(&self.shared, force_full)
            .await
            .ok_or(SyncError::AlreadyRunning)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.shared.state.lock().await;
        SchedulerStatus {
            enabled: self.shared.config.read().await.enabled,
            running: self.handle.lock().await.is_some(),
            syncing: state.syncing,
            last_run: state.last_run,
            last_result: state.last_result,
            next_run: state.next_run,
            consecutive_failures: state.consecutive_failures,
        }
    }

    /// Aggregate statistics over the last [`STATISTICS_WINDOW`] runs
    pub async fn statistics(&self) -> Result<SyncStatistics> {
        let entries = history::list(&self.shared.pool, STATISTICS_WINDOW, 0).await?;
        Ok(compute_statistics(&entries))
    }
}

async fn run_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    if shared.config.read().await.sync_on_startup {
        run_once(&shared, false).await;
    }

    loop {
        let interval = shared.config.read().await.interval;
        {
            let mut state = shared.state.lock().await;
            state.next_run = TimeDelta::from_std(interval).ok().map(|d| Utc::now() + d);
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => return,
        }

        let (quiet_start, quiet_end) = {
            let config = shared.config.read().await;
            (config.quiet_start, config.quiet_end)
        };
        if let Some(wait) = quiet_deferral(Utc::now().time(), quiet_start, quiet_end) {
            info!("Scheduled sync falls inside quiet hours; deferring {:?}", wait);
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => return,
            }
        }

        run_once(&shared, false).await;
    }
}

/// Run one sync with the configured retry policy
///
/// Returns `None` when another run claimed the scheduler first or when every
/// attempt failed before a session could even start.
async fn run_once(shared: &Shared, force_full: bool) -> Option<SyncHistoryEntry> {
    {
        let mut state = shared.state.lock().await;
        if state.syncing {
            return None;
        }
        state.syncing = true;
    }

    let (retry_on_failure, max_attempts, retry_delay) = {
        let config = shared.config.read().await;
        (
            config.retry_on_failure,
            config.max_retry_attempts.max(1),
            config.retry_delay,
        )
    };
    let attempts = if retry_on_failure { max_attempts } else { 1 };
    let sync_config = shared.sync_config.read().await.clone();

    let mut outcome: Option<SyncHistoryEntry> = None;
    for attempt in 1..=attempts {
        match shared.service.sync(&sync_config, force_full).await {
            Ok(entry) => {
                let status = entry.status;
                outcome = Some(entry);
                // A cancellation is deliberate, not a failure to retry
                if status != SyncRunStatus::Failed {
                    break;
                }
            }
            Err(e) => {
                warn!("Sync attempt {}/{} did not start: {}", attempt, attempts, e);
            }
        }
        if attempt < attempts {
            info!("Retrying sync in {:?} (attempt {}/{})", retry_delay, attempt + 1, attempts);
            tokio::time::sleep(retry_delay).await;
        }
    }

    let mut state = shared.state.lock().await;
    state.syncing = false;
    state.last_run = Some(Utc::now());
    state.last_result = outcome.as_ref().map(|e| e.status);
    match outcome.as_ref().map(|e| e.status) {
        Some(SyncRunStatus::Completed) => state.consecutive_failures = 0,
        Some(SyncRunStatus::Cancelled) => {}
        _ => state.consecutive_failures += 1,
    }

    outcome
}

/// Whether `now` falls inside the quiet window; windows may cross midnight
fn in_quiet_hours(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        now >= start && now < end
    } else {
        now >= start || now < end
    }
}

/// How long to defer a run that landed inside the quiet window, if any
fn quiet_deferral(
    now: NaiveTime,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
) -> Option<Duration> {
    let (start, end) = (start?, end?);
    if !in_quiet_hours(now, start, end) {
        return None;
    }
    let mut delta = end.signed_duration_since(now);
    if delta <= TimeDelta::zero() {
        delta = delta + TimeDelta::hours(24);
    }
    delta.to_std().ok()
}

fn compute_statistics(entries: &[SyncHistoryEntry]) -> SyncStatistics {
    let total_runs = entries.len();
    let successful_runs = entries
        .iter()
        .filter(|e| e.status == SyncRunStatus::Completed)
        .count();
    let failed_runs = entries
        .iter()
        .filter(|e| e.status == SyncRunStatus::Failed)
        .count();
    let cancelled_runs = entries
        .iter()
        .filter(|e| e.status == SyncRunStatus::Cancelled)
        .count();

    let durations: Vec<i64> = entries.iter().filter_map(|e| e.duration_ms).collect();
    let average_duration_ms = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<i64>() / durations.len() as i64)
    };

    SyncStatistics {
        total_runs,
        successful_runs,
        failed_runs,
        cancelled_runs,
        success_rate: if total_runs == 0 {
            0.0
        } else {
            successful_runs as f32 / total_runs as f32
        },
        average_duration_ms,
        total_added: entries.iter().map(|e| e.added).sum(),
        total_updated: entries.iter().map(|e| e.updated).sum(),
        total_deleted: entries.iter().map(|e| e.deleted).sum(),
        last_run: entries.first().map(|e| e.started_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn quiet_window_same_day() {
        let (start, end) = (t(1, 0), t(6, 0));
        assert!(!in_quiet_hours(t(0, 30), start, end));
        assert!(in_quiet_hours(t(1, 0), start, end));
        assert!(in_quiet_hours(t(5, 59), start, end));
        assert!(!in_quiet_hours(t(6, 0), start, end));
    }

    #[test]
    fn quiet_window_crossing_midnight() {
        let (start, end) = (t(22, 0), t(6, 0));
        assert!(in_quiet_hours(t(23, 0), start, end));
        assert!(in_quiet_hours(t(2, 0), start, end));
        assert!(!in_quiet_hours(t(12, 0), start, end));
    }

    #[test]
    fn deferral_reaches_the_window_end() {
        let wait = quiet_deferral(t(23, 0), Some(t(22, 0)), Some(t(6, 0))).unwrap();
        assert_eq!(wait, Duration::from_secs(7 * 60 * 60));

        assert!(quiet_deferral(t(12, 0), Some(t(22, 0)), Some(t(6, 0))).is_none());
        assert!(quiet_deferral(t(12, 0), None, None).is_none());
    }

    #[test]
    fn statistics_over_empty_history() {
        let stats = compute_statistics(&[]);
        assert_eq!(stats.total_runs, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.average_duration_ms.is_none());
        assert!(stats.last_run.is_none());
    }

    #[test]
    fn statistics_aggregate_counts_and_durations() {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let entry = |status, duration_ms, added| SyncHistoryEntry {
            id: 0,
            session_id: "s".to_string(),
            sync_type: "repositories".to_string(),
            status,
            started_at: base,
            finished_at: Some(base),
            total_items: 10,
            processed: 10,
            added,
            updated: 1,
            deleted: 0,
            skipped: 0,
            failed: 0,
            duration_ms,
            error_message: None,
        };

        let stats = compute_statistics(&[
            entry(SyncRunStatus::Completed, Some(100), 3),
            entry(SyncRunStatus::Completed, Some(300), 2),
            entry(SyncRunStatus::Failed, None, 0),
            entry(SyncRunStatus::Cancelled, Some(200), 0),
        ]);

        assert_eq!(stats.total_runs, 4);
        assert_eq!(stats.successful_runs, 2);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.cancelled_runs, 1);
        assert_eq!(stats.success_rate, 0.5);
        assert_eq!(stats.average_duration_ms, Some(200));
        assert_eq!(stats.total_added, 5);
        assert_eq!(stats.total_updated, 3);
    }
}
