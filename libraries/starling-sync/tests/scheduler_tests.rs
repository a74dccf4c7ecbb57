//! Scheduler integration tests: configuration persistence, triggers, retries

mod test_helpers;

use starling_core::types::SyncRunStatus;
use starling_sync::{SchedulerConfig, SyncConfig, SyncError, SyncScheduler, SyncService};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{at, fast_config, repo, service_with, FakeSource, TestDb};

fn fast_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        retry_delay: Duration::from_millis(10),
        ..SchedulerConfig::default()
    }
}

#[tokio::test]
async fn configuration_persists_across_instances() {
    let (db, service, _source) = service_with(vec![]).await;
    let scheduler = SyncScheduler::new(db.pool.clone(), service.clone(), fast_config());

    let config = SchedulerConfig {
        interval: Duration::from_secs(3600),
        sync_on_startup: true,
        quiet_start: chrono::NaiveTime::from_hms_opt(23, 0, 0),
        quiet_end: chrono::NaiveTime::from_hms_opt(6, 0, 0),
        ..fast_scheduler_config()
    };
    scheduler.configure(config.clone()).await.expect("configure failed");

    // A fresh instance over the same database restores the stored config
    let rebuilt = SyncScheduler::new(db.pool.clone(), service, fast_config());
    let restored = rebuilt.restore_config().await.expect("restore failed");
    assert_eq!(restored, config);
    assert_eq!(rebuilt.get_config().await, config);
}

#[tokio::test]
async fn restore_without_a_stored_config_keeps_defaults() {
    let (db, service, _source) = service_with(vec![]).await;
    let scheduler = SyncScheduler::new(db.pool.clone(), service, fast_config());

    let restored = scheduler.restore_config().await.expect("restore failed");
    assert_eq!(restored, SchedulerConfig::default());
}

#[tokio::test]
async fn configure_rejects_nonsense() {
    let (db, service, _source) = service_with(vec![]).await;
    let scheduler = SyncScheduler::new(db.pool.clone(), service, fast_config());

    let zero_interval = SchedulerConfig {
        interval: Duration::ZERO,
        ..fast_scheduler_config()
    };
    assert!(matches!(
        scheduler.configure(zero_interval).await,
        Err(SyncError::InvalidConfig(_))
    ));

    let half_window = SchedulerConfig {
        quiet_start: chrono::NaiveTime::from_hms_opt(23, 0, 0),
        quiet_end: None,
        ..fast_scheduler_config()
    };
    assert!(matches!(
        scheduler.configure(half_window).await,
        Err(SyncError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn trigger_runs_a_session_and_updates_statistics() {
    let items = vec![
        repo(1, "a/one", 10, at(2024, 1, 1)),
        repo(2, "b/two", 20, at(2024, 1, 1)),
    ];
    let (db, service, _source) = service_with(items).await;
    let scheduler = SyncScheduler::new(db.pool.clone(), service, fast_config());

    let entry = scheduler.trigger(false).await.expect("trigger failed");
    assert_eq!(entry.status, SyncRunStatus::Completed);
    assert_eq!(entry.added, 2);

    let status = scheduler.status().await;
    assert!(status.last_run.is_some());
    assert_eq!(status.last_result, Some(SyncRunStatus::Completed));
    assert_eq!(status.consecutive_failures, 0);
    assert!(!status.syncing);

    let stats = scheduler.statistics().await.expect("statistics failed");
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.successful_runs, 1);
    assert_eq!(stats.success_rate, 1.0);
    assert_eq!(stats.total_added, 2);
    assert!(stats.average_duration_ms.is_some());
}

#[tokio::test]
async fn trigger_is_rejected_while_a_session_is_active() {
    let (db, service, source) = service_with(vec![repo(1, "a/one", 10, at(2024, 1, 1))]).await;
    source.set_page_delay(Duration::from_millis(300));
    let scheduler = SyncScheduler::new(db.pool.clone(), service.clone(), fast_config());

    let runner = {
        let service = service.clone();
        tokio::spawn(async move { service.sync(&fast_config(), false).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(matches!(
        scheduler.trigger(false).await,
        Err(SyncError::AlreadyRunning)
    ));

    runner.await.expect("task panicked").expect("sync failed");
}

#[tokio::test]
async fn failed_runs_are_retried_up_to_the_configured_limit() {
    let (db, service, source) = service_with(vec![repo(1, "a/one", 10, at(2024, 1, 1))]).await;
    source.fail_next_pages(100);
    let scheduler = SyncScheduler::new(
        db.pool.clone(),
        service,
        SyncConfig {
            max_retries: 0,
            ..fast_config()
        },
    );
    scheduler
        .configure(SchedulerConfig {
            retry_on_failure: true,
            max_retry_attempts: 2,
            ..fast_scheduler_config()
        })
        .await
        .expect("configure failed");

    let entry = scheduler.trigger(false).await.expect("trigger failed");
    assert_eq!(entry.status, SyncRunStatus::Failed);

    // Every attempt went through the service and left a history row
    let history = scheduler.statistics().await.expect("statistics failed");
    assert_eq!(history.total_runs, 2);
    assert_eq!(history.failed_runs, 2);
    assert_eq!(scheduler.status().await.consecutive_failures, 1);
}

#[tokio::test]
async fn retry_is_skipped_when_disabled() {
    let (db, service, source) = service_with(vec![repo(1, "a/one", 10, at(2024, 1, 1))]).await;
    source.fail_next_pages(100);
    let scheduler = SyncScheduler::new(
        db.pool.clone(),
        service,
        SyncConfig {
            max_retries: 0,
            ..fast_config()
        },
    );
    scheduler
        .configure(SchedulerConfig {
            retry_on_failure: false,
            ..fast_scheduler_config()
        })
        .await
        .expect("configure failed");

    scheduler.trigger(false).await.expect("trigger failed");

    let stats = scheduler.statistics().await.expect("statistics failed");
    assert_eq!(stats.total_runs, 1);
}

#[tokio::test]
async fn startup_sync_runs_when_the_loop_starts() {
    let (db, service, _source) = service_with(vec![repo(1, "a/one", 10, at(2024, 1, 1))]).await;
    let scheduler = SyncScheduler::new(db.pool.clone(), service, fast_config());
    scheduler
        .configure(SchedulerConfig {
            sync_on_startup: true,
            // Long enough that no interval run fires during the test
            interval: Duration::from_secs(6 * 60 * 60),
            ..fast_scheduler_config()
        })
        .await
        .expect("configure failed");

    scheduler.start().await.expect("start failed");
    assert!(scheduler.status().await.running);
    // Starting twice is an error
    assert!(matches!(scheduler.start().await, Err(SyncError::AlreadyRunning)));

    // Give the startup run time to finish
    tokio::time::sleep(Duration::from_millis(500)).await;
    let stats = scheduler.statistics().await.expect("statistics failed");
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.successful_runs, 1);

    scheduler.stop().await;
    assert!(!scheduler.status().await.running);
}

#[tokio::test]
async fn disabled_scheduler_does_not_start_a_loop() {
    let (db, service, _source) = service_with(vec![]).await;
    let scheduler = SyncScheduler::new(db.pool.clone(), service, fast_config());
    scheduler
        .configure(SchedulerConfig {
            enabled: false,
            ..fast_scheduler_config()
        })
        .await
        .expect("configure failed");

    scheduler.start().await.expect("start failed");
    assert!(!scheduler.status().await.running);
}

#[tokio::test]
async fn interval_runs_fire_on_schedule() {
    let items = vec![repo(1, "a/one", 10, at(2024, 1, 1))];
    let db = TestDb::new().await;
    let source = FakeSource::new(items);
    let service = Arc::new(SyncService::new(db.pool.clone(), source));
    let scheduler = SyncScheduler::new(db.pool.clone(), service, fast_config());
    scheduler
        .configure(SchedulerConfig {
            sync_on_startup: false,
            interval: Duration::from_millis(100),
            ..fast_scheduler_config()
        })
        .await
        .expect("configure failed");

    scheduler.start().await.expect("start failed");
    assert!(scheduler.status().await.next_run.is_some());

    tokio::time::sleep(Duration::from_millis(350)).await;
    scheduler.stop().await;

    let stats = scheduler.statistics().await.expect("statistics failed");
    assert!(stats.total_runs >= 2, "only {} runs fired", stats.total_runs);
}
