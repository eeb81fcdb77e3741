mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{upstream, FakeMediaManager, FakeWatchHistory};
use reclaim_core::clock::{Clock, FixedClock};
use reclaim_core::scheduler::{decide, until_next_hour, Scheduler, TickOutcome};
use reclaim_core::sync::SyncOrchestrator;
use std::sync::Arc;
use storage::models::{GeneralSettings, SyncKind, SyncRun};
use storage::Database;

fn settings(enabled: bool) -> GeneralSettings {
    GeneralSettings {
        enabled,
        sync_days: 7,
        sync_hour: 3,
    }
}

fn at_hour(hour: u32) -> chrono::DateTime<chrono::FixedOffset> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap().fixed_offset()
}

fn full_run(finished_days_ago: i64) -> SyncRun {
    let finished = at_hour(3).with_timezone(&Utc) - Duration::days(finished_days_ago);
    SyncRun {
        id: 1,
        kind: SyncKind::Full,
        started_at: finished - Duration::minutes(10),
        finished_at: Some(finished),
    }
}

#[test]
fn first_full_sync_runs_at_the_sync_hour() {
    assert_eq!(decide(&settings(true), None, at_hour(3)), SyncKind::Full);
    assert_eq!(decide(&settings(true), None, at_hour(4)), SyncKind::Partial);
    assert_eq!(decide(&settings(false), None, at_hour(3)), SyncKind::Partial);
}

#[test]
fn full_sync_waits_for_the_interval() {
    let s = settings(true);
    assert_eq!(decide(&s, Some(&full_run(2)), at_hour(3)), SyncKind::Partial);
    assert_eq!(decide(&s, Some(&full_run(7)), at_hour(3)), SyncKind::Full);
    assert_eq!(decide(&s, Some(&full_run(8)), at_hour(3)), SyncKind::Full);
    assert_eq!(decide(&s, Some(&full_run(8)), at_hour(5)), SyncKind::Partial);
}

#[test]
fn full_sync_interval_counts_days_from_the_run_start() {
    let s = GeneralSettings {
        enabled: true,
        sync_days: 1,
        sync_hour: 3,
    };
    let started = at_hour(3).with_timezone(&Utc) - Duration::days(1);
    let last = SyncRun {
        id: 1,
        kind: SyncKind::Full,
        started_at: started,
        finished_at: Some(started + Duration::minutes(5)),
    };
    assert_eq!(decide(&s, Some(&last), at_hour(3)), SyncKind::Full);

    let same_day = SyncRun {
        started_at: at_hour(3).with_timezone(&Utc),
        finished_at: Some(at_hour(3).with_timezone(&Utc) + Duration::minutes(5)),
        ..last
    };
    assert_eq!(decide(&s, Some(&same_day), at_hour(3)), SyncKind::Partial);
}

#[test]
fn next_tick_lands_on_the_hour() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 3, 59, 30).unwrap().fixed_offset();
    assert_eq!(until_next_hour(now), std::time::Duration::from_secs(30));
    assert_eq!(until_next_hour(at_hour(3)), std::time::Duration::from_secs(3600));
}

async fn scheduler(db: &Database, clock: FixedClock) -> (Scheduler, FakeMediaManager) {
    let media = FakeMediaManager::with(|s| s.movies = vec![upstream(1, "Old", Some(400))]);
    let clock: Arc<dyn Clock> = Arc::new(clock);
    let orchestrator = SyncOrchestrator::new(
        db.clone(),
        Arc::new(media.clone()),
        Arc::new(FakeWatchHistory::default()),
        clock.clone(),
    );
    (Scheduler::new(db.clone(), orchestrator, clock), media)
}

#[tokio::test]
async fn reaper_finishes_runs_older_than_twelve_hours() {
    let db = Database::open("sqlite::memory:").await.unwrap();
    let now = at_hour(15).with_timezone(&Utc);
    let stuck = db.syncs().start(SyncKind::Full, now - Duration::hours(13)).await.unwrap();
    let fresh = db.syncs().start(SyncKind::Partial, now - Duration::hours(1)).await.unwrap();

    let (scheduler, _) = scheduler(&db, FixedClock::utc(now)).await;
    assert_eq!(scheduler.reap().await.unwrap(), vec![stuck.id]);

    let running = db.syncs().running().await.unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, fresh.id);
    let reaped = db.syncs().recent(10).await.unwrap();
    let reaped = reaped.iter().find(|r| r.id == stuck.id).unwrap();
    assert_eq!(reaped.finished_at, Some(now));
}

#[tokio::test]
async fn tick_skips_while_a_run_is_in_progress() {
    let db = Database::open("sqlite::memory:").await.unwrap();
    let now = at_hour(3).with_timezone(&Utc);
    let running = db.syncs().start(SyncKind::Partial, now - Duration::minutes(5)).await.unwrap();

    let (scheduler, media) = scheduler(&db, FixedClock::utc(now)).await;
    match scheduler.tick().await.unwrap() {
        TickOutcome::Skipped { running: ids } => assert_eq!(ids, vec![running.id]),
        other => panic!("expected skip, got {other:?}"),
    }
    assert!(media.deleted().is_empty());
}

#[tokio::test]
async fn tick_runs_full_sync_at_the_configured_hour() {
    let db = Database::open("sqlite::memory:").await.unwrap();
    db.settings().ensure(&settings(true)).await.unwrap();
    db.rules()
        .create(storage::models::RuleInput {
            name: "a year".into(),
            enabled: true,
            downloaded_days_ago: Some(365),
            ..Default::default()
        })
        .await
        .unwrap();

    let (at_three, media) = scheduler(&db, FixedClock(at_hour(3))).await;
    match at_three.tick().await.unwrap() {
        TickOutcome::Completed(report) => assert_eq!(report.kind, SyncKind::Full),
        other => panic!("expected a run, got {other:?}"),
    }
    assert_eq!(media.deleted(), vec![1]);

    let (at_four, _) = scheduler(&db, FixedClock(at_hour(4))).await;
    match at_four.tick().await.unwrap() {
        TickOutcome::Completed(report) => assert_eq!(report.kind, SyncKind::Partial),
        other => panic!("expected a run, got {other:?}"),
    }
}
