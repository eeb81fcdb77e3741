mod common;

use common::{days_ago, now, upstream, FakeMediaManager, FakeWatchHistory};
use providers::UpstreamTag;
use reclaim_core::clock::FixedClock;
use reclaim_core::sync::SyncOrchestrator;
use reclaim_core::SyncError;
use std::sync::Arc;
use storage::models::{RuleInput, SyncKind};
use storage::Database;

async fn open() -> Database {
    Database::open("sqlite::memory:").await.unwrap()
}

fn orchestrator(db: &Database, media: &FakeMediaManager, history: &FakeWatchHistory) -> SyncOrchestrator {
    SyncOrchestrator::new(
        db.clone(),
        Arc::new(media.clone()),
        Arc::new(history.clone()),
        Arc::new(FixedClock::utc(now())),
    )
}

fn label(id: i64, label: &str) -> UpstreamTag {
    UpstreamTag {
        id,
        label: label.to_string(),
    }
}

#[tokio::test]
async fn partial_sync_mirrors_upstream_without_deleting() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| {
        s.tags = vec![label(1, "kids"), label(2, "4k")];
        let mut heat = upstream(10, "Heat", Some(40));
        heat.tag_ids = vec![1, 3];
        s.movies = vec![heat, upstream(11, "Upcoming", None), upstream(12, "Ronin", Some(2))];
        s.import_list = vec![1012];
    });
    let history = FakeWatchHistory::default().watched("Heat", days_ago(3));
    db.rules()
        .create(RuleInput {
            name: "old".into(),
            enabled: true,
            downloaded_days_ago: Some(30),
            ..Default::default()
        })
        .await
        .unwrap();

    let report = orchestrator(&db, &media, &history)
        .run(SyncKind::Partial)
        .await
        .unwrap();

    assert_eq!(report.movies.upserted, 2);
    assert_eq!(report.movies.skipped_without_file, 1);
    assert_eq!(report.history.matched, 1);
    assert!(report.deletion.is_none());
    assert!(media.deleted().is_empty());

    let heat = db.movies().get(10).await.unwrap().unwrap();
    assert_eq!(heat.tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
    assert!(heat.watched);
    assert_eq!(heat.last_watched_at, Some(days_ago(3)));
    assert!(!heat.appears_in_list);
    assert!(db.movies().get(12).await.unwrap().unwrap().appears_in_list);
    assert!(db.movies().get(11).await.unwrap().is_none());

    let last = db.syncs().last_finished(None).await.unwrap().unwrap();
    assert_eq!(last.id, report.sync_id);
    assert_eq!(last.kind, SyncKind::Partial);
    assert!(db.syncs().running().await.unwrap().is_empty());
}

#[tokio::test]
async fn vanished_tag_disables_dependent_rules_for_good() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| s.tags = vec![label(1, "kids"), label(2, "4k")]);
    let history = FakeWatchHistory::default();
    let sync = orchestrator(&db, &media, &history);
    sync.sync_tags().await.unwrap();

    let rule = db
        .rules()
        .create(RuleInput {
            name: "4k only".into(),
            enabled: true,
            tag_ids: vec![2],
            ..Default::default()
        })
        .await
        .unwrap();

    media.update(|s| s.tags = vec![label(1, "children")]);
    let stats = sync.sync_tags().await.unwrap();
    assert_eq!(stats.rules_disabled, 1);
    assert_eq!(stats.removed, 1);

    let tags = db.tags().all().await.unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].name, "children");
    assert!(!db.rules().get(rule.id).await.unwrap().unwrap().enabled);

    let again = sync.sync_tags().await.unwrap();
    assert_eq!(again.rules_disabled, 0);
    assert!(!db.rules().get(rule.id).await.unwrap().unwrap().enabled);
}

#[tokio::test]
async fn movies_missing_upstream_are_soft_deleted() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| {
        s.movies = vec![upstream(1, "A", Some(1)), upstream(2, "B", Some(1))];
    });
    let history = FakeWatchHistory::default();
    let sync = orchestrator(&db, &media, &history);
    sync.sync_movies().await.unwrap();

    media.update(|s| s.movies.retain(|m| m.id == 1));
    let stats = sync.sync_movies().await.unwrap();
    assert_eq!(stats.removed, 1);

    let gone = db.movies().get(2).await.unwrap().unwrap();
    assert!(gone.deleted);
    assert_eq!(gone.deleted_at, Some(now()));
}

#[tokio::test]
async fn history_falls_back_to_alternative_titles() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| {
        let mut m = upstream(1, "Le Samourai", Some(1));
        m.alternative_titles = vec!["The Samurai".into(), "Der eiskalte Engel".into()];
        s.movies = vec![m];
    });
    let history = FakeWatchHistory::default().watched("The Samurai", days_ago(2));
    let sync = orchestrator(&db, &media, &history);
    sync.sync_movies().await.unwrap();

    let stats = sync.sync_watch_history().await.unwrap();
    assert_eq!(stats.matched, 1);
    assert_eq!(
        *history.searches.lock().unwrap(),
        vec!["Le Samourai".to_string(), "The Samurai".to_string()]
    );
    assert!(db.movies().get(1).await.unwrap().unwrap().watched);
}

#[tokio::test]
async fn full_sync_deletes_only_full_matches_once() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| {
        s.movies = vec![upstream(1, "Old", Some(35)), upstream(2, "New", Some(5))];
    });
    let history = FakeWatchHistory::default();
    db.rules()
        .create(RuleInput {
            name: "a month".into(),
            enabled: true,
            downloaded_days_ago: Some(30),
            ..Default::default()
        })
        .await
        .unwrap();
    let sync = orchestrator(&db, &media, &history);

    let report = sync.run(SyncKind::Full).await.unwrap();
    assert_eq!(report.deletion.unwrap().deleted, vec![1]);
    assert_eq!(media.deleted(), vec![1]);
    let old = db.movies().get(1).await.unwrap().unwrap();
    assert!(old.deleted);
    assert!(!db.movies().get(2).await.unwrap().unwrap().deleted);

    let again = sync.run(SyncKind::Full).await.unwrap();
    assert!(again.deletion.unwrap().deleted.is_empty());
    assert_eq!(media.deleted(), vec![1]);
}

#[tokio::test]
async fn failed_delete_stops_the_step_but_finishes_the_run() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| {
        s.movies = vec![upstream(1, "Newer", Some(40)), upstream(2, "Older", Some(50))];
        s.fail_delete = Some(2);
    });
    let history = FakeWatchHistory::default();
    db.rules()
        .create(RuleInput {
            name: "a month".into(),
            enabled: true,
            downloaded_days_ago: Some(30),
            ..Default::default()
        })
        .await
        .unwrap();

    let err = orchestrator(&db, &media, &history)
        .run(SyncKind::Full)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Step { step: "delete movies", .. }));

    assert!(db.movies().get(1).await.unwrap().unwrap().deleted);
    assert!(!db.movies().get(2).await.unwrap().unwrap().deleted);
    assert!(db.syncs().running().await.unwrap().is_empty());
    let last = db.syncs().last_finished(Some(SyncKind::Full)).await.unwrap();
    assert!(last.is_some());
}

#[tokio::test]
async fn unreachable_media_manager_aborts_but_finishes_the_run() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| s.unreachable = true);
    let history = FakeWatchHistory::default();

    let err = orchestrator(&db, &media, &history)
        .run(SyncKind::Partial)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Step { step: "sync tags", .. }));
    assert!(db.syncs().running().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_history_keeps_earlier_steps() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| s.movies = vec![upstream(1, "A", Some(1))]);
    let history = FakeWatchHistory {
        unreachable: true,
        ..Default::default()
    };

    let err = orchestrator(&db, &media, &history)
        .run(SyncKind::Partial)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Step { step: "sync watch history", .. }));
    assert!(db.movies().get(1).await.unwrap().is_some());
}

#[tokio::test]
async fn dry_run_leaves_candidates_alone() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| s.movies = vec![upstream(1, "Old", Some(35))]);
    let history = FakeWatchHistory::default();
    for name in ["first", "second"] {
        db.rules()
            .create(RuleInput {
                name: name.into(),
                enabled: true,
                downloaded_days_ago: Some(30),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let report = orchestrator(&db, &media, &history)
        .with_dry_run(true)
        .run(SyncKind::Full)
        .await
        .unwrap();
    let deletion = report.deletion.unwrap();
    assert!(deletion.deleted.is_empty());
    assert_eq!(deletion.skipped, vec![1]);
    assert!(media.deleted().is_empty());
    assert!(!db.movies().get(1).await.unwrap().unwrap().deleted);
}

#[tokio::test]
async fn ignored_movie_survives_full_sync() {
    let db = open().await;
    let media = FakeMediaManager::with(|s| s.movies = vec![upstream(1, "Keeper", Some(90))]);
    let history = FakeWatchHistory::default();
    db.rules()
        .create(RuleInput {
            name: "a month".into(),
            enabled: true,
            downloaded_days_ago: Some(30),
            ..Default::default()
        })
        .await
        .unwrap();
    let sync = orchestrator(&db, &media, &history);
    sync.sync_movies().await.unwrap();
    assert!(sync.catalog().set_ignored(1, true).await.unwrap());

    let report = sync.run(SyncKind::Full).await.unwrap();
    assert!(report.deletion.unwrap().deleted.is_empty());
    let keeper = db.movies().get(1).await.unwrap().unwrap();
    assert!(keeper.ignored);
    assert!(!keeper.deleted);
}
