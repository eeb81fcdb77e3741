//! One reconciliation pass against the media manager and the watch-history
//! tracker. Steps run strictly in order and each is idempotent, so a failed
//! run is repaired by the next one.

use crate::catalog::MovieCatalog;
use crate::clock::Clock;
use crate::error::SyncError;
use crate::mapping::MovieMapper;
use anyhow::Context;
use providers::{MediaManager, WatchHistory};
use serde::Serialize;
use std::sync::Arc;
use storage::models::{SyncKind, Tag};
use storage::Database;
use tracing::{debug, error, info, warn};

const MEDIA_MANAGER: &str = "media manager";
const WATCH_HISTORY: &str = "watch history";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSyncStats {
    pub upserted: usize,
    pub removed: u64,
    pub rules_disabled: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovieSyncStats {
    pub upserted: usize,
    pub skipped_without_file: usize,
    pub removed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistorySyncStats {
    pub matched: usize,
    pub unmatched: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionStats {
    pub deleted: Vec<i64>,
    /// Candidates left alone because of dry-run mode.
    pub skipped: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub sync_id: i64,
    pub kind: SyncKind,
    pub tags: TagSyncStats,
    pub movies: MovieSyncStats,
    pub history: HistorySyncStats,
    pub deletion: Option<DeletionStats>,
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    db: Database,
    catalog: MovieCatalog,
    media: Arc<dyn MediaManager>,
    history: Arc<dyn WatchHistory>,
    clock: Arc<dyn Clock>,
    dry_run: bool,
}

impl SyncOrchestrator {
    pub fn new(
        db: Database,
        media: Arc<dyn MediaManager>,
        history: Arc<dyn WatchHistory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog: MovieCatalog::new(db.clone(), clock.clone()),
            db,
            media,
            history,
            clock,
            dry_run: false,
        }
    }

    /// Deletion candidates are logged instead of deleted.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn catalog(&self) -> &MovieCatalog {
        &self.catalog
    }

    /// Records a run, executes its steps and always marks the run finished.
    /// When recording the start fails nothing runs and no record is left behind.
    pub async fn run(&self, kind: SyncKind) -> Result<SyncReport, SyncError> {
        let syncs = self.db.syncs();
        let run = match syncs.start(kind, self.clock.now_utc()).await {
            Ok(run) => run,
            Err(source) => {
                error!(%kind, error = %source, "could not start sync");
                return Err(SyncError::StartFailed { kind, source });
            }
        };
        info!(sync_id = run.id, %kind, "Sync started");

        let result = self.run_steps(run.id, kind).await;

        let finished = syncs.finish(run.id, self.clock.now_utc()).await;
        match (result, finished) {
            (Ok(report), Ok(_)) => {
                info!(sync_id = run.id, %kind, "Sync finished");
                Ok(report)
            }
            (Ok(_), Err(source)) => {
                error!(sync_id = run.id, error = %source, "could not mark sync finished");
                Err(SyncError::Step {
                    step: "finish sync",
                    source,
                })
            }
            (Err(e), finished) => {
                if let Err(fin) = finished {
                    warn!(sync_id = run.id, error = %fin, "could not mark failed sync finished");
                }
                error!(sync_id = run.id, %kind, error = %e, cause = %error_chain(&e), "Sync failed");
                Err(e)
            }
        }
    }

    async fn run_steps(&self, sync_id: i64, kind: SyncKind) -> Result<SyncReport, SyncError> {
        let tags = self.sync_tags().await.map_err(SyncError::step("sync tags"))?;
        let movies = self.sync_movies().await.map_err(SyncError::step("sync movies"))?;
        let history = self
            .sync_watch_history()
            .await
            .map_err(SyncError::step("sync watch history"))?;
        let deletion = match kind {
            SyncKind::Full => Some(
                self.delete_matched_movies()
                    .await
                    .map_err(SyncError::step("delete movies"))?,
            ),
            SyncKind::Partial => None,
        };
        Ok(SyncReport {
            sync_id,
            kind,
            tags,
            movies,
            history,
            deletion,
        })
    }

    async fn require_media_manager(&self) -> anyhow::Result<providers::MediaManagerPing> {
        let ping = self.media.ping().await;
        if !ping.success {
            return Err(SyncError::Unreachable {
                service: MEDIA_MANAGER,
            }
            .into());
        }
        Ok(ping)
    }

    /// Mirrors the upstream tag set. Rules are disabled before vanished tags
    /// are removed so the cascade still sees their associations.
    pub async fn sync_tags(&self) -> anyhow::Result<TagSyncStats> {
        self.require_media_manager().await?;
        let upstream = self.media.list_tags().await.context("list upstream tags")?;
        let valid: Vec<i64> = upstream.iter().map(|t| t.id).collect();

        let rules_disabled = self.db.rules().disable_where_tags_not_in(&valid).await?;
        if rules_disabled > 0 {
            warn!(rules_disabled, "Disabled rules whose tags no longer exist");
        }
        let tags = self.db.tags();
        let removed = tags.delete_where_not_in(&valid).await?;
        for tag in &upstream {
            tags.upsert(&Tag {
                id: tag.id,
                name: tag.label.clone(),
            })
            .await
            .with_context(|| format!("upsert tag {} ({})", tag.id, tag.label))?;
        }
        info!(upserted = upstream.len(), removed, "Synced tags");
        Ok(TagSyncStats {
            upserted: upstream.len(),
            removed,
            rules_disabled,
        })
    }

    /// Upserts every downloaded upstream movie, then flags local movies the
    /// media manager no longer reports.
    pub async fn sync_movies(&self) -> anyhow::Result<MovieSyncStats> {
        self.require_media_manager().await?;
        let upstream = self.media.list_movies().await.context("list upstream movies")?;
        let import_list = self
            .media
            .list_import_list_movies()
            .await
            .context("list import list movies")?;
        let mapper = MovieMapper::new(&import_list, self.db.tags().all().await?);

        let mut stats = MovieSyncStats::default();
        let upstream_ids: Vec<i64> = upstream.iter().map(|m| m.id).collect();
        for item in upstream {
            let (id, title) = (item.id, item.title.clone());
            match mapper.to_movie(item) {
                Some(movie) => {
                    self.catalog.upsert(&movie).await?;
                    debug!(movie_id = id, title = %title, "Synced movie");
                    stats.upserted += 1;
                }
                None => {
                    debug!(movie_id = id, title = %title, "Skipping movie without a file");
                    stats.skipped_without_file += 1;
                }
            }
        }
        stats.removed = self.catalog.delete_where_not_in(&upstream_ids).await?;
        info!(
            upserted = stats.upserted,
            skipped = stats.skipped_without_file,
            removed = stats.removed,
            "Synced movies"
        );
        Ok(stats)
    }

    /// Looks every live movie up by title, then by alternative titles, and
    /// records the first hit.
    pub async fn sync_watch_history(&self) -> anyhow::Result<HistorySyncStats> {
        if !self.history.ping().await.success {
            return Err(SyncError::Unreachable {
                service: WATCH_HISTORY,
            }
            .into());
        }
        let movies = self.db.movies();
        let mut stats = HistorySyncStats::default();
        for movie in self.catalog.not_deleted().await? {
            let mut found = None;
            for title in movie.titles() {
                let status = self
                    .history
                    .search_by_title(title)
                    .await
                    .with_context(|| format!("search watch history for {title:?}"))?;
                if status.is_some() {
                    found = status;
                    break;
                }
            }
            match found {
                Some(status) => {
                    movies
                        .set_watch_status(movie.id, status.watched, status.last_watched_at)
                        .await
                        .with_context(|| format!("update watch status of movie {}", movie.id))?;
                    stats.matched += 1;
                }
                None => {
                    debug!(movie_id = movie.id, title = %movie.title, "No watch history match");
                    stats.unmatched += 1;
                }
            }
        }
        info!(matched = stats.matched, unmatched = stats.unmatched, "Synced watch history");
        Ok(stats)
    }

    /// Deletes every full match of every enabled rule, in rule creation order.
    /// The first failed deletion stops the step; movies already deleted stay deleted.
    pub async fn delete_matched_movies(&self) -> anyhow::Result<DeletionStats> {
        let ping = self.require_media_manager().await?;
        match ping.has_recycle_bin {
            Some(true) => info!("Recycle bin configured, deleted files can be restored"),
            Some(false) => warn!("No recycle bin configured, deleted files are gone for good"),
            None => debug!("Recycle bin status unknown"),
        }

        let mut stats = DeletionStats::default();
        for rule in self.db.rules().enabled().await? {
            for movie in self.catalog.for_rule(&rule, false).await? {
                if self.dry_run {
                    if stats.skipped.contains(&movie.id) {
                        continue;
                    }
                    info!(movie_id = movie.id, title = %movie.title, rule = %rule.name, "Dry run, not deleting movie");
                    stats.skipped.push(movie.id);
                    continue;
                }
                self.media
                    .delete_movie(movie.id)
                    .await
                    .with_context(|| format!("delete movie {} ({}) for rule {:?}", movie.id, movie.title, rule.name))?;
                self.catalog.soft_delete(movie.id).await?;
                info!(movie_id = movie.id, title = %movie.title, rule = %rule.name, "Deleted movie");
                stats.deleted.push(movie.id);
            }
        }
        Ok(stats)
    }
}

fn error_chain(e: &SyncError) -> String {
    let mut parts = Vec::new();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        parts.push(s.to_string());
        source = s.source();
    }
    parts.join(": ")
}
