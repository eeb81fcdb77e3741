use crate::clock::Clock;
use crate::sync::{SyncOrchestrator, SyncReport};
use chrono::{DateTime, Duration as ChronoDuration, DurationRound, FixedOffset, Timelike, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storage::models::{GeneralSettings, SyncKind, SyncRun};
use storage::Database;
use tracing::{error, info, warn};

/// A run still going after this long is considered crashed.
pub const STALE_AFTER_HOURS: i64 = 12;
pub const REAP_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// FULL when syncing is enabled, `now` falls in the configured hour and the
/// last finished FULL run is missing or started at least `sync_days`
/// calendar days ago, counted in the local offset of `now`.
pub fn decide(settings: &GeneralSettings, last_full: Option<&SyncRun>, now: DateTime<FixedOffset>) -> SyncKind {
    if !settings.enabled || now.hour() != settings.sync_hour {
        return SyncKind::Partial;
    }
    let due = match last_full.filter(|run| run.finished_at.is_some()) {
        None => true,
        Some(run) => {
            let started = run.started_at.with_timezone(now.offset()).date_naive();
            (now.date_naive() - started).num_days() >= settings.sync_days
        }
    };
    if due {
        SyncKind::Full
    } else {
        SyncKind::Partial
    }
}

pub fn is_stale(run: &SyncRun, now: DateTime<Utc>) -> bool {
    run.is_running() && now - run.started_at > ChronoDuration::hours(STALE_AFTER_HOURS)
}

#[derive(Debug)]
pub enum TickOutcome {
    /// Another run was still in progress.
    Skipped { running: Vec<i64> },
    Completed(SyncReport),
}

/// Hourly trigger for the orchestrator plus the stuck-run reaper.
#[derive(Clone)]
pub struct Scheduler {
    db: Database,
    orchestrator: SyncOrchestrator,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(db: Database, orchestrator: SyncOrchestrator, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            orchestrator,
            clock,
        }
    }

    /// Decides FULL or PARTIAL from the persisted settings and runs it.
    pub async fn tick(&self) -> anyhow::Result<TickOutcome> {
        let settings = self.db.settings().general().await?;
        let last_full = self.db.syncs().last_finished(Some(SyncKind::Full)).await?;
        let kind = decide(&settings, last_full.as_ref(), self.clock.now());
        self.run_now(kind).await
    }

    /// Runs `kind` immediately unless another run is in progress.
    pub async fn run_now(&self, kind: SyncKind) -> anyhow::Result<TickOutcome> {
        let running = self.db.syncs().running().await?;
        if !running.is_empty() {
            let running: Vec<i64> = running.into_iter().map(|r| r.id).collect();
            warn!(?running, "Sync already running, skipping");
            return Ok(TickOutcome::Skipped { running });
        }
        let report = self.orchestrator.run(kind).await?;
        Ok(TickOutcome::Completed(report))
    }

    pub async fn reap(&self) -> anyhow::Result<Vec<i64>> {
        reap_stale(&self.db, self.clock.now_utc()).await
    }

    /// Ticks at the top of every hour and reaps every twelve hours, starting
    /// with a reap, until `shutdown` resolves.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut reaper = tokio::time::interval(REAP_INTERVAL);
        reaper.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            let wait = until_next_hour(self.clock.now());
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Scheduler stopping");
                    return;
                }
                _ = reaper.tick() => {
                    if let Err(e) = self.reap().await {
                        error!(error = %e, "Failed to stop long running syncs");
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    match self.tick().await {
                        Ok(TickOutcome::Completed(report)) => {
                            info!(sync_id = report.sync_id, kind = %report.kind, "Scheduled sync completed");
                        }
                        Ok(TickOutcome::Skipped { .. }) => {}
                        Err(e) => error!(error = %e, "Failed to execute scheduled sync"),
                    }
                }
            }
        }
    }
}

/// Force-finishes runs started more than twelve hours before `now`. Each
/// run is finished independently; a failure is logged and the rest continue.
pub async fn reap_stale(db: &Database, now: DateTime<Utc>) -> anyhow::Result<Vec<i64>> {
    let syncs = db.syncs();
    let mut reaped = Vec::new();
    for run in syncs.running().await? {
        if !is_stale(&run, now) {
            continue;
        }
        match syncs.finish(run.id, now).await {
            Ok(true) => {
                warn!(sync_id = run.id, started_at = %run.started_at, "Stopped long running sync");
                reaped.push(run.id);
            }
            Ok(false) => {}
            Err(e) => error!(sync_id = run.id, error = %e, "could not stop long running sync"),
        }
    }
    Ok(reaped)
}

/// Time left until the next full hour, never zero.
pub fn until_next_hour(now: DateTime<FixedOffset>) -> Duration {
    let hour = ChronoDuration::hours(1);
    let next = match now.duration_trunc(hour) {
        Ok(start) => start + hour,
        Err(_) => now + hour,
    };
    (next - now)
        .to_std()
        .ok()
        .filter(|d| !d.is_zero())
        .unwrap_or(Duration::from_secs(3600))
}
