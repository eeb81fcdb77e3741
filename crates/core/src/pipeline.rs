use crate::clock::Clock;
use crate::config::AppConfig;
use crate::rules;
use crate::scheduler::Scheduler;
use crate::sync::SyncOrchestrator;
use anyhow::Context;
use providers::radarr::{RadarrClient, RadarrConfig};
use providers::tautulli::{TautulliClient, TautulliConfig};
use providers::{MediaManager, ProviderError, WatchHistory};
use std::path::Path;
use std::sync::Arc;
use storage::Database;
use tracing::{debug, info};

/// Opens the database, runs migrations and seeds the general settings.
pub async fn open_database(config: &AppConfig) -> anyhow::Result<Database> {
    let db = Database::open(&config.database.path)
        .await
        .with_context(|| format!("open database {}", config.database.path))?;
    db.settings()
        .ensure(&config.general)
        .await
        .context("seed general settings")?;
    Ok(db)
}

/// Opens the database and seeds rules from the configured directory, if any.
pub async fn bootstrap(config: &AppConfig) -> anyhow::Result<Database> {
    let db = open_database(config).await?;
    if let Some(dir) = &config.rules.path {
        let dir = Path::new(dir);
        if dir.exists() {
            let summary = rules::seed_rules(&db, dir)
                .await
                .with_context(|| format!("seed rules from {}", dir.display()))?;
            info!(created = summary.created, skipped = summary.skipped, "Seeded rule files");
        } else {
            debug!(path = %dir.display(), "rule directory missing, nothing to import");
        }
    }
    Ok(db)
}

/// Blank values count as missing.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn build_media_manager(config: &AppConfig) -> Result<Arc<dyn MediaManager>, ProviderError> {
    let (Some(url), Some(api_key)) = (present(&config.radarr.url), present(&config.radarr.api_key)) else {
        return Err(ProviderError::NotConfigured("radarr"));
    };
    let client = RadarrClient::new(RadarrConfig {
        base_url: url.to_string(),
        api_key: api_key.to_string(),
        timeout: config.http.timeout(),
    })?;
    Ok(Arc::new(client))
}

pub fn build_watch_history(config: &AppConfig) -> Result<Arc<dyn WatchHistory>, ProviderError> {
    let (Some(url), Some(api_key)) = (present(&config.tautulli.url), present(&config.tautulli.api_key)) else {
        return Err(ProviderError::NotConfigured("tautulli"));
    };
    let client = TautulliClient::new(TautulliConfig {
        base_url: url.to_string(),
        api_key: api_key.to_string(),
        library_ids: config.tautulli.library_ids.clone(),
        timeout: config.http.timeout(),
    })?;
    Ok(Arc::new(client))
}

pub fn build_orchestrator(
    config: &AppConfig,
    db: Database,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<SyncOrchestrator> {
    let media = build_media_manager(config)?;
    let history = build_watch_history(config)?;
    Ok(SyncOrchestrator::new(db, media, history, clock).with_dry_run(config.safety.dry_run))
}

pub fn build_scheduler(config: &AppConfig, db: Database, clock: Arc<dyn Clock>) -> anyhow::Result<Scheduler> {
    let orchestrator = build_orchestrator(config, db.clone(), clock.clone())?;
    Ok(Scheduler::new(db, orchestrator, clock))
}
