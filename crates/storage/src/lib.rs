//! Storage layer: SQLite schema, pool setup and the CRUD stores the sync
//! engine reads and writes.

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

pub mod models;
pub mod movies;
pub mod rules;
pub mod settings;
pub mod syncs;
pub mod tags;

pub use movies::MovieStore;
pub use rules::RuleRepository;
pub use settings::SettingsStore;
pub use syncs::SyncStore;
pub use tags::TagStore;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let mut url = database_url.to_string();
    if !database_url.starts_with("sqlite:") {
        let path = std::path::PathBuf::from(database_url);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }
        let norm = path.to_string_lossy().replace('\\', "/");
        if path.is_absolute() {
            url = format!("sqlite:///{}", norm.trim_start_matches('/'));
        } else {
            url = format!("sqlite://{}", norm);
        }
    }
    let options = SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("invalid database url {url}"))?
        .create_if_missing(true)
        .foreign_keys(true);
    let mut opts = SqlitePoolOptions::new();
    if url.contains("memory") {
        // every connection to a private in-memory database is a new database
        opts = opts.max_connections(1).idle_timeout(None).max_lifetime(None);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect_with(options).await?;
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Handle bundling the pool with the per-entity stores.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects and runs migrations.
    pub async fn open(database_url: &str) -> anyhow::Result<Self> {
        let pool = connect(database_url).await.context("db connect")?;
        migrate(&pool).await.context("db migrate")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn movies(&self) -> MovieStore {
        MovieStore::new(self.pool.clone())
    }

    pub fn rules(&self) -> RuleRepository {
        RuleRepository::new(self.pool.clone())
    }

    pub fn tags(&self) -> TagStore {
        TagStore::new(self.pool.clone())
    }

    pub fn syncs(&self) -> SyncStore {
        SyncStore::new(self.pool.clone())
    }

    pub fn settings(&self) -> SettingsStore {
        SettingsStore::new(self.pool.clone())
    }
}
