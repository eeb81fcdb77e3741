use crate::clock::Clock;
use crate::matcher::{self, MonitoredMovie};
use anyhow::Context;
use std::sync::Arc;
use storage::models::{Movie, Rule};
use storage::Database;

/// Movie records plus the rule-driven views over them.
#[derive(Clone)]
pub struct MovieCatalog {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl MovieCatalog {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn upsert(&self, movie: &Movie) -> anyhow::Result<()> {
        self.db
            .movies()
            .upsert(movie)
            .await
            .with_context(|| format!("upsert movie {} ({})", movie.id, movie.title))
    }

    /// Returns false when the movie was already deleted or does not exist.
    pub async fn soft_delete(&self, id: i64) -> anyhow::Result<bool> {
        self.db.movies().soft_delete(id, self.clock.now_utc()).await
    }

    pub async fn delete_where_not_in(&self, ids: &[i64]) -> anyhow::Result<u64> {
        self.db
            .movies()
            .delete_where_not_in(ids, self.clock.now_utc())
            .await
    }

    pub async fn set_ignored(&self, id: i64, ignored: bool) -> anyhow::Result<bool> {
        self.db.movies().set_ignored(id, ignored).await
    }

    pub async fn get(&self, id: i64) -> anyhow::Result<Option<Movie>> {
        self.db.movies().get(id).await
    }

    pub async fn all(&self) -> anyhow::Result<Vec<Movie>> {
        self.db.movies().all().await
    }

    pub async fn deleted(&self) -> anyhow::Result<Vec<Movie>> {
        self.db.movies().deleted().await
    }

    pub async fn not_deleted(&self) -> anyhow::Result<Vec<Movie>> {
        self.db.movies().not_deleted().await
    }

    /// Soonest deletion first.
    pub async fn monitored(&self) -> anyhow::Result<Vec<MonitoredMovie>> {
        let (movies, rules) = self.snapshot().await?;
        Ok(matcher::monitored(&movies, &rules, self.clock.now_utc()))
    }

    pub async fn ignored(&self) -> anyhow::Result<Vec<Movie>> {
        let (movies, rules) = self.snapshot().await?;
        Ok(matcher::ignored(&movies, &rules, self.clock.now_utc())
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn unmonitored(&self) -> anyhow::Result<Vec<Movie>> {
        let (movies, rules) = self.snapshot().await?;
        Ok(matcher::unmonitored(&movies, &rules, self.clock.now_utc())
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn for_rule(&self, rule: &Rule, include_soft_match: bool) -> anyhow::Result<Vec<Movie>> {
        let movies = self.db.movies().not_deleted().await?;
        Ok(
            matcher::for_rule(&movies, rule, include_soft_match, self.clock.now_utc())
                .into_iter()
                .cloned()
                .collect(),
        )
    }

    async fn snapshot(&self) -> anyhow::Result<(Vec<Movie>, Vec<Rule>)> {
        let movies = self.db.movies().not_deleted().await.context("load movies")?;
        let rules = self.db.rules().enabled().await.context("load rules")?;
        Ok((movies, rules))
    }
}
