use crate::clock::days_since;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use storage::models::{Movie, Rule, RuleInput, Tag};
use storage::Database;
use tracing::{info, warn};

/// Outcome of checking one rule against one movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Evaluation {
    /// Every static predicate passes; the movie is eventually eligible.
    pub soft: bool,
    /// Static and dynamic predicates pass; the movie is eligible now.
    pub full: bool,
}

/// A rating ceiling passes only while the rating is known and below it.
fn below(rating: Option<i64>, ceiling: Option<i64>) -> bool {
    match ceiling {
        None => true,
        Some(ceiling) => rating.map_or(false, |r| r < ceiling),
    }
}

/// Predicates whose outcome does not depend on the current time.
pub fn static_matches(rule: &Rule, movie: &Movie) -> bool {
    if let Some(in_list) = rule.appears_in_list {
        if movie.appears_in_list != in_list {
            return false;
        }
    }
    if let Some(watched) = rule.watched {
        if movie.watched != watched {
            return false;
        }
    }
    if !below(movie.imdb_rating, rule.minimum_imdb_rating)
        || !below(movie.tmdb_rating, rule.minimum_tmdb_rating)
        || !below(movie.metacritic_rating, rule.minimum_metacritic_rating)
        || !below(movie.rotten_tomatoes_rating, rule.minimum_rotten_tomatoes_rating)
    {
        return false;
    }
    rule.tags.is_empty() || rule.tags.iter().any(|t| movie.has_tag(t.id))
}

/// Age-based predicates evaluated at `now`.
pub fn dynamic_matches(rule: &Rule, movie: &Movie, now: DateTime<Utc>) -> bool {
    if let Some(days) = rule.downloaded_days_ago {
        if days_since(movie.downloaded_at, now) < days {
            return false;
        }
    }
    if rule.watched == Some(true) {
        if let Some(days) = rule.watched_days_ago {
            match movie.last_watched_at {
                Some(at) if days_since(at, now) >= days => {}
                _ => return false,
            }
        }
    }
    true
}

pub fn evaluate(rule: &Rule, movie: &Movie, now: DateTime<Utc>) -> Evaluation {
    let soft = static_matches(rule, movie);
    Evaluation {
        soft,
        full: soft && dynamic_matches(rule, movie, now),
    }
}

/// On-disk rule definition. Tags are referenced by name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleFile {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub downloaded_days_ago: Option<i64>,
    #[serde(default)]
    pub watched: Option<bool>,
    #[serde(default)]
    pub watched_days_ago: Option<i64>,
    #[serde(default)]
    pub appears_in_list: Option<bool>,
    #[serde(default)]
    pub minimum_imdb_rating: Option<i64>,
    #[serde(default)]
    pub minimum_tmdb_rating: Option<i64>,
    #[serde(default)]
    pub minimum_metacritic_rating: Option<i64>,
    #[serde(default)]
    pub minimum_rotten_tomatoes_rating: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl RuleFile {
    /// Resolves tag names against the local tag mirror.
    pub fn resolve(self, tags: &[Tag]) -> anyhow::Result<RuleInput> {
        let by_name: HashMap<String, i64> = tags
            .iter()
            .map(|t| (t.name.to_lowercase(), t.id))
            .collect();
        let tag_ids = self
            .tags
            .iter()
            .map(|name| {
                by_name
                    .get(&name.to_lowercase())
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("rule {:?}: unknown tag {:?}", self.name, name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(RuleInput {
            name: self.name,
            enabled: self.enabled,
            downloaded_days_ago: self.downloaded_days_ago,
            watched: self.watched,
            watched_days_ago: self.watched_days_ago,
            appears_in_list: self.appears_in_list,
            minimum_imdb_rating: self.minimum_imdb_rating,
            minimum_tmdb_rating: self.minimum_tmdb_rating,
            minimum_metacritic_rating: self.minimum_metacritic_rating,
            minimum_rotten_tomatoes_rating: self.minimum_rotten_tomatoes_rating,
            tag_ids,
        })
    }
}

/// Reads every `*.toml` file in `dir`, ordered by file name. A missing
/// directory yields no rules.
pub fn load_rules_from_dir(dir: &Path) -> anyhow::Result<Vec<RuleFile>> {
    let mut rules = Vec::new();
    if !dir.exists() {
        return Ok(rules);
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && path.extension().and_then(|e| e.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();
    for path in paths {
        let content = fs::read_to_string(&path)?;
        let rule: RuleFile =
            toml::from_str(&content).with_context(|| format!("parse rule file {}", path.display()))?;
        rules.push(rule);
    }
    Ok(rules)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    /// Files left alone: already present on a create-only import, or
    /// naming tags that are not mirrored yet.
    pub skipped: usize,
}

/// Creates or replaces rules from the files in `dir`, matching existing
/// rules by name. An existing rule keeps its `enabled` state. Nothing is
/// written when any file fails to resolve.
pub async fn import_rules(db: &Database, dir: &Path) -> anyhow::Result<ImportSummary> {
    let files = load_rules_from_dir(dir)?;
    let tags = db.tags().all().await?;
    let inputs = files
        .into_iter()
        .map(|f| f.resolve(&tags))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let repo = db.rules();
    let existing: HashMap<String, Rule> = repo
        .all()
        .await?
        .into_iter()
        .map(|r| (r.name.clone(), r))
        .collect();
    let mut summary = ImportSummary::default();
    for mut input in inputs {
        let name = input.name.clone();
        match existing.get(&name) {
            Some(rule) => {
                input.enabled = rule.enabled;
                repo.update(rule.id, input)
                    .await
                    .with_context(|| format!("import rule {name:?}"))?;
                summary.updated += 1;
            }
            None => {
                repo.create(input)
                    .await
                    .with_context(|| format!("import rule {name:?}"))?;
                summary.created += 1;
            }
        }
        info!(rule = %name, "imported rule");
    }
    Ok(summary)
}

/// Creates the rules from `dir` that do not exist yet. Existing rules are
/// never touched, and a file naming an unknown tag is logged and skipped.
pub async fn seed_rules(db: &Database, dir: &Path) -> anyhow::Result<ImportSummary> {
    let files = load_rules_from_dir(dir)?;
    let repo = db.rules();
    let existing: HashSet<String> = repo.all().await?.into_iter().map(|r| r.name).collect();
    let tags = db.tags().all().await?;
    let mut summary = ImportSummary::default();
    for file in files {
        if existing.contains(&file.name) {
            summary.skipped += 1;
            continue;
        }
        let name = file.name.clone();
        let input = match file.resolve(&tags) {
            Ok(input) => input,
            Err(e) => {
                warn!(rule = %name, error = %e, "skipping rule file");
                summary.skipped += 1;
                continue;
            }
        };
        repo.create(input)
            .await
            .with_context(|| format!("seed rule {name:?}"))?;
        summary.created += 1;
        info!(rule = %name, "seeded rule");
    }
    Ok(summary)
}
