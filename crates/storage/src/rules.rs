use crate::models::{from_unix, Rule, RuleInput, Tag};
use anyhow::Context;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;

const RULE_COLUMNS: &str = "id, name, enabled, downloaded_days_ago, watched, watched_days_ago, appears_in_list, minimum_imdb_rating, minimum_tmdb_rating, minimum_metacritic_rating, minimum_rotten_tomatoes_rating, created_at";

#[derive(Debug, FromRow)]
struct RuleRow {
    id: i64,
    name: String,
    enabled: bool,
    downloaded_days_ago: Option<i64>,
    watched: Option<bool>,
    watched_days_ago: Option<i64>,
    appears_in_list: Option<bool>,
    minimum_imdb_rating: Option<i64>,
    minimum_tmdb_rating: Option<i64>,
    minimum_metacritic_rating: Option<i64>,
    minimum_rotten_tomatoes_rating: Option<i64>,
    created_at: i64,
}

impl RuleRow {
    fn into_rule(self, tags: Vec<Tag>) -> Rule {
        Rule {
            id: self.id,
            name: self.name,
            enabled: self.enabled,
            downloaded_days_ago: self.downloaded_days_ago,
            watched: self.watched,
            // stale values written before the invariant existed are ignored
            watched_days_ago: if self.watched == Some(true) {
                self.watched_days_ago
            } else {
                None
            },
            appears_in_list: self.appears_in_list,
            minimum_imdb_rating: self.minimum_imdb_rating,
            minimum_tmdb_rating: self.minimum_tmdb_rating,
            minimum_metacritic_rating: self.minimum_metacritic_rating,
            minimum_rotten_tomatoes_rating: self.minimum_rotten_tomatoes_rating,
            tags,
            created_at: from_unix(self.created_at),
        }
    }
}

/// Rules and their required-tag associations.
#[derive(Clone)]
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: RuleInput) -> anyhow::Result<Rule> {
        let input = input.normalized();
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            r#"
            INSERT INTO rules (name, enabled, downloaded_days_ago, watched, watched_days_ago, appears_in_list, minimum_imdb_rating, minimum_tmdb_rating, minimum_metacritic_rating, minimum_rotten_tomatoes_rating)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&input.name)
        .bind(input.enabled)
        .bind(input.downloaded_days_ago)
        .bind(input.watched)
        .bind(input.watched_days_ago)
        .bind(input.appears_in_list)
        .bind(input.minimum_imdb_rating)
        .bind(input.minimum_tmdb_rating)
        .bind(input.minimum_metacritic_rating)
        .bind(input.minimum_rotten_tomatoes_rating)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("create rule {:?}", input.name))?;
        let id = res.last_insert_rowid();
        replace_tags(&mut tx, id, &input.tag_ids).await?;
        tx.commit().await?;

        self.get(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("rule {id} vanished after insert"))
    }

    /// Replaces every field and the tag set. Returns `None` when the rule does not exist.
    pub async fn update(&self, id: i64, input: RuleInput) -> anyhow::Result<Option<Rule>> {
        let input = input.normalized();
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(
            r#"
            UPDATE rules SET
                name = ?2,
                enabled = ?3,
                downloaded_days_ago = ?4,
                watched = ?5,
                watched_days_ago = ?6,
                appears_in_list = ?7,
                minimum_imdb_rating = ?8,
                minimum_tmdb_rating = ?9,
                minimum_metacritic_rating = ?10,
                minimum_rotten_tomatoes_rating = ?11,
                updated_at = strftime('%s','now')
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(input.enabled)
        .bind(input.downloaded_days_ago)
        .bind(input.watched)
        .bind(input.watched_days_ago)
        .bind(input.appears_in_list)
        .bind(input.minimum_imdb_rating)
        .bind(input.minimum_tmdb_rating)
        .bind(input.minimum_metacritic_rating)
        .bind(input.minimum_rotten_tomatoes_rating)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("update rule {id}"))?;
        if res.rows_affected() == 0 {
            return Ok(None);
        }
        replace_tags(&mut tx, id, &input.tag_ids).await?;
        tx.commit().await?;
        self.get(id).await
    }

    pub async fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM rules WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn set_enabled(&self, id: i64, enabled: bool) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE rules SET enabled = ?2, updated_at = strftime('%s','now') WHERE id = ?1")
            .bind(id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn get(&self, id: i64) -> anyhow::Result<Option<Rule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?1");
        let row = sqlx::query_as::<_, RuleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let mut tags = self.tags_by_rule().await?;
                let rule_tags = tags.remove(&row.id).unwrap_or_default();
                Ok(Some(row.into_rule(rule_tags)))
            }
            None => Ok(None),
        }
    }

    /// All rules in creation order.
    pub async fn all(&self) -> anyhow::Result<Vec<Rule>> {
        self.fetch("").await
    }

    /// Enabled rules in creation order, which is the tie-break order for matching.
    pub async fn enabled(&self) -> anyhow::Result<Vec<Rule>> {
        self.fetch("WHERE enabled = 1").await
    }

    /// Disables every rule that requires at least one tag and none of whose
    /// required tags is in `valid_tag_ids`. Rules without tags are untouched.
    pub async fn disable_where_tags_not_in(&self, valid_tag_ids: &[i64]) -> anyhow::Result<u64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "UPDATE rules SET enabled = 0, updated_at = strftime('%s','now') WHERE enabled = 1 AND EXISTS (SELECT 1 FROM rule_tags rt WHERE rt.rule_id = rules.id)",
        );
        if !valid_tag_ids.is_empty() {
            qb.push(" AND NOT EXISTS (SELECT 1 FROM rule_tags rt WHERE rt.rule_id = rules.id AND rt.tag_id IN (");
            let mut separated = qb.separated(", ");
            for id in valid_tag_ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated("))");
        }
        let res = qb.build().execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    async fn fetch(&self, filter: &str) -> anyhow::Result<Vec<Rule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM rules {filter} ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query_as::<_, RuleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        let mut tags = self.tags_by_rule().await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let rule_tags = tags.remove(&row.id).unwrap_or_default();
                row.into_rule(rule_tags)
            })
            .collect())
    }

    /// Tags that vanished upstream stay on the rule with an empty name.
    async fn tags_by_rule(&self) -> anyhow::Result<HashMap<i64, Vec<Tag>>> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            "SELECT rt.rule_id, rt.tag_id, COALESCE(t.name, '') FROM rule_tags rt LEFT JOIN tags t ON t.id = rt.tag_id ORDER BY rt.tag_id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
        for (rule_id, id, name) in rows {
            map.entry(rule_id).or_default().push(Tag { id, name });
        }
        Ok(map)
    }
}

async fn replace_tags(
    tx: &mut Transaction<'_, Sqlite>,
    rule_id: i64,
    tag_ids: &[i64],
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM rule_tags WHERE rule_id = ?1")
        .bind(rule_id)
        .execute(&mut **tx)
        .await?;
    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO rule_tags (rule_id, tag_id) VALUES (?1, ?2)")
            .bind(rule_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}
