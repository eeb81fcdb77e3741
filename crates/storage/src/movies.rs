use crate::models::{from_unix, Movie, Tag};
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;

const MOVIE_COLUMNS: &str = "id, title, alternative_titles, tmdb_id, poster, watched, last_watched_at, ignored, deleted, deleted_at, downloaded_at, imdb_rating, tmdb_rating, metacritic_rating, rotten_tomatoes_rating, appears_in_list";

#[derive(Debug, FromRow)]
struct MovieRow {
    id: i64,
    title: String,
    alternative_titles: String,
    tmdb_id: i64,
    poster: Option<String>,
    watched: bool,
    last_watched_at: Option<i64>,
    ignored: bool,
    deleted: bool,
    deleted_at: Option<i64>,
    downloaded_at: i64,
    imdb_rating: Option<i64>,
    tmdb_rating: Option<i64>,
    metacritic_rating: Option<i64>,
    rotten_tomatoes_rating: Option<i64>,
    appears_in_list: bool,
}

impl MovieRow {
    fn into_movie(self, tags: Vec<Tag>) -> Movie {
        let alternative_titles = serde_json::from_str(&self.alternative_titles).unwrap_or_else(|e| {
            tracing::warn!(movie_id = self.id, error = %e, "unreadable alternative titles");
            Vec::new()
        });
        Movie {
            id: self.id,
            title: self.title,
            alternative_titles,
            tmdb_id: self.tmdb_id,
            poster: self.poster,
            watched: self.watched,
            last_watched_at: self.last_watched_at.map(from_unix),
            ignored: self.ignored,
            deleted: self.deleted,
            deleted_at: self.deleted_at.map(from_unix),
            downloaded_at: from_unix(self.downloaded_at),
            imdb_rating: self.imdb_rating,
            tmdb_rating: self.tmdb_rating,
            metacritic_rating: self.metacritic_rating,
            rotten_tomatoes_rating: self.rotten_tomatoes_rating,
            appears_in_list: self.appears_in_list,
            tags,
        }
    }
}

/// Movie records. Rows are never physically removed, only flagged deleted.
#[derive(Clone)]
pub struct MovieStore {
    pool: SqlitePool,
}

impl MovieStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert-or-update keyed by id, replacing the tag associations wholesale.
    ///
    /// An existing row keeps its user-owned `ignored` flag and the watch
    /// status owned by the history step; a row that reappears upstream is no
    /// longer deleted.
    pub async fn upsert(&self, movie: &Movie) -> anyhow::Result<()> {
        let alternative_titles = serde_json::to_string(&movie.alternative_titles)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO movies (id, title, alternative_titles, tmdb_id, poster, watched, last_watched_at, ignored, deleted, deleted_at, downloaded_at, imdb_rating, tmdb_rating, metacritic_rating, rotten_tomatoes_rating, appears_in_list)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                title=excluded.title,
                alternative_titles=excluded.alternative_titles,
                tmdb_id=excluded.tmdb_id,
                poster=excluded.poster,
                deleted=0,
                deleted_at=NULL,
                downloaded_at=excluded.downloaded_at,
                imdb_rating=excluded.imdb_rating,
                tmdb_rating=excluded.tmdb_rating,
                metacritic_rating=excluded.metacritic_rating,
                rotten_tomatoes_rating=excluded.rotten_tomatoes_rating,
                appears_in_list=excluded.appears_in_list,
                updated_at=strftime('%s','now')
            "#,
        )
        .bind(movie.id)
        .bind(&movie.title)
        .bind(alternative_titles)
        .bind(movie.tmdb_id)
        .bind(&movie.poster)
        .bind(movie.watched)
        .bind(movie.last_watched_at.map(|t| t.timestamp()))
        .bind(movie.ignored)
        .bind(movie.deleted)
        .bind(movie.deleted_at.map(|t| t.timestamp()))
        .bind(movie.downloaded_at.timestamp())
        .bind(movie.imdb_rating)
        .bind(movie.tmdb_rating)
        .bind(movie.metacritic_rating)
        .bind(movie.rotten_tomatoes_rating)
        .bind(movie.appears_in_list)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("write movie {}", movie.id))?;

        sqlx::query("DELETE FROM movie_tags WHERE movie_id = ?1")
            .bind(movie.id)
            .execute(&mut *tx)
            .await?;
        for tag in &movie.tags {
            sqlx::query("INSERT OR IGNORE INTO movie_tags (movie_id, tag_id) VALUES (?1, ?2)")
                .bind(movie.id)
                .bind(tag.id)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("link movie {} to tag {}", movie.id, tag.id))?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Flags a movie deleted. A movie that is already deleted keeps its original timestamp.
    pub async fn soft_delete(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE movies SET deleted = 1, deleted_at = ?2, updated_at = strftime('%s','now') WHERE id = ?1 AND deleted = 0")
            .bind(id)
            .bind(at.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Soft-deletes every live movie whose id is not in `ids`. Returns the number flagged.
    pub async fn delete_where_not_in(&self, ids: &[i64], at: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE movies SET deleted = 1, updated_at = strftime('%s','now'), deleted_at = ");
        qb.push_bind(at.timestamp());
        qb.push(" WHERE deleted = 0");
        if !ids.is_empty() {
            qb.push(" AND id NOT IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
        let res = qb.build().execute(&self.pool).await?;
        Ok(res.rows_affected())
    }

    pub async fn set_watch_status(
        &self,
        id: i64,
        watched: bool,
        last_watched_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE movies SET watched = ?2, last_watched_at = ?3, updated_at = strftime('%s','now') WHERE id = ?1")
            .bind(id)
            .bind(watched)
            .bind(last_watched_at.map(|t| t.timestamp()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// User override; returns false when no such movie exists.
    pub async fn set_ignored(&self, id: i64, ignored: bool) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE movies SET ignored = ?2, updated_at = strftime('%s','now') WHERE id = ?1")
            .bind(id)
            .bind(ignored)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn get(&self, id: i64) -> anyhow::Result<Option<Movie>> {
        let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = ?1");
        let row = sqlx::query_as::<_, MovieRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let tags: Vec<(i64, String)> = sqlx::query_as(
                    "SELECT t.id, t.name FROM movie_tags mt JOIN tags t ON t.id = mt.tag_id WHERE mt.movie_id = ?1 ORDER BY t.id",
                )
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
                let tags = tags.into_iter().map(|(id, name)| Tag { id, name }).collect();
                Ok(Some(row.into_movie(tags)))
            }
            None => Ok(None),
        }
    }

    /// Newest downloads first.
    pub async fn all(&self) -> anyhow::Result<Vec<Movie>> {
        self.fetch("", "downloaded_at DESC, id").await
    }

    /// Most recently deleted first.
    pub async fn deleted(&self) -> anyhow::Result<Vec<Movie>> {
        self.fetch("WHERE deleted = 1", "deleted_at DESC, id").await
    }

    pub async fn not_deleted(&self) -> anyhow::Result<Vec<Movie>> {
        self.fetch("WHERE deleted = 0", "downloaded_at DESC, id").await
    }

    async fn fetch(&self, filter: &str, order: &str) -> anyhow::Result<Vec<Movie>> {
        let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies {filter} ORDER BY {order}");
        let rows = sqlx::query_as::<_, MovieRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        let mut tags = self.tags_by_movie().await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let movie_tags = tags.remove(&row.id).unwrap_or_default();
                row.into_movie(movie_tags)
            })
            .collect())
    }

    async fn tags_by_movie(&self) -> anyhow::Result<HashMap<i64, Vec<Tag>>> {
        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            "SELECT mt.movie_id, t.id, t.name FROM movie_tags mt JOIN tags t ON t.id = mt.tag_id ORDER BY t.id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut map: HashMap<i64, Vec<Tag>> = HashMap::new();
        for (movie_id, id, name) in rows {
            map.entry(movie_id).or_default().push(Tag { id, name });
        }
        Ok(map)
    }
}
