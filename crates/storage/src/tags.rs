use crate::models::Tag;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

/// Local mirror of the media manager's tags. Owned entirely by the tag sync step.
#[derive(Clone)]
pub struct TagStore {
    pool: SqlitePool,
}

impl TagStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn all(&self) -> anyhow::Result<Vec<Tag>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM tags ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id, name)| Tag { id, name }).collect())
    }

    /// Create or rename.
    pub async fn upsert(&self, tag: &Tag) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tags (id, name) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET
                name=excluded.name,
                updated_at=strftime('%s','now')
            "#,
        )
        .bind(tag.id)
        .bind(&tag.name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes every tag whose id is not in `ids`; movie associations cascade.
    pub async fn delete_where_not_in(&self, ids: &[i64]) -> anyhow::Result<u64> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM tags");
        if !ids.is_empty() {
            qb.push(" WHERE id NOT IN (");
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }
        let res = qb.build().execute(&self.pool).await?;
        Ok(res.rows_affected())
    }
}
