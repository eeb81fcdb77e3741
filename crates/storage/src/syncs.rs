use crate::models::{from_unix, SyncKind, SyncRun};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, FromRow)]
struct SyncRow {
    id: i64,
    kind: String,
    started_at: i64,
    finished_at: Option<i64>,
}

impl TryFrom<SyncRow> for SyncRun {
    type Error = anyhow::Error;

    fn try_from(row: SyncRow) -> Result<Self, Self::Error> {
        Ok(SyncRun {
            id: row.id,
            kind: row.kind.parse()?,
            started_at: from_unix(row.started_at),
            finished_at: row.finished_at.map(from_unix),
        })
    }
}

fn convert(rows: Vec<SyncRow>) -> anyhow::Result<Vec<SyncRun>> {
    rows.into_iter().map(SyncRun::try_from).collect()
}

/// One record per reconciliation run.
#[derive(Clone)]
pub struct SyncStore {
    pool: SqlitePool,
}

impl SyncStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn start(&self, kind: SyncKind, at: DateTime<Utc>) -> anyhow::Result<SyncRun> {
        let res = sqlx::query("INSERT INTO syncs (kind, started_at) VALUES (?1, ?2)")
            .bind(kind.as_str())
            .bind(at.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(SyncRun {
            id: res.last_insert_rowid(),
            kind,
            started_at: from_unix(at.timestamp()),
            finished_at: None,
        })
    }

    /// Marks a run finished. Finishing an already-finished run is a no-op.
    pub async fn finish(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE syncs SET finished_at = ?2 WHERE id = ?1 AND finished_at IS NULL")
            .bind(id)
            .bind(at.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn running(&self) -> anyhow::Result<Vec<SyncRun>> {
        let rows = sqlx::query_as::<_, SyncRow>(
            "SELECT id, kind, started_at, finished_at FROM syncs WHERE finished_at IS NULL ORDER BY started_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    /// Most recently finished run, optionally restricted to one kind.
    pub async fn last_finished(&self, kind: Option<SyncKind>) -> anyhow::Result<Option<SyncRun>> {
        let row = sqlx::query_as::<_, SyncRow>(
            r#"
            SELECT id, kind, started_at, finished_at FROM syncs
            WHERE finished_at IS NOT NULL AND (?1 IS NULL OR kind = ?1)
            ORDER BY finished_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(kind.map(|k| k.as_str()))
        .fetch_optional(&self.pool)
        .await?;
        row.map(SyncRun::try_from).transpose()
    }

    /// Newest first.
    pub async fn recent(&self, limit: i64) -> anyhow::Result<Vec<SyncRun>> {
        let rows = sqlx::query_as::<_, SyncRow>(
            "SELECT id, kind, started_at, finished_at FROM syncs ORDER BY started_at DESC, id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }
}
