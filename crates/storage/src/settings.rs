use crate::models::GeneralSettings;
use sqlx::SqlitePool;

const SETTINGS_ID: i64 = 1;

/// Single-row general settings consumed by the scheduler.
#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the settings row from `seed` unless it already exists.
    pub async fn ensure(&self, seed: &GeneralSettings) -> anyhow::Result<()> {
        sqlx::query("INSERT OR IGNORE INTO settings (id, enabled, sync_days, sync_hour) VALUES (?1, ?2, ?3, ?4)")
            .bind(SETTINGS_ID)
            .bind(seed.enabled)
            .bind(seed.sync_days)
            .bind(i64::from(seed.sync_hour))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Falls back to defaults when the row was never created.
    pub async fn general(&self) -> anyhow::Result<GeneralSettings> {
        let row: Option<(bool, i64, i64)> =
            sqlx::query_as("SELECT enabled, sync_days, sync_hour FROM settings WHERE id = ?1")
                .bind(SETTINGS_ID)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match row {
            Some((enabled, sync_days, sync_hour)) => GeneralSettings {
                enabled,
                sync_days,
                sync_hour: u32::try_from(sync_hour)?,
            },
            None => GeneralSettings::default(),
        })
    }

    pub async fn update_general(&self, settings: &GeneralSettings) -> anyhow::Result<()> {
        if settings.sync_hour > 23 {
            anyhow::bail!("sync hour must be between 0 and 23, got {}", settings.sync_hour);
        }
        if settings.sync_days < 1 {
            anyhow::bail!("sync days must be at least 1, got {}", settings.sync_days);
        }
        sqlx::query(
            r#"
            INSERT INTO settings (id, enabled, sync_days, sync_hour) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                enabled=excluded.enabled,
                sync_days=excluded.sync_days,
                sync_hour=excluded.sync_hour
            "#,
        )
        .bind(SETTINGS_ID)
        .bind(settings.enabled)
        .bind(settings.sync_days)
        .bind(i64::from(settings.sync_hour))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
