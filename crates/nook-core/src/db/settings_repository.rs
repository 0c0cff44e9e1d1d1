//! Settings repository implementation

use crate::error::{Error, Result};
use crate::models::{Settings, SettingsRow};
use libsql::Connection;

/// Trait for settings storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    /// Load settings with their sync metadata, defaults when never saved
    async fn load(&self) -> Result<SettingsRow>;

    /// Save locally edited settings and mark them dirty
    async fn save(&self, settings: &Settings, updated_at: i64) -> Result<()>;

    /// Store settings received from the remote store as synced
    async fn put_synced(&self, settings: &Settings, updated_at: i64) -> Result<()>;

    /// Mark settings synced if they still carry the pushed version
    async fn mark_synced(&self, version: i64) -> Result<bool>;

    /// Remove the settings row
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    async fn write(&self, settings: &Settings, updated_at: i64, is_synced: bool) -> Result<()> {
        let payload = serde_json::to_string(settings)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (id, payload, updated_at, is_synced)
                 VALUES ('singleton', ?, ?, ?)",
                libsql::params![payload, updated_at, i64::from(is_synced)],
            )
            .await?;
        Ok(())
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn load(&self) -> Result<SettingsRow> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload, updated_at, is_synced FROM settings WHERE id = 'singleton'",
                (),
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(SettingsRow {
                settings: Settings::default(),
                updated_at: 0,
                is_synced: false,
            });
        };

        let payload: String = row.get(0)?;
        let settings = serde_json::from_str(&payload)
            .map_err(|error| Error::Database(format!("unreadable settings payload: {error}")))?;
        Ok(SettingsRow {
            settings,
            updated_at: row.get(1)?,
            is_synced: row.get::<i64>(2)? != 0,
        })
    }

    async fn save(&self, settings: &Settings, updated_at: i64) -> Result<()> {
        self.write(settings, updated_at, false).await
    }

    async fn put_synced(&self, settings: &Settings, updated_at: i64) -> Result<()> {
        self.write(settings, updated_at, true).await
    }

    async fn mark_synced(&self, version: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE settings SET is_synced = 1 WHERE id = 'singleton' AND updated_at = ?",
                [version],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM settings", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::ThemeMode;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_default_settings() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        let row = repo.load().await.unwrap();
        assert_eq!(row.settings.font_size, 14);
        assert_eq!(row.settings.theme, ThemeMode::System);
        assert_eq!(row.updated_at, 0);
        assert!(!row.is_synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_and_load_settings() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        let settings = Settings {
            font_size: 18,
            theme: ThemeMode::Dark,
            username: Some("ada".to_string()),
            ..Settings::default()
        };

        repo.save(&settings, 42).await.unwrap();

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded.settings, settings);
        assert_eq!(loaded.updated_at, 42);
        assert!(!loaded.is_synced);

        assert!(!repo.mark_synced(41).await.unwrap());
        assert!(repo.mark_synced(42).await.unwrap());
        assert!(repo.load().await.unwrap().is_synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreadable_settings_payload_is_an_error() {
        let db = setup().await;
        db.connection()
            .execute(
                "INSERT INTO settings (id, payload, updated_at, is_synced)
                 VALUES ('singleton', '{not json', 1, 1)",
                (),
            )
            .await
            .unwrap();

        let repo = LibSqlSettingsRepository::new(db.connection());
        assert!(matches!(repo.load().await, Err(Error::Database(_))));
    }
}
