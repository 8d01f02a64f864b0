use std::path::PathBuf;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::DatabaseConfig;
use crate::error::ConnectorError;

#[derive(Clone, Debug)]
pub struct SavedConnection {
    pub name: String,
    pub config: DatabaseConfig,
    pub last_used: String,
}

/// Local store of named connection configs, so users can re-run imports
/// without retyping credentials. Lives in the user's home directory; the
/// query text itself is never stored.
pub struct ConnectionStore {
    pool: SqlitePool,
}

impl ConnectionStore {
    pub async fn open() -> Result<Self, ConnectorError> {
        let db_path = Self::store_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open_at(&format!("sqlite:{}?mode=rwc", db_path.display())).await
    }

    pub async fn open_in_memory() -> Result<Self, ConnectorError> {
        Self::open_at("sqlite::memory:").await
    }

    async fn open_at(url: &str) -> Result<Self, ConnectorError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    fn store_path() -> Result<PathBuf, ConnectorError> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConnectorError::Storage("could not find home directory".to_string()))?;
        Ok(home.join(".quarry").join("connections.db"))
    }

    async fn init_schema(&self) -> Result<(), ConnectorError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS saved_connections (
                name TEXT PRIMARY KEY,
                config TEXT NOT NULL,
                last_used DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upserts by name and bumps the last-used timestamp.
    pub async fn save(&self, name: &str, config: &DatabaseConfig) -> Result<(), ConnectorError> {
        let payload = serde_json::to_string(config)?;
        sqlx::query(
            r#"
            INSERT INTO saved_connections (name, config, last_used)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(name) DO UPDATE SET config = excluded.config, last_used = CURRENT_TIMESTAMP
            "#,
        )
        .bind(name)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<SavedConnection>, ConnectorError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            r#"
            SELECT name, config, datetime(last_used) AS last_used
            FROM saved_connections
            ORDER BY last_used DESC, name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut connections = Vec::with_capacity(rows.len());
        for (name, payload, last_used) in rows {
            let config: DatabaseConfig = serde_json::from_str(&payload)?;
            connections.push(SavedConnection {
                name,
                config,
                last_used,
            });
        }
        Ok(connections)
    }

    pub async fn get(&self, name: &str) -> Result<Option<DatabaseConfig>, ConnectorError> {
        let row = sqlx::query_as::<_, (String,)>(
            "SELECT config FROM saved_connections WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((payload,)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, name: &str) -> Result<(), ConnectorError> {
        sqlx::query("DELETE FROM saved_connections WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
