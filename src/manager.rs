use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{DatabaseConfig, DatabaseVendor};
use crate::db::DatabaseConnection;
use crate::error::ConnectorError;

struct Slot {
    config: DatabaseConfig,
    connection: Arc<DatabaseConnection>,
}

/// Holds at most one live connection per vendor, reopened lazily when the
/// cached one has died or the caller's config no longer matches. No retry,
/// no backoff: a failed open is the caller's error to report.
#[derive(Default)]
pub struct ConnectionManager {
    slots: Mutex<HashMap<DatabaseVendor, Slot>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached connection for this vendor when it was opened with
    /// an identical config and is still alive; otherwise opens a replacement.
    /// `fresh` forces a replacement regardless.
    pub async fn acquire(
        &self,
        config: &DatabaseConfig,
        fresh: bool,
    ) -> Result<Arc<DatabaseConnection>, ConnectorError> {
        let mut slots = self.slots.lock().await;

        if !fresh {
            if let Some(slot) = slots.get(&config.vendor) {
                if slot.config == *config && !slot.connection.is_closed() {
                    return Ok(Arc::clone(&slot.connection));
                }
            }
        }

        info!(vendor = config.vendor.label(), host = %config.host, database = %config.database,
            "opening database connection");
        let connection = Arc::new(DatabaseConnection::connect(config).await?);
        if let Some(stale) = slots.insert(
            config.vendor,
            Slot {
                config: config.clone(),
                connection: Arc::clone(&connection),
            },
        ) {
            stale.connection.close().await;
        }
        Ok(connection)
    }

    /// Opens a throwaway connection, pings it, and closes it again without
    /// touching the cache.
    pub async fn test_connection(&self, config: &DatabaseConfig) -> Result<(), ConnectorError> {
        let connection = DatabaseConnection::connect(config).await?;
        let result = connection.ping().await;
        connection.close().await;
        if let Err(ref err) = result {
            warn!(vendor = config.vendor.label(), %err, "test connection failed");
        }
        result
    }

    /// Closes and drops every cached connection.
    pub async fn shutdown(&self) {
        let mut slots = self.slots.lock().await;
        for (_, slot) in slots.drain() {
            slot.connection.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            vendor: DatabaseVendor::Sqlite,
            host: String::new(),
            port: 0,
            user: String::new(),
            password: String::new(),
            database: ":memory:".into(),
            schema: None,
            use_ssl: false,
        }
    }

    #[tokio::test]
    async fn acquire_reuses_live_connection() {
        let manager = ConnectionManager::new();
        let config = memory_config();
        let first = manager.acquire(&config, false).await.unwrap();
        let second = manager.acquire(&config, false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn fresh_flag_replaces_cached_connection() {
        let manager = ConnectionManager::new();
        let config = memory_config();
        let first = manager.acquire(&config, false).await.unwrap();
        let second = manager.acquire(&config, true).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        // the replaced connection was closed on eviction
        assert!(first.is_closed());
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn changed_config_reopens() {
        let manager = ConnectionManager::new();
        let config = memory_config();
        let first = manager.acquire(&config, false).await.unwrap();

        let mut other = config.clone();
        other.database = ":memory:".to_string();
        other.schema = Some("other".to_string());
        let second = manager.acquire(&other, false).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn dead_connection_is_reopened_lazily() {
        let manager = ConnectionManager::new();
        let config = memory_config();
        let first = manager.acquire(&config, false).await.unwrap();
        first.close().await;
        let second = manager.acquire(&config, false).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let manager = ConnectionManager::new();
        let connection = manager.acquire(&memory_config(), false).await.unwrap();
        manager.shutdown().await;
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_connection_does_not_cache() {
        let manager = ConnectionManager::new();
        manager.test_connection(&memory_config()).await.unwrap();
        assert!(manager.slots.lock().await.is_empty());
    }
}
