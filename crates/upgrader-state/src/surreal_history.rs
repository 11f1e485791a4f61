//! SurrealDB-backed HistoryStore implementation
//!
//! Uses `schema::UpgradeRow` for persistence, converting to
//! `storage_traits::AppliedRecord` at the boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::migrations;
use crate::schema::UpgradeRow;
use crate::storage_traits::{AppliedRecord, HistoryStore, StorageResult};

/// Default local persistence location.
pub const DEFAULT_STORE_URL: &str = "surrealkv://.upgrader/db";

/// Connection settings for [`SurrealHistoryStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Engine URL: `mem://`, `surrealkv://<path>`, `ws://host:port`, ...
    pub url: String,
    pub namespace: String,
    pub database: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORE_URL.to_string(),
            namespace: "upgrader".to_string(),
            database: "main".to_string(),
        }
    }
}

impl StoreConfig {
    /// Config for an ephemeral in-memory engine.
    pub fn in_memory() -> Self {
        Self {
            url: "mem://".to_string(),
            ..Self::default()
        }
    }

    /// Local directory backing a `surrealkv://` url, if any.
    fn local_path(&self) -> Option<&str> {
        self.url.strip_prefix("surrealkv://")
    }
}

/// SurrealDB-backed implementation of [`HistoryStore`].
pub struct SurrealHistoryStore {
    db: Surreal<Any>,
}

impl SurrealHistoryStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect(&StoreConfig::in_memory()).await
    }

    /// Connect to the configured engine, select namespace/database and run
    /// `init_schema`.
    ///
    /// Connection failures surface as [`StorageError::Unavailable`].
    pub async fn connect(config: &StoreConfig) -> StorageResult<Self> {
        if let Some(path) = config.local_path() {
            std::fs::create_dir_all(path).map_err(|e| {
                StorageError::Unavailable(format!(
                    "Failed to create database directory {}: {}",
                    path, e
                ))
            })?;
        }

        let db = surrealdb::engine::any::connect(config.url.as_str())
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("Failed to connect to {}: {}", config.url, e))
            })?;

        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!("SurrealHistoryStore connected ({})", config.url);
        Ok(Self { db })
    }

    async fn fetch_row(&self, upgrade_id: &str) -> StorageResult<Option<UpgradeRow>> {
        let id_owned = upgrade_id.to_string();
        let mut res = self
            .db
            .query("SELECT upgrade, applied FROM upgrade WHERE upgrade = $uid")
            .bind(("uid", id_owned))
            .await?;

        let rows: Vec<UpgradeRow> = res.take(0)?;

        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl HistoryStore for SurrealHistoryStore {
    async fn applied(&self) -> StorageResult<Vec<AppliedRecord>> {
        let mut res = self
            .db
            .query("SELECT upgrade, applied FROM upgrade ORDER BY applied DESC")
            .await?;

        let rows: Vec<UpgradeRow> = res.take(0)?;

        Ok(rows.into_iter().map(AppliedRecord::from).collect())
    }

    async fn record_success(&self, upgrade_id: &str) -> StorageResult<AppliedRecord> {
        if self.fetch_row(upgrade_id).await?.is_some() {
            return Err(StorageError::Duplicate {
                upgrade_id: upgrade_id.to_string(),
            });
        }

        let row = UpgradeRow::new(upgrade_id);
        debug!(upgrade_id, "recording applied upgrade");

        let created: Option<UpgradeRow> = self
            .db
            .create("upgrade")
            .content(row.clone())
            .await?;

        Ok(created.unwrap_or(row).into())
    }
}
