//! SurrealDB schema initialization for the upgrade history

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Initialize the upgrader tables in SurrealDB
///
/// Safe to call on every connection (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing upgrader SurrealDB schema");
    init_upgrade_table(db).await?;
    Ok(())
}

/// Initialize `upgrade` table
///
/// Schema:
/// ```text
/// TABLE upgrade {
///   upgrade:  STRING (unique)
///   applied:  DATETIME (indexed)
/// }
/// ```
///
/// Rows are append-only: updates and deletes are denied.
async fn init_upgrade_table(db: &Surreal<Any>) -> StorageResult<()> {
    let sql = r#"
        DEFINE TABLE IF NOT EXISTS upgrade AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_upgrade ON TABLE upgrade COLUMNS upgrade UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_applied ON TABLE upgrade COLUMNS applied;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StorageError::SchemaSetup(e.to_string()))?;
    info!("✓ upgrade table initialized");
    Ok(())
}
