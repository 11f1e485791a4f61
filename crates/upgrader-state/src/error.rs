//! Error types for upgrader-state

use thiserror::Error;

/// Errors that can occur in the history persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store could not be reached. Never interpreted as "nothing applied".
    #[error("history store unavailable: {0}")]
    Unavailable(String),

    /// An upgrade id was recorded twice
    #[error("upgrade already recorded as applied: {upgrade_id}")]
    Duplicate { upgrade_id: String },

    /// Backend query or decoding failure
    #[error("history store backend error: {0}")]
    Backend(String),

    /// Schema setup error
    #[error("history schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}
