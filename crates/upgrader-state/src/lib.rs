//! Upgrader-State: applied-upgrade history persistence
//!
//! This crate owns the only durable state of the upgrader: one row per
//! successfully applied upgrade unit, keyed by the unit id and stamped with the
//! time it was applied.
//!
//! ## Key Components
//!
//! - `HistoryStore`: backend-agnostic trait used by the engine
//! - `MemoryHistoryStore`: in-memory fake for tests
//! - `SurrealHistoryStore`: SurrealDB-backed store (`mem://`, `surrealkv://`, remote)

mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_history;

pub use error::StorageError;
pub use fakes::MemoryHistoryStore;
pub use schema::UpgradeRow;
pub use storage_traits::{AppliedHistory, AppliedRecord, HistoryStore, StorageResult};
pub use surreal_history::{StoreConfig, SurrealHistoryStore, DEFAULT_STORE_URL};
