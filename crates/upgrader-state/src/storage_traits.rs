//! Storage trait definitions for the upgrader
//!
//! `HistoryStore` is the single persistence abstraction the engine needs: an
//! append-only record of which upgrade units have been applied and when.
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided for
//! testing via the `fakes` module.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Applied upgrade ids mapped to the time they were applied.
pub type AppliedHistory = BTreeMap<String, DateTime<Utc>>;

/// One completed upgrade unit.
///
/// Rows are append-only; the engine never updates or deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRecord {
    /// Globally unique upgrade id (e.g. `demo_2024_05_01_add_index`)
    pub upgrade_id: String,
    /// When `do_upgrade` completed and the row was written
    pub applied_at: DateTime<Utc>,
}

impl AppliedRecord {
    /// Create a record stamped with the current time.
    pub fn now(upgrade_id: impl Into<String>) -> Self {
        Self {
            upgrade_id: upgrade_id.into(),
            applied_at: Utc::now(),
        }
    }
}

/// Durable history of applied upgrade units.
///
/// Guarantees:
/// - `record_success` appends exactly one row per upgrade id; a second call for
///   the same id fails with `StorageError::Duplicate`.
/// - `applied` on a never-used store returns an empty list, not an error.
/// - An unreachable store fails with `StorageError::Unavailable`; it is never
///   reported as an empty history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// All applied records, newest first.
    async fn applied(&self) -> StorageResult<Vec<AppliedRecord>>;

    /// Append a row for a unit whose `do_upgrade` just succeeded.
    async fn record_success(&self, upgrade_id: &str) -> StorageResult<AppliedRecord>;

    /// Newest applied upgrade id belonging to `repository`, if any.
    ///
    /// Membership follows [`repository_of`], so `demo_extra_*` ids never
    /// count towards `demo`.
    async fn latest_applied(&self, repository: &str) -> StorageResult<Option<String>> {
        Ok(self
            .applied()
            .await?
            .into_iter()
            .find(|r| in_repository(&r.upgrade_id, repository))
            .map(|r| r.upgrade_id))
    }

    /// Applied ids mapped to their timestamps.
    async fn load_history(&self) -> StorageResult<AppliedHistory> {
        Ok(self
            .applied()
            .await?
            .into_iter()
            .map(|r| (r.upgrade_id, r.applied_at))
            .collect())
    }
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(.+?)_(\d{4}_\d{2}_\d{2}|release)_(.+)$").expect("static id pattern")
    })
}

/// Repository of an upgrade id: everything before the first
/// `_<YYYY_MM_DD>_` or `_release_` separator.
///
/// `demo_2024_05_01_add_index` and `demo_release_1_0_0` both belong to `demo`.
pub fn repository_of(upgrade_id: &str) -> Option<&str> {
    id_pattern()
        .captures(upgrade_id)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// `true` when `upgrade_id` parses to exactly `repository`.
pub fn in_repository(upgrade_id: &str, repository: &str) -> bool {
    repository_of(upgrade_id) == Some(repository)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_repository_requires_separator() {
        assert!(in_repository("demo_2024_01_01_init", "demo"));
        assert!(in_repository("demo_release_1_0_0", "demo"));
        assert!(!in_repository("demography_2024_01_01_init", "demo"));
        assert!(!in_repository("demo", "demo"));
    }

    #[test]
    fn test_in_repository_rejects_longer_repository_names() {
        assert!(!in_repository("demo_extra_2024_02_01_x", "demo"));
        assert!(in_repository("demo_extra_2024_02_01_x", "demo_extra"));
        assert!(!in_repository("demo_extra_release_1_0", "demo"));
    }

    #[test]
    fn test_repository_of_uses_first_separator() {
        assert_eq!(repository_of("my_app_2023_12_31_fix"), Some("my_app"));
        assert_eq!(repository_of("a_release_b_release_c"), Some("a"));
        assert_eq!(repository_of("no-separator"), None);
    }

    #[test]
    fn test_applied_record_serde_roundtrip() {
        let record = AppliedRecord::now("demo_release_1_0_0");
        let json = serde_json::to_string(&record).expect("serialize");
        let back: AppliedRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(record, back);
    }
}
