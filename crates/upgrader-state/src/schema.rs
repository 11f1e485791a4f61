//! Schema definitions for the upgrader SurrealDB table
//!
//! Tables:
//! - upgrade: one row per applied upgrade unit

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::AppliedRecord;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Row of the `upgrade` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeRow {
    /// Applied upgrade id (unique)
    pub upgrade: String,
    /// Applied timestamp
    #[serde(with = "surreal_datetime")]
    pub applied: DateTime<Utc>,
}

impl UpgradeRow {
    /// Create a row stamped with the current time
    pub fn new(upgrade: impl Into<String>) -> Self {
        Self {
            upgrade: upgrade.into(),
            applied: Utc::now(),
        }
    }
}

impl From<UpgradeRow> for AppliedRecord {
    fn from(row: UpgradeRow) -> Self {
        AppliedRecord {
            upgrade_id: row.upgrade,
            applied_at: row.applied,
        }
    }
}
