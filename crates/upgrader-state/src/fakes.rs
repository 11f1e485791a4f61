//! In-memory fake for the history store (testing only)
//!
//! `MemoryHistoryStore` satisfies the `HistoryStore` contract without any
//! external dependency and can be switched into an "unreachable" mode to
//! exercise fail-fast paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

/// In-memory history backed by an insertion-ordered `Vec<AppliedRecord>`.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<AppliedRecord>>,
    unavailable: AtomicBool,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with already-applied ids, oldest first.
    ///
    /// Seeded rows are spaced one second apart so "newest" is well defined.
    pub fn with_applied<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let base: DateTime<Utc> = Utc::now() - chrono::Duration::days(1);
        let records = ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| AppliedRecord {
                upgrade_id: id.into(),
                applied_at: base + chrono::Duration::seconds(i as i64),
            })
            .collect();
        Self {
            records: Mutex::new(records),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Applied ids in insertion order.
    pub fn applied_ids(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.upgrade_id.clone())
            .collect()
    }

    fn ensure_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn applied(&self) -> StorageResult<Vec<AppliedRecord>> {
        self.ensure_available()?;
        let records = self.records.lock().unwrap();
        let mut newest_first: Vec<AppliedRecord> = records.iter().rev().cloned().collect();
        newest_first.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        Ok(newest_first)
    }

    async fn record_success(&self, upgrade_id: &str) -> StorageResult<AppliedRecord> {
        self.ensure_available()?;
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.upgrade_id == upgrade_id) {
            return Err(StorageError::Duplicate {
                upgrade_id: upgrade_id.to_string(),
            });
        }
        let mut record = AppliedRecord::now(upgrade_id);
        // Keep timestamps strictly increasing even on coarse clocks.
        if let Some(last) = records.iter().map(|r| r.applied_at).max() {
            if record.applied_at <= last {
                record.applied_at = last + chrono::Duration::microseconds(1);
            }
        }
        records.push(record.clone());
        Ok(record)
    }
}
