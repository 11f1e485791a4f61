//! Run-time estimates for a batch of upgrade units.

use std::fmt;

use serde::Serialize;

use crate::unit::UpgradeUnit;

/// Seconds assumed for a unit that declares no estimate.
pub const DEFAULT_UNIT_SECONDS: u64 = 1;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Total estimated duration of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Estimate {
    pub seconds: u64,
}

impl Estimate {
    /// Sum of every unit's estimate.
    pub fn for_units<'a, I>(units: I) -> Self
    where
        I: IntoIterator<Item = &'a UpgradeUnit>,
    {
        let seconds = units
            .into_iter()
            .map(|u| u.estimate().unwrap_or(DEFAULT_UNIT_SECONDS))
            .sum();
        Self { seconds }
    }

    /// Coarse human-readable bucket.
    pub fn human(&self) -> &'static str {
        match self.seconds {
            s if s < MINUTE => "less than 1 minute",
            s if s < 5 * MINUTE => "less than 5 minutes",
            s if s < 10 * MINUTE => "less than 10 minutes",
            s if s < 30 * MINUTE => "less than 30 minutes",
            s if s < HOUR => "less than 1 hour",
            s if s < 3 * HOUR => "less than 3 hours",
            s if s < 6 * HOUR => "less than 6 hours",
            s if s < 12 * HOUR => "less than 12 hours",
            s if s < DAY => "less than 1 day",
            _ => "more than 1 day",
        }
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.human())
    }
}
