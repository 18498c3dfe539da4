//! Settlement periods
//!
//! Rewards are settled in whole-day buckets counted from the marketplace
//! genesis. Every liveness submission carries the bucket it belongs to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamp of period zero.
pub const GENESIS_UNIX: i64 = 1_708_992_000;

/// Length of one settlement period in seconds.
pub const PERIOD_SECONDS: i64 = 86_400;

/// Day-sized settlement bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementPeriod(u32);

impl SettlementPeriod {
    /// Period containing `at`. Instants before genesis map to period zero.
    pub fn at(at: DateTime<Utc>) -> Self {
        let elapsed = (at.timestamp() - GENESIS_UNIX).max(0);
        Self(u32::try_from(elapsed / PERIOD_SECONDS).unwrap_or(u32::MAX))
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SettlementPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "period:{}", self.0)
    }
}
