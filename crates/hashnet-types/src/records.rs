//! Ledger-resident records as the host reads them
//!
//! Both records are owned by the ledger program. The host only reads them
//! and changes them indirectly through submissions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TypesError, TypesResult};
use crate::ids::{AccountRef, OrderRef};
use crate::metadata::OrderMetadata;
use crate::status::{MachineStatus, OrderStatus};

/// This host's machine account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Rental status
    pub status: MachineStatus,

    /// Current order, `None` when the ledger holds the null reference
    #[serde(default)]
    pub order: Option<OrderRef>,

    /// Opaque registration payload written at registration time
    #[serde(default)]
    pub metadata: String,
}

impl MachineRecord {
    /// Whether a registration payload is present on the ledger.
    pub fn is_registered(&self) -> bool {
        !self.metadata.trim().is_empty()
    }
}

/// A buyer's rental order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Lifecycle status
    pub status: OrderStatus,

    /// Buyer wallet
    pub buyer: AccountRef,

    /// When the host's start report was accepted
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,

    /// Rented duration in whole hours
    pub duration_hours: u32,

    /// Opaque payload holding [`OrderMetadata`] as JSON
    #[serde(default)]
    pub metadata: String,
}

/// Acknowledgement of an accepted ledger submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Transaction signature
    pub signature: String,
}

impl Receipt {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
        }
    }
}

impl std::fmt::Display for Receipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.signature)
    }
}

impl OrderRecord {
    /// Scheduled end of the rental: `start_time + duration_hours`. Fails
    /// when the sum falls outside the representable date range.
    pub fn end_time(&self) -> TypesResult<DateTime<Utc>> {
        Duration::try_hours(i64::from(self.duration_hours))
            .and_then(|duration| self.start_time.checked_add_signed(duration))
            .ok_or(TypesError::DurationOutOfRange {
                hours: self.duration_hours,
            })
    }

    /// Decode the buyer-supplied metadata payload.
    pub fn decode_metadata(&self) -> TypesResult<OrderMetadata> {
        OrderMetadata::decode(&self.metadata)
    }
}
