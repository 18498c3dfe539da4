//! Closed status sets for ledger records
//!
//! The ledger stores statuses as enum discriminants; relays and tooling see
//! them as strings. Anything outside the closed set is surfaced as
//! [`TypesError::UnrecognizedStatus`] rather than silently mapped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypesError;

/// Rental status of this host's machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MachineStatus {
    /// Registered but not offered for rent
    Idle,
    /// Listed and waiting for a buyer
    ForRent,
    /// A buyer placed an order on this machine
    Renting,
}

impl MachineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Idle => "Idle",
            MachineStatus::ForRent => "ForRent",
            MachineStatus::Renting => "Renting",
        }
    }
}

impl FromStr for MachineStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Idle" => Ok(MachineStatus::Idle),
            "ForRent" => Ok(MachineStatus::ForRent),
            "Renting" => Ok(MachineStatus::Renting),
            other => Err(TypesError::UnrecognizedStatus {
                kind: "machine",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle status of a rental order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OrderStatus {
    /// Placed by the buyer, host has not started it
    Preparing,
    /// Host reported the start; the rental clock is running
    Training,
    /// Host reported completion and payment was released
    Completed,
    /// Host reported a failure
    Failed,
    /// Buyer cancelled and was refunded
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Preparing => "Preparing",
            OrderStatus::Training => "Training",
            OrderStatus::Completed => "Completed",
            OrderStatus::Failed => "Failed",
            OrderStatus::Refunded => "Refunded",
        }
    }

    /// Whether the ledger accepts no further transitions for this order.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Refunded
        )
    }
}

impl FromStr for OrderStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Preparing" => Ok(OrderStatus::Preparing),
            "Training" => Ok(OrderStatus::Training),
            "Completed" => Ok(OrderStatus::Completed),
            "Failed" => Ok(OrderStatus::Failed),
            "Refunded" => Ok(OrderStatus::Refunded),
            other => Err(TypesError::UnrecognizedStatus {
                kind: "order",
                value: other.to_string(),
            }),
        }
    }
}

macro_rules! string_conversions {
    ($ty:ty) => {
        impl TryFrom<String> for $ty {
            type Error = TypesError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_conversions!(MachineStatus);
string_conversions!(OrderStatus);
