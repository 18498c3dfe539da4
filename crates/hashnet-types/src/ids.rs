//! Strongly-typed identifiers for ledger entities
//!
//! Ledger accounts are opaque address strings; the host never derives them
//! itself. Machine and task identifiers are 16-byte values carried as hex.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TypesError, TypesResult};

/// Address of a ledger account (machine, order, buyer or wallet)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountRef(String);

impl AccountRef {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference from a MachineRecord to its current OrderRecord
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderRef(AccountRef);

impl OrderRef {
    /// Address the ledger program writes when a machine has no order.
    pub const NULL_SENTINEL: &'static str = "11111111111111111111111111111111";

    pub fn new(address: impl Into<String>) -> Self {
        Self(AccountRef::new(address))
    }

    /// Decode a raw order field, mapping empty and sentinel values to `None`.
    pub fn from_ledger(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some(Self::NULL_SENTINEL) => None,
            Some(address) => Some(Self::new(address)),
        }
    }

    pub fn account(&self) -> &AccountRef {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order:{}", self.0)
    }
}

/// Hardware-derived machine identifier (16 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MachineUuid([u8; 16]);

impl MachineUuid {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for MachineUuid {
    type Err = TypesError;

    fn from_str(s: &str) -> TypesResult<Self> {
        decode_16("machine uuid", s).map(Self)
    }
}

impl TryFrom<String> for MachineUuid {
    type Error = TypesError;

    fn try_from(value: String) -> TypesResult<Self> {
        value.parse()
    }
}

impl From<MachineUuid> for String {
    fn from(value: MachineUuid) -> Self {
        value.to_hex()
    }
}

impl fmt::Display for MachineUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Identifier of a liveness task submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId([u8; 16]);

impl TaskId {
    /// Generate a fresh random task identifier.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for TaskId {
    type Err = TypesError;

    fn from_str(s: &str) -> TypesResult<Self> {
        decode_16("task id", s).map(Self)
    }
}

impl TryFrom<String> for TaskId {
    type Error = TypesError;

    fn try_from(value: String) -> TypesResult<Self> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(value: TaskId) -> Self {
        value.to_hex()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.to_hex())
    }
}

fn decode_16(kind: &'static str, s: &str) -> TypesResult<[u8; 16]> {
    let bytes = hex::decode(s.trim()).map_err(|e| TypesError::InvalidIdentifier {
        kind,
        reason: e.to_string(),
    })?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| TypesError::InvalidIdentifier {
            kind,
            reason: format!("expected 16 bytes, got {}", b.len()),
        })
}
