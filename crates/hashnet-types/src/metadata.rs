//! Order metadata codec
//!
//! Buyers write order metadata as a JSON document with PascalCase keys. The
//! host reads the intent and asset references out of it, and writes the
//! failure message and its machine account back in before reporting. Keys
//! the host does not interpret are carried through untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{TypesError, TypesResult};

/// Requested workload kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    /// Interactive training workspace
    Train,
    /// Model deployment
    Deploy,
    /// Anything else the buyer wrote; rejected by the controller
    Other(String),
}

impl Intent {
    pub fn as_str(&self) -> &str {
        match self {
            Intent::Train => "train",
            Intent::Deploy => "deploy",
            Intent::Other(raw) => raw,
        }
    }
}

impl From<String> for Intent {
    fn from(value: String) -> Self {
        match value.as_str() {
            "train" => Intent::Train,
            "deploy" => Intent::Deploy,
            _ => Intent::Other(value),
        }
    }
}

impl From<Intent> for String {
    fn from(value: Intent) -> Self {
        match value {
            Intent::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl Default for Intent {
    fn default() -> Self {
        Intent::Other(String::new())
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buyer-facing part of the order metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    /// Requested workload kind
    #[serde(rename = "Intent", default)]
    pub intent: Intent,

    /// Content references of the asset manifests, in order
    #[serde(rename = "DownloadURL", default, deserialize_with = "null_as_empty")]
    pub download_refs: Vec<String>,

    /// Free text, set by the host when reporting a failure
    #[serde(rename = "Message", default)]
    pub message: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded `OrderRecord.metadata`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
    #[serde(rename = "OrderInfo", default)]
    pub order_info: OrderInfo,

    /// Host machine account, stamped in before completion/failure reports
    #[serde(rename = "MachineAccounts", default)]
    pub machine_accounts: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderMetadata {
    /// Decode a raw metadata payload.
    pub fn decode(raw: &str) -> TypesResult<Self> {
        serde_json::from_str(raw).map_err(|e| TypesError::MalformedMetadata(e.to_string()))
    }

    /// Encode for a ledger submission.
    pub fn encode(&self) -> TypesResult<String> {
        serde_json::to_string(self).map_err(|e| TypesError::MalformedMetadata(e.to_string()))
    }

    pub fn intent(&self) -> &Intent {
        &self.order_info.intent
    }

    pub fn download_refs(&self) -> &[String] {
        &self.order_info.download_refs
    }

    /// Stamp the reporting machine into the metadata.
    pub fn with_machine_account(mut self, machine_account: impl Into<String>) -> Self {
        self.machine_accounts = machine_account.into();
        self
    }

    /// Record a host-side failure message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.order_info.message = message.into();
        self
    }
}

/// Payload of a liveness task submission (always empty today)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMetadata {}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
