//! Asset manifests
//!
//! A download reference in the order metadata points at a manifest file
//! listing the actual items by content id.

use serde::{Deserialize, Serialize};

/// File name every manifest is saved under.
pub const MANIFEST_FILE_NAME: &str = "CID.json";

/// One entry of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestItem {
    pub name: String,
    pub cid: String,
}

impl ManifestItem {
    /// Parse a manifest document.
    pub fn parse_list(raw: &str) -> serde_json::Result<Vec<ManifestItem>> {
        serde_json::from_str(raw)
    }
}

/// A file to fetch into a destination directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    pub url: String,
    /// Target file name inside the destination directory
    pub name: String,
}

impl DownloadItem {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }
}
