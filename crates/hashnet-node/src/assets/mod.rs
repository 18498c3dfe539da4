//! Asset retrieval from the content-addressed store
//!
//! Orders reference assets indirectly: each download reference names a
//! manifest (`CID.json`) that lists the actual files by content id.

mod http;

pub use http::HttpAssetFetcher;

use crate::error::AssetResult;
use async_trait::async_trait;
use hashnet_types::{DownloadItem, ManifestItem};
use std::path::Path;

/// Fetches files into a local directory
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download every item into `dest_dir`, creating it if needed. Stops at
    /// the first failing item.
    async fn fetch(&self, dest_dir: &Path, items: &[DownloadItem]) -> AssetResult<()>;
}

/// URL scheme of the content store gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUrls {
    base: String,
}

impl ContentUrls {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Path-style URL used for manifests and workspace assets.
    pub fn ipfs(&self, cid: &str) -> String {
        format!("{}/ipfs/{}", self.base, cid.trim_start_matches('/'))
    }

    /// Gateway-root URL handed to deployments.
    pub fn gateway(&self, cid: &str) -> String {
        format!("{}/{}", self.base, cid.trim_start_matches('/'))
    }
}

/// Read a downloaded manifest.
pub async fn read_manifest(path: &Path) -> AssetResult<Vec<ManifestItem>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(ManifestItem::parse_list(&raw)?)
}
