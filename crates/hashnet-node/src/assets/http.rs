//! HTTP asset fetcher

use super::AssetFetcher;
use crate::error::{AssetError, AssetResult};
use async_trait::async_trait;
use hashnet_types::DownloadItem;
use reqwest::Client;
use std::path::{Component, Path};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Downloads items with plain GET requests
#[derive(Debug, Clone, Default)]
pub struct HttpAssetFetcher {
    client: Client,
}

impl HttpAssetFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch_one(&self, dest_dir: &Path, item: &DownloadItem) -> AssetResult<()> {
        let target = dest_dir.join(relative_name(&item.name)?);
        let parent = target.parent().unwrap_or(dest_dir);
        tokio::fs::create_dir_all(parent).await?;

        let mut response = self.client.get(&item.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: item.url.clone(),
                status: status.as_u16(),
            });
        }

        // Partial downloads never replace an existing file.
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = target.with_file_name(format!(".{}.part", file_name));
        let mut file = File::create(&tmp).await?;
        let mut written = 0usize;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &target).await?;

        debug!(name = %item.name, bytes = written, "Fetched asset");
        Ok(())
    }
}

/// Manifest names may nest into sub-directories but never leave `dest_dir`.
fn relative_name(name: &str) -> AssetResult<&Path> {
    let path = Path::new(name);
    let mut components = path.components().peekable();
    if components.peek().is_none()
        || !components.all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(AssetError::InvalidName(name.to_string()));
    }
    Ok(path)
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, dest_dir: &Path, items: &[DownloadItem]) -> AssetResult<()> {
        tokio::fs::create_dir_all(dest_dir).await?;
        for item in items {
            self.fetch_one(dest_dir, item).await?;
        }
        Ok(())
    }
}
