//! JSON file session store
//!
//! The whole store is one small JSON object keyed by session key name.
//! Every mutation rewrites it atomically (write `.tmp`, then rename).

use super::SessionStore;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use hashnet_types::SessionKey;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

type Document = BTreeMap<String, String>;

/// Session store persisted to a JSON file
#[derive(Debug)]
pub struct JsonFileSessionStore {
    path: PathBuf,
    document: Mutex<Option<Document>>,
}

impl JsonFileSessionStore {
    /// Open the store, loading existing entries if the file is present.
    pub async fn open(path: impl Into<PathBuf>) -> SessionResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let document = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => Document::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Document::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = document.len(), "Opened session store");

        Ok(Self {
            path,
            document: Mutex::new(Some(document)),
        })
    }

    async fn persist(&self, document: &Document) -> SessionResult<()> {
        let json = serde_json::to_string_pretty(document)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn get(&self, key: SessionKey) -> SessionResult<Option<String>> {
        let document = self.document.lock().await;
        let document = document.as_ref().ok_or(SessionError::Closed)?;
        Ok(document.get(key.as_str()).cloned())
    }

    async fn put(&self, key: SessionKey, value: &str) -> SessionResult<()> {
        let mut guard = self.document.lock().await;
        let document = guard.as_mut().ok_or(SessionError::Closed)?;
        if document.get(key.as_str()).map(String::as_str) == Some(value) {
            return Ok(());
        }
        document.insert(key.as_str().to_string(), value.to_string());
        self.persist(document).await
    }

    async fn delete(&self, key: SessionKey) -> SessionResult<()> {
        let mut guard = self.document.lock().await;
        let document = guard.as_mut().ok_or(SessionError::Closed)?;
        if document.remove(key.as_str()).is_some() {
            self.persist(document).await?;
        }
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        let mut guard = self.document.lock().await;
        if let Some(document) = guard.take() {
            self.persist(&document).await?;
        }
        Ok(())
    }
}
