//! In-memory session store (for testing)

use super::SessionStore;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use hashnet_types::SessionKey;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Session store that lives for the process only
#[derive(Debug)]
pub struct InMemorySessionStore {
    entries: RwLock<Option<HashMap<SessionKey, String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Some(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: SessionKey) -> SessionResult<Option<String>> {
        let entries = self.entries.read().await;
        let entries = entries.as_ref().ok_or(SessionError::Closed)?;
        Ok(entries.get(&key).cloned())
    }

    async fn put(&self, key: SessionKey, value: &str) -> SessionResult<()> {
        let mut entries = self.entries.write().await;
        let entries = entries.as_mut().ok_or(SessionError::Closed)?;
        entries.insert(key, value.to_string());
        Ok(())
    }

    async fn delete(&self, key: SessionKey) -> SessionResult<()> {
        let mut entries = self.entries.write().await;
        let entries = entries.as_mut().ok_or(SessionError::Closed)?;
        entries.remove(&key);
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        self.entries.write().await.take();
        Ok(())
    }
}
