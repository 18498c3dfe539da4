//! Session bookkeeping store
//!
//! A small key/value store holding the active order's `buyer`, `token` and
//! `orderEndTime` for local tools. Nothing here is authoritative.

mod file;
mod memory;

pub use file::JsonFileSessionStore;
pub use memory::InMemorySessionStore;

use crate::error::SessionResult;
use async_trait::async_trait;
use hashnet_types::{AccountRef, SessionKey, SessionState, SessionToken};

/// Persistent key/value store for session keys
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: SessionKey) -> SessionResult<Option<String>>;

    async fn put(&self, key: SessionKey, value: &str) -> SessionResult<()>;

    /// Delete a key; deleting an absent key is not an error
    async fn delete(&self, key: SessionKey) -> SessionResult<()>;

    /// Flush and release the store; later calls fail with `Closed`
    async fn close(&self) -> SessionResult<()>;

    /// Typed snapshot of every session key.
    async fn load_state(&self) -> SessionResult<SessionState> {
        Ok(SessionState {
            buyer: self.get(SessionKey::Buyer).await?.map(AccountRef::new),
            token: self
                .get(SessionKey::Token)
                .await?
                .map(SessionToken::from_stored),
            order_end_time: self
                .get(SessionKey::OrderEndTime)
                .await?
                .as_deref()
                .and_then(SessionState::parse_end_time),
        })
    }
}
