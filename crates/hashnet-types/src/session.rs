//! Local session bookkeeping
//!
//! The session is a convenience copy of the active order for local tools
//! (the workspace proxy reads `buyer` and `token`). It is rebuilt from the
//! ledger on every poll and is never a source of truth.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::AccountRef;

/// Keys persisted in the session store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKey {
    Buyer,
    Token,
    OrderEndTime,
}

impl SessionKey {
    pub const ALL: [SessionKey; 3] = [SessionKey::Buyer, SessionKey::Token, SessionKey::OrderEndTime];

    /// Key name on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKey::Buyer => "buyer",
            SessionKey::Token => "token",
            SessionKey::OrderEndTime => "orderEndTime",
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access token handed to the buyer's workspace
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Derive a fresh 128-bit token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens end up in logs through Debug on containing structs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "SessionToken({}…)", prefix)
    }
}

/// Snapshot of the persisted session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub buyer: Option<AccountRef>,
    pub token: Option<SessionToken>,
    pub order_end_time: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Wire form of an order end time.
    pub fn format_end_time(end: DateTime<Utc>) -> String {
        end.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Parse a stored order end time; unparsable values read as absent.
    pub fn parse_end_time(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}
