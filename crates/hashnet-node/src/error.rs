//! Error types for hashnet-node

use thiserror::Error;

/// Node-level errors
///
/// Only startup and decommission surface these to the caller. The control
/// loops log collaborator errors and carry on.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup could not complete
    #[error("Startup error: {0}")]
    Startup(String),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Workload runtime error
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Asset retrieval error
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Session store error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Record model error
    #[error("Types error: {0}")]
    Types(#[from] hashnet_types::TypesError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ledger gateway errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Network or relay unreachable
    #[error("Transport error: {0}")]
    Transport(String),

    /// Submission or read rejected
    #[error("Rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// A record carried a status outside the known set
    #[error("Unrecognized {kind} status: {value}")]
    UnrecognizedStatus { kind: &'static str, value: String },

    /// A record could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Record does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LedgerError::Decode(err.to_string())
        } else {
            LedgerError::Transport(err.to_string())
        }
    }
}

impl From<hashnet_types::TypesError> for LedgerError {
    fn from(err: hashnet_types::TypesError) -> Self {
        match err {
            hashnet_types::TypesError::UnrecognizedStatus { kind, value } => {
                LedgerError::UnrecognizedStatus { kind, value }
            }
            other => LedgerError::Decode(other.to_string()),
        }
    }
}

/// Workload runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Runtime binary could not be spawned
    #[error("Spawn error: {0}")]
    Spawn(#[from] std::io::Error),

    /// Runtime command exited unsuccessfully
    #[error("Command `{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Benchmark output could not be read as a score
    #[error("Unparsable score output: {0}")]
    ScoreOutput(String),

    /// Workload arguments could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Asset retrieval errors
#[derive(Debug, Error)]
pub enum AssetError {
    /// HTTP request failed
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Store answered with a non-success status
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest could not be decoded
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Item name is empty, absolute or climbs out of the destination
    #[error("Invalid asset name: {0:?}")]
    InvalidName(String),
}

/// Session store errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Session document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Store used after close
    #[error("Session store is closed")]
    Closed,
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
