//! Error types for hashnet-types.

use thiserror::Error;

/// Errors raised while decoding ledger-provided data.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A status string outside the closed set for its record kind.
    #[error("unrecognized {kind} status: {value}")]
    UnrecognizedStatus { kind: &'static str, value: String },

    /// Order metadata payload is not valid JSON of the expected shape.
    #[error("malformed order metadata: {0}")]
    MalformedMetadata(String),

    /// Rental end time falls outside the representable date range.
    #[error("order duration of {hours} hours is out of range")]
    DurationOutOfRange { hours: u32 },

    /// Identifier could not be decoded.
    #[error("invalid {kind}: {reason}")]
    InvalidIdentifier { kind: &'static str, reason: String },
}

/// Result type for decoding operations.
pub type TypesResult<T> = Result<T, TypesError>;
