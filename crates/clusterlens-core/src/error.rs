//! Decode Error Types
//!
//! Every failure the record decoders can produce. Decode errors are always
//! scoped to a single record: callers log them, count them and move on to
//! the next record of the feed.
//!
//! ## Error Categories
//!
//! ### Framing Errors
//! - `Truncated`: the buffer ended before a field could be read
//! - `InvalidUtf8`: a string field is not valid UTF-8
//! - `VarintTooLong`: an unsigned varint ran past 64 bits
//! - `UnexpectedNull`: a non-nullable field was encoded as null
//!
//! ### Version Errors
//! - `UnsupportedKeyVersion`: unknown key schema for a log topic
//! - `UnsupportedValueVersion`: unknown value schema for a known key
//! - `UnsupportedSchemaVersion`: JSON blob with an unknown `version` field
//!
//! ### Content Errors
//! - `UnknownTransactionState`: transaction status byte outside the known range
//! - `Json`: malformed JSON in a coordination-tree node
//! - `Malformed`: structurally valid input carrying impossible values
//! - `InvalidPath`: coordination path matched a pattern but held a bad token

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Buffer too short for {what}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Varint too long")]
    VarintTooLong,

    #[error("Unexpected null {0}")]
    UnexpectedNull(&'static str),

    #[error("Unsupported {kind} key version: {version}")]
    UnsupportedKeyVersion { kind: &'static str, version: i16 },

    #[error("Unsupported {kind} value version: {version}")]
    UnsupportedValueVersion { kind: &'static str, version: i16 },

    #[error("Unsupported {kind} schema version: {version:?}")]
    UnsupportedSchemaVersion {
        kind: &'static str,
        version: Option<i64>,
    },

    #[error("Unknown transaction state: {0}")]
    UnknownTransactionState(i8),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed {kind} payload: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("Invalid coordination path: {0}")]
    InvalidPath(String),
}

impl DecodeError {
    /// Short, stable label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            DecodeError::Truncated { .. } => "truncated",
            DecodeError::InvalidUtf8(_) => "invalid_utf8",
            DecodeError::VarintTooLong => "varint_too_long",
            DecodeError::UnexpectedNull(_) => "unexpected_null",
            DecodeError::UnsupportedKeyVersion { .. } => "unsupported_key_version",
            DecodeError::UnsupportedValueVersion { .. } => "unsupported_value_version",
            DecodeError::UnsupportedSchemaVersion { .. } => "unsupported_schema_version",
            DecodeError::UnknownTransactionState(_) => "unknown_transaction_state",
            DecodeError::Json(_) => "json",
            DecodeError::Malformed { .. } => "malformed",
            DecodeError::InvalidPath(_) => "invalid_path",
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_distinct_for_version_errors() {
        let key = DecodeError::UnsupportedKeyVersion {
            kind: "group",
            version: 9,
        };
        let value = DecodeError::UnsupportedValueVersion {
            kind: "offset",
            version: 9,
        };
        assert_ne!(key.label(), value.label());
        assert_eq!(key.to_string(), "Unsupported group key version: 9");
    }

    #[test]
    fn test_json_error_converts() {
        let err: DecodeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.label(), "json");
    }
}
