//! Error types for Mycel core primitives.

use thiserror::Error;

use crate::types::EntryId;

/// Errors produced by the polygon codec.
///
/// `PayloadTooLarge` is the only encoding failure; every other variant is a
/// decoding failure and names the exact way the input was malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("encoded form has no checksum suffix")]
    MissingChecksum,

    #[error("invalid symbol {symbol:?} at position {index}")]
    InvalidSymbol { index: usize, symbol: String },

    #[error("odd number of symbols ({symbols}); every byte needs two")]
    Truncated { symbols: usize },

    #[error("malformed checksum: {0:?}")]
    MalformedChecksum(String),

    #[error("checksum mismatch: encoded {expected}, content hashes to {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl CodecError {
    /// True if this error came from `encode` rather than `decode`.
    pub fn is_encoding(&self) -> bool {
        matches!(self, CodecError::PayloadTooLarge { .. })
    }
}

/// Core errors for identities, entry types and canonical encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("invalid identity id: {0}")]
    InvalidIdentityId(String),

    #[error("invalid entry type: {0}")]
    InvalidEntryType(String),

    #[error("entry type {0:?} is reserved")]
    ReservedEntryType(String),

    #[error("invalid entry id: {0}")]
    InvalidEntryId(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Structural validation errors for ledger entries.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("payload is not a valid encoded form: {0}")]
    Payload(#[from] CodecError),

    #[error("hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch { claimed: EntryId, computed: EntryId },

    #[error("negative timestamp: {0}")]
    NegativeTimestamp(i64),

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Codec(c) => ValidationError::Payload(c),
            other => ValidationError::StructuralError(other.to_string()),
        }
    }
}
