//! Error types for token operations.

use thiserror::Error;

use mycel_core::{CodecError, IdentityId};

/// Errors that can occur while issuing or spending tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token's TTL window has passed.
    #[error("token for {subject} expired at {expired_at}")]
    Expired { subject: IdentityId, expired_at: i64 },

    /// Unknown subject, or a token this issuer did not sign.
    #[error("unknown identity: {0}")]
    Unknown(String),

    /// The token was already consumed or has been superseded.
    #[error("token for {subject} was already used")]
    Replayed { subject: IdentityId },

    /// The token was explicitly revoked.
    #[error("token for {subject} has been revoked")]
    Revoked { subject: IdentityId },

    /// The state digest could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for token operations.
pub type Result<T> = std::result::Result<T, TokenError>;
