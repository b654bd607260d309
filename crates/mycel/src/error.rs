//! Error types for the node.

use thiserror::Error;

use mycel_core::{CodecError, CoreError, IdentityId, ValidationError};
use mycel_store::StoreError;
use mycel_sync::SyncError;
use mycel_token::TokenError;

use crate::protocol::ErrorCode;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Identity, entry type or canonical encoding error.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// Token rejected.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// An identity with this id is already registered.
    #[error("identity already exists: {0}")]
    IdentityExists(IdentityId),

    /// No identity with this id is registered.
    #[error("identity not found: {0}")]
    IdentityNotFound(IdentityId),

    /// The request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The node configuration is invalid.
    #[error("invalid config: {0}")]
    Config(String),
}

fn codec_code(e: &CodecError) -> ErrorCode {
    if e.is_encoding() {
        ErrorCode::EncodingError
    } else {
        ErrorCode::DecodingError
    }
}

fn core_code(e: &CoreError) -> ErrorCode {
    match e {
        CoreError::Codec(c) => codec_code(c),
        CoreError::EncodingError(_) => ErrorCode::EncodingError,
        CoreError::DecodingError(_) => ErrorCode::DecodingError,
        _ => ErrorCode::InvalidRequest,
    }
}

fn store_code(e: &StoreError) -> ErrorCode {
    match e {
        StoreError::EntryNotFound(_) => ErrorCode::EntryNotFound,
        StoreError::HashMismatch { .. } => ErrorCode::HashMismatch,
        StoreError::InvalidEntry(ValidationError::Payload(c)) => codec_code(c),
        StoreError::InvalidEntry(ValidationError::HashMismatch { .. }) => ErrorCode::HashMismatch,
        StoreError::InvalidEntry(_) => ErrorCode::InvalidRequest,
        _ => ErrorCode::Storage,
    }
}

impl NodeError {
    /// The wire-level error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            NodeError::Codec(e) => codec_code(e),
            NodeError::Core(e) => core_code(e),
            NodeError::Token(e) => match e {
                TokenError::Expired { .. } => ErrorCode::TokenExpired,
                TokenError::Unknown(_) => ErrorCode::TokenUnknown,
                TokenError::Replayed { .. } => ErrorCode::TokenReplayed,
                TokenError::Revoked { .. } => ErrorCode::TokenRevoked,
                TokenError::Codec(c) => codec_code(c),
            },
            NodeError::Store(e) => store_code(e),
            NodeError::Sync(SyncError::IntegrityFault { .. }) => ErrorCode::SyncIntegrityFault,
            NodeError::Sync(SyncError::Store(e)) => store_code(e),
            NodeError::IdentityExists(_) => ErrorCode::IdentityExists,
            NodeError::IdentityNotFound(_) => ErrorCode::IdentityNotFound,
            NodeError::InvalidRequest(_) | NodeError::Config(_) => ErrorCode::InvalidRequest,
        }
    }

    /// Whether the caller can fix the request and retry.
    pub fn is_recoverable(&self) -> bool {
        self.code().is_recoverable()
    }
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
