//! Request and response types for the node's boundary operations.
//!
//! Every type serializes with serde. [`Request`] and [`Response`] are
//! tagged with `"op"`, so an envelope reads like
//! `{"op": "contribute_entry", "agent_token": {...}, ...}`.

use std::fmt;

use serde::{Deserialize, Serialize};

use mycel_core::{EntryId, IdentityId, LedgerEntry};
use mycel_token::Token;

use crate::error::NodeError;

/// Outcome of a successful operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The operation was applied.
    Accepted,
    /// The content was already stored; nothing new was written.
    Duplicate,
    /// The caller's state matches the node's.
    UpToDate,
    /// The response carries entries the caller may lack.
    Delta,
}

/// Per-operation progress, as recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    TokenVerified,
    Applied,
    Rejected,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Unauthenticated => "unauthenticated",
            Phase::TokenVerified => "token_verified",
            Phase::Applied => "applied",
            Phase::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operations
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterIdentityRequest {
    pub agent_id: IdentityId,
    pub agent_name: String,
    #[serde(default)]
    pub description: String,
    /// Codec-encoded state digest the first token is bound to.
    pub initial_digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterIdentityResponse {
    pub status: Status,
    pub token: Token,
    pub identity_entry_id: EntryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePayloadRequest {
    pub sender_token: Token,
    pub receiver_id: IdentityId,
    pub encoded_payload: String,
    pub context_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePayloadResponse {
    pub status: Status,
    pub transaction_id: EntryId,
    pub next_token: Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateRequest {
    pub agent_token: Token,
    /// Codec-encoded state digest of the caller's ledger.
    pub current_state_digest: String,
    #[serde(default)]
    pub last_known_entry_id: Option<EntryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStateResponse {
    pub status: Status,
    pub entries: Vec<LedgerEntry>,
    /// Pass as `last_known_entry_id` to fetch the next page.
    pub resume_from: Option<EntryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributeEntryRequest {
    pub agent_token: Token,
    pub entry_type: String,
    pub encoded_content: String,
    #[serde(default)]
    pub parent_entry_id: Option<EntryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributeEntryResponse {
    pub status: Status,
    pub new_entry_id: EntryId,
    pub next_token: Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewTokenRequest {
    pub token: Token,
    /// Codec-encoded state digest the new token is bound to.
    pub state_digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewTokenResponse {
    pub status: Status,
    pub token: Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeTokenRequest {
    pub token: Token,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeTokenResponse {
    pub status: Status,
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelopes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    RegisterIdentity(RegisterIdentityRequest),
    ExchangePayload(ExchangePayloadRequest),
    SyncState(SyncStateRequest),
    ContributeEntry(ContributeEntryRequest),
    RenewToken(RenewTokenRequest),
    RevokeToken(RevokeTokenRequest),
}

impl Request {
    /// The operation name as it appears in the `"op"` tag.
    pub fn op(&self) -> &'static str {
        match self {
            Request::RegisterIdentity(_) => "register_identity",
            Request::ExchangePayload(_) => "exchange_payload",
            Request::SyncState(_) => "sync_state",
            Request::ContributeEntry(_) => "contribute_entry",
            Request::RenewToken(_) => "renew_token",
            Request::RevokeToken(_) => "revoke_token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Response {
    RegisterIdentity(RegisterIdentityResponse),
    ExchangePayload(ExchangePayloadResponse),
    SyncState(SyncStateResponse),
    ContributeEntry(ContributeEntryResponse),
    RenewToken(RenewTokenResponse),
    RevokeToken(RevokeTokenResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Wire-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    EncodingError,
    DecodingError,
    TokenExpired,
    TokenUnknown,
    TokenReplayed,
    TokenRevoked,
    EntryNotFound,
    HashMismatch,
    SyncIntegrityFault,
    IdentityExists,
    IdentityNotFound,
    InvalidRequest,
    Storage,
}

impl ErrorCode {
    /// Integrity failures and storage faults cannot be fixed by the caller.
    pub fn is_recoverable(self) -> bool {
        !matches!(
            self,
            ErrorCode::HashMismatch | ErrorCode::SyncIntegrityFault | ErrorCode::Storage
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl From<&NodeError> for ErrorResponse {
    fn from(e: &NodeError) -> Self {
        let code = e.code();
        Self {
            code,
            message: e.to_string(),
            recoverable: code.is_recoverable(),
        }
    }
}
