//! Structured payloads the node itself writes to the ledger.
//!
//! Both records are stored as codec-encoded JSON, so a replica can rebuild
//! the identity registry from the ledger alone.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::entry::{EntryDraft, EntryType, LedgerEntry};
use crate::error::CoreError;
use crate::types::IdentityId;

/// A registered identity. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub created_at: i64,
}

/// A payload handed from one identity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub sender: IdentityId,
    pub receiver: IdentityId,
    /// Codec-encoded payload, kept in its encoded form.
    pub payload: String,
    pub context_hash: String,
}

/// A record with a fixed entry type.
pub trait LedgerRecord: Serialize + DeserializeOwned {
    fn entry_type() -> EntryType;

    /// Encode as a root draft authored by `author`.
    fn to_draft(&self, author: IdentityId, timestamp: i64) -> Result<EntryDraft, CoreError> {
        let json = serde_json::to_vec(self).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        let payload = codec::encode(&json)?;
        Ok(EntryDraft::new(Self::entry_type(), payload, author, timestamp))
    }

    /// Decode from a stored entry, checking its type.
    fn from_entry(entry: &LedgerEntry) -> Result<Self, CoreError> {
        if entry.entry_type != Self::entry_type() {
            return Err(CoreError::DecodingError(format!(
                "expected {} entry, found {}",
                Self::entry_type(),
                entry.entry_type
            )));
        }
        let raw = entry.decode_payload()?;
        serde_json::from_slice(&raw).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

impl LedgerRecord for Identity {
    fn entry_type() -> EntryType {
        EntryType::identity()
    }
}

impl LedgerRecord for ExchangeRecord {
    fn entry_type() -> EntryType {
        EntryType::exchange()
    }
}
