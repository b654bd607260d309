//! Ledger entries: the immutable, content-addressed records of the ledger.
//!
//! An entry is never edited. Amending one means appending a new entry whose
//! `parent_id` points at it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{canonical_entry_bytes, EntryFields};
use crate::codec;
use crate::crypto::Blake3Hash;
use crate::error::{CodecError, CoreError};
use crate::types::{EntryId, IdentityId};

/// Domain separator for entry ids.
pub const ENTRY_ID_DOMAIN: &[u8] = b"mycel/entry-id/v1";

/// Maximum length of an entry type, in bytes.
pub const MAX_ENTRY_TYPE_LEN: usize = 64;

/// Prefix of entry types written by the node itself.
pub const RESERVED_PREFIX: &str = "mycel.";

/// The kind of an entry, determining how its payload is interpreted.
///
/// Any non-empty ASCII graphic string up to [`MAX_ENTRY_TYPE_LEN`] bytes.
/// Types under [`RESERVED_PREFIX`] are written only by the node.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryType(String);

impl EntryType {
    pub const IDENTITY: &'static str = "mycel.identity";
    pub const EXCHANGE: &'static str = "mycel.exchange";

    pub fn new(entry_type: impl Into<String>) -> Result<Self, CoreError> {
        let entry_type = entry_type.into();
        if entry_type.is_empty() || entry_type.len() > MAX_ENTRY_TYPE_LEN {
            return Err(CoreError::InvalidEntryType(format!(
                "length {} outside 1..={}",
                entry_type.len(),
                MAX_ENTRY_TYPE_LEN
            )));
        }
        if !entry_type.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(CoreError::InvalidEntryType(format!(
                "{entry_type:?} contains non-graphic characters"
            )));
        }
        Ok(Self(entry_type))
    }

    /// Like [`EntryType::new`], but rejects reserved types.
    pub fn user(entry_type: impl Into<String>) -> Result<Self, CoreError> {
        let t = Self::new(entry_type)?;
        if t.is_reserved() {
            return Err(CoreError::ReservedEntryType(t.0));
        }
        Ok(t)
    }

    /// Identity declaration, written on registration.
    pub fn identity() -> Self {
        Self(Self::IDENTITY.to_string())
    }

    /// Payload exchange record.
    pub fn exchange() -> Self {
        Self(Self::EXCHANGE.to_string())
    }

    pub fn is_reserved(&self) -> bool {
        self.0.starts_with(RESERVED_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryType({})", self.0)
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntryType {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<EntryType> for String {
    fn from(t: EntryType) -> Self {
        t.0
    }
}

/// An entry that has not been hashed yet.
///
/// `claimed_id` is set when the caller already knows what the id should be
/// (a replica received from a peer). The store checks the claim against the
/// computed hash and refuses the entry on mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub entry_type: EntryType,
    /// Codec-encoded payload.
    pub payload: String,
    pub parent_id: Option<EntryId>,
    pub author: IdentityId,
    /// Author-claimed Unix milliseconds.
    pub timestamp: i64,
    pub claimed_id: Option<EntryId>,
}

impl EntryDraft {
    /// Start a root draft with an already-encoded payload.
    pub fn new(
        entry_type: EntryType,
        payload: impl Into<String>,
        author: IdentityId,
        timestamp: i64,
    ) -> Self {
        Self {
            entry_type,
            payload: payload.into(),
            parent_id: None,
            author,
            timestamp,
            claimed_id: None,
        }
    }

    /// Start a draft from raw payload bytes, encoding them first.
    pub fn with_raw_payload(
        entry_type: EntryType,
        raw: &[u8],
        author: IdentityId,
        timestamp: i64,
    ) -> Result<Self, CodecError> {
        Ok(Self::new(entry_type, codec::encode(raw)?, author, timestamp))
    }

    pub fn parent(mut self, parent: EntryId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn maybe_parent(mut self, parent: Option<EntryId>) -> Self {
        self.parent_id = parent;
        self
    }

    pub fn claim(mut self, id: EntryId) -> Self {
        self.claimed_id = Some(id);
        self
    }

    fn fields(&self) -> EntryFields<'_> {
        EntryFields {
            entry_type: &self.entry_type,
            payload: &self.payload,
            parent_id: self.parent_id.as_ref(),
            author: &self.author,
            timestamp: self.timestamp,
        }
    }

    /// Compute the content hash this draft would be stored under.
    pub fn compute_id(&self) -> Result<EntryId, CoreError> {
        compute_entry_id(&self.fields())
    }

    /// Attach an id and produce the stored form.
    pub fn into_entry(self, id: EntryId) -> LedgerEntry {
        LedgerEntry {
            id,
            entry_type: self.entry_type,
            payload: self.payload,
            parent_id: self.parent_id,
            author: self.author,
            timestamp: self.timestamp,
        }
    }
}

/// A stored ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub entry_type: EntryType,
    pub payload: String,
    pub parent_id: Option<EntryId>,
    pub author: IdentityId,
    pub timestamp: i64,
}

impl LedgerEntry {
    fn fields(&self) -> EntryFields<'_> {
        EntryFields {
            entry_type: &self.entry_type,
            payload: &self.payload,
            parent_id: self.parent_id.as_ref(),
            author: &self.author,
            timestamp: self.timestamp,
        }
    }

    /// Recompute the content hash from the entry's fields.
    pub fn compute_id(&self) -> Result<EntryId, CoreError> {
        compute_entry_id(&self.fields())
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Decode the payload to raw bytes.
    pub fn decode_payload(&self) -> Result<Bytes, CodecError> {
        codec::decode(&self.payload)
    }

    /// A draft that reproduces this entry and claims its id.
    pub fn to_draft(&self) -> EntryDraft {
        EntryDraft {
            entry_type: self.entry_type.clone(),
            payload: self.payload.clone(),
            parent_id: self.parent_id,
            author: self.author.clone(),
            timestamp: self.timestamp,
            claimed_id: Some(self.id),
        }
    }
}

fn compute_entry_id(fields: &EntryFields<'_>) -> Result<EntryId, CoreError> {
    let bytes = canonical_entry_bytes(fields)?;
    Ok(EntryId(Blake3Hash::derive(ENTRY_ID_DOMAIN, &[&bytes]).0))
}
