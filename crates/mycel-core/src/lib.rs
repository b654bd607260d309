//! # Mycel Core
//!
//! Pure primitives for Mycel: the polygon codec, ledger entries, identity
//! records, and canonical content hashing.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`LedgerEntry`] - An immutable, content-addressed ledger record
//! - [`EntryId`] - Content address of an entry (Blake3 over canonical CBOR)
//! - [`IdentityId`] - Caller-chosen identity name
//! - [`EntryType`] - Discriminator for payload interpretation
//!
//! ## Codec
//!
//! Payloads travel and rest as polygon text. See the [`codec`] module.

pub mod canonical;
pub mod codec;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod record;
pub mod types;
pub mod validation;

pub use canonical::canonical_entry_bytes;
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use entry::{EntryDraft, EntryType, LedgerEntry};
pub use error::{CodecError, CoreError, ValidationError};
pub use record::{ExchangeRecord, Identity, LedgerRecord};
pub use types::{now_millis, EntryId, IdentityId};
pub use validation::{validate_draft, verify_entry_id};
