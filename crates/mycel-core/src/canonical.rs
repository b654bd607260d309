//! Canonical CBOR encoding for ledger entry hashing.
//!
//! This module implements RFC 8949 Core Deterministic Encoding for the
//! subset of CBOR that entries use:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! The same entry fields must produce identical bytes on every node, or two
//! peers would disagree on the entry's id.

use ciborium::value::Value;

use crate::entry::EntryType;
use crate::error::CoreError;
use crate::types::{EntryId, IdentityId};

/// Entry field keys. Text keys keep the encoding self-describing.
mod keys {
    pub const TYPE: &str = "type";
    pub const AUTHOR: &str = "author";
    pub const PARENT: &str = "parent";
    pub const PAYLOAD: &str = "payload";
    pub const TIMESTAMP: &str = "timestamp";
}

/// Borrowed view of the fields an entry id is computed over.
#[derive(Debug, Clone, Copy)]
pub struct EntryFields<'a> {
    pub entry_type: &'a EntryType,
    pub payload: &'a str,
    pub parent_id: Option<&'a EntryId>,
    pub author: &'a IdentityId,
    pub timestamp: i64,
}

/// Encode entry fields to canonical CBOR bytes.
pub fn canonical_entry_bytes(fields: &EntryFields<'_>) -> Result<Vec<u8>, CoreError> {
    let parent = match fields.parent_id {
        Some(id) => Value::Bytes(id.0.to_vec()),
        None => Value::Null,
    };

    let value = Value::Map(vec![
        (Value::Text(keys::TYPE.into()), Value::Text(fields.entry_type.as_str().into())),
        (Value::Text(keys::AUTHOR.into()), Value::Text(fields.author.as_str().into())),
        (Value::Text(keys::PARENT.into()), parent),
        (Value::Text(keys::PAYLOAD.into()), Value::Text(fields.payload.into())),
        (Value::Text(keys::TIMESTAMP.into()), Value::Integer(fields.timestamp.into())),
    ]);

    encode_cbor_value_canonical(&value)
}

/// Encode a CBOR Value to canonical bytes.
pub fn encode_cbor_value_canonical(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::EncodingError(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => {
            return Err(CoreError::EncodingError(
                "unsupported CBOR value type".into(),
            ))
        }
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a map canonically (major type 5), keys sorted by encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    if pairs.windows(2).any(|w| w[0].0 == w[1].0) {
        return Err(CoreError::EncodingError("duplicate map key".into()));
    }

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
