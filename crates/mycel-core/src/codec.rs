//! The polygon codec: a lossless, injective mapping between bytes and text.
//!
//! Every byte becomes two symbols, high nibble first. A nibble `n` is written
//! as the side count of an `(n + 3)`-gon, so symbols range over `3..=18` in
//! plain decimal. Symbols are joined with `-`, and the encoded form ends with
//! `.` followed by an 8-hex-digit checksum over the raw bytes:
//!
//! ```text
//! "hi"  = [0x68, 0x69]  ->  "9-11-9-12.<checksum>"
//! ""                    ->  ".<checksum>"
//! ```
//!
//! Decoding is strict. Exactly one string encodes any given byte sequence, so
//! leading zeros, stray separators, out-of-range symbols and checksum
//! mismatches all fail with a distinct [`CodecError`].

use bytes::Bytes;

use crate::error::CodecError;

/// Domain separator for the codec checksum.
pub const CODEC_DOMAIN: &[u8] = b"mycel/codec/v1";

/// Largest payload accepted by [`encode`].
pub const MAX_PAYLOAD_LEN: usize = 1 << 20;

/// Smallest polygon: a triangle encodes nibble 0.
pub const MIN_SIDES: u8 = 3;

/// Largest polygon: an 18-gon encodes nibble 15.
pub const MAX_SIDES: u8 = MIN_SIDES + 15;

const SEPARATOR: char = '-';
const CHECKSUM_MARK: char = '.';
const CHECKSUM_HEX_LEN: usize = 8;

/// Encode bytes into their polygon text form.
pub fn encode(bytes: &[u8]) -> Result<String, CodecError> {
    if bytes.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge {
            len: bytes.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut out = String::with_capacity(max_encoded_len(bytes.len()));
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        push_symbol(&mut out, byte >> 4);
        out.push(SEPARATOR);
        push_symbol(&mut out, byte & 0x0f);
    }
    out.push(CHECKSUM_MARK);
    out.push_str(&checksum_hex(bytes));
    Ok(out)
}

/// Decode a polygon text form back into bytes.
pub fn decode(encoded: &str) -> Result<Bytes, CodecError> {
    let (body, checksum) = split_checksum(encoded)?;

    let mut out = Vec::with_capacity(body.len() / 4 + 1);
    walk_body(body, |byte| out.push(byte))?;

    let actual = checksum_hex(&out);
    if actual != checksum {
        return Err(CodecError::ChecksumMismatch {
            expected: checksum.to_string(),
            actual,
        });
    }
    Ok(Bytes::from(out))
}

/// Check that `encoded` is a well-formed encoding without materializing it.
///
/// Returns the decoded length.
pub fn validate(encoded: &str) -> Result<usize, CodecError> {
    let (body, checksum) = split_checksum(encoded)?;

    let mut hasher = checksum_hasher();
    let mut len = 0usize;
    walk_body(body, |byte| {
        hasher.update(&[byte]);
        len += 1;
    })?;

    let actual = hex::encode(&hasher.finalize().as_bytes()[..CHECKSUM_HEX_LEN / 2]);
    if actual != checksum {
        return Err(CodecError::ChecksumMismatch {
            expected: checksum.to_string(),
            actual,
        });
    }
    Ok(len)
}

/// Upper bound on the encoded length of `n` input bytes.
pub fn max_encoded_len(n: usize) -> usize {
    // Two symbols per byte, at most two digits each, plus separators.
    let body = if n == 0 { 0 } else { n * 4 + (n * 2 - 1) };
    body + 1 + CHECKSUM_HEX_LEN
}

fn push_symbol(out: &mut String, nibble: u8) {
    let sides = nibble + MIN_SIDES;
    if sides >= 10 {
        out.push('1');
        out.push(char::from(b'0' + sides - 10));
    } else {
        out.push(char::from(b'0' + sides));
    }
}

/// Parse one symbol into its nibble. Only the canonical spelling is accepted.
fn parse_symbol(index: usize, symbol: &str) -> Result<u8, CodecError> {
    let sides = match symbol.as_bytes() {
        [d @ b'3'..=b'9'] => d - b'0',
        [b'1', d @ b'0'..=b'8'] => 10 + (d - b'0'),
        _ => {
            return Err(CodecError::InvalidSymbol {
                index,
                symbol: symbol.to_string(),
            })
        }
    };
    Ok(sides - MIN_SIDES)
}

fn split_checksum(encoded: &str) -> Result<(&str, &str), CodecError> {
    let (body, checksum) = encoded
        .rsplit_once(CHECKSUM_MARK)
        .ok_or(CodecError::MissingChecksum)?;

    let well_formed = checksum.len() == CHECKSUM_HEX_LEN
        && checksum
            .bytes()
            .all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f'));
    if !well_formed {
        return Err(CodecError::MalformedChecksum(checksum.to_string()));
    }
    Ok((body, checksum))
}

/// Feed every decoded byte of `body` to `sink`.
fn walk_body(body: &str, mut sink: impl FnMut(u8)) -> Result<(), CodecError> {
    if body.is_empty() {
        return Ok(());
    }

    let mut high: Option<u8> = None;
    let mut count = 0usize;
    for (index, symbol) in body.split(SEPARATOR).enumerate() {
        let nibble = parse_symbol(index, symbol)?;
        match high.take() {
            None => high = Some(nibble),
            Some(h) => sink((h << 4) | nibble),
        }
        count = index + 1;
    }

    if high.is_some() {
        return Err(CodecError::Truncated { symbols: count });
    }
    Ok(())
}

fn checksum_hasher() -> blake3::Hasher {
    let mut hasher = blake3::Hasher::new();
    hasher.update(CODEC_DOMAIN);
    hasher
}

fn checksum_hex(bytes: &[u8]) -> String {
    let mut hasher = checksum_hasher();
    hasher.update(bytes);
    hex::encode(&hasher.finalize().as_bytes()[..CHECKSUM_HEX_LEN / 2])
}
