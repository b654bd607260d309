//! Codec test vectors.
//!
//! Each vector pins the symbol body an input must encode to. The checksum
//! suffix is derived from BLAKE3 and checked for shape and round-trip only.

use serde::Serialize;

use mycel_core::codec;

/// A codec test vector.
#[derive(Debug, Clone, Serialize)]
pub struct CodecVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Raw input bytes.
    pub input: &'static [u8],
    /// Expected encoded form, without the `.checksum` suffix.
    pub body: &'static str,
}

/// Get all codec vectors.
pub fn all_vectors() -> Vec<CodecVector> {
    vec![
        CodecVector {
            name: "empty input",
            input: b"",
            body: "",
        },
        CodecVector {
            name: "ascii hi",
            input: b"hi",
            body: "9-11-9-12",
        },
        CodecVector {
            name: "zero byte",
            input: &[0x00],
            body: "3-3",
        },
        CodecVector {
            name: "max byte",
            input: &[0xff],
            body: "18-18",
        },
        CodecVector {
            name: "identity id",
            input: b"node-7",
            body: "9-17-9-18-9-7-9-8-5-16-6-10",
        },
        CodecVector {
            name: "every nibble once",
            input: &[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef],
            body: "3-4-5-6-7-8-9-10-11-12-13-14-15-16-17-18",
        },
    ]
}

fn check(vector: &CodecVector) -> (bool, String) {
    let encoded = match codec::encode(vector.input) {
        Ok(e) => e,
        Err(e) => return (false, e.to_string()),
    };
    let shape_ok = encoded
        .rsplit_once('.')
        .is_some_and(|(body, checksum)| {
            body == vector.body
                && checksum.len() == 8
                && checksum.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        });
    let round_trip = codec::decode(&encoded).is_ok_and(|raw| raw[..] == *vector.input);
    (shape_ok && round_trip, encoded)
}

/// Run every vector. Returns `(name, passed, encoded)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let (ok, encoded) = check(v);
            (v.name.to_string(), ok, encoded)
        })
        .collect()
}

/// The vectors as JSON, with their encoded forms, for other implementations.
pub fn export_json() -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct Exported {
        #[serde(flatten)]
        vector: CodecVector,
        encoded: String,
    }

    let exported: Vec<Exported> = all_vectors()
        .into_iter()
        .map(|vector| {
            let (_, encoded) = check(&vector);
            Exported { vector, encoded }
        })
        .collect();
    serde_json::to_string_pretty(&exported)
}
