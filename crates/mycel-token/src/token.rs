//! Identity tokens and their verification status.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use mycel_core::{codec, Blake3Hash, CodecError, Ed25519Signature, IdentityId};

/// Domain separator for token digests.
pub const TOKEN_DOMAIN: &[u8] = b"mycel/token/v1";

/// Domain separator for the issuer's signature over a token.
pub const TOKEN_SIGNATURE_DOMAIN: &[u8] = b"mycel/token-sig/v1";

/// Default token lifetime: 24 hours.
pub const DEFAULT_TOKEN_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Digest binding a token to its subject, issuance time and state snapshot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenDigest(pub [u8; 32]);

impl TokenDigest {
    /// `Blake3(domain, subject, issued_at, encode(state_digest))`.
    pub fn compute(
        subject: &IdentityId,
        issued_at: i64,
        state_digest: &[u8],
    ) -> Result<Self, CodecError> {
        let encoded_state = codec::encode(state_digest)?;
        let hash = Blake3Hash::derive(
            TOKEN_DOMAIN,
            &[
                subject.as_str().as_bytes(),
                &issued_at.to_le_bytes(),
                encoded_state.as_bytes(),
            ],
        );
        Ok(Self(hash.0))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl Serialize for TokenDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TokenDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TokenDigest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A short-lived identity token.
///
/// Tokens are never persisted; an identity holds at most one valid token,
/// and issuing a new one supersedes the previous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub subject: IdentityId,
    /// Unix milliseconds.
    pub issued_at: i64,
    /// Lifetime in milliseconds.
    pub ttl: u64,
    pub digest: TokenDigest,
    /// Issuer signature over [`Token::signed_message`].
    pub signature: Ed25519Signature,
}

impl Token {
    /// The bytes the issuer signs. Covers every field but the signature.
    pub fn signed_message(
        subject: &IdentityId,
        issued_at: i64,
        ttl: u64,
        digest: &TokenDigest,
    ) -> Vec<u8> {
        let subject = subject.as_str().as_bytes();
        let mut msg = Vec::with_capacity(TOKEN_SIGNATURE_DOMAIN.len() + subject.len() + 56);
        msg.extend_from_slice(TOKEN_SIGNATURE_DOMAIN);
        msg.extend_from_slice(&(subject.len() as u64).to_le_bytes());
        msg.extend_from_slice(subject);
        msg.extend_from_slice(&issued_at.to_le_bytes());
        msg.extend_from_slice(&ttl.to_le_bytes());
        msg.extend_from_slice(&digest.0);
        msg
    }

    /// [`Token::signed_message`] for this token's fields.
    pub fn message(&self) -> Vec<u8> {
        Self::signed_message(&self.subject, self.issued_at, self.ttl, &self.digest)
    }

    /// When the token stops being valid.
    pub fn expires_at(&self) -> i64 {
        self.issued_at
            .saturating_add(i64::try_from(self.ttl).unwrap_or(i64::MAX))
    }

    /// Expired when `now - issued_at > ttl`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at()
    }
}

/// Result of verifying a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStatus {
    Valid,
    Expired,
    UnknownIdentity,
    Replayed,
    Revoked,
}

impl TokenStatus {
    pub fn is_valid(self) -> bool {
        self == TokenStatus::Valid
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenStatus::Valid => "valid",
            TokenStatus::Expired => "expired",
            TokenStatus::UnknownIdentity => "unknown identity",
            TokenStatus::Replayed => "replayed",
            TokenStatus::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> IdentityId {
        IdentityId::new("node-7").unwrap()
    }

    #[test]
    fn test_digest_deterministic() {
        let a = TokenDigest::compute(&subject(), 1000, b"state").unwrap();
        let b = TokenDigest::compute(&subject(), 1000, b"state").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_binds_every_input() {
        let base = TokenDigest::compute(&subject(), 1000, b"state").unwrap();
        assert_ne!(base, TokenDigest::compute(&subject(), 1001, b"state").unwrap());
        assert_ne!(base, TokenDigest::compute(&subject(), 1000, b"statf").unwrap());
        let other = IdentityId::new("node-8").unwrap();
        assert_ne!(base, TokenDigest::compute(&other, 1000, b"state").unwrap());
    }

    #[test]
    fn test_expiry_boundary() {
        let token = Token {
            subject: subject(),
            issued_at: 1000,
            ttl: 3600,
            digest: TokenDigest([0; 32]),
            signature: Ed25519Signature::ZERO,
        };
        assert_eq!(token.expires_at(), 4600);
        assert!(!token.is_expired_at(4599));
        assert!(!token.is_expired_at(4600));
        assert!(token.is_expired_at(4601));
    }

    #[test]
    fn test_token_json_roundtrip() {
        let token = Token {
            subject: subject(),
            issued_at: 1000,
            ttl: 3600,
            digest: TokenDigest([7; 32]),
            signature: Ed25519Signature::ZERO,
        };
        let json = serde_json::to_string(&token).unwrap();
        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(token, back);
    }
}
