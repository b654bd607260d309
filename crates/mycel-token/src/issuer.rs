//! Token issuance, verification and replay bookkeeping.
//!
//! The issuer keeps one small record per enrolled identity: the digest of
//! its latest token, the last issuance time, and the set of tokens already
//! consumed or revoked. Records older than the retention window are evicted
//! lazily on every write and by [`TokenIssuer::sweep`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use mycel_core::{Ed25519PublicKey, IdentityId, Keypair};

use crate::error::{Result, TokenError};
use crate::token::{Token, TokenDigest, TokenStatus, DEFAULT_TOKEN_TTL_MS};

/// Lifetime rules applied by an issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Token lifetime in milliseconds.
    pub ttl_ms: u64,
    /// How long after expiry a token may still be renewed.
    pub renewal_grace_ms: u64,
}

impl TokenPolicy {
    /// How long consumed and revoked records are kept after issuance.
    pub fn retention_ms(&self) -> u64 {
        self.ttl_ms.saturating_add(self.renewal_grace_ms)
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TOKEN_TTL_MS,
            renewal_grace_ms: 5 * 60 * 1000,
        }
    }
}

#[derive(Debug, Default)]
struct SubjectState {
    /// Digest and issuance time of the latest token.
    latest: Option<(TokenDigest, i64)>,
    last_issued_at: Option<i64>,
    /// Consumed token digest -> issued_at.
    consumed: HashMap<TokenDigest, i64>,
    /// Revoked token digest -> issued_at.
    revoked: HashMap<TokenDigest, i64>,
}

impl SubjectState {
    fn evict_before(&mut self, cutoff: i64) -> usize {
        let before = self.consumed.len() + self.revoked.len();
        self.consumed.retain(|_, issued_at| *issued_at >= cutoff);
        self.revoked.retain(|_, issued_at| *issued_at >= cutoff);
        before - (self.consumed.len() + self.revoked.len())
    }

    fn tracked(&self) -> usize {
        self.consumed.len() + self.revoked.len()
    }
}

/// Issues and verifies identity tokens for the identities it has enrolled.
///
/// Tokens are signed with the issuer's Ed25519 key. A token signed by any
/// other key verifies as [`TokenStatus::UnknownIdentity`].
pub struct TokenIssuer {
    keypair: Keypair,
    policy: TokenPolicy,
    subjects: RwLock<HashMap<IdentityId, SubjectState>>,
}

impl TokenIssuer {
    pub fn new(keypair: Keypair, policy: TokenPolicy) -> Self {
        Self {
            keypair,
            policy,
            subjects: RwLock::new(HashMap::new()),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<IdentityId, SubjectState>> {
        self.subjects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<IdentityId, SubjectState>> {
        self.subjects.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Enrollment
    // ─────────────────────────────────────────────────────────────────────────

    /// Allow tokens to be issued for `subject`. Idempotent.
    pub fn enroll(&self, subject: IdentityId) {
        self.write().entry(subject).or_default();
    }

    pub fn is_enrolled(&self, subject: &IdentityId) -> bool {
        self.read().contains_key(subject)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Issuance
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue a fresh token, superseding any earlier one for `subject`.
    ///
    /// Issuance times are strictly increasing per subject: if `now` is not
    /// after the previous issuance, the new token is stamped one millisecond
    /// later so the two digests never collide.
    pub fn issue(&self, subject: &IdentityId, state_digest: &[u8], now: i64) -> Result<Token> {
        let mut subjects = self.write();
        let state = subjects
            .get_mut(subject)
            .ok_or_else(|| TokenError::Unknown(subject.to_string()))?;
        self.issue_locked(subject, state, state_digest, now)
    }

    fn issue_locked(
        &self,
        subject: &IdentityId,
        state: &mut SubjectState,
        state_digest: &[u8],
        now: i64,
    ) -> Result<Token> {
        let issued_at = match state.last_issued_at {
            Some(last) if now <= last => last + 1,
            _ => now,
        };

        let digest = TokenDigest::compute(subject, issued_at, state_digest)?;
        let signature = self.keypair.sign(&Token::signed_message(
            subject,
            issued_at,
            self.policy.ttl_ms,
            &digest,
        ));

        state.latest = Some((digest, issued_at));
        state.last_issued_at = Some(issued_at);

        debug!(identity = %subject, digest = %digest, issued_at, "issued token");

        Ok(Token {
            subject: subject.clone(),
            issued_at,
            ttl: self.policy.ttl_ms,
            digest,
            signature,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Check a token without consuming it.
    pub fn verify(&self, token: &Token, now: i64) -> TokenStatus {
        let subjects = self.read();
        self.status_locked(&subjects, token, now)
    }

    fn is_authentic(&self, token: &Token) -> bool {
        self.keypair
            .public_key()
            .verify(&token.message(), &token.signature)
            .is_ok()
    }

    fn is_latest(state: &SubjectState, token: &Token) -> bool {
        state.latest == Some((token.digest, token.issued_at))
    }

    fn status_locked(
        &self,
        subjects: &HashMap<IdentityId, SubjectState>,
        token: &Token,
        now: i64,
    ) -> TokenStatus {
        let Some(state) = subjects.get(&token.subject) else {
            return TokenStatus::UnknownIdentity;
        };
        if !self.is_authentic(token) {
            return TokenStatus::UnknownIdentity;
        }
        if let Some((digest, issued_at)) = state.latest {
            if digest == token.digest && issued_at != token.issued_at {
                return TokenStatus::UnknownIdentity;
            }
        }
        if token.is_expired_at(now) {
            return TokenStatus::Expired;
        }
        if state.revoked.contains_key(&token.digest) {
            return TokenStatus::Revoked;
        }
        if state.consumed.contains_key(&token.digest) || !Self::is_latest(state, token) {
            return TokenStatus::Replayed;
        }
        TokenStatus::Valid
    }

    fn status_error(token: &Token, status: TokenStatus) -> TokenError {
        match status {
            TokenStatus::Expired => TokenError::Expired {
                subject: token.subject.clone(),
                expired_at: token.expires_at(),
            },
            TokenStatus::Replayed => TokenError::Replayed {
                subject: token.subject.clone(),
            },
            TokenStatus::Revoked => TokenError::Revoked {
                subject: token.subject.clone(),
            },
            TokenStatus::UnknownIdentity | TokenStatus::Valid => {
                TokenError::Unknown(token.subject.to_string())
            }
        }
    }

    /// Check a token and fail with the matching error unless it is valid.
    pub fn require_valid(&self, token: &Token, now: i64) -> Result<()> {
        match self.verify(token, now) {
            TokenStatus::Valid => Ok(()),
            status => Err(Self::status_error(token, status)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Spending
    // ─────────────────────────────────────────────────────────────────────────

    /// Atomically verify and consume a token.
    ///
    /// Exactly one of several concurrent calls with the same token succeeds.
    pub fn consume(&self, token: &Token, now: i64) -> Result<()> {
        let mut subjects = self.write();
        let status = self.status_locked(&subjects, token, now);
        if status != TokenStatus::Valid {
            warn!(identity = %token.subject, %status, "token rejected");
            return Err(Self::status_error(token, status));
        }

        let cutoff = self.retention_cutoff(now);
        if let Some(state) = subjects.get_mut(&token.subject) {
            state.evict_before(cutoff);
            state.consumed.insert(token.digest, token.issued_at);
        }
        debug!(identity = %token.subject, digest = %token.digest, "consumed token");
        Ok(())
    }

    /// Consume `token` and issue its successor in one step.
    pub fn rotate(&self, token: &Token, state_digest: &[u8], now: i64) -> Result<Token> {
        let mut subjects = self.write();
        let status = self.status_locked(&subjects, token, now);
        if status != TokenStatus::Valid {
            warn!(identity = %token.subject, %status, "token rejected");
            return Err(Self::status_error(token, status));
        }

        let cutoff = self.retention_cutoff(now);
        let state = subjects
            .get_mut(&token.subject)
            .ok_or_else(|| TokenError::Unknown(token.subject.to_string()))?;
        state.evict_before(cutoff);
        state.consumed.insert(token.digest, token.issued_at);
        self.issue_locked(&token.subject, state, state_digest, now)
    }

    /// Exchange a valid or recently expired token for a fresh one.
    ///
    /// Tokens past the renewal grace window, revoked tokens and tokens that
    /// were already used or superseded cannot be renewed.
    pub fn renew(&self, token: &Token, state_digest: &[u8], now: i64) -> Result<Token> {
        let mut subjects = self.write();
        let status = self.status_locked(&subjects, token, now);
        let renewable = match status {
            TokenStatus::Valid => true,
            TokenStatus::Expired => {
                let grace_end = token
                    .expires_at()
                    .saturating_add(i64::try_from(self.policy.renewal_grace_ms).unwrap_or(i64::MAX));
                let state = subjects.get(&token.subject);
                let unused = state.is_some_and(|s| {
                    Self::is_latest(s, token)
                        && !s.consumed.contains_key(&token.digest)
                        && !s.revoked.contains_key(&token.digest)
                });
                if !unused {
                    warn!(identity = %token.subject, "expired token was already used or revoked");
                    return Err(TokenError::Replayed {
                        subject: token.subject.clone(),
                    });
                }
                now <= grace_end
            }
            _ => false,
        };
        if !renewable {
            warn!(identity = %token.subject, %status, "token renewal refused");
            return Err(Self::status_error(token, status));
        }

        let cutoff = self.retention_cutoff(now);
        let state = subjects
            .get_mut(&token.subject)
            .ok_or_else(|| TokenError::Unknown(token.subject.to_string()))?;
        state.evict_before(cutoff);
        state.consumed.insert(token.digest, token.issued_at);
        self.issue_locked(&token.subject, state, state_digest, now)
    }

    /// Permanently invalidate a token.
    pub fn revoke(&self, token: &Token) -> Result<()> {
        if !self.is_authentic(token) {
            return Err(TokenError::Unknown(token.subject.to_string()));
        }
        let mut subjects = self.write();
        let state = subjects
            .get_mut(&token.subject)
            .ok_or_else(|| TokenError::Unknown(token.subject.to_string()))?;
        state.revoked.insert(token.digest, token.issued_at);
        debug!(identity = %token.subject, digest = %token.digest, "revoked token");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Eviction
    // ─────────────────────────────────────────────────────────────────────────

    fn retention_cutoff(&self, now: i64) -> i64 {
        now.saturating_sub(i64::try_from(self.policy.retention_ms()).unwrap_or(i64::MAX))
    }

    /// Evict consumed and revoked records whose window has passed.
    ///
    /// Returns the number of records removed. Evicted tokens are past their
    /// TTL, so they keep verifying as expired.
    pub fn sweep(&self, now: i64) -> usize {
        let cutoff = self.retention_cutoff(now);
        let mut subjects = self.write();
        let evicted: usize = subjects
            .values_mut()
            .map(|state| state.evict_before(cutoff))
            .sum();
        if evicted > 0 {
            debug!(evicted, "swept token records");
        }
        evicted
    }

    /// Number of consumed and revoked records currently held.
    pub fn tracked_records(&self) -> usize {
        self.read().values().map(SubjectState::tracked).sum()
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("public_key", &self.keypair.public_key())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn issuer(ttl_ms: u64) -> TokenIssuer {
        TokenIssuer::new(
            Keypair::from_seed(&[0x42; 32]),
            TokenPolicy {
                ttl_ms,
                renewal_grace_ms: 0,
            },
        )
    }

    fn node7() -> IdentityId {
        IdentityId::new("node-7").unwrap()
    }

    #[test]
    fn test_ttl_boundary_scenario() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let token = issuer.issue(&node7(), b"state", 1000).unwrap();

        assert_eq!(issuer.verify(&token, 4599), TokenStatus::Valid);
        assert_eq!(issuer.verify(&token, 4601), TokenStatus::Expired);
    }

    #[test]
    fn test_issue_unknown_subject() {
        let issuer = issuer(3600);
        assert!(matches!(
            issuer.issue(&node7(), b"", 0),
            Err(TokenError::Unknown(_))
        ));
    }

    #[test]
    fn test_unknown_subject_verifies_unknown() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let mut token = issuer.issue(&node7(), b"", 0).unwrap();
        token.subject = IdentityId::new("node-8").unwrap();
        assert_eq!(issuer.verify(&token, 0), TokenStatus::UnknownIdentity);
    }

    #[test]
    fn test_forged_token_is_unknown() {
        let real = issuer(3600);
        let forger = TokenIssuer::new(Keypair::from_seed(&[0x01; 32]), real.policy());
        real.enroll(node7());
        forger.enroll(node7());

        let forged = forger.issue(&node7(), b"", 0).unwrap();
        assert_eq!(real.verify(&forged, 0), TokenStatus::UnknownIdentity);
    }

    #[test]
    fn test_tampered_ttl_is_unknown() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let mut token = issuer.issue(&node7(), b"", 0).unwrap();
        token.ttl = u64::MAX;
        assert_eq!(issuer.verify(&token, 0), TokenStatus::UnknownIdentity);
    }

    #[test]
    fn test_moved_issuance_time_is_unknown() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let mut token = issuer.issue(&node7(), b"", 1000).unwrap();
        assert_eq!(issuer.verify(&token, 1_000_000_000), TokenStatus::Expired);

        token.issued_at = 1_000_000_000;
        assert_eq!(
            issuer.verify(&token, 1_000_000_000),
            TokenStatus::UnknownIdentity
        );
        assert!(matches!(
            issuer.consume(&token, 1_000_000_000),
            Err(TokenError::Unknown(_))
        ));
        assert!(issuer.rotate(&token, b"", 1_000_000_000).is_err());
    }

    #[test]
    fn test_moved_subject_is_unknown() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let node8 = IdentityId::new("node-8").unwrap();
        issuer.enroll(node8.clone());
        let mut token = issuer.issue(&node7(), b"", 0).unwrap();
        token.subject = node8;
        assert_eq!(issuer.verify(&token, 0), TokenStatus::UnknownIdentity);
    }

    #[test]
    fn test_verify_does_not_consume() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let token = issuer.issue(&node7(), b"", 0).unwrap();
        for _ in 0..3 {
            assert_eq!(issuer.verify(&token, 10), TokenStatus::Valid);
        }
    }

    #[test]
    fn test_consume_then_replay() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let token = issuer.issue(&node7(), b"", 0).unwrap();

        issuer.consume(&token, 10).unwrap();
        assert_eq!(issuer.verify(&token, 11), TokenStatus::Replayed);
        assert!(matches!(
            issuer.consume(&token, 12),
            Err(TokenError::Replayed { .. })
        ));
    }

    #[test]
    fn test_fresh_issuance_supersedes() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let first = issuer.issue(&node7(), b"", 100).unwrap();
        let second = issuer.issue(&node7(), b"", 100).unwrap();

        assert!(second.issued_at > first.issued_at);
        assert_ne!(first.digest, second.digest);
        assert_eq!(issuer.verify(&first, 200), TokenStatus::Replayed);
        assert_eq!(issuer.verify(&second, 200), TokenStatus::Valid);
    }

    #[test]
    fn test_rotate_returns_valid_successor() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let token = issuer.issue(&node7(), b"", 0).unwrap();

        let next = issuer.rotate(&token, b"new-state", 50).unwrap();
        assert_eq!(issuer.verify(&token, 60), TokenStatus::Replayed);
        assert_eq!(issuer.verify(&next, 60), TokenStatus::Valid);
    }

    #[test]
    fn test_revoke() {
        let issuer = issuer(3600);
        issuer.enroll(node7());
        let token = issuer.issue(&node7(), b"", 0).unwrap();

        issuer.revoke(&token).unwrap();
        assert_eq!(issuer.verify(&token, 1), TokenStatus::Revoked);
        assert!(matches!(
            issuer.consume(&token, 1),
            Err(TokenError::Revoked { .. })
        ));
    }

    #[test]
    fn test_renew_within_grace() {
        let issuer = TokenIssuer::new(
            Keypair::from_seed(&[0x42; 32]),
            TokenPolicy {
                ttl_ms: 100,
                renewal_grace_ms: 50,
            },
        );
        issuer.enroll(node7());
        let token = issuer.issue(&node7(), b"", 0).unwrap();

        assert_eq!(issuer.verify(&token, 120), TokenStatus::Expired);
        let renewed = issuer.renew(&token, b"", 120).unwrap();
        assert_eq!(issuer.verify(&renewed, 120), TokenStatus::Valid);

        // The old token cannot be renewed twice.
        assert!(issuer.renew(&token, b"", 121).is_err());
    }

    #[test]
    fn test_renew_past_grace_fails() {
        let issuer = TokenIssuer::new(
            Keypair::from_seed(&[0x42; 32]),
            TokenPolicy {
                ttl_ms: 100,
                renewal_grace_ms: 50,
            },
        );
        issuer.enroll(node7());
        let token = issuer.issue(&node7(), b"", 0).unwrap();
        assert!(matches!(
            issuer.renew(&token, b"", 151),
            Err(TokenError::Expired { .. })
        ));
    }

    #[test]
    fn test_sweep_evicts_old_records() {
        let issuer = issuer(100);
        issuer.enroll(node7());
        let token = issuer.issue(&node7(), b"", 0).unwrap();
        issuer.consume(&token, 10).unwrap();
        assert_eq!(issuer.tracked_records(), 1);

        assert_eq!(issuer.sweep(50), 0);
        assert_eq!(issuer.sweep(101), 1);
        assert_eq!(issuer.tracked_records(), 0);

        // Evicted tokens are past their TTL and still refused.
        assert_eq!(issuer.verify(&token, 101), TokenStatus::Expired);
    }

    proptest! {
        #[test]
        fn prop_validity_window(issued in 0i64..1_000_000, ttl in 1u64..1_000_000, offset in 0i64..2_000_000) {
            let issuer = issuer(ttl);
            issuer.enroll(node7());
            let token = issuer.issue(&node7(), b"s", issued).unwrap();
            let now = issued + offset;
            let status = issuer.verify(&token, now);
            if offset as u64 > ttl {
                prop_assert_eq!(status, TokenStatus::Expired);
            } else {
                prop_assert_eq!(status, TokenStatus::Valid);
            }
        }
    }
}
