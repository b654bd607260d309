//! Convergence verification.
//!
//! After syncing, two ledgers can check they hold the same entry set by
//! comparing a deterministic state digest, without exchanging the entries.

use std::collections::BTreeSet;

use mycel_core::{Blake3Hash, EntryId};
use mycel_store::LedgerStore;

use crate::error::Result;

/// Domain prefix for state digests.
pub const STATE_DOMAIN: &[u8] = b"mycel/state/v1";

/// Digest of an id set, independent of insertion order.
///
/// Algorithm: H = Blake3(STATE_DOMAIN || count || id_1 || ... || id_n), ids
/// in ascending byte order.
pub fn digest_ids(ids: &BTreeSet<EntryId>) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(STATE_DOMAIN);
    hasher.update(&(ids.len() as u64).to_le_bytes());
    for id in ids {
        hasher.update(id.as_bytes());
    }
    Blake3Hash::from_bytes(*hasher.finalize().as_bytes())
}

/// State digest of everything a store holds.
pub async fn state_digest(store: &dyn LedgerStore) -> Result<Blake3Hash> {
    Ok(digest_ids(&store.all_ids().await?))
}

/// Compare two stores entry set against entry set.
pub async fn verify_convergence(
    local: &dyn LedgerStore,
    remote: &dyn LedgerStore,
) -> Result<ConvergenceResult> {
    let local_ids = local.all_ids().await?;
    let remote_ids = remote.all_ids().await?;

    if digest_ids(&local_ids) == digest_ids(&remote_ids) {
        return Ok(ConvergenceResult::Converged);
    }

    Ok(ConvergenceResult::Diverged {
        local_only: local_ids.difference(&remote_ids).copied().collect(),
        remote_only: remote_ids.difference(&local_ids).copied().collect(),
    })
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both stores hold identical entry sets.
    Converged,
    /// The stores differ (another sync round in either direction is needed).
    Diverged {
        local_only: BTreeSet<EntryId>,
        remote_only: BTreeSet<EntryId>,
    },
}

impl ConvergenceResult {
    /// Check if the stores have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}
