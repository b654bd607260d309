//! Entry validation: structural checks and content-hash verification.

use crate::codec;
use crate::entry::{EntryDraft, LedgerEntry};
use crate::error::ValidationError;
use crate::types::EntryId;

/// Validate a draft before it is hashed and stored.
///
/// This performs:
/// - Payload check (must be a well-formed codec encoding)
/// - Timestamp check (no negative timestamps)
/// - Hash check, when the draft claims an id
///
/// Returns the computed id.
pub fn validate_draft(draft: &EntryDraft) -> Result<EntryId, ValidationError> {
    if draft.timestamp < 0 {
        return Err(ValidationError::NegativeTimestamp(draft.timestamp));
    }

    codec::validate(&draft.payload)?;

    let computed = draft.compute_id()?;
    if let Some(claimed) = draft.claimed_id {
        if claimed != computed {
            return Err(ValidationError::HashMismatch { claimed, computed });
        }
    }
    Ok(computed)
}

/// Check that a stored entry still hashes to its id.
pub fn verify_entry_id(entry: &LedgerEntry) -> Result<(), ValidationError> {
    let computed = entry.compute_id()?;
    if computed != entry.id {
        return Err(ValidationError::HashMismatch {
            claimed: entry.id,
            computed,
        });
    }
    Ok(())
}
