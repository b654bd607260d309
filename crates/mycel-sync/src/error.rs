//! Error types for the sync module.

use thiserror::Error;

use mycel_core::EntryId;
use mycel_store::StoreError;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Two contents under one id, a remote entry that does not hash to its
    /// id, or a remote entry whose ancestry the remote cannot produce.
    /// Never merged or repaired.
    #[error("sync integrity fault at {entry_id}: {reason}")]
    IntegrityFault { entry_id: EntryId, reason: String },

    /// Store operation failed (including an unknown `since` marker).
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, SyncError::IntegrityFault { .. })
    }

    pub(crate) fn fault(entry_id: EntryId, reason: impl Into<String>) -> Self {
        SyncError::IntegrityFault {
            entry_id,
            reason: reason.into(),
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
