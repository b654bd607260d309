//! Error types for the store module.

use thiserror::Error;

use mycel_core::{EntryId, ValidationError};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced entry (a parent, or a sync marker) is not in the store.
    #[error("entry not found: {0}")]
    EntryNotFound(EntryId),

    /// The claimed id does not match the entry's content hash.
    #[error("hash mismatch: claimed {claimed}, computed {computed}")]
    HashMismatch { claimed: EntryId, computed: EntryId },

    /// The entry failed structural validation.
    #[error("invalid entry: {0}")]
    InvalidEntry(ValidationError),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Integrity faults are never retried or repaired.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, StoreError::HashMismatch { .. })
    }
}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::HashMismatch { claimed, computed } => {
                StoreError::HashMismatch { claimed, computed }
            }
            other => StoreError::InvalidEntry(other),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
