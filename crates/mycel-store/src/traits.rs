//! LedgerStore trait: the abstract interface for ledger persistence.
//!
//! Implementations include SQLite (persistent) and in-memory (for tests
//! and ephemeral nodes). Both share one contract test suite.

use std::collections::BTreeSet;

use async_trait::async_trait;
use mycel_core::{EntryDraft, EntryId, EntryType, IdentityId, LedgerEntry};

use crate::error::Result;

/// Result of appending an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The entry was new and has been stored.
    Inserted(EntryId),
    /// Identical content was already stored (idempotent, not an error).
    AlreadyExists(EntryId),
}

impl AppendOutcome {
    pub fn id(&self) -> EntryId {
        match self {
            AppendOutcome::Inserted(id) | AppendOutcome::AlreadyExists(id) => *id,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, AppendOutcome::Inserted(_))
    }
}

/// An entry together with its local append position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// 1-based position in this store's append log.
    pub seq: u64,
    pub entry: LedgerEntry,
}

/// The LedgerStore trait: an append-only, content-addressed forest.
///
/// # Design Notes
///
/// - **Idempotent appends**: Appending identical content twice returns
///   `AlreadyExists` with the same id and stores nothing new.
/// - **Parents first**: An entry whose parent is missing is rejected with
///   `EntryNotFound`, and the store is left untouched.
/// - **Tamper check**: A draft that claims an id must hash to it, or the
///   append fails with `HashMismatch`.
/// - **Local log**: Every stored entry gets a monotonic local sequence
///   number. Parents always precede their children in the log.
/// - **Concurrency**: Appends are serialized; reads run concurrently.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Entry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Hash, validate and store a draft.
    async fn append(&self, draft: EntryDraft) -> Result<AppendOutcome>;

    /// Get an entry by its content-addressed id.
    async fn get(&self, id: &EntryId) -> Result<Option<LedgerEntry>>;

    /// Check if an entry exists.
    async fn has(&self, id: &EntryId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Graph Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Direct children of an entry. Fails with `EntryNotFound` if `id` is unknown.
    async fn children(&self, id: &EntryId) -> Result<BTreeSet<EntryId>>;

    /// Entries with no parent, in log order.
    async fn roots(&self) -> Result<Vec<EntryId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Entries written by `author`, in log order.
    async fn by_author(&self, author: &IdentityId) -> Result<Vec<LedgerEntry>>;

    /// Entries of a given type, in log order.
    async fn by_type(&self, entry_type: &EntryType) -> Result<Vec<LedgerEntry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Log Operations (for sync)
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of stored entries.
    async fn len(&self) -> Result<u64>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Local log position of an entry.
    async fn position(&self, id: &EntryId) -> Result<Option<u64>>;

    /// Up to `limit` entries appended after `since`, in log order.
    ///
    /// `None` starts from the beginning. An unknown `since` fails with
    /// `EntryNotFound`.
    async fn log_since(&self, since: Option<&EntryId>, limit: usize) -> Result<Vec<LogEntry>>;

    /// Every stored id.
    async fn all_ids(&self) -> Result<BTreeSet<EntryId>>;
}
