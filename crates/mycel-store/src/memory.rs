//! In-memory implementation of the LedgerStore trait.
//!
//! Same semantics as SQLite, but everything lives in memory with no
//! persistence. Writers take the write lock for the whole
//! check-then-insert; readers share the read lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use mycel_core::{validate_draft, EntryDraft, EntryId, EntryType, IdentityId, LedgerEntry};

use crate::error::{Result, StoreError};
use crate::traits::{AppendOutcome, LedgerStore, LogEntry};

/// In-memory ledger.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryLedger {
    inner: RwLock<MemoryLedgerInner>,
}

#[derive(Default)]
struct MemoryLedgerInner {
    /// Entries indexed by id, with their 1-based log position.
    entries: HashMap<EntryId, (u64, LedgerEntry)>,

    /// Append log: log[seq - 1] is the entry stored at `seq`.
    log: Vec<EntryId>,

    /// Parent -> children index.
    children: HashMap<EntryId, BTreeSet<EntryId>>,

    /// Author -> entry ids, in log order.
    by_author: HashMap<IdentityId, Vec<EntryId>>,

    /// Type -> entry ids, in log order.
    by_type: HashMap<EntryType, Vec<EntryId>>,
}

impl MemoryLedgerInner {
    fn collect(&self, ids: Option<&Vec<EntryId>>) -> Vec<LedgerEntry> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.entries.get(id).map(|(_, e)| e.clone()))
                .collect()
        })
        .unwrap_or_default()
    }
}

impl MemoryLedger {
    /// Create a new empty in-memory ledger.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryLedgerInner::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryLedgerInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryLedgerInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn append(&self, draft: EntryDraft) -> Result<AppendOutcome> {
        let id = validate_draft(&draft)?;

        let mut inner = self.write();

        if inner.entries.contains_key(&id) {
            return Ok(AppendOutcome::AlreadyExists(id));
        }

        if let Some(parent) = draft.parent_id {
            if !inner.entries.contains_key(&parent) {
                return Err(StoreError::EntryNotFound(parent));
            }
        }

        let entry = draft.into_entry(id);
        let seq = inner.log.len() as u64 + 1;

        if let Some(parent) = entry.parent_id {
            inner.children.entry(parent).or_default().insert(id);
        }
        inner
            .by_author
            .entry(entry.author.clone())
            .or_default()
            .push(id);
        inner
            .by_type
            .entry(entry.entry_type.clone())
            .or_default()
            .push(id);
        inner.log.push(id);
        inner.entries.insert(id, (seq, entry));

        debug!(entry_id = %id, seq, "appended entry");
        Ok(AppendOutcome::Inserted(id))
    }

    async fn get(&self, id: &EntryId) -> Result<Option<LedgerEntry>> {
        Ok(self.read().entries.get(id).map(|(_, e)| e.clone()))
    }

    async fn has(&self, id: &EntryId) -> Result<bool> {
        Ok(self.read().entries.contains_key(id))
    }

    async fn children(&self, id: &EntryId) -> Result<BTreeSet<EntryId>> {
        let inner = self.read();
        if !inner.entries.contains_key(id) {
            return Err(StoreError::EntryNotFound(*id));
        }
        Ok(inner.children.get(id).cloned().unwrap_or_default())
    }

    async fn roots(&self) -> Result<Vec<EntryId>> {
        let inner = self.read();
        Ok(inner
            .log
            .iter()
            .filter(|id| {
                inner
                    .entries
                    .get(*id)
                    .is_some_and(|(_, e)| e.parent_id.is_none())
            })
            .copied()
            .collect())
    }

    async fn by_author(&self, author: &IdentityId) -> Result<Vec<LedgerEntry>> {
        let inner = self.read();
        Ok(inner.collect(inner.by_author.get(author)))
    }

    async fn by_type(&self, entry_type: &EntryType) -> Result<Vec<LedgerEntry>> {
        let inner = self.read();
        Ok(inner.collect(inner.by_type.get(entry_type)))
    }

    async fn len(&self) -> Result<u64> {
        Ok(self.read().log.len() as u64)
    }

    async fn position(&self, id: &EntryId) -> Result<Option<u64>> {
        Ok(self.read().entries.get(id).map(|(seq, _)| *seq))
    }

    async fn log_since(&self, since: Option<&EntryId>, limit: usize) -> Result<Vec<LogEntry>> {
        let inner = self.read();
        let start = match since {
            None => 0,
            Some(id) => match inner.entries.get(id) {
                Some((seq, _)) => *seq as usize,
                None => return Err(StoreError::EntryNotFound(*id)),
            },
        };

        Ok(inner
            .log
            .iter()
            .skip(start)
            .take(limit)
            .filter_map(|id| {
                inner.entries.get(id).map(|(seq, entry)| LogEntry {
                    seq: *seq,
                    entry: entry.clone(),
                })
            })
            .collect())
    }

    async fn all_ids(&self) -> Result<BTreeSet<EntryId>> {
        Ok(self.read().entries.keys().copied().collect())
    }
}
