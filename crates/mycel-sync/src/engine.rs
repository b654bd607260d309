//! Pull-based reconciliation between two ledgers.
//!
//! A round reads the remote log after a marker, works out which entries
//! the local store lacks (including any ancestors the local store has never
//! seen), and appends them in remote log order. A parent always precedes its
//! children in any store's log, so that order is topological.
//!
//! Every applied entry claims its remote id, so the local store re-derives
//! and checks each content hash.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use mycel_core::{verify_entry_id, EntryId, LedgerEntry};
use mycel_store::{AppendOutcome, LedgerStore, StoreError};

use crate::error::{Result, SyncError};

/// Configuration for sync behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum remote log entries examined in one round.
    pub max_entries_per_round: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_entries_per_round: 500,
        }
    }
}

/// Cooperative cancellation, checked between entry applications.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a sync round (or several, when aggregated).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries appended locally, in application order.
    pub applied: Vec<EntryId>,
    /// Remote entries the local store already had.
    pub duplicates: usize,
    /// Pass as `since` to continue where this round stopped.
    pub resume_from: Option<EntryId>,
    /// The remote log was read to its end.
    pub complete: bool,
    /// The round stopped because the cancel flag was raised.
    pub cancelled: bool,
}

impl SyncReport {
    fn absorb(&mut self, round: SyncReport) {
        self.applied.extend(round.applied);
        self.duplicates += round.duplicates;
        self.resume_from = round.resume_from;
        self.complete = round.complete;
        self.cancelled = round.cancelled;
    }
}

/// Reconciles a local ledger against a remote one.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    config: SyncConfig,
}

fn check_remote_entry(entry: &LedgerEntry) -> Result<()> {
    verify_entry_id(entry).map_err(|e| {
        error!(entry_id = %entry.id, error = %e, "remote entry fails its content hash");
        SyncError::fault(entry.id, e.to_string())
    })
}

/// Greatest batch entry strictly before `seq`, else the round's start marker.
fn marker_before(
    batch: &BTreeMap<u64, EntryId>,
    seq: u64,
    since: Option<&EntryId>,
) -> Option<EntryId> {
    batch
        .range(..seq)
        .next_back()
        .map(|(_, id)| *id)
        .or(since.copied())
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one bounded round: pull what `local` lacks from `remote`'s log
    /// after `since`.
    pub async fn sync(
        &self,
        local: &dyn LedgerStore,
        remote: &dyn LedgerStore,
        since: Option<&EntryId>,
        cancel: &CancelFlag,
    ) -> Result<SyncReport> {
        let limit = self.config.max_entries_per_round.max(1);
        let batch = remote.log_since(since, limit).await?;
        let reached_end = batch.len() < limit;

        let mut report = SyncReport::default();

        // Remote seq -> entry to apply.
        let mut plan: BTreeMap<u64, LedgerEntry> = BTreeMap::new();
        for record in &batch {
            check_remote_entry(&record.entry)?;
            match local.get(&record.entry.id).await? {
                Some(existing) if existing != record.entry => {
                    error!(entry_id = %record.entry.id, "same id, different content");
                    return Err(SyncError::fault(
                        record.entry.id,
                        "local and remote contents differ under one id",
                    ));
                }
                Some(_) => report.duplicates += 1,
                None => {
                    plan.insert(record.seq, record.entry.clone());
                }
            }
        }

        // Pull ancestors the local store has never seen.
        let mut planned: HashSet<EntryId> = plan.values().map(|e| e.id).collect();
        let mut pending: Vec<EntryId> = plan.values().filter_map(|e| e.parent_id).collect();
        while let Some(parent) = pending.pop() {
            if planned.contains(&parent) || local.has(&parent).await? {
                continue;
            }
            let entry = remote.get(&parent).await?.ok_or_else(|| {
                SyncError::fault(parent, "remote references an ancestor it does not hold")
            })?;
            if entry.id != parent {
                error!(entry_id = %parent, served = %entry.id, "remote served the wrong entry");
                return Err(SyncError::fault(parent, "remote served a different entry"));
            }
            check_remote_entry(&entry)?;
            let seq = remote.position(&parent).await?.ok_or_else(|| {
                SyncError::fault(parent, "remote holds an entry outside its log")
            })?;
            if plan.contains_key(&seq) {
                return Err(SyncError::fault(
                    parent,
                    format!("remote log position {seq} is already taken"),
                ));
            }

            debug!(entry_id = %parent, seq, "pulling missing ancestor");
            planned.insert(parent);
            if let Some(grandparent) = entry.parent_id {
                pending.push(grandparent);
            }
            plan.insert(seq, entry);
        }

        let batch_ids: BTreeMap<u64, EntryId> =
            batch.iter().map(|r| (r.seq, r.entry.id)).collect();

        for (seq, entry) in plan {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.resume_from = marker_before(&batch_ids, seq, since);
                warn!(
                    applied = report.applied.len(),
                    "sync cancelled between entries"
                );
                return Ok(report);
            }

            let id = entry.id;
            match local.append(entry.to_draft()).await {
                Ok(AppendOutcome::Inserted(id)) => report.applied.push(id),
                // Another writer got there first.
                Ok(AppendOutcome::AlreadyExists(_)) => report.duplicates += 1,
                Err(StoreError::HashMismatch { claimed, computed }) => {
                    error!(entry_id = %claimed, computed = %computed, "hash mismatch while applying");
                    return Err(SyncError::fault(claimed, "content does not hash to its id"));
                }
                Err(StoreError::EntryNotFound(parent)) => {
                    return Err(SyncError::fault(
                        id,
                        format!("parent {parent} missing while applying"),
                    ));
                }
                Err(e) => return Err(e.into()),
            }
        }

        report.resume_from = batch.last().map(|r| r.entry.id).or(since.copied());
        report.complete = reached_end;

        info!(
            applied = report.applied.len(),
            duplicates = report.duplicates,
            complete = report.complete,
            "sync round finished"
        );
        Ok(report)
    }

    /// Run rounds until the remote log is exhausted or the sync is cancelled.
    pub async fn sync_all(
        &self,
        local: &dyn LedgerStore,
        remote: &dyn LedgerStore,
        since: Option<&EntryId>,
        cancel: &CancelFlag,
    ) -> Result<SyncReport> {
        let mut total = SyncReport::default();
        let mut marker = since.copied();
        loop {
            let round = self.sync(local, remote, marker.as_ref(), cancel).await?;
            marker = round.resume_from;
            let done = round.complete || round.cancelled;
            total.absorb(round);
            if done {
                return Ok(total);
            }
        }
    }

    /// Sync in both directions so `a` and `b` end with the same entry set.
    ///
    /// Returns the reports for `a` (pulled from `b`) and `b` (pulled from `a`).
    pub async fn reconcile(
        &self,
        a: &dyn LedgerStore,
        b: &dyn LedgerStore,
        cancel: &CancelFlag,
    ) -> Result<(SyncReport, SyncReport)> {
        let into_a = self.sync_all(a, b, None, cancel).await?;
        if into_a.cancelled {
            return Ok((into_a, SyncReport::default()));
        }
        let into_b = self.sync_all(b, a, None, cancel).await?;
        Ok((into_a, into_b))
    }
}

/// Pull every entry `local` lacks from `remote`'s log after `since`.
///
/// Returns the applied ids in application order.
pub async fn sync(
    local: &dyn LedgerStore,
    remote: &dyn LedgerStore,
    since: Option<&EntryId>,
) -> Result<Vec<EntryId>> {
    let report = SyncEngine::default()
        .sync_all(local, remote, since, &CancelFlag::new())
        .await?;
    Ok(report.applied)
}
