//! # Mycel Sync
//!
//! Reconciliation between two ledgers.
//!
//! ## Protocol Overview
//!
//! Sync is pull-based and works on whole entries:
//!
//! 1. Read the remote log after a marker (`since`), bounded per round
//! 2. Verify every remote entry hashes to its id
//! 3. Pull any ancestors the local store has never seen
//! 4. Append parent-first, checking the cancel flag between entries
//!
//! Because entries are content-addressed, syncing is idempotent and
//! syncing A from B then B from A leaves both with the union.
//!
//! ## Invariants
//!
//! - Applied entries are never rolled back by a later failure or cancel
//! - Two contents under one id is an integrity fault, never merged
//! - `SyncReport::resume_from` always names an entry whose predecessors
//!   in the remote log are all held locally

pub mod convergence;
pub mod engine;
pub mod error;

pub use convergence::{digest_ids, state_digest, verify_convergence, ConvergenceResult};
pub use engine::{sync, CancelFlag, SyncConfig, SyncEngine, SyncReport};
pub use error::{Result, SyncError};
