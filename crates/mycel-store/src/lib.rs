//! # Mycel Store
//!
//! Ledger storage for Mycel: an append-only, content-addressed forest of
//! entries behind the [`LedgerStore`] trait.
//!
//! ## Key Types
//!
//! - [`LedgerStore`] - The async trait for all ledger operations
//! - [`SqliteLedger`] - SQLite-based persistent storage
//! - [`MemoryLedger`] - In-memory storage
//! - [`AppendOutcome`] - Result of appending an entry
//! - [`LogEntry`] - An entry with its local append position
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mycel_core::{EntryDraft, EntryType, IdentityId};
//! use mycel_store::{LedgerStore, SqliteLedger};
//!
//! async fn example() -> mycel_store::Result<()> {
//!     let store = SqliteLedger::open("ledger.db")?;
//!
//!     let author = IdentityId::new("node-7").unwrap();
//!     let draft = EntryDraft::with_raw_payload(
//!         EntryType::new("note").unwrap(),
//!         b"hello",
//!         author,
//!         1_736_870_400_000,
//!     )
//!     .unwrap();
//!
//!     let id = store.append(draft).await?.id();
//!     assert!(store.has(&id).await?);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{AppendOutcome, LedgerStore, LogEntry};
