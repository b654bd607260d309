//! # Mycel
//!
//! A peer-identity and shared-ledger node.
//!
//! ## Overview
//!
//! A [`Node`] composes four components:
//!
//! - **Codec** (`mycel_core::codec`): lossless bytes to polygon text
//! - **TokenIssuer** (`mycel_token`): short-lived signed identity tokens
//!   with replay protection
//! - **LedgerStore** (`mycel_store`): an append-only, content-addressed
//!   forest of entries
//! - **SyncEngine** (`mycel_sync`): parent-first reconciliation between
//!   two ledgers
//!
//! and exposes four boundary operations: `register_identity`,
//! `exchange_payload`, `sync_state` and `contribute_entry`. Consuming
//! operations return a successor token in `next_token`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mycel::core::{codec, IdentityId};
//! use mycel::protocol::{ContributeEntryRequest, RegisterIdentityRequest};
//! use mycel::store::SqliteLedger;
//! use mycel::{Node, NodeConfig};
//!
//! async fn example() -> mycel::Result<()> {
//!     let store = SqliteLedger::open("ledger.db")?;
//!     let node = Node::new(store, NodeConfig::default())?;
//!
//!     let registered = node
//!         .register_identity(RegisterIdentityRequest {
//!             agent_id: IdentityId::new("node-7")?,
//!             agent_name: "Node Seven".into(),
//!             description: String::new(),
//!             initial_digest: codec::encode(b"genesis")?,
//!         })
//!         .await?;
//!
//!     let contributed = node
//!         .contribute_entry(ContributeEntryRequest {
//!             agent_token: registered.token,
//!             entry_type: "note".into(),
//!             encoded_content: codec::encode(b"hello")?,
//!             parent_entry_id: None,
//!         })
//!         .await?;
//!
//!     // The spent token is gone; keep going with its successor.
//!     let _token = contributed.next_token;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `mycel::core` - Codec, entries, identities, hashing
//! - `mycel::token` - Token issuance and verification
//! - `mycel::store` - Storage abstraction, SQLite and in-memory
//! - `mycel::sync` - Reconciliation and convergence

pub mod clock;
pub mod config;
pub mod error;
pub mod node;
pub mod protocol;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use node::Node;
pub use protocol::{ErrorCode, ErrorResponse, Request, Response, Status};

pub use mycel_core as core;
pub use mycel_store as store;
pub use mycel_sync as sync;
pub use mycel_token as token;
