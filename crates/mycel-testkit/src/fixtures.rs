//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use rand::RngCore;

use mycel::protocol::{ContributeEntryRequest, ContributeEntryResponse, RegisterIdentityRequest};
use mycel::{ManualClock, Node, NodeConfig};
use mycel_core::{codec, CodecError, EntryDraft, EntryId, EntryType, IdentityId};
use mycel_store::{LedgerStore, MemoryLedger};
use mycel_token::Token;

/// A node on an in-memory ledger and a manual clock.
pub struct TestNode {
    pub clock: Arc<ManualClock>,
    pub node: Node<MemoryLedger>,
}

impl TestNode {
    /// A node whose clock starts at `start` with default config.
    pub fn new(start: i64) -> Self {
        Self::with_config(start, NodeConfig::default())
    }

    /// Deterministic signing key from a one-byte seed pattern.
    pub fn with_seed(start: i64, seed: u8) -> Self {
        Self::with_config(
            start,
            NodeConfig {
                signing_seed: Some(format!("{seed:02x}").repeat(32)),
                ..NodeConfig::default()
            },
        )
    }

    pub fn with_config(start: i64, config: NodeConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let node = match Node::with_clock(MemoryLedger::new(), config, clock.clone()) {
            Ok(node) => node,
            Err(e) => panic!("fixture config rejected: {e}"),
        };
        Self { clock, node }
    }

    /// Register `id` with an empty initial digest.
    pub async fn register(&self, id: &str) -> mycel::Result<Token> {
        let resp = self
            .node
            .register_identity(RegisterIdentityRequest {
                agent_id: IdentityId::new(id)?,
                agent_name: id.to_string(),
                description: String::new(),
                initial_digest: codec::encode(b"")?,
            })
            .await?;
        Ok(resp.token)
    }

    /// Contribute a `note` entry.
    pub async fn contribute(
        &self,
        token: &Token,
        content: &[u8],
        parent: Option<EntryId>,
    ) -> mycel::Result<ContributeEntryResponse> {
        self.node
            .contribute_entry(ContributeEntryRequest {
                agent_token: token.clone(),
                entry_type: "note".into(),
                encoded_content: codec::encode(content)?,
                parent_entry_id: parent,
            })
            .await
    }
}

/// Several independent nodes sharing one start time.
pub fn multi_node_fixtures(count: usize, start: i64) -> Vec<TestNode> {
    (0..count).map(|_| TestNode::new(start)).collect()
}

/// A root `note` draft with raw payload bytes.
pub fn note_draft(author: &str, raw: &[u8], timestamp: i64) -> Result<EntryDraft, CodecError> {
    let author = IdentityId::new(author)
        .unwrap_or_else(|e| panic!("fixture author {author:?} invalid: {e}"));
    let entry_type = EntryType::new("note").unwrap_or_else(|e| panic!("{e}"));
    EntryDraft::with_raw_payload(entry_type, raw, author, timestamp)
}

/// A ledger holding a single chain of `len` entries by `author`.
pub async fn seeded_ledger(
    author: &str,
    len: usize,
) -> mycel_store::Result<(MemoryLedger, Vec<EntryId>)> {
    let store = MemoryLedger::new();
    let mut ids: Vec<EntryId> = Vec::with_capacity(len);
    for i in 0..len {
        let draft = note_draft(author, format!("{author}/{i}").as_bytes(), i as i64)
            .map_err(|e| mycel_store::StoreError::InvalidData(e.to_string()))?
            .maybe_parent(ids.last().copied());
        ids.push(store.append(draft).await?.id());
    }
    Ok((store, ids))
}

/// `len` random bytes.
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}
