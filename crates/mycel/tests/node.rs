//! End-to-end tests for the node's boundary operations.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use mycel::core::{codec, EntryType, ExchangeRecord, IdentityId, LedgerRecord};
use mycel::protocol::{
    ContributeEntryRequest, ExchangePayloadRequest, RegisterIdentityRequest, RenewTokenRequest,
    RevokeTokenRequest, SyncStateRequest,
};
use mycel::store::{LedgerStore, MemoryLedger, SqliteLedger};
use mycel::sync::{state_digest, verify_convergence, CancelFlag, SyncConfig};
use mycel::token::{Token, TokenStatus};
use mycel::{ErrorCode, ManualClock, Node, NodeConfig, NodeError, Request, Response, Status};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config() -> NodeConfig {
    NodeConfig {
        token_ttl_ms: 3600,
        renewal_grace_ms: 600,
        ..NodeConfig::default()
    }
}

fn memory_node(clock: &Arc<ManualClock>) -> Node<MemoryLedger> {
    Node::with_clock(MemoryLedger::new(), config(), clock.clone()).unwrap()
}

async fn register<S: LedgerStore>(node: &Node<S>, id: &str) -> Token {
    node.register_identity(RegisterIdentityRequest {
        agent_id: IdentityId::new(id).unwrap(),
        agent_name: id.to_uppercase(),
        description: format!("{id} test identity"),
        initial_digest: codec::encode(b"genesis").unwrap(),
    })
    .await
    .unwrap()
    .token
}

fn contribute(token: &Token, content: &[u8]) -> ContributeEntryRequest {
    ContributeEntryRequest {
        agent_token: token.clone(),
        entry_type: "note".into(),
        encoded_content: codec::encode(content).unwrap(),
        parent_entry_id: None,
    }
}

#[tokio::test]
async fn consumed_token_is_replayed() -> anyhow::Result<()> {
    init_tracing();
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);
    let token = register(&node, "node-7").await;

    let first = node.contribute_entry(contribute(&token, b"one")).await?;
    assert_eq!(first.status, Status::Accepted);
    let len = node.store().len().await?;

    let err = node
        .contribute_entry(contribute(&token, b"two"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TokenReplayed);
    assert!(err.is_recoverable());
    assert_eq!(node.store().len().await?, len);

    // The successor keeps working.
    node.contribute_entry(contribute(&first.next_token, b"two"))
        .await?;
    Ok(())
}

#[tokio::test]
async fn children_follow_contributions() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);
    let token = register(&node, "author").await;

    let e1 = node.contribute_entry(contribute(&token, b"E1")).await?;
    clock.advance(1);
    let mut req = contribute(&e1.next_token, b"E2");
    req.parent_entry_id = Some(e1.new_entry_id);
    let e2 = node.contribute_entry(req).await?;

    assert_eq!(
        node.store().children(&e1.new_entry_id).await?,
        BTreeSet::from([e2.new_entry_id])
    );
    let stored = node.store().get(&e2.new_entry_id).await?.unwrap();
    assert_eq!(stored.author.as_str(), "author");
    assert_eq!(&stored.decode_payload()?[..], b"E2");
    Ok(())
}

#[tokio::test]
async fn missing_parent_leaves_token_and_store_untouched() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);
    let token = register(&node, "author").await;
    let before = node.store().len().await?;

    let mut req = contribute(&token, b"orphan");
    req.parent_entry_id = Some(mycel::core::EntryId::from_bytes([9; 32]));
    let err = node.contribute_entry(req).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::EntryNotFound);
    assert_eq!(node.store().len().await?, before);
    assert_eq!(node.verify_token(&token), TokenStatus::Valid);
    Ok(())
}

#[tokio::test]
async fn malformed_content_is_decoding_error() {
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);
    let token = register(&node, "author").await;

    let mut req = contribute(&token, b"x");
    req.encoded_content = "9-11-9.00000000".into();
    let err = node.contribute_entry(req).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DecodingError);
    assert_eq!(node.verify_token(&token), TokenStatus::Valid);
}

#[tokio::test]
async fn exchange_requires_registered_receiver() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);
    let alice = register(&node, "alice").await;
    register(&node, "bob").await;

    let payload = codec::encode(b"for bob")?;
    let err = node
        .exchange_payload(ExchangePayloadRequest {
            sender_token: alice.clone(),
            receiver_id: IdentityId::new("carol")?,
            encoded_payload: payload.clone(),
            context_hash: "ctx".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::IdentityNotFound(_)));
    assert_eq!(node.verify_token(&alice), TokenStatus::Valid);

    let resp = node
        .exchange_payload(ExchangePayloadRequest {
            sender_token: alice.clone(),
            receiver_id: IdentityId::new("bob")?,
            encoded_payload: payload.clone(),
            context_hash: "ctx".into(),
        })
        .await?;
    assert_eq!(resp.status, Status::Accepted);
    assert_eq!(node.verify_token(&alice), TokenStatus::Replayed);
    assert_eq!(node.verify_token(&resp.next_token), TokenStatus::Valid);

    let entry = node.store().get(&resp.transaction_id).await?.unwrap();
    assert_eq!(entry.entry_type, EntryType::exchange());
    let record = ExchangeRecord::from_entry(&entry)?;
    assert_eq!(record.sender.as_str(), "alice");
    assert_eq!(record.payload, payload);
    Ok(())
}

#[tokio::test]
async fn sync_state_reports_delta_then_up_to_date() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let node = Node::with_clock(
        MemoryLedger::new(),
        NodeConfig {
            sync: SyncConfig {
                max_entries_per_round: 2,
            },
            ..config()
        },
        clock.clone(),
    )?;
    let mut token = register(&node, "reader").await;
    for i in 0..3u8 {
        token = node.contribute_entry(contribute(&token, &[i])).await?.next_token;
    }

    // Empty caller: first page of the log.
    let empty = codec::encode(b"")?;
    let page = node
        .sync_state(SyncStateRequest {
            agent_token: token.clone(),
            current_state_digest: empty.clone(),
            last_known_entry_id: None,
        })
        .await?;
    assert_eq!(page.status, Status::Delta);
    assert_eq!(page.entries.len(), 2);

    let rest = node
        .sync_state(SyncStateRequest {
            agent_token: token.clone(),
            current_state_digest: empty,
            last_known_entry_id: page.resume_from,
        })
        .await?;
    assert_eq!(rest.entries.len(), 2);

    let digest = state_digest(node.store()).await?;
    let current = node
        .sync_state(SyncStateRequest {
            agent_token: token.clone(),
            current_state_digest: codec::encode(digest.as_bytes())?,
            last_known_entry_id: rest.resume_from,
        })
        .await?;
    assert_eq!(current.status, Status::UpToDate);
    assert!(current.entries.is_empty());

    // Status checks never consume.
    assert_eq!(node.verify_token(&token), TokenStatus::Valid);
    Ok(())
}

#[tokio::test]
async fn token_lifecycle_against_the_clock() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);
    let token = register(&node, "node-7").await;

    clock.set(4599);
    assert_eq!(node.verify_token(&token), TokenStatus::Valid);
    clock.set(4601);
    let err = node
        .contribute_entry(contribute(&token, b"late"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TokenExpired);

    // Within the renewal grace window.
    let renewed = node
        .renew_token(RenewTokenRequest {
            token: token.clone(),
            state_digest: codec::encode(b"later")?,
        })
        .await?
        .token;
    assert_eq!(node.verify_token(&renewed), TokenStatus::Valid);

    // Past it.
    clock.advance(3600 + 601);
    let err = node
        .renew_token(RenewTokenRequest {
            token: renewed,
            state_digest: codec::encode(b"too late")?,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TokenExpired);
    Ok(())
}

#[tokio::test]
async fn revoked_token_is_refused() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);
    let token = register(&node, "node-7").await;

    node.revoke_token(RevokeTokenRequest {
        token: token.clone(),
    })
    .await?;
    let err = node
        .contribute_entry(contribute(&token, b"x"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TokenRevoked);
    Ok(())
}

#[tokio::test]
async fn token_from_another_node_is_unknown() {
    let clock = Arc::new(ManualClock::new(1000));
    let a = memory_node(&clock);
    let b = memory_node(&clock);
    let token = register(&a, "node-7").await;
    register(&b, "node-7").await;

    let err = b
        .contribute_entry(contribute(&token, b"x"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TokenUnknown);
}

#[tokio::test]
async fn expired_token_cannot_be_restamped() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);
    let mut token = register(&node, "node-7").await;
    let len = node.store().len().await?;

    clock.set(1_000_000_000);
    assert_eq!(node.verify_token(&token), TokenStatus::Expired);

    token.issued_at = 1_000_000_000;
    assert_eq!(node.verify_token(&token), TokenStatus::UnknownIdentity);
    let err = node
        .contribute_entry(contribute(&token, b"x"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TokenUnknown);
    assert_eq!(node.store().len().await?, len);
    Ok(())
}

#[tokio::test]
async fn zero_page_size_still_makes_progress() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let node = Node::with_clock(
        MemoryLedger::new(),
        NodeConfig {
            sync: SyncConfig {
                max_entries_per_round: 0,
            },
            ..config()
        },
        clock.clone(),
    )?;
    let token = register(&node, "reader").await;

    let page = node
        .sync_state(SyncStateRequest {
            agent_token: token,
            current_state_digest: codec::encode(b"")?,
            last_known_entry_id: None,
        })
        .await?;
    assert_eq!(page.status, Status::Delta);
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.resume_from, Some(page.entries[0].id));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_use_of_one_token_applies_once() {
    let clock = Arc::new(ManualClock::new(1000));
    let node = Arc::new(memory_node(&clock));
    let token = register(&node, "racer").await;

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let node = node.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            node.contribute_entry(contribute(&token, &[i])).await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(e) => assert_eq!(e.code(), ErrorCode::TokenReplayed),
        }
    }
    assert_eq!(applied, 1);
    // Identity entry plus the one contribution.
    assert_eq!(node.store().len().await.unwrap(), 2);
}

#[tokio::test]
async fn registry_survives_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("node.db");
    let clock = Arc::new(ManualClock::new(1000));

    {
        let node = Node::with_clock(SqliteLedger::open(&path)?, config(), clock.clone())?;
        register(&node, "alice").await;
        register(&node, "bob").await;
    }

    let node = Node::with_clock(SqliteLedger::open(&path)?, config(), clock.clone())?;
    assert_eq!(node.identity_count(), 0);
    assert_eq!(node.restore().await?, 2);
    assert_eq!(node.restore().await?, 0);

    let alice = node.identity(&IdentityId::new("alice")?).unwrap();
    assert_eq!(alice.label, "ALICE");
    assert_eq!(alice.created_at, 1000);

    let err = node
        .register_identity(RegisterIdentityRequest {
            agent_id: IdentityId::new("alice")?,
            agent_name: "again".into(),
            description: String::new(),
            initial_digest: codec::encode(b"")?,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::IdentityExists);
    Ok(())
}

#[tokio::test]
async fn nodes_reconcile_ledgers_and_identities() -> anyhow::Result<()> {
    init_tracing();
    let clock = Arc::new(ManualClock::new(1000));
    let a = memory_node(&clock);
    let b = Node::with_clock(SqliteLedger::open_memory()?, config(), clock.clone())?;

    let alice = register(&a, "alice").await;
    let bob = register(&b, "bob").await;
    a.contribute_entry(contribute(&alice, b"from a")).await?;
    b.contribute_entry(contribute(&bob, b"from b")).await?;

    let (into_a, into_b) = a.reconcile_with(&b, &CancelFlag::new()).await?;
    assert_eq!(into_a.applied.len(), 2);
    assert_eq!(into_b.applied.len(), 2);
    assert!(verify_convergence(a.store(), b.store()).await?.is_converged());

    // Each side now knows the other's identity.
    assert!(a.identity(&IdentityId::new("bob")?).is_some());
    assert!(b.identity(&IdentityId::new("alice")?).is_some());

    // A second pass is a no-op.
    let (again_a, again_b) = a.reconcile_with(&b, &CancelFlag::new()).await?;
    assert!(again_a.applied.is_empty() && again_b.applied.is_empty());
    Ok(())
}

#[tokio::test]
async fn synced_identities_keep_their_home_issuer() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let a = memory_node(&clock);
    let b = memory_node(&clock);
    let alice = register(&a, "alice").await;
    let bob = register(&b, "bob").await;
    a.reconcile_with(&b, &CancelFlag::new()).await?;

    // Known on b, but not re-registrable there.
    let err = b
        .register_identity(RegisterIdentityRequest {
            agent_id: IdentityId::new("alice")?,
            agent_name: "Impostor".into(),
            description: String::new(),
            initial_digest: codec::encode(b"")?,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::IdentityExists);

    // a's tokens are only good on a.
    let err = b
        .contribute_entry(contribute(&alice, b"x"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::TokenUnknown);
    a.contribute_entry(contribute(&alice, b"x")).await?;

    // The synced identity can still receive on b.
    b.exchange_payload(ExchangePayloadRequest {
        sender_token: bob,
        receiver_id: IdentityId::new("alice")?,
        encoded_payload: codec::encode(b"hi")?,
        context_hash: String::new(),
    })
    .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn register_racing_a_pull_keeps_one_record() -> anyhow::Result<()> {
    for round in 0..16 {
        let clock = Arc::new(ManualClock::new(1000 + round));
        let source = memory_node(&clock);
        source
            .register_identity(RegisterIdentityRequest {
                agent_id: IdentityId::new("alice")?,
                agent_name: "from source".into(),
                description: String::new(),
                initial_digest: codec::encode(b"")?,
            })
            .await?;
        let target = Arc::new(memory_node(&clock));

        let registering = {
            let target = target.clone();
            tokio::spawn(async move {
                target
                    .register_identity(RegisterIdentityRequest {
                        agent_id: IdentityId::new("alice").unwrap(),
                        agent_name: "local".into(),
                        description: String::new(),
                        initial_digest: codec::encode(b"").unwrap(),
                    })
                    .await
            })
        };
        target
            .pull_from(source.store(), None, &CancelFlag::new())
            .await?;

        let label = target.identity(&IdentityId::new("alice")?).unwrap().label;
        match registering.await? {
            Ok(resp) => {
                assert_eq!(resp.status, Status::Accepted);
                assert_eq!(label, "local");
            }
            Err(e) => {
                assert_eq!(e.code(), ErrorCode::IdentityExists);
                assert_eq!(label, "from source");
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn pull_from_a_remote_store() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let source = memory_node(&clock);
    let token = register(&source, "writer").await;
    source.contribute_entry(contribute(&token, b"x")).await?;

    let replica = memory_node(&clock);
    let report = replica
        .pull_from(source.store(), None, &CancelFlag::new())
        .await?;
    assert_eq!(report.applied.len(), 2);
    assert!(report.complete);
    assert!(replica.identity(&IdentityId::new("writer")?).is_some());
    Ok(())
}

#[tokio::test]
async fn json_envelope_round_trip() -> anyhow::Result<()> {
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);

    let raw = serde_json::json!({
        "op": "register_identity",
        "agent_id": "node-7",
        "agent_name": "Node Seven",
        "initial_digest": codec::encode(b"genesis")?,
    })
    .to_string();
    let response: Response = serde_json::from_str(&node.handle_json(&raw).await?)?;
    let token = match response {
        Response::RegisterIdentity(r) => r.token,
        other => panic!("unexpected response {other:?}"),
    };

    let request = Request::ContributeEntry(contribute(&token, b"hi"));
    assert!(!node.handle(request.clone()).await.is_error());

    match node.handle(request).await {
        Response::Error(e) => {
            assert_eq!(e.code, ErrorCode::TokenReplayed);
            assert!(e.recoverable);
        }
        other => panic!("expected replay error, got {other:?}"),
    }

    let garbage: Response = serde_json::from_str(&node.handle_json("{\"op\":42}").await?)?;
    match garbage {
        Response::Error(e) => assert_eq!(e.code, ErrorCode::InvalidRequest),
        other => panic!("expected invalid request, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn sweeper_evicts_old_records() {
    let clock = Arc::new(ManualClock::new(1000));
    let node = memory_node(&clock);
    let token = register(&node, "node-7").await;
    node.contribute_entry(contribute(&token, b"x")).await.unwrap();
    assert_eq!(node.tracked_token_records(), 1);

    // Past ttl + grace.
    clock.advance(3600 + 600 + 1);
    let sweeper = node.spawn_token_sweeper(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(50)).await;
    sweeper.abort();

    assert_eq!(node.tracked_token_records(), 0);
    assert_eq!(node.verify_token(&token), TokenStatus::Expired);
}
