//! Property tests for chains of successor tokens.

use std::sync::Arc;

use proptest::prelude::*;

use mycel::core::{codec, IdentityId};
use mycel::protocol::{ContributeEntryRequest, RegisterIdentityRequest};
use mycel::store::{LedgerStore, MemoryLedger};
use mycel::token::{Token, TokenStatus};
use mycel::{ErrorCode, ManualClock, Node, NodeConfig};

/// One step against the node: spend the current token, or replay an
/// earlier one picked by index.
#[derive(Debug, Clone)]
enum Step {
    Spend(u8),
    Replay(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<u8>().prop_map(Step::Spend),
        any::<usize>().prop_map(Step::Replay),
    ]
}

fn request(token: &Token, content: u8) -> ContributeEntryRequest {
    ContributeEntryRequest {
        agent_token: token.clone(),
        entry_type: "note".into(),
        encoded_content: codec::encode(&[content]).unwrap(),
        parent_entry_id: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn only_the_latest_token_is_valid(steps in prop::collection::vec(step(), 1..24)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let clock = Arc::new(ManualClock::new(1000));
            let node = Node::with_clock(MemoryLedger::new(), NodeConfig::default(), clock.clone())
                .unwrap();
            let mut current = node
                .register_identity(RegisterIdentityRequest {
                    agent_id: IdentityId::new("node-7").unwrap(),
                    agent_name: "Node 7".into(),
                    description: String::new(),
                    initial_digest: codec::encode(b"").unwrap(),
                })
                .await
                .unwrap()
                .token;
            let mut spent: Vec<Token> = Vec::new();

            for (i, step) in steps.into_iter().enumerate() {
                clock.advance(1);
                let len = node.store().len().await.unwrap();
                match step {
                    Step::Spend(content) => {
                        // Vary content so spends are not all duplicates.
                        let next = node
                            .contribute_entry(request(&current, content ^ i as u8))
                            .await
                            .unwrap()
                            .next_token;
                        spent.push(std::mem::replace(&mut current, next));
                    }
                    Step::Replay(pick) if !spent.is_empty() => {
                        let old = &spent[pick % spent.len()];
                        let err = node.contribute_entry(request(old, 0)).await.unwrap_err();
                        assert_eq!(err.code(), ErrorCode::TokenReplayed);
                        assert_eq!(node.store().len().await.unwrap(), len);
                    }
                    Step::Replay(_) => {}
                }

                assert_eq!(node.verify_token(&current), TokenStatus::Valid);
                for old in &spent {
                    assert_eq!(node.verify_token(old), TokenStatus::Replayed);
                }
            }
        });
    }
}
