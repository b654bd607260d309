//! Proptest generators for property-based testing.

use proptest::prelude::*;

use mycel_core::{EntryDraft, EntryId, EntryType, IdentityId};
use mycel_store::{LedgerStore, Result};

/// Generate a valid identity id.
pub fn identity_id() -> impl Strategy<Value = IdentityId> {
    "[a-z][a-z0-9-]{0,15}".prop_map(|s| IdentityId::new(s).unwrap_or_else(|e| panic!("{e}")))
}

/// Generate a user entry type.
pub fn entry_type() -> impl Strategy<Value = EntryType> {
    "[a-z][a-z0-9_.]{0,15}"
        .prop_filter("reserved prefix", |s| !s.starts_with("mycel."))
        .prop_map(|s| EntryType::user(s).unwrap_or_else(|e| panic!("{e}")))
}

/// Generate a random EntryId.
pub fn entry_id() -> impl Strategy<Value = EntryId> {
    any::<[u8; 32]>().prop_map(EntryId::from_bytes)
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for generating a root draft.
#[derive(Debug, Clone)]
pub struct DraftParams {
    pub author: IdentityId,
    pub entry_type: EntryType,
    pub timestamp: i64,
    pub payload: Vec<u8>,
}

impl Arbitrary for DraftParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (identity_id(), entry_type(), timestamp(), payload(256))
            .prop_map(|(author, entry_type, timestamp, payload)| DraftParams {
                author,
                entry_type,
                timestamp,
                payload,
            })
            .boxed()
    }
}

/// Build a root draft from parameters.
pub fn draft_from_params(params: &DraftParams) -> EntryDraft {
    EntryDraft::with_raw_payload(
        params.entry_type.clone(),
        &params.payload,
        params.author.clone(),
        params.timestamp,
    )
    .unwrap_or_else(|e| panic!("generated payload too large: {e}"))
}

/// A random forest: each node carries a payload and optionally picks an
/// earlier node as its parent.
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub nodes: Vec<(Vec<u8>, Option<prop::sample::Index>)>,
}

impl Arbitrary for ForestParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop::collection::vec((payload(16), any::<Option<prop::sample::Index>>()), 0..24)
            .prop_map(|nodes| ForestParams { nodes })
            .boxed()
    }
}

/// Append a generated forest to `store`, returning ids in append order.
///
/// Duplicate content collapses onto one id, so the result may repeat ids.
pub async fn build_forest(
    store: &dyn LedgerStore,
    author: &str,
    params: &ForestParams,
) -> Result<Vec<EntryId>> {
    let mut ids: Vec<EntryId> = Vec::with_capacity(params.nodes.len());
    for (i, (payload, parent)) in params.nodes.iter().enumerate() {
        let parent = match (parent, ids.is_empty()) {
            (Some(index), false) => Some(ids[index.index(ids.len())]),
            _ => None,
        };
        let draft = crate::fixtures::note_draft(author, payload, i as i64)
            .map_err(|e| mycel_store::StoreError::InvalidData(e.to_string()))?
            .maybe_parent(parent);
        ids.push(store.append(draft).await?.id());
    }
    Ok(ids)
}
