//! The Node: the four boundary operations over a token issuer, a ledger
//! store and the sync engine.
//!
//! Every operation moves through `Unauthenticated -> TokenVerified ->
//! Applied | Rejected` and is atomic for the caller. Mutating operations
//! hold the node's write gate from token verification through the append
//! and the token's consumption, and the token is only consumed once the
//! append has succeeded. A rejected operation leaves both the token and
//! the ledger as they were.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mycel_core::codec::{self, MAX_PAYLOAD_LEN};
use mycel_core::{
    CodecError, Ed25519PublicKey, EntryDraft, EntryId, EntryType, ExchangeRecord, Identity,
    IdentityId, LedgerRecord,
};
use mycel_store::{AppendOutcome, LedgerStore};
use mycel_sync::{state_digest, CancelFlag, SyncEngine, SyncReport};
use mycel_token::{Token, TokenIssuer, TokenStatus};

use crate::clock::{Clock, SystemClock};
use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::protocol::{
    ContributeEntryRequest, ContributeEntryResponse, ErrorResponse, ExchangePayloadRequest,
    ExchangePayloadResponse, Phase, RegisterIdentityRequest, RegisterIdentityResponse,
    RenewTokenRequest, RenewTokenResponse, Request, Response, RevokeTokenRequest,
    RevokeTokenResponse, Status, SyncStateRequest, SyncStateResponse,
};

/// Decode a codec-encoded state digest, bounded so it can be re-encoded
/// into a token.
fn decode_digest(encoded: &str) -> Result<Vec<u8>> {
    let digest = codec::decode(encoded)?;
    if digest.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge {
            len: digest.len(),
            max: MAX_PAYLOAD_LEN,
        }
        .into());
    }
    Ok(digest.to_vec())
}

fn status_of(outcome: AppendOutcome) -> Status {
    match outcome {
        AppendOutcome::Inserted(_) => Status::Accepted,
        AppendOutcome::AlreadyExists(_) => Status::Duplicate,
    }
}

/// A Mycel node.
///
/// Holds the token issuer, the identity registry and a ledger store.
pub struct Node<S: LedgerStore> {
    store: Arc<S>,
    issuer: Arc<TokenIssuer>,
    identities: RwLock<HashMap<IdentityId, Identity>>,
    write_gate: Mutex<()>,
    clock: Arc<dyn Clock>,
    sync: SyncEngine,
    config: NodeConfig,
}

impl<S: LedgerStore> Node<S> {
    /// Create a node on the system clock.
    pub fn new(store: S, config: NodeConfig) -> Result<Self> {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let issuer = TokenIssuer::new(config.keypair()?, config.token_policy());
        Ok(Self {
            store: Arc::new(store),
            issuer: Arc::new(issuer),
            identities: RwLock::new(HashMap::new()),
            write_gate: Mutex::new(()),
            clock,
            sync: SyncEngine::new(config.sync.clone()),
            config,
        })
    }

    /// The key this node signs tokens with.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.issuer.public_key()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Check a token without consuming it.
    pub fn verify_token(&self, token: &Token) -> TokenStatus {
        self.issuer.verify(token, self.clock.now_millis())
    }

    /// Look up a registered identity.
    pub fn identity(&self, id: &IdentityId) -> Option<Identity> {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn identity_count(&self) -> usize {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn is_registered(&self, id: &IdentityId) -> bool {
        self.identities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Add an identity to the registry and enroll it. Returns false if it
    /// was already known.
    fn admit(&self, identity: Identity) -> bool {
        let id = identity.id.clone();
        let inserted = {
            let mut identities = self.identities.write().unwrap_or_else(PoisonError::into_inner);
            if identities.contains_key(&id) {
                false
            } else {
                identities.insert(id.clone(), identity);
                true
            }
        };
        self.issuer.enroll(id);
        inserted
    }

    fn reject<T>(&self, op: &'static str, err: NodeError) -> Result<T> {
        warn!(op, phase = %Phase::Rejected, code = ?err.code(), error = %err, "operation rejected");
        Err(err)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Boundary Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a new identity and issue its first token.
    ///
    /// Appends a root `mycel.identity` entry holding the identity record.
    pub async fn register_identity(
        &self,
        req: RegisterIdentityRequest,
    ) -> Result<RegisterIdentityResponse> {
        const OP: &str = "register_identity";
        let now = self.clock.now_millis();
        debug!(op = OP, phase = %Phase::Unauthenticated, identity = %req.agent_id);

        let digest = match decode_digest(&req.initial_digest) {
            Ok(d) => d,
            Err(e) => return self.reject(OP, e),
        };

        let _gate = self.write_gate.lock().await;
        if self.is_registered(&req.agent_id) {
            return self.reject(OP, NodeError::IdentityExists(req.agent_id));
        }

        let identity = Identity {
            id: req.agent_id.clone(),
            label: req.agent_name,
            description: req.description,
            created_at: now,
        };
        let outcome = match self.append_record(&identity, &req.agent_id, now).await {
            Ok(o) => o,
            Err(e) => return self.reject(OP, e),
        };

        if !self.admit(identity) {
            return self.reject(OP, NodeError::IdentityExists(req.agent_id));
        }
        let token = self.issuer.issue(&req.agent_id, &digest, now)?;

        info!(op = OP, phase = %Phase::Applied, identity = %req.agent_id, entry_id = %outcome.id());
        Ok(RegisterIdentityResponse {
            status: Status::Accepted,
            token,
            identity_entry_id: outcome.id(),
        })
    }

    /// Hand a payload from the token's subject to a registered receiver.
    ///
    /// Appends a root `mycel.exchange` entry authored by the sender and
    /// consumes the token.
    pub async fn exchange_payload(
        &self,
        req: ExchangePayloadRequest,
    ) -> Result<ExchangePayloadResponse> {
        const OP: &str = "exchange_payload";
        let _gate = self.write_gate.lock().await;
        let now = self.clock.now_millis();
        let sender = req.sender_token.subject.clone();
        debug!(op = OP, phase = %Phase::Unauthenticated, identity = %sender);

        if let Err(e) = self.issuer.require_valid(&req.sender_token, now) {
            return self.reject(OP, e.into());
        }
        debug!(op = OP, phase = %Phase::TokenVerified, identity = %sender);

        if !self.is_registered(&req.receiver_id) {
            return self.reject(OP, NodeError::IdentityNotFound(req.receiver_id));
        }
        if let Err(e) = codec::validate(&req.encoded_payload) {
            return self.reject(OP, e.into());
        }

        let record = ExchangeRecord {
            sender: sender.clone(),
            receiver: req.receiver_id,
            payload: req.encoded_payload,
            context_hash: req.context_hash,
        };
        let outcome = match self.append_record(&record, &sender, now).await {
            Ok(o) => o,
            Err(e) => return self.reject(OP, e),
        };

        let transaction_id = outcome.id();
        let next_token = self
            .issuer
            .rotate(&req.sender_token, transaction_id.as_bytes(), now)?;

        info!(
            op = OP,
            phase = %Phase::Applied,
            identity = %sender,
            receiver = %record.receiver,
            entry_id = %transaction_id
        );
        Ok(ExchangePayloadResponse {
            status: status_of(outcome),
            transaction_id,
            next_token,
        })
    }

    /// Compare the caller's state with this node's and return what differs.
    ///
    /// Verifies the token without consuming it.
    pub async fn sync_state(&self, req: SyncStateRequest) -> Result<SyncStateResponse> {
        const OP: &str = "sync_state";
        let now = self.clock.now_millis();
        let subject = &req.agent_token.subject;
        debug!(op = OP, phase = %Phase::Unauthenticated, identity = %subject);

        if let Err(e) = self.issuer.require_valid(&req.agent_token, now) {
            return self.reject(OP, e.into());
        }
        debug!(op = OP, phase = %Phase::TokenVerified, identity = %subject);

        let claimed = match codec::decode(&req.current_state_digest) {
            Ok(d) => d,
            Err(e) => return self.reject(OP, e.into()),
        };
        let digest = state_digest(&*self.store).await?;

        if claimed[..] == digest.as_bytes()[..] {
            debug!(op = OP, identity = %subject, "caller is up to date");
            return Ok(SyncStateResponse {
                status: Status::UpToDate,
                entries: Vec::new(),
                resume_from: req.last_known_entry_id,
            });
        }

        let log = match self
            .store
            .log_since(
                req.last_known_entry_id.as_ref(),
                self.config.sync.max_entries_per_round.max(1),
            )
            .await
        {
            Ok(log) => log,
            Err(e) => return self.reject(OP, e.into()),
        };

        let resume_from = log
            .last()
            .map(|l| l.entry.id)
            .or(req.last_known_entry_id);
        let entries: Vec<_> = log.into_iter().map(|l| l.entry).collect();

        info!(op = OP, phase = %Phase::Applied, identity = %subject, count = entries.len());
        Ok(SyncStateResponse {
            status: Status::Delta,
            entries,
            resume_from,
        })
    }

    /// Append a caller-typed entry authored by the token's subject.
    pub async fn contribute_entry(
        &self,
        req: ContributeEntryRequest,
    ) -> Result<ContributeEntryResponse> {
        const OP: &str = "contribute_entry";
        let _gate = self.write_gate.lock().await;
        let now = self.clock.now_millis();
        let author = req.agent_token.subject.clone();
        debug!(op = OP, phase = %Phase::Unauthenticated, identity = %author);

        if let Err(e) = self.issuer.require_valid(&req.agent_token, now) {
            return self.reject(OP, e.into());
        }
        debug!(op = OP, phase = %Phase::TokenVerified, identity = %author);

        let entry_type = match EntryType::user(req.entry_type) {
            Ok(t) => t,
            Err(e) => return self.reject(OP, e.into()),
        };
        if let Err(e) = codec::validate(&req.encoded_content) {
            return self.reject(OP, e.into());
        }

        let draft = EntryDraft::new(entry_type, req.encoded_content, author.clone(), now)
            .maybe_parent(req.parent_entry_id);
        let outcome = match self.store.append(draft).await {
            Ok(o) => o,
            Err(e) => return self.reject(OP, e.into()),
        };

        let new_entry_id = outcome.id();
        let next_token = self
            .issuer
            .rotate(&req.agent_token, new_entry_id.as_bytes(), now)?;

        info!(op = OP, phase = %Phase::Applied, identity = %author, entry_id = %new_entry_id);
        Ok(ContributeEntryResponse {
            status: status_of(outcome),
            new_entry_id,
            next_token,
        })
    }

    /// Exchange a valid or recently expired token for a fresh one.
    pub async fn renew_token(&self, req: RenewTokenRequest) -> Result<RenewTokenResponse> {
        const OP: &str = "renew_token";
        let digest = match decode_digest(&req.state_digest) {
            Ok(d) => d,
            Err(e) => return self.reject(OP, e),
        };

        let _gate = self.write_gate.lock().await;
        let now = self.clock.now_millis();
        match self.issuer.renew(&req.token, &digest, now) {
            Ok(token) => {
                info!(op = OP, phase = %Phase::Applied, identity = %token.subject);
                Ok(RenewTokenResponse {
                    status: Status::Accepted,
                    token,
                })
            }
            Err(e) => self.reject(OP, e.into()),
        }
    }

    /// Permanently invalidate a token.
    pub async fn revoke_token(&self, req: RevokeTokenRequest) -> Result<RevokeTokenResponse> {
        const OP: &str = "revoke_token";
        let _gate = self.write_gate.lock().await;
        if let Err(e) = self.issuer.revoke(&req.token) {
            return self.reject(OP, e.into());
        }
        info!(op = OP, phase = %Phase::Applied, identity = %req.token.subject);
        Ok(RevokeTokenResponse {
            status: Status::Accepted,
        })
    }

    /// Dispatch a request to its operation. Errors become
    /// [`Response::Error`].
    pub async fn handle(&self, request: Request) -> Response {
        let result = match request {
            Request::RegisterIdentity(r) => self
                .register_identity(r)
                .await
                .map(Response::RegisterIdentity),
            Request::ExchangePayload(r) => self
                .exchange_payload(r)
                .await
                .map(Response::ExchangePayload),
            Request::SyncState(r) => self.sync_state(r).await.map(Response::SyncState),
            Request::ContributeEntry(r) => self
                .contribute_entry(r)
                .await
                .map(Response::ContributeEntry),
            Request::RenewToken(r) => self.renew_token(r).await.map(Response::RenewToken),
            Request::RevokeToken(r) => self.revoke_token(r).await.map(Response::RevokeToken),
        };
        result.unwrap_or_else(|e| Response::Error(ErrorResponse::from(&e)))
    }

    /// Handle a JSON request envelope and produce a JSON response envelope.
    pub async fn handle_json(&self, raw: &str) -> Result<String> {
        let response = match serde_json::from_str::<Request>(raw) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                let err = NodeError::InvalidRequest(e.to_string());
                warn!(error = %err, "malformed request envelope");
                Response::Error(ErrorResponse::from(&err))
            }
        };
        serde_json::to_string(&response)
            .map_err(|e| NodeError::Core(mycel_core::CoreError::EncodingError(e.to_string())))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Replication
    // ─────────────────────────────────────────────────────────────────────────

    /// Pull entries this node lacks from `remote`, then pick up any
    /// identities that arrived with them.
    ///
    /// Holds the write gate throughout: a concurrent registration sees
    /// either none or all of the pulled identities.
    pub async fn pull_from(
        &self,
        remote: &dyn LedgerStore,
        since: Option<&EntryId>,
        cancel: &CancelFlag,
    ) -> Result<SyncReport> {
        let _gate = self.write_gate.lock().await;
        let report = self.sync.sync_all(&*self.store, remote, since, cancel).await?;
        if !report.applied.is_empty() {
            self.restore_locked().await?;
        }
        Ok(report)
    }

    /// Sync with another node in both directions.
    ///
    /// Each node's gate is held only while entries flow into it.
    pub async fn reconcile_with<T: LedgerStore>(
        &self,
        peer: &Node<T>,
        cancel: &CancelFlag,
    ) -> Result<(SyncReport, SyncReport)> {
        let into_self = self.pull_from(&*peer.store, None, cancel).await?;
        if into_self.cancelled {
            return Ok((into_self, SyncReport::default()));
        }
        let into_peer = peer.pull_from(&*self.store, None, cancel).await?;
        Ok((into_self, into_peer))
    }

    /// Rebuild the identity registry from `mycel.identity` entries already
    /// in the store. Returns how many identities were added.
    ///
    /// When one id has several identity entries, the earliest in log order
    /// wins. Entries whose author is not the identity they describe are
    /// ignored.
    ///
    /// Tokens are issued per node. An identity that arrived through sync
    /// is known here (it can receive exchanges) but its tokens come from
    /// the node it registered with; that node's tokens are unknown here.
    pub async fn restore(&self) -> Result<usize> {
        let _gate = self.write_gate.lock().await;
        self.restore_locked().await
    }

    async fn restore_locked(&self) -> Result<usize> {
        let entries = self.store.by_type(&EntryType::identity()).await?;
        let mut added = 0;
        for entry in entries {
            let identity = match Identity::from_entry(&entry) {
                Ok(i) => i,
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "skipping unreadable identity entry");
                    continue;
                }
            };
            if identity.id != entry.author {
                warn!(entry_id = %entry.id, identity = %identity.id, "identity entry not self-authored");
                continue;
            }
            if self.admit(identity) {
                added += 1;
            }
        }
        if added > 0 {
            info!(count = added, "restored identities");
        }
        Ok(added)
    }

    /// Periodically evict token records whose window has passed.
    pub fn spawn_token_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let issuer = self.issuer.clone();
        let clock = self.clock.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let evicted = issuer.sweep(clock.now_millis());
                if evicted > 0 {
                    debug!(count = evicted, "token sweeper evicted records");
                }
            }
        })
    }

    /// Number of consumed and revoked token records held.
    pub fn tracked_token_records(&self) -> usize {
        self.issuer.tracked_records()
    }

    async fn append_record<R: LedgerRecord>(
        &self,
        record: &R,
        author: &IdentityId,
        now: i64,
    ) -> Result<AppendOutcome> {
        let draft = record.to_draft(author.clone(), now)?;
        Ok(self.store.append(draft).await?)
    }
}
