//! Tree-diff sync protocol.
//!
//! The initiator walks a peer's copy of an author's tree from the root
//! down, descending only where the two trees disagree, and fetches the
//! messages behind mismatched leaves it does not already hold.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hearsay_core::{
    validate_signed, MessageHash, NodeCheck, ProofVerifier, SignedMessage, TreeHash,
};
use hearsay_store::{Ledger, Store, StoreRecord};
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::messages::{
    InfoResponse, SyncRequest, SyncResponse, INFO_PROTOCOL, PROTOCOL_VERSION, SYNC_PROTOCOL,
};
use crate::transport::{PeerId, ProtocolHandler, Transport};

/// Configuration for sync behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum protocol round-trips for one (peer, author) branch.
    pub request_budget: usize,
    /// Timeout for a single request.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_budget: 65_536,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of syncing one author from one peer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub requests: usize,
    /// Messages newly inserted.
    pub received: usize,
    /// Messages we already held.
    pub duplicates: usize,
    /// Messages dropped because their proof did not verify.
    pub rejected: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: &SyncReport) {
        self.requests += other.requests;
        self.received += other.received;
        self.duplicates += other.duplicates;
        self.rejected += other.rejected;
    }
}

/// Notified for every message sync inserts.
pub trait SyncListener: Send + Sync {
    fn on_new_message(&self, peer: &PeerId, record: &StoreRecord);
}

/// One pending node comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SyncTask {
    depth: usize,
    index: usize,
    /// The peer's value at this node, unknown for the root.
    expected: Option<TreeHash>,
}

/// Initiator side of the protocol.
pub struct SyncEngine<S: Store + ?Sized, T: Transport + ?Sized> {
    ledger: Arc<Ledger<S>>,
    transport: Arc<T>,
    config: SyncConfig,
    listener: Option<Arc<dyn SyncListener>>,
    verifier: Option<Arc<dyn ProofVerifier>>,
}

impl<S: Store + ?Sized, T: Transport + ?Sized> SyncEngine<S, T> {
    pub fn new(ledger: Arc<Ledger<S>>, transport: Arc<T>, config: SyncConfig) -> Self {
        Self {
            ledger,
            transport,
            config,
            listener: None,
            verifier: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn SyncListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Check the proof of every fetched message before inserting it.
    pub fn with_verifier(mut self, verifier: Arc<dyn ProofVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    async fn dial(&self, peer: &PeerId, protocol: &str, request: Vec<u8>) -> Result<Bytes> {
        let call = self
            .transport
            .dial_protocol(peer, protocol, Bytes::from(request));
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| SyncError::Timeout(format!("{protocol} on {peer}")))?
    }

    /// Handshake: which authors does the peer hold?
    pub async fn fetch_info(&self, peer: &PeerId) -> Result<InfoResponse> {
        let response = self.dial(peer, INFO_PROTOCOL, Vec::new()).await?;
        serde_json::from_slice(&response)
            .map_err(|e| SyncError::Protocol(format!("malformed info response: {e}")))
    }

    /// Pull every message of `author` the peer holds and we do not.
    pub async fn sync_author(&self, peer: &PeerId, author: &str) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut queue = vec![SyncTask {
            depth: 0,
            index: 0,
            expected: None,
        }];

        while let Some(task) = queue.pop() {
            if report.requests >= self.config.request_budget {
                return Err(SyncError::BudgetExhausted(report.requests));
            }

            let tree = self.ledger.tree(author).await?;
            let request = SyncRequest {
                user: author.to_string(),
                root: tree.node(task.depth, task.index).unwrap_or(TreeHash::ZERO),
                depth: task.depth,
                index: task.index,
            };

            report.requests += 1;
            let bytes = self
                .dial(peer, SYNC_PROTOCOL, serde_json::to_vec(&request)?)
                .await?;

            match SyncResponse::from_json(&bytes)? {
                SyncResponse::Empty => {}
                SyncResponse::Children(children) => {
                    SyncResponse::validate_children(&request, &children)?;
                    if children.depth >= tree.depth() {
                        return Err(SyncError::Protocol(format!(
                            "children at depth {} beyond tree depth {}",
                            children.depth,
                            tree.depth()
                        )));
                    }
                    // Right first so the left subtree is walked first.
                    for side in [1, 0] {
                        let hash = children.hashes[side];
                        if hash.is_zero() || tree.contains(&hash) {
                            continue;
                        }
                        queue.push(SyncTask {
                            depth: children.depth,
                            index: children.indices[side],
                            expected: Some(hash),
                        });
                    }
                }
                SyncResponse::Messages(messages) => {
                    for hex in messages {
                        self.ingest(peer, author, &task, &hex, &mut report).await?;
                    }
                }
            }
        }

        debug!(%peer, author, ?report, "sync branch complete");
        Ok(report)
    }

    async fn ingest(
        &self,
        peer: &PeerId,
        author: &str,
        task: &SyncTask,
        hex: &str,
        report: &mut SyncReport,
    ) -> Result<()> {
        let signed = SignedMessage::decode(hex)
            .map_err(|e| SyncError::Protocol(format!("undecodable message: {e}")))?;
        if signed.message().author() != author {
            return Err(SyncError::Protocol(format!(
                "asked for {author}, got a message by {}",
                signed.message().author()
            )));
        }
        if let Some(expected) = task.expected {
            if MessageHash::from(expected) != signed.hash() {
                return Err(SyncError::Protocol(format!(
                    "leaf {} does not match message {}",
                    expected.to_hex(),
                    signed.hash()
                )));
            }
        }
        if let Some(verifier) = &self.verifier {
            // The peer answered correctly; the message itself is bad. Skip
            // it and keep walking.
            if let Err(e) = validate_signed(&signed, verifier.as_ref()) {
                warn!(
                    %peer,
                    author,
                    hash = %signed.hash(),
                    error = %e,
                    "dropping synced message"
                );
                report.rejected += 1;
                return Ok(());
            }
        }

        match self.ledger.insert(&signed).await? {
            Some(record) => {
                report.received += 1;
                if let Some(listener) = &self.listener {
                    listener.on_new_message(peer, &record);
                }
            }
            None => report.duplicates += 1,
        }
        Ok(())
    }
}

/// Responder side of the protocol.
pub struct SyncResponder<S: Store + ?Sized> {
    ledger: Arc<Ledger<S>>,
}

impl<S: Store + ?Sized> SyncResponder<S> {
    pub fn new(ledger: Arc<Ledger<S>>) -> Self {
        Self { ledger }
    }

    pub async fn info(&self) -> Result<InfoResponse> {
        Ok(InfoResponse {
            version: PROTOCOL_VERSION,
            users: self.ledger.list_authors().await?,
        })
    }

    pub async fn respond(&self, request: &SyncRequest) -> Result<SyncResponse> {
        let tree = self.ledger.tree(&request.user).await?;
        let check = tree.check_node(request.depth, request.index, &request.root);
        Ok(match check {
            None | Some(NodeCheck::Match) => SyncResponse::Empty,
            Some(NodeCheck::Children(children)) => SyncResponse::Children(children),
            Some(NodeCheck::Leaf) => {
                match self
                    .ledger
                    .leaf_message(&request.user, request.index)
                    .await?
                {
                    Some(record) => SyncResponse::Messages(vec![record.signed().encode()]),
                    None => SyncResponse::Empty,
                }
            }
        })
    }

    /// Protocol handlers to register on a transport.
    pub fn handlers(self: &Arc<Self>) -> Vec<(&'static str, Arc<dyn ProtocolHandler>)>
    where
        S: 'static,
    {
        vec![
            (
                INFO_PROTOCOL,
                Arc::new(InfoHandler(Arc::clone(self))) as Arc<dyn ProtocolHandler>,
            ),
            (
                SYNC_PROTOCOL,
                Arc::new(TreeDiffHandler(Arc::clone(self))) as Arc<dyn ProtocolHandler>,
            ),
        ]
    }
}

struct InfoHandler<S: Store + ?Sized>(Arc<SyncResponder<S>>);

#[async_trait]
impl<S: Store + ?Sized + 'static> ProtocolHandler for InfoHandler<S> {
    async fn handle(&self, _from: PeerId, _request: Bytes) -> Result<Bytes> {
        let info = self.0.info().await?;
        Ok(Bytes::from(serde_json::to_vec(&info)?))
    }
}

struct TreeDiffHandler<S: Store + ?Sized>(Arc<SyncResponder<S>>);

#[async_trait]
impl<S: Store + ?Sized + 'static> ProtocolHandler for TreeDiffHandler<S> {
    async fn handle(&self, from: PeerId, request: Bytes) -> Result<Bytes> {
        let request: SyncRequest = match serde_json::from_slice(&request) {
            Ok(request) => request,
            Err(e) => {
                warn!(%from, error = %e, "malformed sync request");
                return Ok(Bytes::from(SyncResponse::Empty.to_json()?));
            }
        };
        let response = self.0.respond(&request).await?;
        Ok(Bytes::from(response.to_json()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryNetwork, MemoryTransport};
    use hearsay_core::{
        Ed25519Verifier, Keypair, Message, PostKind, PostPayload, Proof, ProofScheme, ProofSigner,
    };
    use hearsay_store::{LedgerConfig, MemoryStore};
    use std::sync::Mutex;

    struct Peer {
        id: PeerId,
        ledger: Arc<Ledger<MemoryStore>>,
        transport: Arc<MemoryTransport>,
    }

    async fn peer(network: &Arc<MemoryNetwork>, byte: u8) -> Peer {
        let id = PeerId::from_bytes([byte; 32]);
        let ledger = Arc::new(Ledger::new(
            Arc::new(MemoryStore::new()),
            LedgerConfig {
                depth: 5,
                ..Default::default()
            },
        ));
        let transport = Arc::new(network.create_transport(id).await);
        let responder = Arc::new(SyncResponder::new(Arc::clone(&ledger)));
        for (protocol, handler) in responder.handlers() {
            transport.handle(protocol, handler).await.unwrap();
        }
        Peer {
            id,
            ledger,
            transport,
        }
    }

    fn post(keypair: &Keypair, at: u64) -> SignedMessage {
        let message = Message::new(
            keypair.author(),
            at,
            PostPayload::new(PostKind::Default).with_body(format!("post {at}")),
        )
        .unwrap();
        SignedMessage::sign(message, keypair)
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<MessageHash>>);

    impl SyncListener for Collect {
        fn on_new_message(&self, _peer: &PeerId, record: &StoreRecord) {
            self.0.lock().unwrap().push(record.hash);
        }
    }

    #[tokio::test]
    async fn test_sync_pulls_missing_messages() {
        let network = MemoryNetwork::new();
        let a = peer(&network, 0xA0).await;
        let b = peer(&network, 0xB0).await;
        network.connect(a.id, b.id).await.unwrap();

        let keypair = Keypair::from_seed(&[1; 32]);
        let author = keypair.author();
        for at in 0..6 {
            b.ledger.insert(&post(&keypair, at)).await.unwrap();
        }
        a.ledger.insert(&post(&keypair, 2)).await.unwrap();

        let listener = Arc::new(Collect::default());
        let engine = SyncEngine::new(
            Arc::clone(&a.ledger),
            Arc::clone(&a.transport),
            SyncConfig::default(),
        )
        .with_listener(listener.clone());

        let info = engine.fetch_info(&b.id).await.unwrap();
        assert_eq!(info.users, vec![author.clone()]);

        let report = engine.sync_author(&b.id, &author).await.unwrap();
        assert_eq!(report.received, 5);
        assert_eq!(listener.0.lock().unwrap().len(), 5);
        assert_eq!(
            a.ledger.root(&author).await.unwrap(),
            b.ledger.root(&author).await.unwrap()
        );

        // A second pass stops at the root.
        let again = engine.sync_author(&b.id, &author).await.unwrap();
        assert_eq!(again.requests, 1);
        assert_eq!(again.received, 0);
    }

    #[tokio::test]
    async fn test_sync_from_empty_peer_is_one_request() {
        let network = MemoryNetwork::new();
        let a = peer(&network, 0xA0).await;
        let b = peer(&network, 0xB0).await;
        network.connect(a.id, b.id).await.unwrap();

        let keypair = Keypair::from_seed(&[1; 32]);
        a.ledger.insert(&post(&keypair, 1)).await.unwrap();

        let engine = SyncEngine::new(a.ledger.clone(), a.transport.clone(), SyncConfig::default());
        let report = engine.sync_author(&b.id, &keypair.author()).await.unwrap();
        assert_eq!(report.requests, 1);
        assert_eq!(a.ledger.store().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let network = MemoryNetwork::new();
        let a = peer(&network, 0xA0).await;
        let b = peer(&network, 0xB0).await;
        network.connect(a.id, b.id).await.unwrap();

        let keypair = Keypair::from_seed(&[1; 32]);
        for at in 0..4 {
            b.ledger.insert(&post(&keypair, at)).await.unwrap();
        }

        let engine = SyncEngine::new(
            a.ledger.clone(),
            a.transport.clone(),
            SyncConfig {
                request_budget: 2,
                ..Default::default()
            },
        );
        assert!(matches!(
            engine.sync_author(&b.id, &keypair.author()).await,
            Err(SyncError::BudgetExhausted(2))
        ));
    }

    #[tokio::test]
    async fn test_responder_out_of_range_is_empty() {
        let ledger = Arc::new(Ledger::new(
            Arc::new(MemoryStore::new()),
            LedgerConfig::default(),
        ));
        let responder = SyncResponder::new(ledger);
        let response = responder
            .respond(&SyncRequest {
                user: "nobody".into(),
                root: TreeHash::from_u64(9),
                depth: 99,
                index: 0,
            })
            .await
            .unwrap();
        assert_eq!(response, SyncResponse::Empty);
    }

    #[tokio::test]
    async fn test_verifier_drops_forged_messages() {
        let network = MemoryNetwork::new();
        let a = peer(&network, 0xA0).await;
        let b = peer(&network, 0xB0).await;
        network.connect(a.id, b.id).await.unwrap();

        let keypair = Keypair::from_seed(&[1; 32]);
        let honest = post(&keypair, 1);
        let forged = SignedMessage::new(
            post(&keypair, 2).message().clone(),
            Some(Proof::new(ProofScheme::Signature, vec![7; 64]).unwrap()),
        );
        b.ledger.insert(&honest).await.unwrap();
        b.ledger.insert(&forged).await.unwrap();

        let engine = SyncEngine::new(a.ledger.clone(), a.transport.clone(), SyncConfig::default())
            .with_verifier(Arc::new(Ed25519Verifier));
        let report = engine.sync_author(&b.id, &keypair.author()).await.unwrap();
        assert_eq!(report.received, 1);
        assert_eq!(report.rejected, 1);
        assert!(a.ledger.store().has(&honest.hash()).await.unwrap());
        assert!(!a.ledger.store().has(&forged.hash()).await.unwrap());
    }

    struct Liar;

    #[async_trait]
    impl ProtocolHandler for Liar {
        async fn handle(&self, _from: PeerId, _request: Bytes) -> Result<Bytes> {
            Ok(Bytes::from_static(br#"{"messages":["zz"]}"#))
        }
    }

    #[tokio::test]
    async fn test_malformed_response_aborts_branch() {
        let network = MemoryNetwork::new();
        let a = peer(&network, 0xA0).await;
        let liar_id = PeerId::from_bytes([0xEE; 32]);
        let liar = network.create_transport(liar_id).await;
        liar.handle(SYNC_PROTOCOL, Arc::new(Liar)).await.unwrap();
        network.connect(a.id, liar_id).await.unwrap();

        let engine = SyncEngine::new(a.ledger.clone(), a.transport.clone(), SyncConfig::default());
        assert!(matches!(
            engine.sync_author(&liar_id, "alice").await,
            Err(SyncError::Protocol(_))
        ));
    }
}
