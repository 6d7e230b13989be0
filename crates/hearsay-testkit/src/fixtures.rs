//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hearsay::{Node, NodeConfig};
use hearsay_core::{
    ConnectionKind, ConnectionPayload, Ed25519Verifier, Keypair, Message, MessageId,
    ModerationKind, ModerationPayload, Payload, PostKind, PostPayload, ProfileKind,
    ProfilePayload, ProofSigner, SignedMessage,
};
use hearsay_store::{Ledger, LedgerConfig, MemoryStore, StoreRecord};
use hearsay_sync::{MemoryNetwork, PeerId};

/// Creation time of the first message a fixture signs.
pub const FIXTURE_EPOCH: u64 = 1_700_000_000_000;

/// One author: a keypair, a private ledger and a monotonic clock.
pub struct TestFixture {
    pub keypair: Keypair,
    pub ledger: Arc<Ledger<MemoryStore>>,
    clock: AtomicU64,
}

impl TestFixture {
    /// Create a new test fixture with a random keypair.
    pub fn new() -> Self {
        Self::from_keypair(Keypair::generate())
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::from_keypair(Keypair::from_seed(&seed))
    }

    fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair,
            ledger: Arc::new(Ledger::new(
                Arc::new(MemoryStore::new()),
                LedgerConfig::default(),
            )),
            clock: AtomicU64::new(FIXTURE_EPOCH),
        }
    }

    /// The author identifier: the hex public key.
    pub fn author(&self) -> String {
        self.keypair.author()
    }

    /// Sign a payload at the next tick of the fixture clock.
    pub fn sign(&self, payload: impl Into<Payload>) -> SignedMessage {
        let at = self.clock.fetch_add(1, Ordering::Relaxed);
        let message =
            Message::new(self.author(), at, payload).expect("fixture payloads stay within bounds");
        SignedMessage::sign(message, &self.keypair)
    }

    pub fn make_post(&self, body: &str) -> SignedMessage {
        self.sign(PostPayload::new(PostKind::Default).with_body(body))
    }

    pub fn make_comment(&self, parent: &MessageId, body: &str) -> SignedMessage {
        self.sign(
            PostPayload::new(PostKind::Comment)
                .with_body(body)
                .with_reference(parent.to_string()),
        )
    }

    pub fn make_moderation(&self, kind: ModerationKind, target: &MessageId) -> SignedMessage {
        self.sign(ModerationPayload::new(kind, target.to_string()))
    }

    pub fn make_connection(&self, kind: ConnectionKind, target: &str) -> SignedMessage {
        self.sign(ConnectionPayload::new(kind, target))
    }

    pub fn make_profile(&self, kind: ProfileKind, value: &str) -> SignedMessage {
        self.sign(ProfilePayload::new(kind, value))
    }

    /// Insert into this fixture's ledger.
    pub async fn insert(&self, signed: &SignedMessage) -> Option<StoreRecord> {
        self.ledger
            .insert(signed)
            .await
            .expect("fixture insert failed")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple test fixtures for multi-party tests.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[31] = 0xA5;
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// Nodes sharing one in-memory network. Node `i` has peer id `[i + 1; 32]`.
pub struct TestNetwork {
    pub network: Arc<MemoryNetwork>,
    pub nodes: Vec<Node>,
}

impl TestNetwork {
    /// Build `count` unstarted nodes on memory stores.
    pub async fn new(count: usize, config: NodeConfig) -> Self {
        let network = MemoryNetwork::new();
        let mut nodes = Vec::with_capacity(count);
        for i in 0..count {
            let peer = PeerId::from_bytes([i as u8 + 1; 32]);
            let transport = network.create_transport(peer).await;
            let node = Node::new(
                config.clone(),
                Arc::new(MemoryStore::new()),
                Arc::new(transport),
                Arc::new(Ed25519Verifier),
            )
            .expect("test network config is valid");
            nodes.push(node);
        }
        Self { network, nodes }
    }

    pub async fn start_all(&self) {
        for node in &self.nodes {
            node.start().await.expect("node start failed");
        }
    }

    pub async fn stop_all(&self) {
        for node in &self.nodes {
            if node.is_running().await {
                node.stop().await.expect("node stop failed");
            }
        }
    }

    pub async fn connect(&self, a: usize, b: usize) {
        self.network
            .connect(self.nodes[a].peer_id(), self.nodes[b].peer_id())
            .await
            .expect("connect failed");
    }

    /// Connect every pair of nodes.
    pub async fn connect_all(&self) {
        for a in 0..self.nodes.len() {
            for b in a + 1..self.nodes.len() {
                self.connect(a, b).await;
            }
        }
    }

    /// Wait until node `i` has completed a handshake with `expected` peers.
    pub async fn await_handshakes(&self, i: usize, expected: usize) -> bool {
        let node = &self.nodes[i];
        eventually(move || async move { node.known_peers().len() >= expected }).await
    }
}

/// Poll `check` every 10ms for up to two seconds.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
