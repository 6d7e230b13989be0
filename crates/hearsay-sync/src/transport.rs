//! Transport abstraction: pubsub, request/response protocols and peer events.
//!
//! The node only needs four capabilities from the network substrate:
//! publish to a topic, subscribe to a topic, dial a protocol on a peer and
//! register a protocol handler. Discovery, dialing and encryption live
//! behind this trait.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, SyncError};

/// Unique identifier for a peer on the network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random peer id.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex()[..12])
    }
}

/// One pubsub delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipFrame {
    /// The peer that forwarded the frame.
    pub from: PeerId,
    pub topic: String,
    pub data: Bytes,
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    Discovered(PeerId),
}

/// Serves one request/response protocol.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    async fn handle(&self, from: PeerId, request: Bytes) -> Result<Bytes>;
}

/// Network capability consumed by the node.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the local peer's identity.
    fn local_peer_id(&self) -> PeerId;

    /// Publish to every subscribed peer.
    async fn publish(&self, topic: &str, data: Bytes) -> Result<()>;

    /// Subscribe to a topic. A second subscription replaces the first.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<GossipFrame>>;

    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Send one request on a protocol and wait for the response.
    async fn dial_protocol(&self, peer: &PeerId, protocol: &str, request: Bytes) -> Result<Bytes>;

    /// Register the handler for a protocol id.
    async fn handle(&self, protocol: &str, handler: Arc<dyn ProtocolHandler>) -> Result<()>;

    async fn unhandle(&self, protocol: &str) -> Result<()>;

    /// Stream of connection events. A second call replaces the first stream.
    async fn peer_events(&self) -> Result<mpsc::Receiver<PeerEvent>>;

    /// List currently connected peers.
    async fn connected_peers(&self) -> Result<Vec<PeerId>>;
}

/// A simple in-memory transport for testing.
///
/// Peers are linked explicitly with [`MemoryNetwork::connect`]; publishes
/// reach directly connected subscribers only.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use tokio::sync::RwLock;

    const CHANNEL_CAPACITY: usize = 1000;

    #[derive(Default)]
    struct PeerSlot {
        links: RwLock<HashSet<PeerId>>,
        handlers: RwLock<HashMap<String, Arc<dyn ProtocolHandler>>>,
        topics: RwLock<HashMap<String, mpsc::Sender<GossipFrame>>>,
        events: RwLock<Option<mpsc::Sender<PeerEvent>>>,
    }

    impl PeerSlot {
        async fn notify(&self, event: PeerEvent) {
            let sender = self.events.read().await.clone();
            if let Some(sender) = sender {
                // A node that stopped listening is not an error.
                let _ = sender.send(event).await;
            }
        }
    }

    /// Shared state for the memory transport network.
    #[derive(Default)]
    pub struct MemoryNetwork {
        peers: RwLock<HashMap<PeerId, Arc<PeerSlot>>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Create a transport attached to this network.
        pub async fn create_transport(self: &Arc<Self>, peer_id: PeerId) -> MemoryTransport {
            let slot = Arc::new(PeerSlot::default());
            self.peers.write().await.insert(peer_id, Arc::clone(&slot));
            MemoryTransport {
                peer_id,
                network: Arc::clone(self),
                slot,
            }
        }

        async fn slot(&self, peer: &PeerId) -> Option<Arc<PeerSlot>> {
            self.peers.read().await.get(peer).cloned()
        }

        /// Link two peers and notify both.
        pub async fn connect(&self, a: PeerId, b: PeerId) -> Result<()> {
            let (slot_a, slot_b) = self.pair(&a, &b).await?;
            let fresh = slot_a.links.write().await.insert(b);
            slot_b.links.write().await.insert(a);
            if fresh {
                slot_a.notify(PeerEvent::Connected(b)).await;
                slot_b.notify(PeerEvent::Connected(a)).await;
            }
            Ok(())
        }

        /// Unlink two peers and notify both.
        pub async fn disconnect(&self, a: PeerId, b: PeerId) -> Result<()> {
            let (slot_a, slot_b) = self.pair(&a, &b).await?;
            let existed = slot_a.links.write().await.remove(&b);
            slot_b.links.write().await.remove(&a);
            if existed {
                slot_a.notify(PeerEvent::Disconnected(b)).await;
                slot_b.notify(PeerEvent::Disconnected(a)).await;
            }
            Ok(())
        }

        /// Tell `to` that `peer` exists without linking them.
        pub async fn announce(&self, to: PeerId, peer: PeerId) -> Result<()> {
            let slot = self
                .slot(&to)
                .await
                .ok_or(SyncError::PeerNotConnected(to))?;
            slot.notify(PeerEvent::Discovered(peer)).await;
            Ok(())
        }

        async fn pair(&self, a: &PeerId, b: &PeerId) -> Result<(Arc<PeerSlot>, Arc<PeerSlot>)> {
            let slot_a = self.slot(a).await.ok_or(SyncError::PeerNotConnected(*a))?;
            let slot_b = self.slot(b).await.ok_or(SyncError::PeerNotConnected(*b))?;
            Ok((slot_a, slot_b))
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        peer_id: PeerId,
        network: Arc<MemoryNetwork>,
        slot: Arc<PeerSlot>,
    }

    impl MemoryTransport {
        pub fn network(&self) -> &Arc<MemoryNetwork> {
            &self.network
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        fn local_peer_id(&self) -> PeerId {
            self.peer_id
        }

        async fn publish(&self, topic: &str, data: Bytes) -> Result<()> {
            let links: Vec<PeerId> = self.slot.links.read().await.iter().copied().collect();
            for peer in links {
                let Some(slot) = self.network.slot(&peer).await else {
                    continue;
                };
                let sender = slot.topics.read().await.get(topic).cloned();
                if let Some(sender) = sender {
                    let frame = GossipFrame {
                        from: self.peer_id,
                        topic: topic.to_string(),
                        data: data.clone(),
                    };
                    // Ignore errors for publish (some peers may have stopped)
                    let _ = sender.send(frame).await;
                }
            }
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<GossipFrame>> {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            self.slot.topics.write().await.insert(topic.to_string(), tx);
            Ok(rx)
        }

        async fn unsubscribe(&self, topic: &str) -> Result<()> {
            self.slot.topics.write().await.remove(topic);
            Ok(())
        }

        async fn dial_protocol(
            &self,
            peer: &PeerId,
            protocol: &str,
            request: Bytes,
        ) -> Result<Bytes> {
            if !self.slot.links.read().await.contains(peer) {
                return Err(SyncError::PeerNotConnected(*peer));
            }
            let slot = self
                .network
                .slot(peer)
                .await
                .ok_or(SyncError::PeerNotConnected(*peer))?;
            let handler = slot
                .handlers
                .read()
                .await
                .get(protocol)
                .cloned()
                .ok_or_else(|| SyncError::NoHandler(protocol.to_string()))?;
            handler
                .handle(self.peer_id, request)
                .await
                .map_err(|e| SyncError::Transport(format!("{protocol} on {peer}: {e}")))
        }

        async fn handle(&self, protocol: &str, handler: Arc<dyn ProtocolHandler>) -> Result<()> {
            self.slot
                .handlers
                .write()
                .await
                .insert(protocol.to_string(), handler);
            Ok(())
        }

        async fn unhandle(&self, protocol: &str) -> Result<()> {
            self.slot.handlers.write().await.remove(protocol);
            Ok(())
        }

        async fn peer_events(&self) -> Result<mpsc::Receiver<PeerEvent>> {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            *self.slot.events.write().await = Some(tx);
            Ok(rx)
        }

        async fn connected_peers(&self) -> Result<Vec<PeerId>> {
            let mut peers: Vec<PeerId> = self.slot.links.read().await.iter().copied().collect();
            peers.sort();
            Ok(peers)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;

    struct Echo;

    #[async_trait]
    impl ProtocolHandler for Echo {
        async fn handle(&self, _from: PeerId, request: Bytes) -> Result<Bytes> {
            Ok(request)
        }
    }

    #[tokio::test]
    async fn test_memory_transport_publish() {
        let network = MemoryNetwork::new();

        let node_a = PeerId::from_bytes([0xAA; 32]);
        let node_b = PeerId::from_bytes([0xBB; 32]);
        let node_c = PeerId::from_bytes([0xCC; 32]);

        let transport_a = network.create_transport(node_a).await;
        let transport_b = network.create_transport(node_b).await;
        let transport_c = network.create_transport(node_c).await;

        let mut rx_b = transport_b.subscribe("t").await.unwrap();
        let mut rx_c = transport_c.subscribe("t").await.unwrap();
        network.connect(node_a, node_b).await.unwrap();

        transport_a
            .publish("t", Bytes::from_static(b"hi"))
            .await
            .unwrap();

        let frame = rx_b.recv().await.unwrap();
        assert_eq!(frame.from, node_a);
        assert_eq!(frame.data, Bytes::from_static(b"hi"));
        // C is not linked to A
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dial_protocol() {
        let network = MemoryNetwork::new();
        let node_a = PeerId::from_bytes([0xAA; 32]);
        let node_b = PeerId::from_bytes([0xBB; 32]);
        let transport_a = network.create_transport(node_a).await;
        let transport_b = network.create_transport(node_b).await;

        let request = Bytes::from_static(b"ping");
        assert!(matches!(
            transport_a.dial_protocol(&node_b, "/echo", request.clone()).await,
            Err(SyncError::PeerNotConnected(_))
        ));

        network.connect(node_a, node_b).await.unwrap();
        assert!(matches!(
            transport_a.dial_protocol(&node_b, "/echo", request.clone()).await,
            Err(SyncError::NoHandler(_))
        ));

        transport_b.handle("/echo", Arc::new(Echo)).await.unwrap();
        let response = transport_a
            .dial_protocol(&node_b, "/echo", request.clone())
            .await
            .unwrap();
        assert_eq!(response, request);
    }

    #[tokio::test]
    async fn test_peer_events() {
        let network = MemoryNetwork::new();
        let node_a = PeerId::from_bytes([0xAA; 32]);
        let node_b = PeerId::from_bytes([0xBB; 32]);
        let transport_a = network.create_transport(node_a).await;
        let _transport_b = network.create_transport(node_b).await;

        let mut events = transport_a.peer_events().await.unwrap();
        network.connect(node_a, node_b).await.unwrap();
        network.disconnect(node_a, node_b).await.unwrap();

        assert_eq!(events.recv().await, Some(PeerEvent::Connected(node_b)));
        assert_eq!(events.recv().await, Some(PeerEvent::Disconnected(node_b)));
        assert!(transport_a.connected_peers().await.unwrap().is_empty());
    }
}
