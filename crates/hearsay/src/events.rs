//! Typed node events.
//!
//! One bus per node. Subscribers get every event emitted after they
//! subscribe; a subscriber that falls more than `event_capacity` behind
//! sees `RecvError::Lagged` and resumes from the oldest retained event.

use std::sync::Mutex;

use hearsay_core::MessageHash;
use hearsay_store::StoreRecord;
use hearsay_sync::PeerId;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    PeerConnect(PeerId),
    PeerDiscovery(PeerId),
    /// A gossiped message was verified and newly stored.
    GossipAccepted { from: PeerId, record: StoreRecord },
    /// A gossiped message failed proof verification.
    GossipRejected {
        from: PeerId,
        hash: MessageHash,
        reason: String,
    },
    /// Sync stored a message we did not have.
    SyncNewMessage { peer: PeerId, record: StoreRecord },
}

impl NodeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NodeEvent::PeerConnect(_) => "peer:connect",
            NodeEvent::PeerDiscovery(_) => "peer:discovery",
            NodeEvent::GossipAccepted { .. } => "gossip:accepted",
            NodeEvent::GossipRejected { .. } => "gossip:rejected",
            NodeEvent::SyncNewMessage { .. } => "sync:new_message",
        }
    }
}

pub struct EventBus {
    sender: Mutex<Option<broadcast::Sender<NodeEvent>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            capacity,
        }
    }

    fn sender(&self) -> Option<broadcast::Sender<NodeEvent>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// After [`EventBus::shutdown`] the receiver is already closed.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        match self.sender() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(self.capacity).1,
        }
    }

    /// Returns how many subscribers saw the event.
    pub fn emit(&self, event: NodeEvent) -> usize {
        match self.sender() {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop the sender so every subscriber observes closure.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_emit_and_shutdown() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let peer = PeerId::from_bytes([1; 32]);

        assert_eq!(bus.emit(NodeEvent::PeerConnect(peer)), 1);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "peer:connect");

        bus.shutdown();
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
        assert!(matches!(bus.subscribe().recv().await, Err(RecvError::Closed)));
        assert_eq!(bus.emit(NodeEvent::PeerDiscovery(peer)), 0);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.emit(NodeEvent::PeerDiscovery(PeerId::from_bytes([1; 32]))), 0);
    }
}
