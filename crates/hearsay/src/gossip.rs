//! Gossip layer: validate, store and publish messages on one topic.
//!
//! The wire form of a gossiped message is [`SignedMessage::to_bytes`].

use std::sync::Arc;

use bytes::Bytes;
use hearsay_core::{validate_signed, ProofVerifier, SignedMessage};
use hearsay_store::{Ledger, Store, StoreRecord};
use hearsay_sync::{PeerId, Transport};
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{EventBus, NodeEvent};

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Verified and newly stored.
    Accepted(StoreRecord),
    /// Verified, already stored.
    Duplicate,
    /// Missing or invalid proof, or a structural error.
    Rejected(String),
    /// Undecodable bytes or a local storage failure.
    Dropped,
}

pub struct Gossip<S: Store + ?Sized, T: Transport + ?Sized> {
    ledger: Arc<Ledger<S>>,
    transport: Arc<T>,
    verifier: Arc<dyn ProofVerifier>,
    events: Arc<EventBus>,
    topic: String,
}

impl<S: Store + ?Sized, T: Transport + ?Sized> Gossip<S, T> {
    pub fn new(
        ledger: Arc<Ledger<S>>,
        transport: Arc<T>,
        verifier: Arc<dyn ProofVerifier>,
        events: Arc<EventBus>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            transport,
            verifier,
            events,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Store a locally authored message and gossip it.
    ///
    /// The proof must verify. Returns `None` when the message was already
    /// stored; it is published either way.
    pub async fn publish(&self, signed: &SignedMessage) -> Result<Option<StoreRecord>> {
        validate_signed(signed, self.verifier.as_ref())?;
        let record = self.ledger.insert(signed).await?;
        self.transport
            .publish(&self.topic, Bytes::from(signed.to_bytes()))
            .await?;
        debug!(hash = %signed.hash(), topic = %self.topic, "published");
        Ok(record)
    }

    /// Handle one frame from the topic. Never fails: problems are logged,
    /// and proof failures become a `gossip:rejected` event.
    pub async fn on_receive(&self, from: PeerId, data: &[u8]) -> Delivery {
        let signed = match SignedMessage::from_bytes(data) {
            Ok(signed) => signed,
            Err(e) => {
                debug!(%from, error = %e, "dropping undecodable gossip");
                return Delivery::Dropped;
            }
        };

        if let Err(e) = validate_signed(&signed, self.verifier.as_ref()) {
            warn!(%from, hash = %signed.hash(), error = %e, "rejected gossip");
            self.events.emit(NodeEvent::GossipRejected {
                from,
                hash: signed.hash(),
                reason: e.to_string(),
            });
            return Delivery::Rejected(e.to_string());
        }

        match self.ledger.insert(&signed).await {
            Ok(Some(record)) => {
                self.events.emit(NodeEvent::GossipAccepted {
                    from,
                    record: record.clone(),
                });
                Delivery::Accepted(record)
            }
            Ok(None) => Delivery::Duplicate,
            Err(e) => {
                warn!(%from, hash = %signed.hash(), error = %e, "failed to store gossip");
                Delivery::Dropped
            }
        }
    }
}
