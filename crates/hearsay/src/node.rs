//! The Node: one store, one tree cache, one transport.
//!
//! A started node serves the info and sync protocols, listens on the
//! gossip topic, reacts to peer events and runs a periodic sync sweep over
//! every (peer, author) pair.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use hearsay_core::{Message, ProofSigner, ProofVerifier, SignedMessage};
use hearsay_store::{Ledger, SqliteStore, Store, StoreRecord};
use hearsay_sync::{
    PeerEvent, PeerId, SyncEngine, SyncListener, SyncReport, SyncResponder, Transport,
};
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::events::{EventBus, NodeEvent};
use crate::gossip::Gossip;

/// Per-peer bookkeeping.
#[derive(Default)]
struct PeerTable {
    /// Authors each peer reported in its info handshake.
    authors: HashMap<PeerId, Vec<String>>,
    /// Sync branches currently running against each peer.
    in_flight: HashMap<PeerId, Vec<AbortHandle>>,
}

/// Forwards sync inserts to the event bus.
struct EventForwarder(Arc<EventBus>);

impl SyncListener for EventForwarder {
    fn on_new_message(&self, peer: &PeerId, record: &StoreRecord) {
        self.0.emit(NodeEvent::SyncNewMessage {
            peer: *peer,
            record: record.clone(),
        });
    }
}

/// State shared with the background tasks.
struct Shared {
    config: NodeConfig,
    ledger: Arc<Ledger<dyn Store>>,
    transport: Arc<dyn Transport>,
    events: Arc<EventBus>,
    gossip: Gossip<dyn Store, dyn Transport>,
    engine: Arc<SyncEngine<dyn Store, dyn Transport>>,
    peers: Mutex<PeerTable>,
}

impl Shared {
    fn peers(&self) -> MutexGuard<'_, PeerTable> {
        self.peers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn handshake(&self, peer: PeerId) -> Result<Vec<String>> {
        let info = self.engine.fetch_info(&peer).await?;
        info!(%peer, version = info.version, authors = info.users.len(), "peer handshake");
        self.peers().authors.insert(peer, info.users.clone());
        Ok(info.users)
    }

    /// Remember a running task against `peer` so a disconnect can abort it.
    fn track(&self, peer: PeerId, handle: AbortHandle) {
        let mut peers = self.peers();
        let in_flight = peers.in_flight.entry(peer).or_default();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    /// Handshakes run on `handshakes` so a slow peer never stalls the
    /// event loop.
    fn on_peer_event(self: &Arc<Self>, event: PeerEvent, handshakes: &mut JoinSet<()>) {
        match event {
            PeerEvent::Connected(peer) => {
                self.events.emit(NodeEvent::PeerConnect(peer));
                let shared = Arc::clone(self);
                let handle = handshakes.spawn(async move {
                    if let Err(e) = shared.handshake(peer).await {
                        warn!(%peer, error = %e, "peer handshake failed");
                    }
                });
                self.track(peer, handle);
            }
            PeerEvent::Disconnected(peer) => {
                let handles = {
                    let mut peers = self.peers();
                    peers.authors.remove(&peer);
                    peers.in_flight.remove(&peer).unwrap_or_default()
                };
                for handle in &handles {
                    handle.abort();
                }
                debug!(%peer, aborted = handles.len(), "peer disconnected");
            }
            PeerEvent::Discovered(peer) => {
                self.events.emit(NodeEvent::PeerDiscovery(peer));
            }
        }
    }

    /// Sync every author from every connected peer, one task per pair.
    async fn sweep(&self) -> Result<SyncReport> {
        let local: BTreeSet<String> = self.ledger.list_authors().await?.into_iter().collect();

        let mut targets = Vec::new();
        for peer in self.transport.connected_peers().await? {
            let known = self.peers().authors.get(&peer).cloned();
            let remote = match known {
                Some(authors) => authors,
                None => match self.handshake(peer).await {
                    Ok(authors) => authors,
                    Err(e) => {
                        warn!(%peer, error = %e, "skipping peer without handshake");
                        continue;
                    }
                },
            };
            let mut authors = local.clone();
            authors.extend(remote);
            targets.push((peer, authors));
        }

        let mut branches = JoinSet::new();
        for (peer, authors) in targets {
            for author in authors {
                let engine = Arc::clone(&self.engine);
                let handle = branches.spawn(async move {
                    let result = engine.sync_author(&peer, &author).await;
                    (peer, author, result)
                });
                self.track(peer, handle);
            }
        }

        let mut total = SyncReport::default();
        while let Some(joined) = branches.join_next().await {
            match joined {
                Ok((_, _, Ok(report))) => total.merge(&report),
                Ok((peer, author, Err(e))) => {
                    warn!(%peer, author, error = %e, "sync branch aborted");
                }
                Err(e) if e.is_cancelled() => debug!("sync branch cancelled"),
                Err(e) => warn!(error = %e, "sync branch panicked"),
            }
        }
        if total.received > 0 {
            info!(received = total.received, requests = total.requests, "sync sweep");
        }
        Ok(total)
    }
}

/// Background tasks of a started node.
struct Running {
    tasks: Vec<JoinHandle<()>>,
    protocols: Vec<&'static str>,
}

/// A hearsay node.
pub struct Node {
    shared: Arc<Shared>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl Node {
    /// Create a node over an existing store and transport.
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventBus::new(config.event_capacity));
        let ledger: Arc<Ledger<dyn Store>> = Arc::new(Ledger::new(store, config.ledger_config()));
        let engine = SyncEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&transport),
            config.sync_config(),
        )
        .with_listener(Arc::new(EventForwarder(Arc::clone(&events))))
        .with_verifier(Arc::clone(&verifier));
        let gossip = Gossip::new(
            Arc::clone(&ledger),
            Arc::clone(&transport),
            verifier,
            Arc::clone(&events),
            config.gossip_topic.clone(),
        );

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                ledger,
                transport,
                events,
                gossip,
                engine: Arc::new(engine),
                peers: Mutex::new(PeerTable::default()),
            }),
            running: tokio::sync::Mutex::new(None),
        })
    }

    /// Create a node backed by a SQLite file. Failing to open the store is
    /// fatal.
    pub fn open_sqlite(
        config: NodeConfig,
        path: impl AsRef<Path>,
        transport: Arc<dyn Transport>,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<Self> {
        let store = SqliteStore::open(path)?;
        Self::new(config, Arc::new(store), transport, verifier)
    }

    pub fn peer_id(&self) -> PeerId {
        self.shared.transport.local_peer_id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    /// Store plus tree cache. Queries go through `ledger().store()`.
    pub fn ledger(&self) -> &Arc<Ledger<dyn Store>> {
        &self.shared.ledger
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.shared.events.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Peers that completed an info handshake.
    pub fn known_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.shared.peers().authors.keys().copied().collect();
        peers.sort();
        peers
    }

    /// Register protocol handlers, join the gossip topic and start the
    /// background loops.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(NodeError::AlreadyStarted);
        }

        let shared = &self.shared;
        let responder = Arc::new(SyncResponder::new(Arc::clone(&shared.ledger)));
        let mut protocols = Vec::new();
        for (protocol, handler) in responder.handlers() {
            shared.transport.handle(protocol, handler).await?;
            protocols.push(protocol);
        }

        let mut frames = shared.transport.subscribe(&shared.config.gossip_topic).await?;
        let mut peer_events = shared.transport.peer_events().await?;

        let mut tasks = Vec::new();

        let gossip_shared = Arc::clone(shared);
        tasks.push(tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                gossip_shared
                    .gossip
                    .on_receive(frame.from, &frame.data)
                    .await;
            }
        }));

        let peer_shared = Arc::clone(shared);
        tasks.push(tokio::spawn(async move {
            // Dropped with this task, which aborts pending handshakes.
            let mut handshakes = JoinSet::new();
            loop {
                tokio::select! {
                    event = peer_events.recv() => match event {
                        Some(event) => peer_shared.on_peer_event(event, &mut handshakes),
                        None => break,
                    },
                    Some(_) = handshakes.join_next(), if !handshakes.is_empty() => {}
                }
            }
        }));

        let timer_shared = Arc::clone(shared);
        tasks.push(tokio::spawn(async move {
            let interval = timer_shared.config.sync_interval();
            loop {
                tokio::time::sleep(interval).await;
                // Re-armed only once the sweep has finished.
                if let Err(e) = timer_shared.sweep().await {
                    warn!(error = %e, "sync sweep failed");
                }
            }
        }));

        info!(peer = %self.peer_id(), topic = %shared.config.gossip_topic, "node started");
        *running = Some(Running { tasks, protocols });
        Ok(())
    }

    /// Stop the loops, deregister from the transport, close the event bus
    /// and the store.
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            return Err(NodeError::NotStarted);
        };
        let shared = &self.shared;

        for task in &running.tasks {
            task.abort();
        }
        let in_flight: Vec<AbortHandle> = {
            let mut peers = shared.peers();
            peers.authors.clear();
            peers.in_flight.drain().flat_map(|(_, handles)| handles).collect()
        };
        for handle in in_flight {
            handle.abort();
        }

        for protocol in running.protocols {
            shared.transport.unhandle(protocol).await?;
        }
        shared
            .transport
            .unsubscribe(&shared.config.gossip_topic)
            .await?;
        shared.events.shutdown();
        shared.ledger.close().await?;

        info!(peer = %self.peer_id(), "node stopped");
        Ok(())
    }

    /// Store a signed message locally and gossip it.
    pub async fn publish(&self, signed: &SignedMessage) -> Result<Option<StoreRecord>> {
        self.shared.gossip.publish(signed).await
    }

    /// Sign a message with `signer` and publish it.
    pub async fn publish_message<S: ProofSigner + ?Sized>(
        &self,
        message: Message,
        signer: &S,
    ) -> Result<Option<StoreRecord>> {
        self.publish(&SignedMessage::sign(message, signer)).await
    }

    /// Run one sync sweep now instead of waiting for the timer.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        if !self.is_running().await {
            return Err(NodeError::NotStarted);
        }
        self.shared.sweep().await
    }

    /// Sync one author from one peer.
    pub async fn sync_author(&self, peer: &PeerId, author: &str) -> Result<SyncReport> {
        Ok(self.shared.engine.sync_author(peer, author).await?)
    }
}
