//! # Hearsay Sync
//!
//! Anti-entropy for hearsay: two peers converge on the same per-author
//! message sets by diffing their Merkle trees over the network.
//!
//! ## Key Properties
//!
//! - **Idempotent**: re-syncing a converged pair costs one request
//! - **Commutative**: arrival order does not affect the final trees
//! - **Bounded**: a branch never issues more than `request_budget` requests
//! - **Bandwidth-efficient**: only mismatched subtrees are walked
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hearsay_store::{Ledger, LedgerConfig, MemoryStore};
//! use hearsay_sync::{MemoryNetwork, PeerId, SyncConfig, SyncEngine};
//!
//! async fn example() -> hearsay_sync::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let transport = Arc::new(network.create_transport(PeerId::random()).await);
//!     let ledger = Arc::new(Ledger::new(Arc::new(MemoryStore::new()), LedgerConfig::default()));
//!
//!     let engine = SyncEngine::new(ledger, transport, SyncConfig::default());
//!     let peer = PeerId::random();
//!     for author in engine.fetch_info(&peer).await?.users {
//!         let report = engine.sync_author(&peer, &author).await?;
//!         println!("{author}: {} new", report.received);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Initiator                                   Responder
//!   |-- /hearsay/v1/info {} ------------------->|
//!   |<------------------- {version, users} -----|
//!   |-- /hearsay/v1/sync {user, root, 0, 0} --->|
//!   |<------------ {children} | {messages} | {} |
//!   |   ... one request per mismatched node ... |
//! ```

pub mod convergence;
pub mod error;
pub mod messages;
pub mod protocol;
pub mod transport;

pub use convergence::{roots_by_author, verify_all_authors, verify_convergence, ConvergenceResult};
pub use error::{Result, SyncError};
pub use messages::{
    InfoResponse, SyncRequest, SyncResponse, INFO_PROTOCOL, PROTOCOL_VERSION, SYNC_PROTOCOL,
};
pub use protocol::{SyncConfig, SyncEngine, SyncListener, SyncReport, SyncResponder};
pub use transport::{
    memory::MemoryNetwork, memory::MemoryTransport, GossipFrame, PeerEvent, PeerId,
    ProtocolHandler, Transport,
};
