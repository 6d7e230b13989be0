//! # Hearsay
//!
//! A peer-to-peer social-data node: signed, content-addressed messages
//! travel over gossip, and peers reconcile divergent histories by diffing
//! per-author Merkle trees.
//!
//! ## Overview
//!
//! - **Messages**: Immutable, canonically encoded, addressed by SHA-256
//! - **Store**: Insert-only, idempotent, with feed/thread/profile indices
//! - **Trees**: One fixed-depth SHA-256 Merkle tree per author
//! - **Sync**: Recursive tree diff over a request/response protocol
//! - **Gossip**: Verified publish/receive on a single topic
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hearsay::{Node, NodeConfig};
//! use hearsay::core::{Ed25519Verifier, Keypair, Message, PostKind, PostPayload, ProofSigner};
//! use hearsay::sync::{MemoryNetwork, PeerId};
//!
//! async fn example() -> hearsay::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let transport = network.create_transport(PeerId::random()).await;
//!     let node = Node::open_sqlite(
//!         NodeConfig::load("hearsay.toml")?,
//!         "hearsay.db",
//!         Arc::new(transport),
//!         Arc::new(Ed25519Verifier),
//!     )?;
//!     node.start().await?;
//!
//!     let keypair = Keypair::generate();
//!     let message = Message::new(
//!         keypair.author(),
//!         1_700_000_000_000,
//!         PostPayload::new(PostKind::Default).with_body("hello"),
//!     )?;
//!     node.publish_message(message, &keypair).await?;
//!
//!     node.stop().await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `hearsay::core` - Messages, codec, hashing, Merkle trees
//! - `hearsay::store` - Storage, indices and queries
//! - `hearsay::sync` - Transport capability and sync protocol

pub mod config;
pub mod error;
pub mod events;
pub mod gossip;
pub mod node;

// Re-export component crates
pub use hearsay_core as core;
pub use hearsay_store as store;
pub use hearsay_sync as sync;

// Re-export main types for convenience
pub use config::NodeConfig;
pub use error::{NodeError, Result};
pub use events::{EventBus, NodeEvent};
pub use gossip::{Delivery, Gossip};
pub use node::Node;

// Re-export commonly used types
pub use hearsay_core::{Message, MessageHash, MessageId, MessageKind, SignedMessage};
pub use hearsay_store::{QueryOptions, StoreExt, StoreRecord};
