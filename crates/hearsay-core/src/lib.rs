//! # Hearsay Core
//!
//! Pure primitives for hearsay: messages, the canonical hex codec, content
//! hashing and per-author Merkle trees.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Message`] - Immutable, content-addressed unit of social data
//! - [`SignedMessage`] - A message plus its author proof, as carried on the wire
//! - [`MessageHash`] - SHA-256 over the canonical encoding
//! - [`AuthTree`] - Fixed-depth Merkle tree over one author's message hashes
//!
//! ## Encoding
//!
//! Messages are encoded with a fixed-width hex TLV scheme. See [`codec`].

pub mod codec;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod message;
pub mod types;
pub mod validation;

pub use codec::{Decoder, Encoder};
pub use crypto::{
    Ed25519PublicKey, Ed25519Signature, Ed25519Verifier, Keypair, Proof, ProofScheme,
    ProofSigner, ProofVerifier,
};
pub use error::{CodecError, CryptoError, MerkleError, ValidationError};
pub use merkle::{hash_pair, AuthTree, ChildNodes, MerkleProof, NodeCheck, TreeHash};
pub use message::{
    ChatKind, ChatPayload, ConnectionKind, ConnectionPayload, GroupKind, GroupPayload, Header,
    Message, MessageKind, ModerationKind, ModerationPayload, Payload, PayloadCodec, PostKind,
    PostPayload, ProfileKind, ProfilePayload, RevertKind, RevertPayload, SignedMessage,
    CUSTOM_FIELD_PREFIX,
};
pub use types::{reference_hash, MessageHash, MessageId};
pub use validation::{validate_proof, validate_signed, validate_structure};
