//! Proof capability traits and the Ed25519 implementation.
//!
//! Signing and verification are external collaborators: the rest of the
//! system only sees [`ProofSigner`] and [`ProofVerifier`]. Ed25519 is provided
//! so nodes and tests have a working scheme out of the box; in that scheme an
//! author identifier is the hex-encoded public key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CodecError, CryptoError};
use crate::types::MessageHash;

/// Bound on the hex length of proof data on the wire.
pub const MAX_PROOF_LEN: u64 = 0xFFFF;

/// The proof system a [`Proof`] was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ProofScheme {
    /// Plain signature by the author's key.
    Signature = 0x00,
    /// Semaphore group-membership proof.
    Semaphore = 0x01,
    /// Rate-limiting nullifier proof.
    Rln = 0x02,
}

impl ProofScheme {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Signature),
            0x01 => Some(Self::Semaphore),
            0x02 => Some(Self::Rln),
            _ => None,
        }
    }
}

/// An author's proof over a message hash. Travels beside the message, never
/// inside the hashed encoding.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    scheme: ProofScheme,
    #[serde(with = "hex_bytes")]
    data: Vec<u8>,
}

impl Proof {
    /// Create a proof, rejecting data too large for the wire format.
    pub fn new(scheme: ProofScheme, data: Vec<u8>) -> Result<Self, CodecError> {
        if (data.len() as u64) * 2 > MAX_PROOF_LEN {
            return Err(CodecError::Encoding(format!(
                "proof: {} bytes exceeds maximum {}",
                data.len(),
                MAX_PROOF_LEN / 2
            )));
        }
        Ok(Self { scheme, data })
    }

    pub fn scheme(&self) -> ProofScheme {
        self.scheme
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.data);
        write!(f, "Proof({:?}, {}...)", self.scheme, &hex[..hex.len().min(16)])
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Produces proofs for messages by one author.
pub trait ProofSigner: Send + Sync {
    /// The author identifier proofs from this signer verify against.
    fn author(&self) -> String;

    /// Sign a message hash.
    fn sign(&self, hash: &MessageHash) -> Proof;
}

/// Checks a proof against a message hash and the declared author.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, hash: &MessageHash, proof: &Proof, author: &str) -> bool;
}

/// A 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse an author identifier.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidPublicKey)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(arr))
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = Signature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Pub({})", &self.to_hex()[..16])
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(arr))
    }

    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", &hex::encode(self.0)[..16])
    }
}

/// An Ed25519 keypair acting as one author's signer.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign arbitrary bytes.
    pub fn sign_bytes(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl ProofSigner for Keypair {
    fn author(&self) -> String {
        self.public_key().to_hex()
    }

    fn sign(&self, hash: &MessageHash) -> Proof {
        Proof {
            scheme: ProofScheme::Signature,
            data: self.sign_bytes(hash.as_bytes()).0.to_vec(),
        }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

/// Verifies [`ProofScheme::Signature`] proofs where the author is a hex
/// Ed25519 public key. Other schemes never verify.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl ProofVerifier for Ed25519Verifier {
    fn verify(&self, hash: &MessageHash, proof: &Proof, author: &str) -> bool {
        if proof.scheme() != ProofScheme::Signature {
            return false;
        }
        let Ok(key) = Ed25519PublicKey::from_hex(author) else {
            return false;
        };
        let Ok(signature) = Ed25519Signature::from_slice(proof.data()) else {
            return false;
        };
        key.verify(hash.as_bytes(), &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign_bytes(message);

        keypair
            .public_key()
            .verify(message, &signature)
            .expect("valid signature should verify");
        assert!(keypair.public_key().verify(b"hello worlD", &signature).is_err());
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let kp1 = Keypair::from_seed(&[0x42; 32]);
        let kp2 = Keypair::from_seed(&[0x42; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.author(), kp2.author());
    }

    #[test]
    fn test_verifier_accepts_own_proof() {
        let keypair = Keypair::from_seed(&[0x01; 32]);
        let hash = MessageHash::digest(b"content");
        let proof = keypair.sign(&hash);
        assert!(Ed25519Verifier.verify(&hash, &proof, &keypair.author()));
    }

    #[test]
    fn test_verifier_rejects_wrong_author() {
        let alice = Keypair::from_seed(&[0x01; 32]);
        let bob = Keypair::from_seed(&[0x02; 32]);
        let hash = MessageHash::digest(b"content");
        let proof = alice.sign(&hash);
        assert!(!Ed25519Verifier.verify(&hash, &proof, &bob.author()));
        assert!(!Ed25519Verifier.verify(&hash, &proof, "not-a-key"));
    }

    #[test]
    fn test_verifier_rejects_other_hash_and_scheme() {
        let keypair = Keypair::from_seed(&[0x03; 32]);
        let hash = MessageHash::digest(b"content");
        let proof = keypair.sign(&hash);
        assert!(!Ed25519Verifier.verify(
            &MessageHash::digest(b"other"),
            &proof,
            &keypair.author()
        ));

        let relabeled = Proof::new(ProofScheme::Semaphore, proof.data().to_vec()).unwrap();
        assert!(!Ed25519Verifier.verify(&hash, &relabeled, &keypair.author()));
    }

    #[test]
    fn test_proof_size_bound() {
        assert!(Proof::new(ProofScheme::Rln, vec![0; 32767]).is_ok());
        assert!(Proof::new(ProofScheme::Rln, vec![0; 32768]).is_err());
    }

    #[test]
    fn test_scheme_roundtrip() {
        for scheme in [ProofScheme::Signature, ProofScheme::Semaphore, ProofScheme::Rln] {
            assert_eq!(ProofScheme::from_u8(scheme.to_u8()), Some(scheme));
        }
        assert_eq!(ProofScheme::from_u8(0x7f), None);
    }
}
