//! Message validation: structural checks and proof verification.

use crate::crypto::ProofVerifier;
use crate::error::ValidationError;
use crate::message::{Message, Payload, SignedMessage};

/// Validate a signed message: structure first, then the proof.
pub fn validate_signed<V: ProofVerifier + ?Sized>(
    signed: &SignedMessage,
    verifier: &V,
) -> Result<(), ValidationError> {
    validate_structure(signed.message())?;
    validate_proof(signed, verifier)
}

/// Check that the message carries a proof that verifies for its author.
pub fn validate_proof<V: ProofVerifier + ?Sized>(
    signed: &SignedMessage,
    verifier: &V,
) -> Result<(), ValidationError> {
    let proof = signed.proof().ok_or(ValidationError::MissingProof)?;
    let message = signed.message();
    if !verifier.verify(&message.hash(), proof, message.author()) {
        return Err(ValidationError::ProofInvalid {
            author: message.author().to_string(),
        });
    }
    Ok(())
}

/// Structural rules the codec cannot express: required strings must be
/// non-empty.
pub fn validate_structure(message: &Message) -> Result<(), ValidationError> {
    if message.author().is_empty() {
        return Err(ValidationError::StructuralError("empty author".into()));
    }

    let missing = match message.payload() {
        Payload::Moderation(p) if p.reference.is_empty() => Some("reference"),
        Payload::Connection(p) if p.target.is_empty() => Some("target"),
        Payload::Chat(p) if p.destination.is_empty() => Some("destination"),
        Payload::Group(p) if p.group_id.is_empty() => Some("group_id"),
        Payload::Revert(p) if p.reference.is_empty() => Some("reference"),
        _ => None,
    };
    if let Some(field) = missing {
        return Err(ValidationError::StructuralError(format!(
            "{} message requires a non-empty {field}",
            message.kind()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Ed25519Verifier, Keypair, Proof, ProofScheme, ProofSigner};
    use crate::message::{ConnectionKind, ConnectionPayload, PostKind, PostPayload};

    fn post(author: &str) -> Message {
        Message::new(author, 1, PostPayload::new(PostKind::Default).with_body("hi")).unwrap()
    }

    #[test]
    fn test_valid_signed_message() {
        let keypair = Keypair::from_seed(&[1; 32]);
        let signed = SignedMessage::sign(post(&keypair.author()), &keypair);
        assert!(validate_signed(&signed, &Ed25519Verifier).is_ok());
    }

    #[test]
    fn test_missing_proof() {
        let signed = SignedMessage::unsigned(post("alice"));
        assert_eq!(
            validate_proof(&signed, &Ed25519Verifier),
            Err(ValidationError::MissingProof)
        );
    }

    #[test]
    fn test_forged_proof() {
        let keypair = Keypair::from_seed(&[1; 32]);
        let forged = Proof::new(ProofScheme::Signature, vec![0u8; 64]).unwrap();
        let signed = SignedMessage::new(post(&keypair.author()), Some(forged));
        assert!(matches!(
            validate_proof(&signed, &Ed25519Verifier),
            Err(ValidationError::ProofInvalid { .. })
        ));
    }

    #[test]
    fn test_proof_by_other_author() {
        let alice = Keypair::from_seed(&[1; 32]);
        let mallory = Keypair::from_seed(&[2; 32]);
        let message = post(&alice.author());
        let proof = mallory.sign_bytes(message.hash().as_bytes());
        let proof = Proof::new(ProofScheme::Signature, proof.as_bytes().to_vec()).unwrap();
        let signed = SignedMessage::new(message, Some(proof));
        assert!(validate_proof(&signed, &Ed25519Verifier).is_err());
    }

    #[test]
    fn test_structure_rules() {
        assert!(validate_structure(&post("")).is_err());
        let edge = Message::new("alice", 1, ConnectionPayload::new(ConnectionKind::Follow, ""))
            .unwrap();
        assert!(matches!(
            validate_structure(&edge),
            Err(ValidationError::StructuralError(_))
        ));
    }
}
