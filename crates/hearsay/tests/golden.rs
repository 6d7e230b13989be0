//! Golden vectors for cross-implementation verification.
//!
//! Every implementation must produce identical:
//! - canonical encodings
//! - SHA-256 content hashes
//! - Merkle roots
//! - Ed25519 signatures (deterministic)

use hearsay::core::{
    AuthTree, Ed25519Verifier, Keypair, Message, NodeCheck, PostKind, PostPayload, ProofSigner,
    SignedMessage, TreeHash,
};
use hearsay_testkit::vectors::{
    all_vectors, reference_tree, verify_vector, BASE_TIME, TREE_ROOT_DEPTH4_1_TO_5,
};

#[test]
fn golden_message_vectors() {
    for vector in all_vectors() {
        if let Err(failure) = verify_vector(&vector) {
            panic!("{failure}");
        }
    }
}

#[test]
fn golden_vectors_cover_every_kind() {
    let mut kinds: Vec<_> = all_vectors().iter().map(|v| (v.build)().kind()).collect();
    kinds.sort();
    kinds.dedup();
    assert_eq!(kinds.len(), hearsay::MessageKind::ALL.len());
}

#[test]
fn golden_tree_root() {
    let tree = reference_tree();
    assert_eq!(tree.root().to_decimal(), TREE_ROOT_DEPTH4_1_TO_5);

    // Order matters: the same leaves shuffled give another root.
    let shuffled = AuthTree::from_leaves(4, [2, 1, 3, 4, 5].map(TreeHash::from_u64)).unwrap();
    assert_ne!(shuffled.root(), tree.root());
}

#[test]
fn golden_tree_proofs_and_node_checks() {
    let tree = reference_tree();
    for leaf in tree.leaves() {
        let proof = tree.proof(leaf).unwrap();
        assert!(tree.verify(&proof));
    }

    assert_eq!(
        tree.check_node(0, 0, &tree.root()),
        Some(NodeCheck::Match)
    );
    match tree.check_node(0, 0, &TreeHash::from_u64(1)) {
        Some(NodeCheck::Children(children)) => {
            assert_eq!(children.depth, 1);
            assert_eq!(children.indices, [0, 1]);
            assert_eq!(children.hashes[0], tree.node(1, 0).unwrap());
        }
        other => panic!("expected children, got {other:?}"),
    }
    assert_eq!(
        tree.check_node(3, 4, &TreeHash::from_u64(9)),
        Some(NodeCheck::Leaf)
    );
    assert_eq!(tree.check_node(0, 1, &tree.root()), None);
}

#[test]
fn signatures_are_deterministic() {
    let keypair = Keypair::from_seed(&[0x42; 32]);
    let message = Message::new(
        keypair.author(),
        BASE_TIME,
        PostPayload::new(PostKind::Default).with_body("hello"),
    )
    .unwrap();

    let a = SignedMessage::sign(message.clone(), &keypair);
    let b = SignedMessage::sign(message, &keypair);
    assert_eq!(a.to_bytes(), b.to_bytes());
    assert!(hearsay::core::validate_signed(&a, &Ed25519Verifier).is_ok());
}
