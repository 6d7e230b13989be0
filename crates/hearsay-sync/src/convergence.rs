//! Convergence verification for the sync protocol.
//!
//! Two nodes hold the same message set for an author exactly when their
//! trees for that author have the same root.

use std::collections::BTreeMap;

use hearsay_core::TreeHash;
use hearsay_store::{Ledger, Store};

use crate::error::Result;

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both nodes have identical state.
    Converged,
    /// Roots differ; another sync round is needed.
    Diverged { local: TreeHash, remote: TreeHash },
}

impl ConvergenceResult {
    /// Check if nodes have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare the local root for `author` against a peer's.
pub async fn verify_convergence<S: Store + ?Sized>(
    ledger: &Ledger<S>,
    author: &str,
    remote_root: &TreeHash,
) -> Result<ConvergenceResult> {
    let local = ledger.root(author).await?;
    if local == *remote_root {
        Ok(ConvergenceResult::Converged)
    } else {
        Ok(ConvergenceResult::Diverged {
            local,
            remote: *remote_root,
        })
    }
}

/// Root of every author the ledger holds.
pub async fn roots_by_author<S: Store + ?Sized>(
    ledger: &Ledger<S>,
) -> Result<BTreeMap<String, TreeHash>> {
    let mut roots = BTreeMap::new();
    for author in ledger.list_authors().await? {
        let root = ledger.root(&author).await?;
        roots.insert(author, root);
    }
    Ok(roots)
}

/// Batch verification of every author the remote reported.
pub async fn verify_all_authors<S: Store + ?Sized>(
    ledger: &Ledger<S>,
    remote: &BTreeMap<String, TreeHash>,
) -> Result<Vec<(String, ConvergenceResult)>> {
    let mut results = Vec::with_capacity(remote.len());
    for (author, root) in remote {
        let result = verify_convergence(ledger, author, root).await?;
        results.push((author.clone(), result));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{SyncConfig, SyncEngine, SyncResponder};
    use crate::transport::memory::MemoryNetwork;
    use crate::transport::{PeerId, Transport};
    use hearsay_core::{Keypair, Message, PostKind, PostPayload, ProofSigner, SignedMessage};
    use hearsay_store::{LedgerConfig, MemoryStore};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn ledger() -> Arc<Ledger<MemoryStore>> {
        Arc::new(Ledger::new(
            Arc::new(MemoryStore::new()),
            LedgerConfig {
                depth: 6,
                ..Default::default()
            },
        ))
    }

    fn post(keypair: &Keypair, at: u64) -> SignedMessage {
        let message = Message::new(
            keypair.author(),
            at,
            PostPayload::new(PostKind::Default).with_body(format!("post {at}")),
        )
        .unwrap();
        SignedMessage::sign(message, keypair)
    }

    #[tokio::test]
    async fn test_diverged_then_converged() {
        let a = ledger();
        let b = ledger();
        let keypair = Keypair::from_seed(&[3; 32]);
        let author = keypair.author();
        a.insert(&post(&keypair, 1)).await.unwrap();

        let remote = b.root(&author).await.unwrap();
        assert!(!verify_convergence(&a, &author, &remote)
            .await
            .unwrap()
            .is_converged());

        b.insert(&post(&keypair, 1)).await.unwrap();
        let remote = b.root(&author).await.unwrap();
        assert!(verify_convergence(&a, &author, &remote)
            .await
            .unwrap()
            .is_converged());
    }

    async fn sync_pair(split: Vec<(u64, u8)>) -> (BTreeMap<String, TreeHash>, BTreeMap<String, TreeHash>) {
        let network = MemoryNetwork::new();
        let (id_a, id_b) = (PeerId::from_bytes([0xA; 32]), PeerId::from_bytes([0xB; 32]));
        let (a, b) = (ledger(), ledger());
        let transport_a = Arc::new(network.create_transport(id_a).await);
        let transport_b = Arc::new(network.create_transport(id_b).await);
        for (ledger, transport) in [(&a, &transport_a), (&b, &transport_b)] {
            let responder = Arc::new(SyncResponder::new(Arc::clone(ledger)));
            for (protocol, handler) in responder.handlers() {
                transport.handle(protocol, handler).await.unwrap();
            }
        }
        network.connect(id_a, id_b).await.unwrap();

        let keypairs = [Keypair::from_seed(&[1; 32]), Keypair::from_seed(&[2; 32])];
        for (at, placement) in split {
            let signed = post(&keypairs[(at % 2) as usize], at);
            if placement != 1 {
                a.insert(&signed).await.unwrap();
            }
            if placement != 0 {
                b.insert(&signed).await.unwrap();
            }
        }

        let engine_a = SyncEngine::new(a.clone(), transport_a, SyncConfig::default());
        let engine_b = SyncEngine::new(b.clone(), transport_b, SyncConfig::default());
        for keypair in &keypairs {
            engine_a.sync_author(&id_b, &keypair.author()).await.unwrap();
            engine_b.sync_author(&id_a, &keypair.author()).await.unwrap();
        }

        (
            roots_by_author(&a).await.unwrap(),
            roots_by_author(&b).await.unwrap(),
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        /// Any split of a message set converges after one sync each way.
        #[test]
        fn prop_bidirectional_sync_converges(
            split in proptest::collection::btree_map(0u64..1_000, 0u8..3, 0..20)
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (a, b) = runtime.block_on(sync_pair(split.into_iter().collect()));
            prop_assert_eq!(a, b);
        }
    }
}
