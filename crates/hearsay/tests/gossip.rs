//! Gossip between started nodes.

use std::time::Duration;

use anyhow::Result;
use hearsay::core::{Proof, ProofScheme, SignedMessage};
use hearsay::sync::{PeerId, Transport};
use hearsay::{NodeConfig, NodeEvent};
use hearsay_testkit::{TestFixture, TestNetwork};
use tokio::sync::broadcast::Receiver;
use tokio::time::timeout;

fn config() -> NodeConfig {
    NodeConfig {
        sync_interval_ms: 3_600_000,
        ..Default::default()
    }
}

/// Next event with the given name, skipping others.
async fn next_named(events: &mut Receiver<NodeEvent>, name: &str) -> Option<NodeEvent> {
    timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await {
                Ok(event) if event.name() == name => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

#[tokio::test]
async fn published_message_reaches_peer() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let net = TestNetwork::new(2, config()).await;
    net.start_all().await;
    net.connect(0, 1).await;

    let mut events = net.nodes[1].subscribe();
    let fixture = TestFixture::new();
    let post = fixture.make_post("over the wire");
    assert!(net.nodes[0].publish(&post).await?.is_some());

    match next_named(&mut events, "gossip:accepted").await {
        Some(NodeEvent::GossipAccepted { from, record }) => {
            assert_eq!(from, net.nodes[0].peer_id());
            assert_eq!(record.hash, post.hash());
        }
        other => panic!("expected gossip:accepted, got {other:?}"),
    }
    assert!(net.nodes[1].ledger().store().has(&post.hash()).await?);

    net.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn forged_proof_rejected_once_and_not_stored() -> Result<()> {
    let net = TestNetwork::new(2, config()).await;
    net.start_all().await;
    net.connect(0, 1).await;

    let mut events = net.nodes[1].subscribe();
    let fixture = TestFixture::new();
    let honest = fixture.make_post("honest");
    let forged = SignedMessage::new(
        honest.message().clone(),
        Some(Proof::new(ProofScheme::Signature, vec![7; 64])?),
    );

    // Bypass the publisher's own check by writing straight to the topic.
    let transport = net.network.create_transport(PeerId::random()).await;
    net.network
        .connect(transport.local_peer_id(), net.nodes[1].peer_id())
        .await?;
    transport
        .publish(&config().gossip_topic, bytes::Bytes::from(forged.to_bytes()))
        .await?;

    match next_named(&mut events, "gossip:rejected").await {
        Some(NodeEvent::GossipRejected { hash, .. }) => assert_eq!(hash, forged.hash()),
        other => panic!("expected gossip:rejected, got {other:?}"),
    }
    assert!(next_named(&mut events, "gossip:rejected").await.is_none());
    assert!(!net.nodes[1].ledger().store().has(&forged.hash()).await?);

    net.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn duplicate_delivery_accepted_once() -> Result<()> {
    let net = TestNetwork::new(2, config()).await;
    net.start_all().await;
    net.connect(0, 1).await;

    let mut events = net.nodes[1].subscribe();
    let fixture = TestFixture::new();
    let post = fixture.make_post("twice");
    net.nodes[0].publish(&post).await?;
    // Already stored on node 0; published again all the same.
    assert!(net.nodes[0].publish(&post).await?.is_none());

    assert!(next_named(&mut events, "gossip:accepted").await.is_some());
    assert!(next_named(&mut events, "gossip:accepted").await.is_none());

    net.stop_all().await;
    Ok(())
}

#[tokio::test]
async fn publish_without_proof_fails() -> Result<()> {
    let net = TestNetwork::new(1, config()).await;
    net.start_all().await;

    let fixture = TestFixture::new();
    let unsigned = SignedMessage::unsigned(fixture.make_post("no proof").message().clone());
    assert!(matches!(
        net.nodes[0].publish(&unsigned).await,
        Err(hearsay::NodeError::MissingProof)
    ));

    net.stop_all().await;
    Ok(())
}
