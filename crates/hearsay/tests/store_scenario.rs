//! A small social graph queried through both store backends.

use std::sync::Arc;

use anyhow::Result;
use hearsay::core::{ConnectionKind, ModerationKind, ProfileKind};
use hearsay::store::query::{any, top_level_posts};
use hearsay::store::{MemoryStore, SqliteStore, Store};
use hearsay::{MessageKind, QueryOptions, StoreExt};
use hearsay_testkit::{multi_party_fixtures, TestFixture};

struct Scenario {
    fixtures: Vec<TestFixture>,
    thread: String,
}

/// Three authors with two posts each, replies and reactions on one
/// thread, connections towards one user, and a revised profile.
async fn populate<S: Store + ?Sized>(store: &S) -> Result<Scenario> {
    let fixtures = multi_party_fixtures(3);
    let (alice, bob, carol) = (&fixtures[0], &fixtures[1], &fixtures[2]);

    let mut posts = Vec::new();
    for fixture in &fixtures {
        for body in ["first", "second"] {
            let post = fixture.make_post(body);
            store.insert(&post).await?;
            posts.push(post);
        }
    }
    let thread = posts[0].message().message_id();
    let other = posts[2].message().message_id();

    for (fixture, body) in [(bob, "+1"), (carol, "agreed"), (alice, "thanks"), (bob, "also")] {
        store.insert(&fixture.make_comment(&thread, body)).await?;
    }

    store.insert(&alice.make_moderation(ModerationKind::Like, &thread)).await?;
    store.insert(&bob.make_moderation(ModerationKind::Like, &thread)).await?;
    store.insert(&carol.make_moderation(ModerationKind::Dislike, &thread)).await?;
    store.insert(&carol.make_moderation(ModerationKind::Custom, &other)).await?;

    store.insert(&alice.make_connection(ConnectionKind::Follow, "dave")).await?;
    store.insert(&bob.make_connection(ConnectionKind::Block, "dave")).await?;
    store.insert(&carol.make_connection(ConnectionKind::Block, "dave")).await?;
    store.insert(&alice.make_connection(ConnectionKind::Block, "erin")).await?;

    store.insert(&alice.make_profile(ProfileKind::Name, "Alice")).await?;
    store.insert(&alice.make_profile(ProfileKind::Bio, "hello")).await?;
    store.insert(&alice.make_profile(ProfileKind::Name, "Alice B.")).await?;

    Ok(Scenario {
        thread: thread.to_string(),
        fixtures,
    })
}

async fn check<S: Store + ?Sized>(store: &S) -> Result<()> {
    let scenario = populate(store).await?;
    let alice = scenario.fixtures[0].author();

    let global = store
        .query_global(MessageKind::Post, top_level_posts, QueryOptions::default())
        .await?;
    assert_eq!(global.len(), 6);

    let feed = store
        .query_by_author(
            &alice,
            Some(MessageKind::Post),
            top_level_posts,
            QueryOptions::default(),
        )
        .await?;
    assert_eq!(feed.len(), 2);

    let meta = store.get_post_meta(&scenario.thread).await?;
    assert_eq!(meta.moderation_count, 3);
    assert_eq!(meta.moderations(ModerationKind::Like), 2);
    assert_eq!(meta.reply_count, 4);

    let moderations = store
        .query_by_thread(
            &scenario.thread,
            MessageKind::Moderation,
            any,
            QueryOptions::default(),
        )
        .await?;
    assert_eq!(moderations.len(), 3);

    let edges = store
        .query_connections("dave", None, QueryOptions::default())
        .await?;
    assert_eq!(edges.len(), 3);
    let follows = store
        .query_connections("dave", Some(ConnectionKind::Follow), QueryOptions::default())
        .await?;
    assert_eq!(follows.len(), 1);

    let user = store.get_user_meta(&alice).await?;
    assert_eq!(user.outgoing(ConnectionKind::Follow), 1);
    assert_eq!(user.outgoing(ConnectionKind::Block), 1);
    assert_eq!(user.post_count, 3);

    let profile = store.get_profile(&alice).await?;
    assert_eq!(profile.name(), Some("Alice B."));
    assert_eq!(profile.bio(), Some("hello"));
    assert_eq!(profile.avatar(), None);

    // Newest first, two at a time.
    let page = store
        .query_global(
            MessageKind::Post,
            top_level_posts,
            QueryOptions::newest_first().with_limit(2),
        )
        .await?;
    assert_eq!(page.len(), 2);
    assert!(page[0].message.created_at() >= page[1].message.created_at());

    Ok(())
}

#[tokio::test]
async fn scenario_on_memory_store() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    check(&MemoryStore::new()).await
}

#[tokio::test]
async fn scenario_on_sqlite_store() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = tempfile::tempdir()?;
    let store = Arc::new(SqliteStore::open(dir.path().join("hearsay.db"))?);
    check(store.as_ref()).await?;
    store.close().await?;
    Ok(())
}

#[tokio::test]
async fn sqlite_store_survives_reopen() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("hearsay.db");
    let fixture = TestFixture::new();
    let post = fixture.make_post("persisted");

    {
        let store = SqliteStore::open(&path)?;
        assert!(store.insert(&post).await?.is_some());
        store.close().await?;
    }

    let store = SqliteStore::open(&path)?;
    assert!(store.has(&post.hash()).await?);
    assert!(store.insert(&post).await?.is_none());
    assert_eq!(store.list_authors().await?, vec![fixture.author()]);
    Ok(())
}
