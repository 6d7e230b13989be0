//! Query layer over any [`Store`].
//!
//! Feeds are read from one sublevel in key order, filtered by a
//! [`Predicate`] and paginated by a previously seen hash.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use hearsay_core::{
    ConnectionKind, Message, MessageHash, MessageKind, ModerationKind, PostKind,
    CUSTOM_FIELD_PREFIX,
};
use serde::Serialize;

use crate::error::Result;
use crate::index::{self, IndexEntry};
use crate::traits::{ScanOptions, Store, StoreRecord};

/// Entries fetched per scan round while filtering.
const PAGE_SIZE: usize = 64;

/// Record filter applied after the index scan.
pub type Predicate = fn(&Message) -> bool;

/// Accept everything.
pub fn any(_: &Message) -> bool {
    true
}

/// Posts that belong in a top-level feed. Non-post messages pass.
pub fn top_level_posts(message: &Message) -> bool {
    match message.as_post() {
        Some(post) => match post.subkind {
            PostKind::Default | PostKind::Repost => true,
            PostKind::Comment => false,
            PostKind::CrossPost => post.reference.is_none(),
        },
        None => true,
    }
}

/// Posts that belong in a thread under their reference. Non-post
/// messages pass.
pub fn thread_replies(message: &Message) -> bool {
    match message.as_post() {
        Some(post) => match post.subkind {
            PostKind::Comment => true,
            PostKind::Default | PostKind::Repost | PostKind::CrossPost => {
                post.reference.is_some()
            }
        },
        None => true,
    }
}

/// Ordering and pagination for feed queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Newest first.
    pub reverse: bool,
    pub limit: Option<usize>,
    /// Resume strictly after this record. An unknown hash starts from the
    /// beginning.
    pub offset: Option<MessageHash>,
}

impl QueryOptions {
    pub fn newest_first() -> Self {
        Self {
            reverse: true,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn after(mut self, offset: MessageHash) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A user's profile, each field resolved to its latest assertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub fields: BTreeMap<String, String>,
}

impl Profile {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    pub fn bio(&self) -> Option<&str> {
        self.get("bio")
    }

    pub fn avatar(&self) -> Option<&str> {
        self.get("avatar")
    }

    pub fn cover(&self) -> Option<&str> {
        self.get("cover")
    }

    pub fn website(&self) -> Option<&str> {
        self.get("website")
    }

    /// A custom field, by its bare key.
    pub fn custom(&self, key: &str) -> Option<&str> {
        self.get(&format!("{CUSTOM_FIELD_PREFIX}{key}"))
    }
}

/// Engagement on one message. Moderations count once per
/// (author, subkind).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostMeta {
    pub moderations_by_subkind: BTreeMap<String, usize>,
    pub moderation_count: usize,
    pub reply_count: usize,
}

impl PostMeta {
    pub fn moderations(&self, subkind: ModerationKind) -> usize {
        self.moderations_by_subkind
            .get(subkind.as_str())
            .copied()
            .unwrap_or(0)
    }
}

/// Connection and post counts for one user. Outgoing edges count once per
/// (target, subkind), incoming once per (author, subkind).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserMeta {
    pub outgoing_by_subkind: BTreeMap<String, usize>,
    pub incoming_by_subkind: BTreeMap<String, usize>,
    pub post_count: usize,
}

impl UserMeta {
    pub fn outgoing(&self, subkind: ConnectionKind) -> usize {
        self.outgoing_by_subkind
            .get(subkind.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn incoming(&self, subkind: ConnectionKind) -> usize {
        self.incoming_by_subkind
            .get(subkind.as_str())
            .copied()
            .unwrap_or(0)
    }
}

/// Walk a sublevel, returning records that pass `predicate`.
async fn collect<S, F>(
    store: &S,
    sublevel: &str,
    predicate: F,
    options: &QueryOptions,
) -> Result<Vec<StoreRecord>>
where
    S: Store + ?Sized,
    F: Fn(&Message) -> bool + Send + Sync,
{
    let limit = options.limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    if limit == 0 {
        return Ok(records);
    }

    let mut cursor = match &options.offset {
        Some(hash) => store
            .get(hash)
            .await?
            .map(|record| IndexEntry::for_message(&record.message)),
        None => None,
    };

    loop {
        let page = store
            .scan(
                sublevel,
                ScanOptions {
                    reverse: options.reverse,
                    after: cursor.clone(),
                    limit: Some(PAGE_SIZE),
                },
            )
            .await?;
        let exhausted = page.len() < PAGE_SIZE;

        for entry in page {
            if let Some(record) = store.get(&entry.hash).await? {
                if predicate(&record.message) {
                    records.push(record);
                    if records.len() == limit {
                        return Ok(records);
                    }
                }
            }
            cursor = Some(entry);
        }

        if exhausted {
            return Ok(records);
        }
    }
}

/// Every record in a sublevel, oldest first.
async fn scan_all<S: Store + ?Sized>(store: &S, sublevel: &str) -> Result<Vec<StoreRecord>> {
    collect(store, sublevel, any, &QueryOptions::default()).await
}

/// Feed and aggregate queries, available on every [`Store`].
pub trait StoreExt: Store {
    /// All messages of one kind across authors.
    fn query_global(
        &self,
        kind: MessageKind,
        predicate: Predicate,
        options: QueryOptions,
    ) -> impl Future<Output = Result<Vec<StoreRecord>>> + Send;

    /// One author's messages, of one kind or all kinds.
    fn query_by_author(
        &self,
        author: &str,
        kind: Option<MessageKind>,
        predicate: Predicate,
        options: QueryOptions,
    ) -> impl Future<Output = Result<Vec<StoreRecord>>> + Send;

    /// Messages of one kind pointing at `reference` (a hash or message id).
    fn query_by_thread(
        &self,
        reference: &str,
        kind: MessageKind,
        predicate: Predicate,
        options: QueryOptions,
    ) -> impl Future<Output = Result<Vec<StoreRecord>>> + Send;

    /// Connection edges targeting `user`.
    fn query_connections(
        &self,
        user: &str,
        subkind: Option<ConnectionKind>,
        options: QueryOptions,
    ) -> impl Future<Output = Result<Vec<StoreRecord>>> + Send;

    /// Chat lines addressed to a destination.
    fn query_chat(
        &self,
        destination: &str,
        options: QueryOptions,
    ) -> impl Future<Output = Result<Vec<StoreRecord>>> + Send;

    /// Messages scoped to a group.
    fn query_group(
        &self,
        group_id: &str,
        options: QueryOptions,
    ) -> impl Future<Output = Result<Vec<StoreRecord>>> + Send;

    fn get_profile(&self, user: &str) -> impl Future<Output = Result<Profile>> + Send;

    fn get_post_meta(&self, reference: &str) -> impl Future<Output = Result<PostMeta>> + Send;

    fn get_user_meta(&self, user: &str) -> impl Future<Output = Result<UserMeta>> + Send;

    /// An author's hashes in tree leaf order.
    fn author_leaves(&self, author: &str)
        -> impl Future<Output = Result<Vec<MessageHash>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn query_global(
        &self,
        kind: MessageKind,
        predicate: Predicate,
        options: QueryOptions,
    ) -> Result<Vec<StoreRecord>> {
        collect(self, &index::global(kind), predicate, &options).await
    }

    async fn query_by_author(
        &self,
        author: &str,
        kind: Option<MessageKind>,
        predicate: Predicate,
        options: QueryOptions,
    ) -> Result<Vec<StoreRecord>> {
        let sublevel = match kind {
            Some(kind) => index::author(author, kind),
            None => index::author_all(author),
        };
        collect(self, &sublevel, predicate, &options).await
    }

    async fn query_by_thread(
        &self,
        reference: &str,
        kind: MessageKind,
        predicate: Predicate,
        options: QueryOptions,
    ) -> Result<Vec<StoreRecord>> {
        collect(self, &index::thread(reference, kind), predicate, &options).await
    }

    async fn query_connections(
        &self,
        user: &str,
        subkind: Option<ConnectionKind>,
        options: QueryOptions,
    ) -> Result<Vec<StoreRecord>> {
        // Filtered during the walk so the limit counts matching edges only.
        let matches = move |message: &Message| match subkind {
            Some(subkind) => message
                .as_connection()
                .is_some_and(|c| c.subkind == subkind),
            None => true,
        };
        collect(self, &index::connection(user), matches, &options).await
    }

    async fn query_chat(
        &self,
        destination: &str,
        options: QueryOptions,
    ) -> Result<Vec<StoreRecord>> {
        collect(self, &index::chat(destination), any, &options).await
    }

    async fn query_group(&self, group_id: &str, options: QueryOptions) -> Result<Vec<StoreRecord>> {
        collect(self, &index::group(group_id), any, &options).await
    }

    async fn get_profile(&self, user: &str) -> Result<Profile> {
        // Ascending key order: a later assertion overwrites an earlier one.
        let mut profile = Profile::default();
        for record in scan_all(self, &index::profile(user)).await? {
            if let Some(field) = record.message.as_profile() {
                profile
                    .fields
                    .insert(field.field(), field.value.clone());
            }
        }
        Ok(profile)
    }

    async fn get_post_meta(&self, reference: &str) -> Result<PostMeta> {
        let mut meta = PostMeta::default();

        let mut seen: BTreeSet<(String, ModerationKind)> = BTreeSet::new();
        for record in scan_all(self, &index::thread(reference, MessageKind::Moderation)).await? {
            if let Some(moderation) = record.message.as_moderation() {
                let key = (record.message.author().to_string(), moderation.subkind);
                if seen.insert(key) {
                    *meta
                        .moderations_by_subkind
                        .entry(moderation.subkind.as_str().to_string())
                        .or_default() += 1;
                }
            }
        }
        meta.moderation_count = seen.len();

        meta.reply_count = collect(
            self,
            &index::thread(reference, MessageKind::Post),
            thread_replies,
            &QueryOptions::default(),
        )
        .await?
        .len();

        Ok(meta)
    }

    async fn get_user_meta(&self, user: &str) -> Result<UserMeta> {
        let mut meta = UserMeta::default();

        let mut outgoing: BTreeSet<(String, ConnectionKind)> = BTreeSet::new();
        for record in scan_all(self, &index::author(user, MessageKind::Connection)).await? {
            if let Some(edge) = record.message.as_connection() {
                if outgoing.insert((edge.target.clone(), edge.subkind)) {
                    *meta
                        .outgoing_by_subkind
                        .entry(edge.subkind.as_str().to_string())
                        .or_default() += 1;
                }
            }
        }

        let mut incoming: BTreeSet<(String, ConnectionKind)> = BTreeSet::new();
        for record in scan_all(self, &index::connection(user)).await? {
            if let Some(edge) = record.message.as_connection() {
                let key = (record.message.author().to_string(), edge.subkind);
                if incoming.insert(key) {
                    *meta
                        .incoming_by_subkind
                        .entry(edge.subkind.as_str().to_string())
                        .or_default() += 1;
                }
            }
        }

        meta.post_count = self.count(&index::author(user, MessageKind::Post)).await?;
        Ok(meta)
    }

    async fn author_leaves(&self, author: &str) -> Result<Vec<MessageHash>> {
        Ok(self
            .scan(&index::author_all(author), ScanOptions::default())
            .await?
            .into_iter()
            .map(|entry| entry.hash)
            .collect())
    }
}
