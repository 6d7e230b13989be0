//! Secondary index layout.
//!
//! Every message fans out into a handful of ordered sublevels. An entry is
//! `(sort_key, hash)` where
//! `sort_key = hex12(created_at) "-" author "-" hex2(kind) "-" hex2(subkind)`,
//! so entries order by time first and tie-break deterministically.

use hearsay_core::{reference_hash, Message, MessageHash, MessageKind, Payload};

/// Sublevel listing every author the store has seen.
pub const AUTHOR_LIST: &str = "author/list";

/// One key in a sublevel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexEntry {
    pub sort_key: String,
    pub hash: MessageHash,
}

impl IndexEntry {
    pub fn new(sort_key: impl Into<String>, hash: MessageHash) -> Self {
        Self {
            sort_key: sort_key.into(),
            hash,
        }
    }

    /// The entry a message occupies in every message sublevel.
    pub fn for_message(message: &Message) -> Self {
        Self::new(sort_key(message), message.hash())
    }
}

pub fn sort_key(message: &Message) -> String {
    format!(
        "{:012x}-{}-{:02x}-{:02x}",
        message.created_at(),
        message.author(),
        message.kind().to_u8(),
        message.subkind()
    )
}

pub fn global(kind: MessageKind) -> String {
    format!("global/{kind}")
}

pub fn author(author: &str, kind: MessageKind) -> String {
    format!("author/{author}/{kind}")
}

pub fn author_all(author: &str) -> String {
    format!("author/{author}/all")
}

/// Thread sublevel, keyed by the hash component of a reference.
pub fn thread(reference: &str, kind: MessageKind) -> String {
    format!("thread/{}/{kind}", reference_hash(reference))
}

pub fn connection(target: &str) -> String {
    format!("connection/{target}")
}

pub fn profile(author: &str) -> String {
    format!("profile/{author}")
}

pub fn chat(destination: &str) -> String {
    format!("chat/{destination}")
}

pub fn group(group_id: &str) -> String {
    format!("group/{group_id}")
}

/// All `(sublevel, entry)` pairs a message is written under.
pub fn entries_for(message: &Message) -> Vec<(String, IndexEntry)> {
    let entry = IndexEntry::for_message(message);
    let kind = message.kind();
    let author_name = message.author();

    let mut sublevels = vec![
        global(kind),
        author(author_name, kind),
        author_all(author_name),
    ];
    match message.payload() {
        Payload::Post(p) => {
            if let Some(reference) = &p.reference {
                sublevels.push(thread(reference, kind));
            }
        }
        Payload::Moderation(p) => sublevels.push(thread(&p.reference, kind)),
        Payload::Connection(p) => sublevels.push(connection(&p.target)),
        Payload::Profile(_) => sublevels.push(profile(author_name)),
        Payload::Chat(p) => sublevels.push(chat(&p.destination)),
        Payload::Group(p) => sublevels.push(group(&p.group_id)),
        Payload::Revert(_) => {}
    }

    let mut entries: Vec<(String, IndexEntry)> = sublevels
        .into_iter()
        .map(|sublevel| (sublevel, entry.clone()))
        .collect();
    entries.push((
        AUTHOR_LIST.to_string(),
        IndexEntry::new(author_name, MessageHash::ZERO),
    ));
    entries
}
