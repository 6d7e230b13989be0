//! Sync protocol message types.
//!
//! Both protocols speak JSON. Node values travel as 64-digit hex.

use hearsay_core::{ChildNodes, TreeHash};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Handshake protocol id.
pub const INFO_PROTOCOL: &str = "/hearsay/v1/info";

/// Tree-diff protocol id.
pub const SYNC_PROTOCOL: &str = "/hearsay/v1/sync";

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Reply to an info handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    pub version: u32,
    /// Every author the peer holds messages for.
    pub users: Vec<String>,
}

/// Ask a peer to compare one node of an author's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub user: String,
    /// The requester's value at `(depth, index)`, zero when unknown.
    pub root: TreeHash,
    pub depth: usize,
    pub index: usize,
}

/// A peer's answer to a [`SyncRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResponse {
    /// The node differs; compare these next.
    Children(ChildNodes),
    /// The leaf differs; signed wire hex of the peer's message.
    Messages(Vec<String>),
    /// Nothing to do: match, empty slot or out of range.
    Empty,
}

/// JSON shape: `{children}`, `{messages}` or `{}`.
#[derive(Default, Serialize, Deserialize)]
struct SyncResponseWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<ChildNodes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    messages: Option<Vec<String>>,
}

impl SyncResponse {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let wire = match self {
            SyncResponse::Children(children) => SyncResponseWire {
                children: Some(*children),
                ..Default::default()
            },
            SyncResponse::Messages(messages) => SyncResponseWire {
                messages: Some(messages.clone()),
                ..Default::default()
            },
            SyncResponse::Empty => SyncResponseWire::default(),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let wire: SyncResponseWire = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::Protocol(format!("malformed sync response: {e}")))?;
        match (wire.children, wire.messages) {
            (Some(children), None) => Ok(SyncResponse::Children(children)),
            (None, Some(messages)) => Ok(SyncResponse::Messages(messages)),
            (None, None) => Ok(SyncResponse::Empty),
            (Some(_), Some(_)) => Err(SyncError::Protocol(
                "sync response carries both children and messages".into(),
            )),
        }
    }

    /// Check a children reply against the request it answers.
    pub fn validate_children(request: &SyncRequest, children: &ChildNodes) -> Result<()> {
        let expected = [request.index * 2, request.index * 2 + 1];
        if children.depth != request.depth + 1 || children.indices != expected {
            return Err(SyncError::Protocol(format!(
                "children at depth {} indices {:?} do not descend from ({}, {})",
                children.depth, children.indices, request.depth, request.index
            )));
        }
        Ok(())
    }
}
