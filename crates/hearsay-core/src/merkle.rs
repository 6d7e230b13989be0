//! Per-author fixed-depth Merkle tree used to diff message sets.
//!
//! Leaves are message hashes read as 256-bit big-endian integers. An
//! internal node is the SHA-256 of the decimal renderings of its children
//! concatenated left then right, read back as an integer. An empty (zero)
//! side passes the other side through unchanged: `H(x, 0) = x`,
//! `H(0, x) = x`, `H(0, 0) = 0`.
//!
//! Depth 0 is the root; depth `D - 1` is the leaf level, so a tree of depth
//! `D` holds at most `2^(D-1)` leaves. Appending rebuilds the whole tree.
//! That is fine for per-author message counts but does not scale to large
//! authors.

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

use crate::error::MerkleError;
use crate::types::MessageHash;

/// Largest supported tree depth.
pub const MAX_DEPTH: usize = 32;

/// A tree node value: a 256-bit unsigned integer, big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TreeHash(pub [u8; 32]);

impl TreeHash {
    /// The empty-subtree sentinel.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse hex, left-padding short values. An empty string is zero.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.len() > 64 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let padded = format!("{s:0>64}");
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(padded, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Decimal rendering of the integer value.
    pub fn to_decimal(&self) -> String {
        BigUint::from_bytes_be(&self.0).to_string()
    }

    pub fn from_decimal(s: &str) -> Option<Self> {
        let value = BigUint::parse_bytes(s.as_bytes(), 10)?;
        let raw = value.to_bytes_be();
        if raw.len() > 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes[32 - raw.len()..].copy_from_slice(&raw);
        Some(Self(bytes))
    }
}

impl From<MessageHash> for TreeHash {
    fn from(hash: MessageHash) -> Self {
        Self(hash.0)
    }
}

impl From<TreeHash> for MessageHash {
    fn from(hash: TreeHash) -> Self {
        MessageHash(hash.0)
    }
}

impl fmt::Debug for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for TreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl Serialize for TreeHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TreeHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Two-to-one node hash with zero pass-through.
pub fn hash_pair(left: &TreeHash, right: &TreeHash) -> TreeHash {
    match (left.is_zero(), right.is_zero()) {
        (true, true) => TreeHash::ZERO,
        (false, true) => *left,
        (true, false) => *right,
        (false, false) => {
            let mut hasher = Sha256::new();
            hasher.update(left.to_decimal().as_bytes());
            hasher.update(right.to_decimal().as_bytes());
            TreeHash(hasher.finalize().into())
        }
    }
}

/// Leaf-to-root inclusion path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: TreeHash,
    pub index: usize,
    /// Sibling values, starting at the leaf level.
    pub siblings: Vec<TreeHash>,
}

/// The two children of an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildNodes {
    pub depth: usize,
    pub indices: [usize; 2],
    pub hashes: [TreeHash; 2],
}

/// Outcome of comparing a claimed node value against the local tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCheck {
    /// The subtrees agree; stop descending.
    Match,
    /// Mismatch at an internal node; descend into these.
    Children(ChildNodes),
    /// Mismatch at the leaf level; the message itself must be fetched.
    Leaf,
}

/// A fixed-depth Merkle tree over one author's message hashes.
#[derive(Debug, Clone)]
pub struct AuthTree {
    depth: usize,
    /// `levels[0]` is the root level, `levels[depth - 1]` the leaves.
    /// Each level holds only its populated prefix; missing entries are zero.
    levels: Vec<Vec<TreeHash>>,
    reverse: HashMap<TreeHash, (usize, usize)>,
}

impl AuthTree {
    pub fn new(depth: usize) -> Result<Self, MerkleError> {
        if depth == 0 || depth > MAX_DEPTH {
            return Err(MerkleError::InvalidDepth(depth));
        }
        Ok(Self {
            depth,
            levels: vec![Vec::new(); depth],
            reverse: HashMap::new(),
        })
    }

    pub fn from_leaves(
        depth: usize,
        leaves: impl IntoIterator<Item = TreeHash>,
    ) -> Result<Self, MerkleError> {
        let mut tree = Self::new(depth)?;
        let leaves: Vec<TreeHash> = leaves.into_iter().collect();
        tree.check_capacity(leaves.len())?;
        tree.levels[depth - 1] = leaves;
        tree.rebuild();
        Ok(tree)
    }

    /// Maximum number of leaves a tree of `depth` holds.
    pub fn capacity_for(depth: usize) -> usize {
        1usize << depth.saturating_sub(1)
    }

    pub fn capacity(&self) -> usize {
        Self::capacity_for(self.depth)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn leaf_depth(&self) -> usize {
        self.depth - 1
    }

    pub fn leaves(&self) -> &[TreeHash] {
        &self.levels[self.depth - 1]
    }

    pub fn len(&self) -> usize {
        self.leaves().len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves().is_empty()
    }

    fn check_capacity(&self, leaves: usize) -> Result<(), MerkleError> {
        if leaves > self.capacity() {
            return Err(MerkleError::CapacityExceeded {
                depth: self.depth,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    /// Append a leaf and rebuild. Returns the leaf index.
    pub fn append_leaf(&mut self, leaf: TreeHash) -> Result<usize, MerkleError> {
        self.check_capacity(self.len() + 1)?;
        let leaf_depth = self.leaf_depth();
        self.levels[leaf_depth].push(leaf);
        self.rebuild();
        Ok(self.len() - 1)
    }

    fn rebuild(&mut self) {
        for depth in (0..self.depth - 1).rev() {
            let children = &self.levels[depth + 1];
            let mut parents = Vec::with_capacity(children.len().div_ceil(2));
            for pair in children.chunks(2) {
                let right = pair.get(1).copied().unwrap_or(TreeHash::ZERO);
                parents.push(hash_pair(&pair[0], &right));
            }
            self.levels[depth] = parents;
        }

        // Leaves are inserted last so a leaf value always maps to its leaf
        // position even when a pass-through parent carries the same value.
        self.reverse.clear();
        for (depth, level) in self.levels.iter().enumerate() {
            for (index, value) in level.iter().enumerate() {
                if !value.is_zero() {
                    self.reverse.insert(*value, (depth, index));
                }
            }
        }
    }

    pub fn root(&self) -> TreeHash {
        self.levels[0].first().copied().unwrap_or(TreeHash::ZERO)
    }

    /// Node value at a position, zero for empty slots. `None` when the
    /// position is outside the tree.
    pub fn node(&self, depth: usize, index: usize) -> Option<TreeHash> {
        if depth >= self.depth || index >> depth != 0 {
            return None;
        }
        Some(
            self.levels[depth]
                .get(index)
                .copied()
                .unwrap_or(TreeHash::ZERO),
        )
    }

    /// Whether a nonzero value appears anywhere in the tree.
    pub fn contains(&self, value: &TreeHash) -> bool {
        self.reverse.contains_key(value)
    }

    pub fn position(&self, value: &TreeHash) -> Option<(usize, usize)> {
        self.reverse.get(value).copied()
    }

    pub fn leaf_index(&self, leaf: &TreeHash) -> Option<usize> {
        match self.position(leaf)? {
            (depth, index) if depth == self.leaf_depth() => Some(index),
            _ => None,
        }
    }

    pub fn proof(&self, leaf: &TreeHash) -> Option<MerkleProof> {
        let index = self.leaf_index(leaf)?;
        let mut siblings = Vec::with_capacity(self.depth - 1);
        let mut position = index;
        for depth in (1..self.depth).rev() {
            siblings.push(self.node(depth, position ^ 1)?);
            position >>= 1;
        }
        Some(MerkleProof {
            leaf: *leaf,
            index,
            siblings,
        })
    }

    /// Recompute the path upward. Fails if the path leaves the set of values
    /// this tree knows, or ends somewhere other than the current root.
    pub fn verify(&self, proof: &MerkleProof) -> bool {
        if proof.siblings.len() != self.depth - 1 || !self.contains(&proof.leaf) {
            return false;
        }
        let mut current = proof.leaf;
        let mut position = proof.index;
        for sibling in &proof.siblings {
            current = if position % 2 == 0 {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
            position >>= 1;
            if !current.is_zero() && !self.contains(&current) {
                return false;
            }
        }
        current == self.root()
    }

    /// Diff primitive: compare `claimed` against the node at a position.
    /// `None` when the position is outside the tree.
    pub fn check_node(&self, depth: usize, index: usize, claimed: &TreeHash) -> Option<NodeCheck> {
        let value = self.node(depth, index)?;
        if value == *claimed {
            return Some(NodeCheck::Match);
        }
        if depth == self.leaf_depth() {
            return Some(NodeCheck::Leaf);
        }
        let child_depth = depth + 1;
        let indices = [index * 2, index * 2 + 1];
        Some(NodeCheck::Children(ChildNodes {
            depth: child_depth,
            indices,
            hashes: [
                self.node(child_depth, indices[0]).unwrap_or(TreeHash::ZERO),
                self.node(child_depth, indices[1]).unwrap_or(TreeHash::ZERO),
            ],
        }))
    }
}
