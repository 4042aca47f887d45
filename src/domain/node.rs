//! Content-Addressed Node Model
//!
//! Value objects for the merkle-DAG: identifiers, links, nodes and the
//! recovery section carried by encoded nodes.
//!
//! A node's canonical bytes are its `serde_json` encoding. Its
//! [`ContentId`] is the BLAKE3 digest of those bytes, so any change to the
//! payload, the links or the recovery section yields a new identifier.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::ports::StrategyKind;
use crate::error::{Error, Result};

const CID_PREFIX: &str = "b3";
const CID_HEX_LEN: usize = 64;

// =============================================================================
// ContentId
// =============================================================================

/// Content-derived, immutable block identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Derive the identifier for a block's bytes.
    pub fn for_bytes(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        Self(format!("{}{}", CID_PREFIX, hash.to_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `data` hashes to this identifier.
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::for_bytes(data) == *self
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix(CID_PREFIX)
            .ok_or_else(|| Error::InvalidContentId(s.to_string()))?;
        if hex.len() != CID_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidContentId(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for ContentId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ContentId> for String {
    fn from(cid: ContentId) -> Self {
        cid.0
    }
}

// =============================================================================
// Links and Recovery Sections
// =============================================================================

/// Named, sized edge to a child block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub cid: ContentId,
    /// Byte length of the target block
    pub size: u64,
}

impl Link {
    pub fn new(name: impl Into<String>, cid: ContentId, size: u64) -> Self {
        Self {
            name: name.into(),
            cid,
            size,
        }
    }

    /// Link pointing at an already-built block.
    pub fn to_block(name: impl Into<String>, block: &Block) -> Self {
        Self::new(name, block.cid.clone(), block.data.len() as u64)
    }
}

/// Redundancy covering a contiguous run of a node's distinct children.
///
/// Members are the node's links with repeated content ids dropped, in
/// first-appearance order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryGroup {
    /// Index of the first protected distinct child
    pub start: usize,
    /// Number of protected distinct children
    pub len: usize,
    /// Length every member was zero-padded to before coding
    pub shard_len: usize,
    /// Parity blocks, in codec order
    pub redundant: Vec<Link>,
}

impl RecoveryGroup {
    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.start + self.len
    }
}

/// Recovery section attached to encoded nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryInfo {
    pub strategy: StrategyKind,
    pub recoverability: u32,
    /// Node exists only to protect a single leaf root
    #[serde(default)]
    pub wrapped: bool,
    pub groups: Vec<RecoveryGroup>,
}

// =============================================================================
// DagNode
// =============================================================================

/// Immutable merkle-DAG node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DagNode {
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryInfo>,
}

impl DagNode {
    pub fn new(data: impl Into<Vec<u8>>, links: Vec<Link>) -> Self {
        Self {
            data: data.into(),
            links,
            recovery: None,
        }
    }

    pub fn leaf(data: impl Into<Vec<u8>>) -> Self {
        Self::new(data, Vec::new())
    }

    pub fn with_recovery(mut self, recovery: RecoveryInfo) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.links.is_empty()
    }

    pub fn is_encoded(&self) -> bool {
        self.recovery.is_some()
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name == name)
    }

    /// Every block this node references, including parity blocks.
    pub fn child_cids(&self) -> impl Iterator<Item = &ContentId> + '_ {
        let redundant = self
            .recovery
            .iter()
            .flat_map(|r| r.groups.iter())
            .flat_map(|g| g.redundant.iter());
        self.links.iter().chain(redundant).map(|l| &l.cid)
    }

    /// Canonical bytes and identifier for this node.
    pub fn to_block(&self) -> Result<Block> {
        let data = Bytes::from(serde_json::to_vec(self)?);
        Ok(Block::new(data))
    }

    pub fn cid(&self) -> Result<ContentId> {
        Ok(self.to_block()?.cid)
    }

    /// Decode a block, checking that its bytes match its identifier.
    pub fn from_block(block: &Block) -> Result<Self> {
        if !block.cid.matches(&block.data) {
            return Err(Error::CorruptBlock {
                cid: block.cid.clone(),
                reason: "content hash mismatch".to_string(),
            });
        }
        serde_json::from_slice(&block.data).map_err(|e| Error::CorruptBlock {
            cid: block.cid.clone(),
            reason: e.to_string(),
        })
    }
}

/// Raw block: canonical bytes plus their identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: ContentId,
    pub data: Bytes,
}

impl Block {
    pub fn new(data: Bytes) -> Self {
        Self {
            cid: ContentId::for_bytes(&data),
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
