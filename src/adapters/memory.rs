//! In-Memory Adapters
//!
//! Block store and pin set held entirely in memory. Used by tests and as the
//! default store for embedding callers that do not need persistence.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::node::{Block, ContentId, DagNode};
use crate::domain::ports::{DagService, RetentionManager};
use crate::error::{Error, Result};

// =============================================================================
// Block Store
// =============================================================================

/// Content-addressed block store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryDagStore {
    blocks: DashMap<ContentId, Bytes>,
}

impl MemoryDagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Identifiers of all stored blocks, sorted.
    pub fn cids(&self) -> Vec<ContentId> {
        let mut cids: Vec<ContentId> = self.blocks.iter().map(|e| e.key().clone()).collect();
        cids.sort();
        cids
    }

    /// Drop every block not reachable from a retained root. Parity blocks
    /// referenced by recovery sections count as reachable.
    ///
    /// Returns the number of blocks removed.
    pub async fn collect_garbage(&self, retention: &dyn RetentionManager) -> Result<usize> {
        let roots = retention.list().await?;
        let live = reachable(self, &roots).await?;

        let before = self.blocks.len();
        self.blocks.retain(|cid, _| live.contains(cid));
        let removed = before - self.blocks.len();
        debug!(live = live.len(), removed, "Collected garbage");
        Ok(removed)
    }
}

/// All blocks reachable from `roots`. Blocks that are missing are skipped.
async fn reachable(
    dag: &dyn DagService,
    roots: &[ContentId],
) -> Result<HashSet<ContentId>> {
    let mut live = HashSet::new();
    let mut stack: Vec<ContentId> = roots.to_vec();

    while let Some(cid) = stack.pop() {
        if !live.insert(cid.clone()) {
            continue;
        }
        let block = match dag.get(&cid).await {
            Ok(block) => block,
            Err(Error::BlockNotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        let node = DagNode::from_block(&block)?;
        stack.extend(node.child_cids().cloned());
    }

    Ok(live)
}

#[async_trait]
impl DagService for MemoryDagStore {
    async fn get(&self, cid: &ContentId) -> Result<Block> {
        self.blocks
            .get(cid)
            .map(|data| Block {
                cid: cid.clone(),
                data: data.clone(),
            })
            .ok_or_else(|| Error::BlockNotFound(cid.clone()))
    }

    async fn put(&self, block: Block) -> Result<ContentId> {
        if !block.cid.matches(&block.data) {
            return Err(Error::CorruptBlock {
                cid: block.cid,
                reason: "content hash mismatch".to_string(),
            });
        }
        self.blocks.entry(block.cid.clone()).or_insert(block.data);
        Ok(block.cid)
    }

    async fn has(&self, cid: &ContentId) -> Result<bool> {
        Ok(self.blocks.contains_key(cid))
    }

    async fn remove(&self, cid: &ContentId) -> Result<()> {
        self.blocks.remove(cid);
        Ok(())
    }
}

// =============================================================================
// Pin Set
// =============================================================================

/// Recursive pin set.
#[derive(Debug, Default)]
pub struct MemoryPinSet {
    pins: RwLock<BTreeSet<ContentId>>,
}

impl MemoryPinSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin set seeded with `roots`.
    pub fn with_pins(roots: impl IntoIterator<Item = ContentId>) -> Self {
        Self {
            pins: RwLock::new(roots.into_iter().collect()),
        }
    }

    fn snapshot(&self) -> Vec<ContentId> {
        self.pins.read().iter().cloned().collect()
    }
}

#[async_trait]
impl RetentionManager for MemoryPinSet {
    async fn add_recursive(&self, root: &ContentId) -> Result<()> {
        self.pins.write().insert(root.clone());
        Ok(())
    }

    async fn remove_recursive(&self, root: &ContentId) -> Result<bool> {
        Ok(self.pins.write().remove(root))
    }

    async fn is_retained(&self, root: &ContentId) -> Result<bool> {
        Ok(self.pins.read().contains(root))
    }

    async fn list(&self) -> Result<Vec<ContentId>> {
        Ok(self.snapshot())
    }
}
