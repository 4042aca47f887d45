//! Domain Ports (Port/Adapter Pattern)
//!
//! The abstractions the encode pipeline depends on. The store, the naming
//! layer, the pin set and the coding algorithms all sit behind these traits
//! so the orchestrator can be driven against in-memory fakes in tests and
//! against the on-disk repository from the CLI.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  DagService │ PathResolver │ RetentionManager        │    │
//! │  │  ErasureStrategy │ EventPublisher                    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  MemoryDagStore │ FsDagStore │ LinkPathResolver      │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::events::DomainEvent;
use super::node::{Block, ContentId, DagNode};
use crate::error::{Error, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Registered erasure-coding strategy identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Block-parity over fixed-size groups of sibling blocks
    #[serde(rename = "reed-solomon")]
    ReedSolomon,
    /// Redundant XOR strands linking sibling blocks
    #[serde(rename = "entangle")]
    Entanglement,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 2] = [StrategyKind::ReedSolomon, StrategyKind::Entanglement];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::ReedSolomon => "reed-solomon",
            StrategyKind::Entanglement => "entangle",
        }
    }
}

impl Default for StrategyKind {
    fn default() -> Self {
        StrategyKind::ReedSolomon
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reed-solomon" => Ok(StrategyKind::ReedSolomon),
            "entangle" | "entanglement" => Ok(StrategyKind::Entanglement),
            other => Err(Error::UnknownStrategy(other.to_string())),
        }
    }
}

/// A path resolved to a concrete root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoot {
    pub cid: ContentId,
    pub node: DagNode,
}

/// Outcome of repairing a DAG below an encoded root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Blocks that were missing and have been rebuilt and re-stored
    pub restored: Vec<ContentId>,
    /// Blocks visited and found intact
    pub intact: usize,
}

impl RecoveryReport {
    pub fn merge(&mut self, other: RecoveryReport) {
        self.restored.extend(other.restored);
        self.intact += other.intact;
    }
}

// =============================================================================
// DAG Service Port
// =============================================================================

/// Port for content-addressed block storage.
///
/// Blocks are immutable. `put` of an existing block is a no-op.
#[async_trait]
pub trait DagService: Send + Sync {
    /// Fetch a block, failing with `Error::BlockNotFound` if absent.
    async fn get(&self, cid: &ContentId) -> Result<Block>;

    /// Store a block and return its identifier.
    async fn put(&self, block: Block) -> Result<ContentId>;

    /// Check whether a block is present.
    async fn has(&self, cid: &ContentId) -> Result<bool>;

    /// Drop a block. Used by garbage collection and loss simulation.
    async fn remove(&self, cid: &ContentId) -> Result<()>;

    /// Fetch and decode a node.
    async fn get_node(&self, cid: &ContentId) -> Result<DagNode> {
        let block = self.get(cid).await?;
        DagNode::from_block(&block)
    }

    /// Encode and store a node, returning its block.
    async fn put_node(&self, node: &DagNode) -> Result<Block> {
        let block = node.to_block()?;
        self.put(block.clone()).await?;
        Ok(block)
    }
}

// =============================================================================
// Naming Port
// =============================================================================

/// Port mapping user paths to DAG roots.
#[async_trait]
pub trait PathResolver: Send + Sync {
    /// Resolve `path` to an existing root node.
    async fn resolve(&self, path: &str, cancel: &CancellationToken) -> Result<ResolvedRoot>;
}

// =============================================================================
// Retention Port
// =============================================================================

/// Port for pin bookkeeping.
///
/// Removal has remove-if-present semantics so a retried swap never fails
/// just because an earlier attempt already removed the pin.
#[async_trait]
pub trait RetentionManager: Send + Sync {
    /// Retain `root` and everything reachable from it.
    async fn add_recursive(&self, root: &ContentId) -> Result<()>;

    /// Drop the recursive retention on `root`. Returns whether a pin existed.
    async fn remove_recursive(&self, root: &ContentId) -> Result<bool>;

    /// Check whether `root` is directly retained.
    async fn is_retained(&self, root: &ContentId) -> Result<bool>;

    /// List retained roots.
    async fn list(&self) -> Result<Vec<ContentId>>;
}

// =============================================================================
// Erasure Coding Port
// =============================================================================

/// Port for pluggable DAG erasure-coding strategies.
///
/// Implementations must leave the original DAG readable and unmodified, and
/// must return a root whose DAG has no dangling links.
#[async_trait]
pub trait ErasureStrategy: Send + Sync {
    /// Identifier this strategy is registered under.
    fn kind(&self) -> StrategyKind;

    /// Number of lost members per coding group this strategy always tolerates.
    fn tolerated_losses(&self, recoverability: u32, group_len: usize) -> usize;

    /// Encode the DAG rooted at `root` and return the encoded root node.
    async fn encode(
        &self,
        dag: &dyn DagService,
        root: &DagNode,
        recoverability: u32,
        cancel: &CancellationToken,
    ) -> Result<DagNode>;

    /// Rebuild missing blocks below an encoded root.
    async fn recover(
        &self,
        dag: &dyn DagService,
        root: &ContentId,
        cancel: &CancellationToken,
    ) -> Result<RecoveryReport>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing domain events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()>;
}

// =============================================================================
// Tests
// =============================================================================
