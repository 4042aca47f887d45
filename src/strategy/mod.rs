//! Erasure-Coding Strategies
//!
//! A strategy turns a DAG into an encoded DAG. Both built-in strategies share
//! one post-order walker ([`DagCodecStrategy`]) and differ only in the
//! [`GroupCodec`] that computes redundancy for a node's children:
//!
//! ```text
//!                 ┌───────────────────────────┐
//!   orchestrator ─▶  StrategyRegistry (name)  │
//!                 └─────────────┬─────────────┘
//!                               ▼
//!                 ┌───────────────────────────┐
//!                 │ DagCodecStrategy<C>       │  walks, rewrites links,
//!                 │   (ErasureStrategy)       │  stores parity blocks
//!                 └─────────────┬─────────────┘
//!                               ▼
//!            ┌──────────────────┴──────────────────┐
//!   ReedSolomonCodec (group parity)     EntanglementCodec (strands)
//! ```
//!
//! New strategies implement [`ErasureStrategy`] directly, or [`GroupCodec`]
//! to reuse the walker, and are registered by name.

mod entanglement;
mod reed_solomon;
mod walker;

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;

use crate::domain::ports::{ErasureStrategy, StrategyKind};
use crate::error::{Error, Result};

pub use entanglement::EntanglementCodec;
pub use reed_solomon::ReedSolomonCodec;
pub use walker::DagCodecStrategy;

/// Default number of sibling blocks per Reed-Solomon group.
pub const DEFAULT_GROUP_SIZE: usize = 16;

// =============================================================================
// Group Codec
// =============================================================================

/// Redundancy over the children of one node.
///
/// Codecs see only block bytes. Parity is returned, and repaired, as an
/// ordered list whose layout is private to the codec.
pub trait GroupCodec: Send + Sync {
    /// Kind recorded in the recovery section of encoded nodes.
    fn kind(&self) -> StrategyKind;

    /// Split `n` children into contiguous coding groups.
    fn plan_groups(&self, n: usize, recoverability: u32) -> Result<Vec<Range<usize>>>;

    /// Compute parity for one group. Returns the padded shard length and the
    /// parity blocks.
    fn protect(&self, members: &[Bytes], recoverability: u32) -> Result<(usize, Vec<Vec<u8>>)>;

    /// Rebuild missing members and parity in place. Present entries are
    /// padded to the group's shard length.
    fn repair(
        &self,
        members: &mut [Option<Vec<u8>>],
        parity: &mut [Option<Vec<u8>>],
        recoverability: u32,
    ) -> Result<()>;

    /// Lost blocks per group that are always repairable.
    fn tolerated_losses(&self, recoverability: u32, group_len: usize) -> usize;
}

// =============================================================================
// Strategy Registry
// =============================================================================

/// Named erasure-coding strategies.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn ErasureStrategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

impl StrategyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `reed-solomon` and `entangle` (alias `entanglement`).
    pub fn with_defaults(group_size: usize) -> Self {
        let mut registry = Self::new();
        for kind in StrategyKind::ALL {
            let strategy: Arc<dyn ErasureStrategy> = match kind {
                StrategyKind::ReedSolomon => {
                    Arc::new(DagCodecStrategy::new(ReedSolomonCodec::new(group_size)))
                }
                StrategyKind::Entanglement => Arc::new(DagCodecStrategy::new(EntanglementCodec)),
            };
            if kind == StrategyKind::Entanglement {
                registry.register("entanglement", strategy.clone());
            }
            registry.register(kind.as_str(), strategy);
        }
        registry
    }

    /// Register `strategy` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, strategy: Arc<dyn ErasureStrategy>) {
        self.strategies.insert(name.into(), strategy);
    }

    /// Look up a strategy by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ErasureStrategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownStrategy(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
