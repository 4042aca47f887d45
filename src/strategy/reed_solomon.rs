//! Reed-Solomon Group Codec
//!
//! Splits a node's children into groups of at most `group_size` blocks and
//! adds `recoverability` parity blocks per group. Any `recoverability`
//! members of a group (data or parity) may be lost.

use std::ops::Range;

use bytes::Bytes;

use super::GroupCodec;
use crate::domain::ports::StrategyKind;
use crate::ec::encoder::{max_group_len, EcDecoder, EcEncoder};
use crate::error::{Error, Result};

/// Reed-Solomon codec over sibling blocks.
#[derive(Debug, Clone, Copy)]
pub struct ReedSolomonCodec {
    group_size: usize,
}

impl ReedSolomonCodec {
    /// Create a codec with the given maximum group size (at least 1).
    pub fn new(group_size: usize) -> Self {
        Self {
            group_size: group_size.max(1),
        }
    }

    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Group size actually used for `parity` parity shards.
    fn effective_group_size(&self, parity: usize) -> Result<usize> {
        let max = max_group_len(parity);
        if max == 0 {
            return Err(Error::InvalidEcConfig(format!(
                "recoverability {} leaves no room for data shards",
                parity
            )));
        }
        Ok(self.group_size.min(max))
    }
}

impl GroupCodec for ReedSolomonCodec {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ReedSolomon
    }

    fn plan_groups(&self, n: usize, recoverability: u32) -> Result<Vec<Range<usize>>> {
        let size = self.effective_group_size(recoverability as usize)?;
        Ok((0..n)
            .step_by(size)
            .map(|start| start..(start + size).min(n))
            .collect())
    }

    fn protect(&self, members: &[Bytes], recoverability: u32) -> Result<(usize, Vec<Vec<u8>>)> {
        let encoder = EcEncoder::new(members.len(), recoverability as usize)?;
        let parity = encoder.encode_group(members)?;
        Ok((parity.shard_len, parity.parity))
    }

    fn repair(
        &self,
        members: &mut [Option<Vec<u8>>],
        parity: &mut [Option<Vec<u8>>],
        _recoverability: u32,
    ) -> Result<()> {
        let k = members.len();
        let decoder = EcDecoder::new(k, parity.len())?;

        let mut shards: Vec<Option<Vec<u8>>> = members
            .iter_mut()
            .map(Option::take)
            .chain(parity.iter_mut().map(Option::take))
            .collect();
        let result = decoder.reconstruct(&mut shards);

        // Hand the shards back even on failure so callers see what survived.
        let mut shards = shards.into_iter();
        for slot in members.iter_mut().chain(parity.iter_mut()) {
            *slot = shards.next().flatten();
        }
        result
    }

    fn tolerated_losses(&self, recoverability: u32, _group_len: usize) -> usize {
        recoverability as usize
    }
}
