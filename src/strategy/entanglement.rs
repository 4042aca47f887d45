//! Entanglement Group Codec
//!
//! Entangles all children of a node in one group with `recoverability`
//! strands. Parity is laid out strand-major: entry `s * n + i` is strand
//! `s` at child `i`.

use std::ops::Range;

use bytes::Bytes;

use super::GroupCodec;
use crate::domain::ports::StrategyKind;
use crate::ec::entangle::Entangler;
use crate::error::{Error, Result};

/// Alpha-entanglement codec over sibling blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntanglementCodec;

impl GroupCodec for EntanglementCodec {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Entanglement
    }

    fn plan_groups(&self, n: usize, recoverability: u32) -> Result<Vec<Range<usize>>> {
        Entangler::new(recoverability as usize)?;
        if n == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![0..n])
    }

    fn protect(&self, members: &[Bytes], recoverability: u32) -> Result<(usize, Vec<Vec<u8>>)> {
        let entangled = Entangler::new(recoverability as usize)?.entangle(members)?;
        Ok((
            entangled.shard_len,
            entangled.strands.into_iter().flatten().collect(),
        ))
    }

    fn repair(
        &self,
        members: &mut [Option<Vec<u8>>],
        parity: &mut [Option<Vec<u8>>],
        recoverability: u32,
    ) -> Result<()> {
        let n = members.len();
        let alpha = recoverability as usize;
        if n == 0 || parity.len() != n * alpha {
            return Err(Error::EcReconstructionFailed(format!(
                "expected {} strand parities for {} blocks, found {}",
                n * alpha,
                n,
                parity.len()
            )));
        }

        let mut strands: Vec<Vec<Option<Vec<u8>>>> = parity
            .chunks_mut(n)
            .map(|chunk| chunk.iter_mut().map(Option::take).collect())
            .collect();
        let result = Entangler::new(alpha)?.repair(members, &mut strands);

        for (slot, value) in parity.iter_mut().zip(strands.into_iter().flatten()) {
            *slot = value;
        }
        result.map(|_| ())
    }

    fn tolerated_losses(&self, recoverability: u32, _group_len: usize) -> usize {
        recoverability as usize
    }
}
