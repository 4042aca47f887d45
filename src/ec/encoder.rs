//! Reed-Solomon Group Encoder/Decoder
//!
//! Computes parity shards over a group of sibling blocks using the
//! `reed-solomon-erasure` crate, and rebuilds missing members from survivors.
//! Members of a group may differ in length; each is zero-padded to the
//! longest member before coding and trimmed back by the caller using the
//! length recorded in the member's link.

use crate::error::{Error, Result};
use reed_solomon_erasure::galois_8::ReedSolomon;
use std::sync::Arc;
use tracing::{debug, instrument};

/// GF(2^8) limits a codeword to 256 shards.
pub const MAX_TOTAL_SHARDS: usize = 256;

/// Largest group that still leaves room for `parity_shards`.
pub fn max_group_len(parity_shards: usize) -> usize {
    MAX_TOTAL_SHARDS.saturating_sub(parity_shards)
}

/// Padded length for a group: the longest member, never zero.
pub fn group_shard_len<T: AsRef<[u8]>>(members: &[T]) -> usize {
    members
        .iter()
        .map(|m| m.as_ref().len())
        .max()
        .unwrap_or(0)
        .max(1)
}

/// Copy `data` into a zero-padded shard of `shard_len` bytes.
pub fn pad_shard(data: &[u8], shard_len: usize) -> Result<Vec<u8>> {
    if data.len() > shard_len {
        return Err(Error::InvalidEcConfig(format!(
            "member of {} bytes exceeds shard length {}",
            data.len(),
            shard_len
        )));
    }
    let mut shard = data.to_vec();
    shard.resize(shard_len, 0);
    Ok(shard)
}

fn build_codec(data_shards: usize, parity_shards: usize) -> Result<ReedSolomon> {
    if data_shards == 0 {
        return Err(Error::InvalidEcConfig(
            "data_shards must be greater than 0".to_string(),
        ));
    }
    if parity_shards == 0 {
        return Err(Error::InvalidEcConfig(
            "parity_shards must be greater than 0".to_string(),
        ));
    }
    if data_shards + parity_shards > MAX_TOTAL_SHARDS {
        return Err(Error::InvalidEcConfig(format!(
            "{}+{} exceeds {} total shards",
            data_shards, parity_shards, MAX_TOTAL_SHARDS
        )));
    }

    ReedSolomon::new(data_shards, parity_shards).map_err(|e| {
        Error::InvalidEcConfig(format!("Failed to create Reed-Solomon codec: {}", e))
    })
}

// =============================================================================
// EC Encoder
// =============================================================================

/// Parity computed over one group of blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupParity {
    /// Length every member was padded to
    pub shard_len: usize,
    /// Parity shards, each `shard_len` bytes
    pub parity: Vec<Vec<u8>>,
}

/// Erasure coding encoder for creating parity shards from a block group
pub struct EcEncoder {
    rs: Arc<ReedSolomon>,
    data_shards: usize,
    parity_shards: usize,
}

impl EcEncoder {
    /// Create a new encoder with the specified k+m configuration
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        let rs = build_codec(data_shards, parity_shards)?;
        Ok(Self {
            rs: Arc::new(rs),
            data_shards,
            parity_shards,
        })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Compute parity over `members`, padding each to the longest member.
    #[instrument(skip(self, members), fields(members = members.len()))]
    pub fn encode_group<T: AsRef<[u8]>>(&self, members: &[T]) -> Result<GroupParity> {
        if members.len() != self.data_shards {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} members, got {}",
                self.data_shards,
                members.len()
            )));
        }

        let shard_len = group_shard_len(members);
        let mut shards: Vec<Vec<u8>> = Vec::with_capacity(self.total_shards());
        for member in members {
            shards.push(pad_shard(member.as_ref(), shard_len)?);
        }
        for _ in 0..self.parity_shards {
            shards.push(vec![0u8; shard_len]);
        }

        self.rs
            .encode(&mut shards)
            .map_err(|e| Error::EcEncodingFailed(format!("Reed-Solomon encoding failed: {}", e)))?;

        debug!(
            "Encoded group of {} blocks into {} parity shards of {} bytes",
            self.data_shards, self.parity_shards, shard_len
        );

        Ok(GroupParity {
            shard_len,
            parity: shards.split_off(self.data_shards),
        })
    }
}

// =============================================================================
// EC Decoder
// =============================================================================

/// Erasure coding decoder for rebuilding missing group members
pub struct EcDecoder {
    rs: Arc<ReedSolomon>,
    data_shards: usize,
    parity_shards: usize,
}

impl EcDecoder {
    /// Create a new decoder with the specified k+m configuration
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        let rs = build_codec(data_shards, parity_shards)?;
        Ok(Self {
            rs: Arc::new(rs),
            data_shards,
            parity_shards,
        })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Reconstruct every missing shard (data and parity) in place.
    ///
    /// Present shards must already be padded to the group's shard length.
    /// At least k shards must be present.
    #[instrument(skip(self, shards))]
    pub fn reconstruct(&self, shards: &mut [Option<Vec<u8>>]) -> Result<()> {
        if shards.len() != self.total_shards() {
            return Err(Error::InvalidEcConfig(format!(
                "Expected {} shards, got {}",
                self.total_shards(),
                shards.len()
            )));
        }

        let available = shards.iter().filter(|s| s.is_some()).count();
        if available < self.data_shards {
            return Err(Error::InsufficientShards {
                available,
                required: self.data_shards,
            });
        }
        if available == self.total_shards() {
            return Ok(());
        }

        self.rs.reconstruct(shards).map_err(|e| {
            Error::EcReconstructionFailed(format!("Reed-Solomon reconstruction failed: {}", e))
        })?;

        debug!(
            "Reconstructed group from {}/{} available shards",
            available,
            self.total_shards()
        );

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
