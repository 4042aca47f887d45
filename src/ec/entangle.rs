//! Entanglement Codes
//!
//! Simple alpha-entanglement over a sequence of blocks. Each of `alpha`
//! strands threads through the data blocks with its own stride, and every
//! hop of a strand stores one parity block:
//!
//! ```text
//! strand s, step = s + 1
//!
//!   p[s][i] = d[i] XOR p[s][i - step]      (p[s][j] = 0 for j < 0)
//! ```
//!
//! A missing data block is `p[s][i] XOR p[s][i - step]` on any strand whose
//! two parities survive. A missing parity is recomputed from the previous
//! hop, or peeled off the next hop as `p[s][i + step] XOR d[i + step]`.
//! Any `alpha` erasures are repairable: a lost data block leaves at least one
//! strand with both of its parities intact, and once all data is back the
//! strands are recomputed front to back.

use crate::error::{Error, Result};
use tracing::{debug, instrument};

use super::encoder::{group_shard_len, pad_shard};

/// Upper bound on strands per group.
pub const MAX_STRANDS: usize = 8;

/// Parity produced for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entangled {
    pub shard_len: usize,
    /// `strands[s][i]` is the parity of strand `s` at block `i`
    pub strands: Vec<Vec<Vec<u8>>>,
}

/// Entanglement encoder and repairer.
#[derive(Debug, Clone, Copy)]
pub struct Entangler {
    alpha: usize,
}

fn xor_into(acc: &mut [u8], other: &[u8]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}

fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = a.to_vec();
    xor_into(&mut out, b);
    out
}

impl Entangler {
    pub fn new(alpha: usize) -> Result<Self> {
        if alpha == 0 || alpha > MAX_STRANDS {
            return Err(Error::InvalidEcConfig(format!(
                "entanglement needs 1..={} strands, got {}",
                MAX_STRANDS, alpha
            )));
        }
        Ok(Self { alpha })
    }

    pub fn alpha(&self) -> usize {
        self.alpha
    }

    /// Stride of strand `s`.
    pub fn step(strand: usize) -> usize {
        strand + 1
    }

    /// Compute all strand parities over `members`.
    #[instrument(skip(self, members), fields(members = members.len(), alpha = self.alpha))]
    pub fn entangle<T: AsRef<[u8]>>(&self, members: &[T]) -> Result<Entangled> {
        if members.is_empty() {
            return Err(Error::EcEncodingFailed(
                "cannot entangle an empty group".to_string(),
            ));
        }

        let shard_len = group_shard_len(members);
        let data = members
            .iter()
            .map(|m| pad_shard(m.as_ref(), shard_len))
            .collect::<Result<Vec<_>>>()?;

        let strands = (0..self.alpha)
            .map(|s| {
                let step = Self::step(s);
                let mut strand: Vec<Vec<u8>> = Vec::with_capacity(data.len());
                for (i, block) in data.iter().enumerate() {
                    let parity = match i.checked_sub(step) {
                        Some(prev) => xor(block, &strand[prev]),
                        None => block.clone(),
                    };
                    strand.push(parity);
                }
                strand
            })
            .collect();

        debug!(
            "Entangled {} blocks across {} strands ({} bytes per shard)",
            data.len(),
            self.alpha,
            shard_len
        );

        Ok(Entangled { shard_len, strands })
    }

    /// Rebuild missing data and parity in place.
    ///
    /// Present entries must be padded to the group's shard length. Fails with
    /// `InsufficientShards` if some data block stays missing; parity that
    /// cannot be rebuilt is left as `None`.
    #[instrument(skip(self, data, parity))]
    pub fn repair(
        &self,
        data: &mut [Option<Vec<u8>>],
        parity: &mut [Vec<Option<Vec<u8>>>],
    ) -> Result<usize> {
        let n = data.len();
        if parity.len() != self.alpha || parity.iter().any(|p| p.len() != n) {
            return Err(Error::InvalidEcConfig(format!(
                "expected {} strands of {} parities",
                self.alpha, n
            )));
        }

        let mut rebuilt = 0;
        loop {
            let mut progress = false;

            for (s, strand) in parity.iter_mut().enumerate() {
                let step = Self::step(s);
                for i in 0..n {
                    let prev = match i.checked_sub(step) {
                        Some(j) => match &strand[j] {
                            Some(p) => Some(p.clone()),
                            None => continue,
                        },
                        None => None,
                    };

                    if data[i].is_none() {
                        if let Some(p) = &strand[i] {
                            data[i] = Some(match &prev {
                                Some(prev) => xor(p, prev),
                                None => p.clone(),
                            });
                            rebuilt += 1;
                            progress = true;
                        }
                    }

                    if strand[i].is_none() {
                        if let Some(d) = &data[i] {
                            strand[i] = Some(match &prev {
                                Some(prev) => xor(d, prev),
                                None => d.clone(),
                            });
                            rebuilt += 1;
                            progress = true;
                        }
                    }
                }

                // Peel backwards: p[i] = p[i + step] ^ d[i + step]
                for i in (0..n).rev() {
                    if strand[i].is_some() || i + step >= n {
                        continue;
                    }
                    let peeled = match (&strand[i + step], &data[i + step]) {
                        (Some(next), Some(d)) => Some(xor(next, d)),
                        _ => None,
                    };
                    if peeled.is_some() {
                        strand[i] = peeled;
                        rebuilt += 1;
                        progress = true;
                    }
                }
            }

            if !progress {
                break;
            }
        }

        let available = data.iter().filter(|d| d.is_some()).count();
        if available < n {
            return Err(Error::InsufficientShards {
                available,
                required: n,
            });
        }

        debug!("Entanglement repair rebuilt {} blocks", rebuilt);
        Ok(rebuilt)
    }
}

// =============================================================================
// Tests
// =============================================================================
