//! Erasure Coding Module
//!
//! Block-group codecs used by the DAG strategies. Both operate on the
//! canonical bytes of sibling blocks and know nothing about DAGs.
//!
//! # Components
//!
//! - **Encoder/Decoder** (`encoder.rs`): Reed-Solomon parity over a group of
//!   k blocks using the `reed-solomon-erasure` crate. Any m lost members of a
//!   k+m group can be rebuilt.
//!
//! - **Entangler** (`entangle.rs`): XOR strand chains. Each strand adds one
//!   parity per block; any `alpha` lost blocks can be repaired.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dagrecovery::ec::encoder::{pad_shard, EcDecoder, EcEncoder};
//!
//! let members = vec![b"a".to_vec(), b"bbb".to_vec()];
//! let parity = EcEncoder::new(members.len(), 1)?.encode_group(&members)?;
//! let decoder = EcDecoder::new(members.len(), 1)?;
//!
//! let mut shards = vec![None, Some(pad_shard(&members[1], parity.shard_len)?),
//!                       Some(parity.parity[0].clone())];
//! decoder.reconstruct(&mut shards)?;
//! ```

pub mod encoder;
pub mod entangle;

#[cfg(test)]
mod proptest;

pub use encoder::{EcDecoder, EcEncoder, GroupParity};
pub use entangle::{Entangled, Entangler};
