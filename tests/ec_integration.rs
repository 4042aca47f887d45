//! EC Integration Tests
//!
//! Group-level tests for the Reed-Solomon and entanglement codecs through the
//! public API.

use assert_matches::assert_matches;
use bytes::Bytes;

use dagrecovery::ec::encoder::{max_group_len, pad_shard, EcDecoder, EcEncoder, MAX_TOTAL_SHARDS};
use dagrecovery::ec::entangle::{Entangler, MAX_STRANDS};
use dagrecovery::strategy::{EntanglementCodec, GroupCodec, ReedSolomonCodec};
use dagrecovery::Error;

fn members() -> Vec<Vec<u8>> {
    vec![
        b"first sibling block".to_vec(),
        b"second".to_vec(),
        b"a third, noticeably longer sibling block".to_vec(),
        Vec::new(),
    ]
}

// =============================================================================
// Reed-Solomon Group Tests
// =============================================================================

#[test]
fn test_group_survives_any_parity_count_losses() {
    let members = members();
    let encoder = EcEncoder::new(members.len(), 2).expect("Failed to create encoder");
    let decoder = EcDecoder::new(members.len(), 2).expect("Failed to create decoder");
    let parity = encoder.encode_group(&members).expect("Failed to encode");

    let mut full: Vec<Vec<u8>> = members
        .iter()
        .map(|m| pad_shard(m, parity.shard_len).expect("Failed to pad"))
        .collect();
    full.extend(parity.parity.iter().cloned());

    let total = full.len();
    for a in 0..total {
        for b in (a + 1)..total {
            let mut shards: Vec<Option<Vec<u8>>> = full.iter().cloned().map(Some).collect();
            shards[a] = None;
            shards[b] = None;

            decoder
                .reconstruct(&mut shards)
                .unwrap_or_else(|e| panic!("lost {} and {}: {}", a, b, e));
            let rebuilt: Vec<Vec<u8>> = shards.into_iter().flatten().collect();
            assert_eq!(rebuilt, full);
        }
    }
}

#[test]
fn test_group_fails_beyond_parity_count() {
    let members = members();
    let encoder = EcEncoder::new(members.len(), 2).expect("Failed to create encoder");
    let decoder = EcDecoder::new(members.len(), 2).expect("Failed to create decoder");
    let parity = encoder.encode_group(&members).expect("Failed to encode");

    let mut shards: Vec<Option<Vec<u8>>> = members
        .iter()
        .map(|m| Some(pad_shard(m, parity.shard_len).expect("Failed to pad")))
        .chain(parity.parity.into_iter().map(Some))
        .collect();
    shards[0] = None;
    shards[1] = None;
    shards[4] = None;

    assert_matches!(
        decoder.reconstruct(&mut shards),
        Err(Error::InsufficientShards {
            available: 3,
            required: 4
        })
    );
}

#[test]
fn test_group_limits() {
    assert_eq!(max_group_len(3), MAX_TOTAL_SHARDS - 3);
    assert!(EcEncoder::new(MAX_TOTAL_SHARDS - 2, 2).is_ok());
    assert_matches!(
        EcEncoder::new(MAX_TOTAL_SHARDS - 1, 2).err(),
        Some(Error::InvalidEcConfig(_))
    );
    assert_matches!(EcEncoder::new(0, 2).err(), Some(Error::InvalidEcConfig(_)));
    assert_matches!(EcDecoder::new(4, 0).err(), Some(Error::InvalidEcConfig(_)));
}

#[test]
fn test_oversized_member_is_rejected() {
    assert_matches!(pad_shard(b"too long", 4), Err(Error::InvalidEcConfig(_)));
}

// =============================================================================
// Entanglement Tests
// =============================================================================

#[test]
fn test_entangler_repairs_consecutive_losses() {
    let members = members();
    let entangler = Entangler::new(3).expect("Failed to create entangler");
    let entangled = entangler.entangle(&members).expect("Failed to entangle");
    assert_eq!(entangled.strands.len(), 3);

    let padded: Vec<Vec<u8>> = members
        .iter()
        .map(|m| pad_shard(m, entangled.shard_len).expect("Failed to pad"))
        .collect();
    let mut data: Vec<Option<Vec<u8>>> = padded.iter().cloned().map(Some).collect();
    data[0] = None;
    data[1] = None;
    data[2] = None;
    let mut strands: Vec<Vec<Option<Vec<u8>>>> = entangled
        .strands
        .iter()
        .map(|s| s.iter().cloned().map(Some).collect())
        .collect();

    let rebuilt = entangler
        .repair(&mut data, &mut strands)
        .expect("Failed to repair");

    assert_eq!(rebuilt, 3);
    assert_eq!(data.into_iter().flatten().collect::<Vec<_>>(), padded);
}

#[test]
fn test_entangler_repairs_mixed_losses() {
    let members = members();
    let entangler = Entangler::new(2).expect("Failed to create entangler");
    let entangled = entangler.entangle(&members).expect("Failed to entangle");

    let padded: Vec<Vec<u8>> = members
        .iter()
        .map(|m| pad_shard(m, entangled.shard_len).expect("Failed to pad"))
        .collect();
    let mut data: Vec<Option<Vec<u8>>> = padded.iter().cloned().map(Some).collect();
    let mut strands: Vec<Vec<Option<Vec<u8>>>> = entangled
        .strands
        .iter()
        .map(|s| s.iter().cloned().map(Some).collect())
        .collect();
    data[1] = None;
    strands[0][1] = None;

    entangler
        .repair(&mut data, &mut strands)
        .expect("Failed to repair");

    assert_eq!(data.into_iter().flatten().collect::<Vec<_>>(), padded);
    assert_eq!(strands[0][1].as_ref(), Some(&entangled.strands[0][1]));
}

#[test]
fn test_entangler_strand_bounds() {
    assert!(Entangler::new(MAX_STRANDS).is_ok());
    assert_matches!(Entangler::new(0), Err(Error::InvalidEcConfig(_)));
    assert_matches!(
        Entangler::new(MAX_STRANDS + 1),
        Err(Error::InvalidEcConfig(_))
    );
}

// =============================================================================
// Group Codec Tests
// =============================================================================

#[test]
fn test_reed_solomon_group_plan() {
    let codec = ReedSolomonCodec::new(16);
    let groups = codec.plan_groups(40, 3).expect("Failed to plan");
    assert_eq!(groups, vec![0..16, 16..32, 32..40]);
    assert!(codec.plan_groups(0, 3).expect("Failed to plan").is_empty());

    // capped so that members plus parity fit one codeword
    let wide = ReedSolomonCodec::new(1000);
    let groups = wide.plan_groups(300, 4).expect("Failed to plan");
    assert_eq!(groups[0], 0..(MAX_TOTAL_SHARDS - 4));
    assert_eq!(groups.len(), 2);
}

#[test]
fn test_codecs_share_one_repair_contract() {
    let blocks: Vec<Bytes> = members().into_iter().map(Bytes::from).collect();
    let rs = ReedSolomonCodec::new(16);
    let codecs: [&dyn GroupCodec; 2] = [&rs, &EntanglementCodec];

    for codec in codecs {
        let r = 2;
        assert_eq!(codec.tolerated_losses(r, blocks.len()), 2);

        let groups = codec.plan_groups(blocks.len(), r).expect("Failed to plan");
        assert_eq!(groups, vec![0..blocks.len()]);

        let (shard_len, parity) = codec.protect(&blocks, r).expect("Failed to protect");
        let padded: Vec<Vec<u8>> = blocks
            .iter()
            .map(|b| pad_shard(b, shard_len).expect("Failed to pad"))
            .collect();

        let mut members: Vec<Option<Vec<u8>>> = padded.iter().cloned().map(Some).collect();
        let mut shards: Vec<Option<Vec<u8>>> = parity.iter().cloned().map(Some).collect();
        members[2] = None;
        members[3] = None;

        codec
            .repair(&mut members, &mut shards, r)
            .unwrap_or_else(|e| panic!("{} repair failed: {}", codec.kind(), e));
        assert_eq!(members.into_iter().flatten().collect::<Vec<_>>(), padded);
        assert_eq!(shards.into_iter().flatten().collect::<Vec<_>>(), parity);
    }
}
