//! Property-Based Tests for the Group Codecs
//!
//! # Test Properties
//!
//! 1. **Fault Tolerance**: any `m` lost members of a Reed-Solomon group, or
//!    any `alpha` lost blocks of an entangled group, are rebuilt exactly
//! 2. **Monotonicity**: raising the redundancy never turns a repairable loss
//!    pattern into an unrepairable one
//! 3. **Determinism**: the same group always produces the same parity

#![cfg(test)]

use proptest::prelude::*;

use super::encoder::{pad_shard, EcDecoder, EcEncoder};
use super::entangle::Entangler;

// =============================================================================
// Property Strategies
// =============================================================================

/// Groups of 1..=12 blocks with uneven lengths.
fn group_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 1..=12)
}

/// Indices to erase out of `total` slots.
fn erasure_strategy(total: usize, max_erasures: usize) -> impl Strategy<Value = Vec<usize>> {
    let max = std::cmp::min(max_erasures, total);
    prop::collection::vec(0..total, 0..=max).prop_map(|mut v| {
        v.sort();
        v.dedup();
        v
    })
}

fn padded(members: &[Vec<u8>], shard_len: usize) -> Vec<Vec<u8>> {
    members
        .iter()
        .map(|m| pad_shard(m, shard_len).unwrap())
        .collect()
}

// =============================================================================
// Reed-Solomon Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: Any m erasures across data and parity are rebuilt.
    #[test]
    fn prop_rs_group_survives_m_erasures(
        (members, m, erasures) in (group_strategy(), 1usize..=3).prop_flat_map(|(g, m)| {
            let total = g.len() + m;
            (Just(g), Just(m), erasure_strategy(total, m))
        }),
    ) {
        let k = members.len();
        let encoder = EcEncoder::new(k, m)?;
        let decoder = EcDecoder::new(k, m)?;
        let parity = encoder.encode_group(&members)?;
        let expected: Vec<Vec<u8>> = padded(&members, parity.shard_len)
            .into_iter()
            .chain(parity.parity)
            .collect();

        let mut shards: Vec<Option<Vec<u8>>> = expected.iter().cloned().map(Some).collect();
        for &i in &erasures {
            shards[i] = None;
        }

        decoder.reconstruct(&mut shards)?;
        let rebuilt: Vec<Vec<u8>> = shards.into_iter().flatten().collect();
        prop_assert_eq!(rebuilt, expected);
    }

    /// Property: Parity is deterministic across encoder instances.
    #[test]
    fn prop_rs_parity_deterministic(members in group_strategy(), m in 1usize..=3) {
        let a = EcEncoder::new(members.len(), m)?.encode_group(&members)?;
        let b = EcEncoder::new(members.len(), m)?.encode_group(&members)?;
        prop_assert_eq!(a, b);
    }
}

// =============================================================================
// Entanglement Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: Any alpha erasures over data and strand parities are repaired.
    #[test]
    fn prop_entangled_group_survives_alpha_erasures(
        (members, alpha, erasures) in (group_strategy(), 1usize..=3).prop_flat_map(|(g, a)| {
            let total = g.len() * (a + 1);
            (Just(g), Just(a), erasure_strategy(total, a))
        }),
    ) {
        let n = members.len();
        let entangler = Entangler::new(alpha)?;
        let ent = entangler.entangle(&members)?;

        let want_data = padded(&members, ent.shard_len);
        let mut data: Vec<Option<Vec<u8>>> = want_data.iter().cloned().map(Some).collect();
        let mut parity: Vec<Vec<Option<Vec<u8>>>> = ent
            .strands
            .iter()
            .map(|s| s.iter().cloned().map(Some).collect())
            .collect();

        // slots 0..n are data, then strand-major parity
        for &e in &erasures {
            if e < n {
                data[e] = None;
            } else {
                let p = e - n;
                parity[p / n][p % n] = None;
            }
        }

        entangler.repair(&mut data, &mut parity)?;
        let rebuilt: Vec<Vec<u8>> = data.into_iter().flatten().collect();
        prop_assert_eq!(rebuilt, want_data);
        for (s, strand) in parity.iter().enumerate() {
            for (i, p) in strand.iter().enumerate() {
                prop_assert_eq!(p.as_ref(), Some(&ent.strands[s][i]));
            }
        }
    }

    /// Property: Adding a strand never breaks a repair that already worked.
    #[test]
    fn prop_entanglement_monotonic(
        (members, lost) in group_strategy().prop_flat_map(|g| {
            let n = g.len();
            (Just(g), erasure_strategy(n, n))
        }),
    ) {
        let n = members.len();
        let mut previous_ok = false;
        for alpha in 1..=3 {
            let entangler = Entangler::new(alpha)?;
            let ent = entangler.entangle(&members)?;
            let mut data: Vec<Option<Vec<u8>>> = padded(&members, ent.shard_len)
                .into_iter()
                .map(Some)
                .collect();
            let mut parity: Vec<Vec<Option<Vec<u8>>>> = ent
                .strands
                .iter()
                .map(|s| s.iter().cloned().map(Some).collect())
                .collect();
            for &i in &lost {
                data[i] = None;
                // the first strand loses the same positions
                parity[0][i] = None;
            }

            let ok = entangler.repair(&mut data, &mut parity).is_ok();
            prop_assert!(ok || !previous_ok, "alpha={} regressed (n={})", alpha, n);
            previous_ok = ok;
        }
    }
}
