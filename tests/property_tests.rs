//! Property-based tests: tracked state stays consistent under arbitrary
//! feasible move sequences, and construction round-trips.

use proptest::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use hypermill::context::Objective;
use hypermill::datastructures::gain_cache::GainCache;
use hypermill::datastructures::hypergraph::{Hypergraph, HypergraphBuilder};
use hypermill::datastructures::partitioned::PartitionedHypergraph;
use hypermill::datastructures::{HypergraphOps, NodeId, NodeWeight};
use hypermill::error::DebugInvariants;
use hypermill::metrics;

/// Random hypergraph from a reproducible seed derived of the parameters.
fn random_hypergraph(n: usize, m: usize, max_size: usize, salt: u64) -> Hypergraph {
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    let seed = {
        let mut h = DefaultHasher::new();
        (n, m, max_size, salt).hash(&mut h);
        h.finish()
    };
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut builder = HypergraphBuilder::new(n);
    for _ in 0..m {
        let size = rng.gen_range(2..=max_size.min(n));
        let mut pins: Vec<NodeId> = (0..n as NodeId).collect();
        for i in 0..size {
            let j = rng.gen_range(i..n);
            pins.swap(i, j);
        }
        pins.truncate(size);
        builder = builder.add_edge(pins, rng.gen_range(1..=4));
    }
    builder.build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn invariants_survive_random_move_sequences(
        n in 4usize..16,
        m in 1usize..12,
        k in 2u32..5,
        salt in 0u64..1000,
        moves in proptest::collection::vec((0u32..16, 0u32..5), 1..40),
    ) {
        let hg = random_hypergraph(n, m, 4, salt);
        let phg = PartitionedHypergraph::new(k as usize, hg);
        for v in 0..n as NodeId {
            phg.set_only_node_part(v, v % k);
        }
        phg.initialize_partition();

        for (v, to) in moves {
            let v = v % n as u32;
            let to = to % k;
            let from = phg.part_id(v);
            if from != to {
                phg.change_node_part(v, from, to, NodeWeight::MAX, |_| {});
            }
        }
        prop_assert!(phg.validate_invariants().is_ok());
    }

    #[test]
    fn gain_cache_tracks_any_move_sequence(
        n in 4usize..12,
        m in 1usize..10,
        salt in 0u64..1000,
        moves in proptest::collection::vec((0u32..12, 0u32..3), 1..30),
    ) {
        for objective in [Objective::Km1, Objective::Cut] {
            let hg = random_hypergraph(n, m, 4, salt);
            let phg = PartitionedHypergraph::new(3, hg);
            for v in 0..n as NodeId {
                phg.set_only_node_part(v, v % 3);
            }
            phg.initialize_partition();
            let mut cache = GainCache::new(objective, usize::MAX);
            cache.initialize(&phg);

            let mut delta = 0;
            let before = metrics::objective(&phg, objective);
            for &(v, to) in &moves {
                let v = v % n as u32;
                let to = to % 3;
                let from = phg.part_id(v);
                if from == to {
                    continue;
                }
                let moved = phg.change_node_part(v, from, to, NodeWeight::MAX, |su| {
                    delta += metrics::objective_delta(objective, su);
                    cache.delta_gain_update(&phg, su);
                });
                if moved {
                    cache.recompute_penalty(&phg, v);
                }
            }
            prop_assert_eq!(metrics::objective(&phg, objective), before + delta);
        }
    }

    #[test]
    fn extract_splits_are_induced_subhypergraphs(
        n in 4usize..14,
        m in 1usize..10,
        k in 2u32..4,
        salt in 0u64..1000,
    ) {
        use hypermill::datastructures::partitioned::CutPolicy;
        let hg = random_hypergraph(n, m, 5, salt);
        let phg = PartitionedHypergraph::new(k as usize, hg);
        for v in 0..n as NodeId {
            phg.set_only_node_part(v, v % k);
        }
        phg.initialize_partition();

        for block in 0..k {
            let (sub, node_map) = phg.extract(block, CutPolicy::Split);
            // Every extracted vertex belongs to the block.
            for &orig in &node_map {
                prop_assert_eq!(phg.part_id(orig), block);
            }
            // Each sub-edge is the in-block restriction of some original edge
            // with at least two in-block pins.
            for e in 0..sub.num_edges() as u32 {
                prop_assert!(sub.edge_size(e) >= 2);
                let original: Vec<NodeId> =
                    sub.pins(e).iter().map(|&p| node_map[p as usize]).collect();
                let found = (0..phg.hypergraph().num_edges() as u32).any(|oe| {
                    let mut in_block: Vec<NodeId> = phg
                        .hypergraph()
                        .pins(oe)
                        .iter()
                        .copied()
                        .filter(|&p| phg.part_id(p) == block)
                        .collect();
                    in_block.sort_unstable();
                    let mut got = original.clone();
                    got.sort_unstable();
                    in_block == got
                });
                prop_assert!(found, "sub-edge without a matching original");
            }
        }
    }

    #[test]
    fn builder_offsets_roundtrip(
        n in 2usize..12,
        m in 1usize..8,
        salt in 0u64..1000,
    ) {
        let hg = random_hypergraph(n, m, 4, salt);
        // Serialize into the wire format and rebuild.
        let mut offsets = vec![0usize];
        let mut pins = Vec::new();
        for e in 0..hg.num_edges() as u32 {
            pins.extend_from_slice(hg.pins(e));
            offsets.push(pins.len());
        }
        let weights: Vec<i64> = (0..hg.num_edges() as u32).map(|e| hg.edge_weight(e)).collect();
        let rebuilt = HypergraphBuilder::from_offset_format(
            n, hg.num_edges(), &offsets, &pins, Some(&weights), None,
        ).unwrap().build();
        prop_assert_eq!(rebuilt.num_edges(), hg.num_edges());
        prop_assert_eq!(rebuilt.num_pins(), hg.num_pins());
        for e in 0..hg.num_edges() as u32 {
            prop_assert_eq!(rebuilt.pins(e), hg.pins(e));
            prop_assert_eq!(rebuilt.edge_weight(e), hg.edge_weight(e));
        }
    }
}
