//! Multilevel clustering coarsener.
//!
//! Each round proposes a heavy-edge partner for every vertex in a seeded
//! random order, matches mutually-top proposals, and contracts the matching
//! into the next level. Rounds stop at the contraction floor or when the
//! shrink factor degenerates.

use log::debug;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use super::contraction;
use super::rating::{best_partner, TieBreak};
use super::{max_allowed_node_weight, Level};
use crate::context::Context;
use crate::datastructures::hypergraph::Hypergraph;
use crate::datastructures::sparse_map::SparseMap;
use crate::datastructures::{HypergraphOps, NodeId, INVALID_NODE};
use crate::runtime::{permutation_ranks, seeded_permutation, Runtime};

/// Coarsen `hg` into a stack of levels; the last entry is the coarsest.
pub fn coarsen(hg: &Hypergraph, ctx: &Context, rt: &Runtime) -> Vec<Level> {
    let contraction_limit = ctx.contraction_limit();
    let max_node_weight = max_allowed_node_weight(
        hg.total_node_weight(),
        contraction_limit,
        ctx.coarsening.max_allowed_weight_multiplier,
    );

    let mut levels: Vec<Level> = Vec::new();
    for round in 0..ctx.coarsening.max_rounds {
        let current = levels.last().map(|l| &l.hg).unwrap_or(hg);
        let n = current.num_nodes();
        if n <= contraction_limit {
            break;
        }

        let salt = rt.salt("coarsening-round", round as u64);
        let cluster = match_round(current, ctx, rt, max_node_weight, salt);
        let num_clusters = (0..n)
            .into_par_iter()
            .filter(|&v| cluster[v] == v as NodeId)
            .count();
        let shrink = n as f64 / num_clusters as f64;
        debug!("coarsening round {round}: {n} -> {num_clusters} vertices");
        if shrink < ctx.coarsening.minimum_shrink_factor {
            break;
        }

        let (coarse, mapping) = contraction::contract(current, &cluster);
        levels.push(Level { hg: coarse, mapping });
    }
    levels
}

/// One propose-and-match round. Returns the cluster representative per
/// vertex (`cluster[r] = r` for representatives and unmatched vertices).
fn match_round(
    hg: &Hypergraph,
    ctx: &Context,
    rt: &Runtime,
    max_node_weight: i64,
    salt: u64,
) -> Vec<NodeId> {
    let n = hg.num_nodes();
    let order = seeded_permutation(n, salt);
    let ranks = permutation_ranks(n, salt ^ 0x9E37);

    let proposals: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(INVALID_NODE)).collect();
    let deterministic = rt.deterministic();
    order.par_iter().for_each_init(
        || SparseMap::<f64>::new(n),
        |scratch, &v| {
            let tie_break = if deterministic {
                TieBreak::PermutationRank(&ranks)
            } else {
                TieBreak::Random
            };
            if let Some(u) = best_partner(
                hg,
                v,
                &ctx.coarsening,
                max_node_weight,
                &tie_break,
                scratch,
            ) {
                proposals[v as usize].store(u, Ordering::Relaxed);
            }
        },
    );

    // Mutually-top proposals become matches; the rank-smaller endpoint is the
    // representative. Each vertex writes only its own entry.
    let cluster: Vec<AtomicU32> = (0..n as u32).map(AtomicU32::new).collect();
    (0..n as u32).into_par_iter().for_each(|v| {
        let u = proposals[v as usize].load(Ordering::Relaxed);
        if u != INVALID_NODE && proposals[u as usize].load(Ordering::Relaxed) == v {
            let leader = if ranks[v as usize] <= ranks[u as usize] {
                v
            } else {
                u
            };
            cluster[v as usize].store(leader, Ordering::Relaxed);
        }
    });
    cluster.into_iter().map(AtomicU32::into_inner).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::hypergraph::HypergraphBuilder;

    /// A chain of heavy pairs: 0-1, 2-3, 4-5, ... plus light links between
    /// consecutive pairs.
    fn pair_chain(num_pairs: usize) -> Hypergraph {
        let mut builder = HypergraphBuilder::new(2 * num_pairs);
        for i in 0..num_pairs {
            builder = builder.add_edge(vec![2 * i as NodeId, 2 * i as NodeId + 1], 10);
        }
        for i in 0..num_pairs.saturating_sub(1) {
            builder = builder.add_edge(vec![2 * i as NodeId + 1, 2 * i as NodeId + 2], 1);
        }
        builder.build()
    }

    fn small_context(k: u32, floor_multiplier: usize) -> Context {
        let mut ctx = Context::new();
        ctx.partition.k = k;
        ctx.coarsening.contraction_limit_multiplier = floor_multiplier;
        ctx
    }

    #[test]
    fn heavy_pairs_match_first() {
        let hg = pair_chain(8);
        let ctx = small_context(2, 2);
        let rt = Runtime::new(1, true, Some(2));
        let levels = rt.install(|| coarsen(&hg, &ctx, &rt));
        assert!(!levels.is_empty());
        let first = &levels[0];
        // Every heavy pair must be contracted in the first round.
        for i in 0..8 {
            assert_eq!(
                first.mapping[2 * i],
                first.mapping[2 * i + 1],
                "pair {i} not matched"
            );
        }
        assert_eq!(first.hg.num_nodes(), 8);
    }

    #[test]
    fn respects_the_contraction_floor() {
        let hg = pair_chain(16);
        let ctx = small_context(2, 2);
        let rt = Runtime::new(7, true, Some(2));
        let levels = rt.install(|| coarsen(&hg, &ctx, &rt));
        let coarsest = &levels.last().unwrap().hg;
        assert!(coarsest.num_nodes() >= 4, "overshot the floor");
        assert!(
            coarsest.num_nodes() < 32,
            "no coarsening happened at all"
        );
    }

    #[test]
    fn deterministic_mode_is_thread_count_invariant() {
        let hg = pair_chain(12);
        let ctx = small_context(2, 2);
        let run = |threads| {
            let rt = Runtime::new(5, true, Some(threads));
            let levels = rt.install(|| coarsen(&hg, &ctx, &rt));
            levels
                .into_iter()
                .map(|l| l.mapping)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(1), run(4));
    }

    #[test]
    fn communities_are_never_crossed() {
        let mut hg = pair_chain(4);
        let communities = vec![0, 0, 0, 0, 1, 1, 1, 1];
        hg.set_communities(communities.clone());
        let ctx = small_context(2, 1);
        let rt = Runtime::new(3, true, Some(2));
        let levels = rt.install(|| coarsen(&hg, &ctx, &rt));
        assert!(!levels.is_empty());
        let first = &levels[0];
        for v in 0..8 {
            for u in 0..8 {
                if first.mapping[v] == first.mapping[u] {
                    assert_eq!(
                        communities[v], communities[u],
                        "{v} and {u} merged across communities"
                    );
                }
            }
        }
        // Coarse levels inherit the community of their members.
        assert!(first.hg.has_communities());
    }

    #[test]
    fn tiny_hypergraphs_are_left_alone() {
        let hg = pair_chain(2);
        let ctx = small_context(2, 160);
        let rt = Runtime::new(0, true, Some(1));
        let levels = rt.install(|| coarsen(&hg, &ctx, &rt));
        assert!(levels.is_empty());
    }
}
