//! N-level coarsener: one contraction at a time into a dynamic hypergraph.
//!
//! Produces the memento log consumed by batch uncontraction during
//! uncoarsening. Contractions are chosen by the same heavy-edge rating and
//! admissibility rules as the clustering coarsener, traversed in a seeded
//! order, so the log is reproducible for a fixed seed.

use log::debug;

use super::rating::{best_partner, TieBreak};
use super::max_allowed_node_weight;
use crate::context::Context;
use crate::datastructures::dynamic::{ContractionMemento, DynamicHypergraph};
use crate::datastructures::hypergraph::Hypergraph;
use crate::datastructures::sparse_map::SparseMap;
use crate::datastructures::{HypergraphOps, NodeId};
use crate::runtime::{permutation_ranks, seeded_permutation, Runtime};

/// Result of n-level coarsening: the contracted dynamic hypergraph and the
/// contraction log in application order.
#[derive(Debug)]
pub struct NLevelHierarchy {
    pub dhg: DynamicHypergraph,
    pub mementos: Vec<ContractionMemento>,
}

pub fn coarsen_nlevel(hg: &Hypergraph, ctx: &Context, rt: &Runtime) -> NLevelHierarchy {
    let contraction_limit = ctx.contraction_limit();
    let max_node_weight = max_allowed_node_weight(
        hg.total_node_weight(),
        contraction_limit,
        ctx.coarsening.max_allowed_weight_multiplier,
    );

    let mut dhg = DynamicHypergraph::from_hypergraph(hg);
    let n = dhg.num_nodes();
    let mut mementos = Vec::new();
    let mut scratch = SparseMap::<f64>::new(n);

    for pass in 0..ctx.coarsening.max_rounds {
        if dhg.num_enabled_nodes() <= contraction_limit {
            break;
        }
        let salt = rt.salt("nlevel-pass", pass as u64);
        let order = seeded_permutation(n, salt);
        let ranks = permutation_ranks(n, salt ^ 0x9E37);
        let before = mementos.len();

        for &v in &order {
            if dhg.num_enabled_nodes() <= contraction_limit {
                break;
            }
            if !dhg.is_node_enabled(v) {
                continue;
            }
            let partner = best_partner(
                &dhg,
                v,
                &ctx.coarsening,
                max_node_weight,
                &TieBreak::PermutationRank(&ranks),
                &mut scratch,
            );
            if let Some(u) = partner {
                mementos.push(dhg.contract(u, v));
            }
        }
        let contracted = mementos.len() - before;
        debug!(
            "n-level pass {pass}: {contracted} contractions, {} nodes left",
            dhg.num_enabled_nodes()
        );
        if contracted == 0 {
            break;
        }
    }

    NLevelHierarchy { dhg, mementos }
}

/// Split the memento log into uncontraction batches, last contraction first.
pub fn uncontraction_batches(
    mementos: &[ContractionMemento],
    batch_size: usize,
) -> impl Iterator<Item = &[ContractionMemento]> {
    let batch_size = batch_size.max(1);
    mementos.rchunks(batch_size)
}

/// Vertices touched by a batch, deduplicated; the localized refinement seeds.
pub fn batch_nodes(batch: &[ContractionMemento]) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = batch.iter().flat_map(|m| [m.u, m.v]).collect();
    nodes.sort_unstable();
    nodes.dedup();
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::hypergraph::HypergraphBuilder;

    fn chain(n: usize) -> Hypergraph {
        let mut builder = HypergraphBuilder::new(n);
        for i in 0..n - 1 {
            builder = builder.add_edge(vec![i as NodeId, i as NodeId + 1], 1);
        }
        builder.build()
    }

    fn context(k: u32, floor: usize) -> Context {
        let mut ctx = Context::new();
        ctx.partition.k = k;
        ctx.coarsening.contraction_limit_multiplier = floor;
        ctx
    }

    #[test]
    fn contracts_down_to_the_floor() {
        let hg = chain(32);
        let ctx = context(2, 2);
        let rt = Runtime::new(11, true, Some(1));
        let hierarchy = rt.install(|| coarsen_nlevel(&hg, &ctx, &rt));
        assert!(hierarchy.dhg.num_enabled_nodes() <= 8);
        assert!(hierarchy.dhg.num_enabled_nodes() >= 4);
        assert_eq!(
            32 - hierarchy.mementos.len(),
            hierarchy.dhg.num_enabled_nodes()
        );
    }

    #[test]
    fn full_uncontraction_restores_the_hypergraph() {
        let hg = chain(20);
        let ctx = context(2, 2);
        let rt = Runtime::new(2, true, Some(1));
        let NLevelHierarchy { mut dhg, mementos } = rt.install(|| coarsen_nlevel(&hg, &ctx, &rt));
        for m in mementos.iter().rev() {
            dhg.uncontract(m);
        }
        assert_eq!(dhg.num_enabled_nodes(), 20);
        assert_eq!(dhg.num_pins(), hg.num_pins());
        for v in 0..20 {
            assert_eq!(dhg.node_weight(v), 1);
            let mut got = dhg.incident_edges(v).to_vec();
            got.sort_unstable();
            let mut want = hg.incident_edges(v).to_vec();
            want.sort_unstable();
            assert_eq!(got, want, "incidence of {v}");
        }
    }

    #[test]
    fn batches_cover_the_log_in_reverse() {
        let hg = chain(16);
        let ctx = context(2, 2);
        let rt = Runtime::new(4, true, Some(1));
        let hierarchy = rt.install(|| coarsen_nlevel(&hg, &ctx, &rt));
        let total: usize = uncontraction_batches(&hierarchy.mementos, 3)
            .map(|b| b.len())
            .sum();
        assert_eq!(total, hierarchy.mementos.len());
        let first_batch = uncontraction_batches(&hierarchy.mementos, 3)
            .next()
            .unwrap();
        assert_eq!(
            first_batch.last().unwrap().v,
            hierarchy.mementos.last().unwrap().v,
            "first batch must end with the last contraction"
        );
        assert!(!batch_nodes(first_batch).is_empty());
    }
}
