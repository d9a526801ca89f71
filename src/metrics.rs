//! Partition quality metrics.
//!
//! `km1` and `cut` are parallel O(E) recomputations intended for phase
//! boundaries and tests; refiners track the running objective through
//! per-move deltas instead ([`objective_delta`]).

use rayon::prelude::*;

use crate::context::Objective;
use crate::datastructures::partitioned::PartitionedHypergraph;
use crate::datastructures::{
    EdgeWeight, Gain, HypergraphOps, NodeWeight, PartitionId, SynchronizedEdgeUpdate,
};

/// Connectivity metric: Σ_e w(e)·(λ(e)−1).
pub fn km1<H: HypergraphOps>(phg: &PartitionedHypergraph<H>) -> EdgeWeight {
    phg.hypergraph()
        .par_edges()
        .map(|e| {
            let lambda = phg.connectivity(e) as EdgeWeight;
            phg.hypergraph().edge_weight(e) * (lambda - 1).max(0)
        })
        .sum()
}

/// Cut metric: Σ_{e : λ(e) ≥ 2} w(e).
pub fn cut<H: HypergraphOps>(phg: &PartitionedHypergraph<H>) -> EdgeWeight {
    phg.hypergraph()
        .par_edges()
        .map(|e| {
            if phg.connectivity(e) >= 2 {
                phg.hypergraph().edge_weight(e)
            } else {
                0
            }
        })
        .sum()
}

/// The configured objective.
pub fn objective<H: HypergraphOps>(
    phg: &PartitionedHypergraph<H>,
    objective: Objective,
) -> EdgeWeight {
    match objective {
        Objective::Km1 => km1(phg),
        Objective::Cut => cut(phg),
    }
}

/// Change of the objective caused by one committed move on one hyperedge.
/// Summed over the [`SynchronizedEdgeUpdate`]s of a move this equals
/// `obj(after) − obj(before)` exactly.
pub fn objective_delta(objective: Objective, su: &SynchronizedEdgeUpdate) -> Gain {
    let w = su.edge_weight;
    match objective {
        Objective::Km1 => {
            let mut delta = 0;
            if su.pin_count_in_to_part_after == 1 {
                delta += w;
            }
            if su.pin_count_in_from_part_after == 0 {
                delta -= w;
            }
            delta
        }
        Objective::Cut => {
            let size = su.edge_size as u32;
            if size < 2 {
                return 0;
            }
            let mut delta = 0;
            if su.pin_count_in_from_part_after == size - 1 {
                // The edge was internal to the source block.
                delta += w;
            }
            if su.pin_count_in_to_part_after == size {
                delta -= w;
            }
            delta
        }
    }
}

/// Per-block weight limit L_max = (1+ε)·⌈w(V)/k⌉.
pub fn max_block_weights(total_weight: NodeWeight, k: usize, epsilon: f64) -> Vec<NodeWeight> {
    let perfect = (total_weight + k as NodeWeight - 1) / k as NodeWeight;
    let lmax = ((1.0 + epsilon) * perfect as f64).floor() as NodeWeight;
    vec![lmax; k]
}

/// Imbalance of the current partition: max_b W[b] / ⌈w(V)/k⌉ − 1.
pub fn imbalance<H: HypergraphOps>(phg: &PartitionedHypergraph<H>) -> f64 {
    let k = phg.k();
    let total = phg.hypergraph().total_node_weight();
    let perfect = (total + k as NodeWeight - 1) / k as NodeWeight;
    let heaviest = (0..k as PartitionId)
        .map(|b| phg.part_weight(b))
        .max()
        .unwrap_or(0);
    heaviest as f64 / perfect as f64 - 1.0
}

/// Lexicographic candidate score: objective first, then imbalance, with a
/// deterministic index for stable tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quality {
    pub objective: EdgeWeight,
    pub imbalance: f64,
    /// Feasible candidates always beat infeasible ones.
    pub feasible: bool,
}

impl Quality {
    pub fn is_better_than(&self, other: &Quality) -> bool {
        if self.feasible != other.feasible {
            return self.feasible;
        }
        if self.objective != other.objective {
            return self.objective < other.objective;
        }
        self.imbalance < other.imbalance
    }
}

/// Running snapshot the refiners update.
#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub objective: EdgeWeight,
    pub imbalance: f64,
}
