//! Greedy rebalancer: evict the cheapest vertices from overweight blocks.
//!
//! Used by the initial-partitioning pool when the best candidate is
//! infeasible and by unconstrained FM after each round. Every move's
//! objective delta is returned so callers charge the cost against their
//! accumulated gain.

use crate::context::Objective;
use crate::datastructures::gain_cache::GainCache;
use crate::datastructures::partitioned::PartitionedHypergraph;
use crate::datastructures::{Gain, HypergraphOps, NodeId, NodeWeight, PartitionId};
use crate::metrics::objective_delta;

use super::direct_move_gain;

/// Move vertices out of overweight blocks until every block fits `l_max`, or
/// no admissible move remains. Returns the total objective delta incurred
/// (positive = objective worsened). Keeps an initialized gain cache in sync.
pub fn rebalance<H: HypergraphOps>(
    phg: &PartitionedHypergraph<H>,
    gain_cache: &GainCache,
    objective: Objective,
    l_max: &[NodeWeight],
) -> Gain {
    let k = phg.k();
    let mut total_delta: Gain = 0;

    loop {
        let overweight: Vec<PartitionId> = (0..k as PartitionId)
            .filter(|&b| phg.part_weight(b) > l_max[b as usize])
            .collect();
        if overweight.is_empty() {
            break;
        }
        let mut any_progress = false;

        for from in overweight {
            // Cheapest evictions first: sort the block's vertices by the loss
            // of their best admissible move.
            let mut candidates: Vec<(Gain, NodeId, PartitionId)> = phg
                .hypergraph()
                .nodes()
                .filter(|&v| phg.part_id(v) == from)
                .filter_map(|v| {
                    best_eviction_target(phg, objective, v, from, l_max)
                        .map(|(gain, to)| (-gain, v, to))
                })
                .collect();
            candidates.sort_unstable_by_key(|&(loss, v, _)| (loss, v));

            for (_, v, _) in candidates {
                if phg.part_weight(from) <= l_max[from as usize] {
                    break;
                }
                // The preferred target may have filled up; recompute.
                let Some((_, to)) = best_eviction_target(phg, objective, v, from, l_max)
                else {
                    continue;
                };
                let mut delta: Gain = 0;
                let moved = phg.change_node_part(v, from, to, l_max[to as usize], |su| {
                    delta += objective_delta(objective, su);
                    if gain_cache.is_initialized() {
                        gain_cache.delta_gain_update(phg, su);
                    }
                });
                if moved {
                    if gain_cache.is_initialized() {
                        gain_cache.recompute_penalty(phg, v);
                    }
                    total_delta += delta;
                    any_progress = true;
                }
            }
        }

        if !any_progress {
            break;
        }
    }
    total_delta
}

/// Best target block for evicting `v` from `from`: highest gain among blocks
/// with room for it. Ties prefer the lighter block.
fn best_eviction_target<H: HypergraphOps>(
    phg: &PartitionedHypergraph<H>,
    objective: Objective,
    v: NodeId,
    from: PartitionId,
    l_max: &[NodeWeight],
) -> Option<(Gain, PartitionId)> {
    let wv = phg.hypergraph().node_weight(v);
    let mut best: Option<(Gain, PartitionId)> = None;
    for to in 0..phg.k() as PartitionId {
        if to == from || phg.part_weight(to) + wv > l_max[to as usize] {
            continue;
        }
        let gain = direct_move_gain(phg, objective, v, to);
        let better = match best {
            None => true,
            Some((bg, bb)) => {
                gain > bg || (gain == bg && phg.part_weight(to) < phg.part_weight(bb))
            }
        };
        if better {
            best = Some((gain, to));
        }
    }
    best
}
