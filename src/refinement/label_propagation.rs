//! Label propagation refinement: parallel greedy single-vertex moves over the
//! border.
//!
//! Each round shuffles the active set with a seeded permutation, moves every
//! vertex to its best admissible block when the cached gain is positive, and
//! activates the pins of touched cut hyperedges for the next round. The
//! refiner converges when a round commits no move. In sequential mode the
//! rounds run on one thread, which (with the seeded shuffle) makes the result
//! independent of the thread count.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::context::{LabelPropagationConfig, Objective};
use crate::datastructures::gain_cache::GainCache;
use crate::datastructures::partitioned::PartitionedHypergraph;
use crate::datastructures::{Gain, HypergraphOps, NodeId, NodeWeight, PartitionId};
use crate::metrics::{objective_delta, Metrics};
use crate::runtime::{seeded_shuffle, Runtime};

use super::Refiner;

pub struct LabelPropagationRefiner {
    cfg: LabelPropagationConfig,
    objective: Objective,
    l_max: Vec<NodeWeight>,
    /// Distinguishes the shuffle salts of repeated refine calls.
    invocation: u64,
}

impl LabelPropagationRefiner {
    pub fn new(cfg: LabelPropagationConfig, objective: Objective, l_max: Vec<NodeWeight>) -> Self {
        Self {
            cfg,
            objective,
            l_max,
            invocation: 0,
        }
    }

    /// Best admissible target of `v` by cached gain; ties prefer the smaller
    /// block id.
    fn best_target<H: HypergraphOps>(
        &self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: &GainCache,
        v: NodeId,
    ) -> Option<(PartitionId, Gain)> {
        let from = phg.part_id(v);
        let wv = phg.hypergraph().node_weight(v);
        let mut best: Option<(PartitionId, Gain)> = None;
        for to in 0..phg.k() as PartitionId {
            if to == from || phg.part_weight(to) + wv > self.l_max[to as usize] {
                continue;
            }
            let gain = gain_cache.gain(v, to);
            if best.map_or(true, |(_, bg)| gain > bg) {
                best = Some((to, gain));
            }
        }
        best
    }

    /// Attempt the best move of `v`; on success mark the pins of its cut
    /// hyperedges active.
    #[allow(clippy::too_many_arguments)]
    fn move_vertex<H: HypergraphOps>(
        &self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: &GainCache,
        v: NodeId,
        next_active: &[AtomicBool],
        delta_acc: &AtomicI64,
        moved_count: &AtomicUsize,
    ) -> bool {
        if !self.cfg.rebalancing && !phg.is_border_node(v) {
            return false;
        }
        let Some((to, gain)) = self.best_target(phg, gain_cache, v) else {
            return false;
        };
        if gain <= 0 {
            return false;
        }
        let from = phg.part_id(v);
        let mut delta: Gain = 0;
        let moved = phg.change_node_part(v, from, to, self.l_max[to as usize], |su| {
            delta += objective_delta(self.objective, su);
            gain_cache.delta_gain_update(phg, su);
        });
        if !moved {
            return false;
        }
        gain_cache.recompute_penalty(phg, v);
        delta_acc.fetch_add(delta, Ordering::Relaxed);
        moved_count.fetch_add(1, Ordering::Relaxed);

        let hg = phg.hypergraph();
        for &e in hg.incident_edges(v) {
            if phg.connectivity(e) >= 2 {
                for &p in hg.pins(e) {
                    next_active[p as usize].store(true, Ordering::Relaxed);
                }
            }
        }
        true
    }
}

impl<H: HypergraphOps> Refiner<H> for LabelPropagationRefiner {
    fn initialize(&mut self, _phg: &PartitionedHypergraph<H>, _gain_cache: &GainCache) {}

    fn refine(
        &mut self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: &GainCache,
        refinement_nodes: &[NodeId],
        metrics: &mut Metrics,
        rt: &Runtime,
        time_budget: Option<Duration>,
    ) -> bool {
        debug_assert!(gain_cache.is_initialized());
        let start = Instant::now();
        self.invocation += 1;
        let n = phg.hypergraph().num_nodes();

        let mut active: Vec<NodeId> = if refinement_nodes.is_empty() {
            if self.cfg.rebalancing {
                phg.hypergraph().par_nodes().collect()
            } else {
                phg.border_nodes()
            }
        } else {
            refinement_nodes.to_vec()
        };

        let delta_acc = AtomicI64::new(0);
        let moved_count = AtomicUsize::new(0);

        for round in 0..self.cfg.maximum_iterations {
            if active.is_empty() {
                break;
            }
            if let Some(budget) = time_budget {
                if start.elapsed() > budget {
                    break;
                }
            }
            let salt = rt.salt("lp-round", self.invocation << 16 | round as u64);
            seeded_shuffle(&mut active, salt);

            let next_active: Vec<AtomicBool> = (0..n).map(|_| AtomicBool::new(false)).collect();
            let moved_before = moved_count.load(Ordering::Relaxed);

            if self.cfg.execute_sequential {
                for &v in &active {
                    self.move_vertex(phg, gain_cache, v, &next_active, &delta_acc, &moved_count);
                }
            } else {
                active.par_iter().for_each(|&v| {
                    self.move_vertex(phg, gain_cache, v, &next_active, &delta_acc, &moved_count);
                });
            }

            if moved_count.load(Ordering::Relaxed) == moved_before {
                break;
            }
            active = (0..n as NodeId)
                .into_par_iter()
                .filter(|&v| {
                    next_active[v as usize].load(Ordering::Relaxed)
                        && phg.hypergraph().is_node_enabled(v)
                })
                .collect();
        }

        let delta = delta_acc.load(Ordering::Relaxed);
        metrics.objective += delta;
        metrics.imbalance = crate::metrics::imbalance(phg);
        delta < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::datastructures::hypergraph::{Hypergraph, HypergraphBuilder};
    use crate::metrics;

    /// Two pair-clusters with one vertex placed on the wrong side.
    fn misassigned_instance() -> (PartitionedHypergraph<Hypergraph>, GainCache) {
        let hg = HypergraphBuilder::new(6)
            .add_edge(vec![0, 1], 2)
            .add_edge(vec![1, 2], 2)
            .add_edge(vec![3, 4], 2)
            .add_edge(vec![4, 5], 2)
            .add_edge(vec![2, 3], 1)
            .build();
        let phg = PartitionedHypergraph::new(2, hg);
        // Vertex 2 belongs with {0,1} but starts in block 1.
        phg.apply_partition(&[0, 0, 1, 1, 1, 1]);
        let mut cache = GainCache::new(Objective::Km1, usize::MAX);
        cache.initialize(&phg);
        (phg, cache)
    }

    #[test]
    fn moves_the_misassigned_vertex_home() {
        let (phg, cache) = misassigned_instance();
        let ctx = Context::new();
        let l_max = metrics::max_block_weights(6, 2, 0.05);
        let mut refiner = LabelPropagationRefiner::new(
            ctx.refinement.label_propagation.clone(),
            Objective::Km1,
            l_max,
        );
        let before = metrics::km1(&phg);
        let mut m = Metrics {
            objective: before,
            imbalance: metrics::imbalance(&phg),
        };
        let rt = Runtime::new(1, false, Some(2));
        let improved =
            rt.install(|| refiner.refine(&phg, &cache, &[], &mut m, &rt, None));
        assert!(improved);
        assert_eq!(phg.part_id(2), 0);
        assert_eq!(m.objective, metrics::km1(&phg));
        assert!(m.objective < before);
        assert!(cache.is_consistent(&phg));
    }

    #[test]
    fn respects_the_balance_constraint() {
        let (phg, cache) = misassigned_instance();
        let ctx = Context::new();
        // Tight limit: block 0 already holds 2 of max 3.
        let l_max = vec![3, 3];
        let mut refiner = LabelPropagationRefiner::new(
            ctx.refinement.label_propagation.clone(),
            Objective::Km1,
            l_max.clone(),
        );
        let mut m = Metrics {
            objective: metrics::km1(&phg),
            imbalance: metrics::imbalance(&phg),
        };
        let rt = Runtime::new(1, false, Some(2));
        rt.install(|| refiner.refine(&phg, &cache, &[], &mut m, &rt, None));
        for b in 0..2u32 {
            assert!(phg.part_weight(b) <= l_max[b as usize]);
        }
    }

    #[test]
    fn sequential_mode_is_repeatable() {
        let run = |threads: usize| {
            let (phg, cache) = misassigned_instance();
            let mut cfg = Context::new().refinement.label_propagation;
            cfg.execute_sequential = true;
            let mut refiner = LabelPropagationRefiner::new(
                cfg,
                Objective::Km1,
                metrics::max_block_weights(6, 2, 0.05),
            );
            let mut m = Metrics {
                objective: metrics::km1(&phg),
                imbalance: 0.0,
            };
            let rt = Runtime::new(9, true, Some(threads));
            rt.install(|| refiner.refine(&phg, &cache, &[], &mut m, &rt, None));
            phg.part_snapshot()
        };
        assert_eq!(run(1), run(4));
    }

    #[test]
    fn objective_delta_is_exact_over_rounds() {
        let (phg, cache) = misassigned_instance();
        let ctx = Context::new();
        let mut refiner = LabelPropagationRefiner::new(
            ctx.refinement.label_propagation.clone(),
            Objective::Cut,
            metrics::max_block_weights(6, 2, 0.05),
        );
        let mut cut_cache = GainCache::new(Objective::Cut, usize::MAX);
        cut_cache.initialize(&phg);
        drop(cache);
        let before = metrics::cut(&phg);
        let mut m = Metrics {
            objective: before,
            imbalance: 0.0,
        };
        let rt = Runtime::new(5, false, Some(2));
        rt.install(|| refiner.refine(&phg, &cut_cache, &[], &mut m, &rt, None));
        assert_eq!(m.objective, metrics::cut(&phg));
    }
}
