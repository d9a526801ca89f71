//! Localized, multi-start FM refinement with bounded rollback.
//!
//! A round shuffles the border nodes and hands them out as seed batches to
//! parallel search tasks. Each task claims vertices through the shared
//! [`NodeTracker`], runs a localized search over a two-level gain priority
//! queue, applies moves directly to the shared partition, and finally rolls
//! back everything after its best prefix. The unconstrained strategy allows
//! temporarily overweight targets and repairs balance with the rebalancer
//! after every round, charging the repair cost against the round's gain.
//!
//! Round termination: relative improvement below the configured threshold,
//! `max_rounds`, or the cooperative time budget
//! `max(5 s, time_limit_factor · k · previous_round_time)` checked between
//! PQ extractions.

pub mod pq;
pub mod tracker;

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use log::debug;

use crate::context::{FmConfig, FmStrategy, Objective};
use crate::datastructures::gain_cache::GainCache;
use crate::datastructures::partitioned::PartitionedHypergraph;
use crate::datastructures::{Gain, HypergraphOps, NodeId, NodeWeight, PartitionId, INVALID_PARTITION};
use crate::metrics::{objective_delta, Metrics};
use crate::runtime::{seeded_shuffle, Runtime};

use self::pq::BlockVertexPq;
use self::tracker::NodeTracker;
use super::{rebalancer, Refiner};

const MIN_TIME_BUDGET: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
struct Move {
    v: NodeId,
    from: PartitionId,
    to: PartitionId,
}

pub struct FmRefiner {
    cfg: FmConfig,
    objective: Objective,
    l_max: Vec<NodeWeight>,
    tracker: NodeTracker,
    previous_round_time: Duration,
}

impl FmRefiner {
    pub fn new(cfg: FmConfig, objective: Objective, l_max: Vec<NodeWeight>) -> Self {
        Self {
            cfg,
            objective,
            l_max,
            tracker: NodeTracker::new(0),
            previous_round_time: Duration::ZERO,
        }
    }

    fn time_budget(&self, k: usize) -> Duration {
        let scaled = self.previous_round_time.as_secs_f64() * self.cfg.time_limit_factor * k as f64;
        MIN_TIME_BUDGET.max(Duration::from_secs_f64(scaled))
    }
}

impl<H: HypergraphOps> Refiner<H> for FmRefiner {
    fn initialize(&mut self, phg: &PartitionedHypergraph<H>, _gain_cache: &GainCache) {
        self.tracker = NodeTracker::new(phg.hypergraph().num_nodes());
    }

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
        let k = phg.k();
        let num_tasks = rt.num_threads().max(1);
        let mut total_delta: Gain = 0;

        for round in 0..self.cfg.max_rounds {
            let round_start = Instant::now();
            let budget = time_budget.unwrap_or_else(|| self.time_budget(k));
            if start.elapsed() > budget {
                break;
            }
            let deadline = start + budget;

            let mut seeds: Vec<NodeId> = if refinement_nodes.is_empty() {
                phg.border_nodes()
            } else {
                refinement_nodes
                    .iter()
                    .copied()
                    .filter(|&v| phg.is_border_node(v))
                    .collect()
            };
            if seeds.is_empty() {
                break;
            }
            seeded_shuffle(&mut seeds, rt.salt("fm-round", round as u64));

            let base = self.tracker.start_round(num_tasks as u32);
            let cursor = AtomicUsize::new(0);
            let round_delta = AtomicI64::new(0);

            rayon::scope(|scope| {
                for task in 0..num_tasks {
                    let seeds = &seeds;
                    let cursor = &cursor;
                    let round_delta = &round_delta;
                    let tracker = &self.tracker;
                    let cfg = &self.cfg;
                    let l_max = &self.l_max;
                    let objective = self.objective;
                    scope.spawn(move |_| {
                        let search_id = base + 1 + task as u32;
                        let mut search = LocalSearch::new(
                            k,
                            phg.hypergraph().num_nodes(),
                            cfg,
                            objective,
                            l_max,
                        );
                        loop {
                            let lo = cursor.fetch_add(cfg.num_seed_nodes, Ordering::Relaxed);
                            if lo >= seeds.len() || Instant::now() > deadline {
                                break;
                            }
                            let hi = (lo + cfg.num_seed_nodes).min(seeds.len());
                            let delta = search.run(
                                phg,
                                gain_cache,
                                tracker,
                                search_id,
                                &seeds[lo..hi],
                                deadline,
                            );
                            round_delta.fetch_add(delta, Ordering::Relaxed);
                        }
                    });
                }
            });

            let mut delta = round_delta.load(Ordering::Relaxed);
            if self.cfg.strategy == FmStrategy::Unconstrained {
                // Repair balance and charge the cost against the round.
                delta += rebalancer::rebalance(phg, gain_cache, self.objective, &self.l_max);
            }

            self.previous_round_time = round_start.elapsed();
            total_delta += delta;
            metrics.objective += delta;
            debug!("fm round {round}: delta {delta}");

            let improvement = -delta;
            let threshold =
                (self.cfg.min_relative_improvement * metrics.objective.max(1) as f64) as Gain;
            if improvement <= threshold {
                break;
            }
        }

        metrics.imbalance = crate::metrics::imbalance(phg);
        total_delta < 0
    }
}

/// Task-local state of one FM search; reused across seed batches.
struct LocalSearch<'a> {
    pq: BlockVertexPq,
    /// Designated target block of every vertex currently in the queue.
    target: Vec<PartitionId>,
    moves: Vec<Move>,
    cfg: &'a FmConfig,
    objective: Objective,
    l_max: &'a [NodeWeight],
    k: usize,
}

impl<'a> LocalSearch<'a> {
    fn new(
        k: usize,
        num_nodes: usize,
        cfg: &'a FmConfig,
        objective: Objective,
        l_max: &'a [NodeWeight],
    ) -> Self {
        Self {
            pq: BlockVertexPq::new(k, num_nodes),
            target: vec![INVALID_PARTITION; num_nodes],
            moves: Vec::new(),
            cfg,
            objective,
            l_max,
            k,
        }
    }

    /// Best target block and gain of `v` under the strategy's weight rule.
    fn best_target<H: HypergraphOps>(
        &self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: &GainCache,
        v: NodeId,
        candidates: Option<[PartitionId; 3]>,
    ) -> (PartitionId, Gain) {
        let from = phg.part_id(v);
        let wv = phg.hypergraph().node_weight(v);
        let constrained = self.cfg.strategy == FmStrategy::Constrained;
        let mut best = INVALID_PARTITION;
        let mut best_gain = Gain::MIN;
        let mut consider = |to: PartitionId| {
            if to == from || to == INVALID_PARTITION {
                return;
            }
            if constrained && phg.part_weight(to) + wv > self.l_max[to as usize] {
                return;
            }
            let gain = gain_cache.gain(v, to);
            if gain > best_gain || (gain == best_gain && to < best) {
                best = to;
                best_gain = gain;
            }
        };
        match candidates {
            Some(blocks) => blocks.into_iter().for_each(&mut consider),
            None => (0..self.k as PartitionId).for_each(&mut consider),
        }
        (best, best_gain)
    }

    fn insert<H: HypergraphOps>(
        &mut self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: &GainCache,
        v: NodeId,
    ) {
        let (to, gain) = self.best_target(phg, gain_cache, v, None);
        if to == INVALID_PARTITION {
            return;
        }
        self.target[v as usize] = to;
        self.pq.insert(phg.part_id(v), v, gain);
    }

    /// Rescore a queued neighbor after `moved` changed the landscape. With
    /// small k or an affected designated target the full scan runs, otherwise
    /// only the three candidate blocks are rescored.
    fn update_neighbor<H: HypergraphOps>(
        &mut self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: &GainCache,
        v: NodeId,
        moved: &Move,
    ) {
        let designated = self.target[v as usize];
        let (to, gain) = if self.k < 4 || designated == moved.from || designated == moved.to {
            self.best_target(phg, gain_cache, v, None)
        } else {
            self.best_target(
                phg,
                gain_cache,
                v,
                Some([designated, moved.from, moved.to]),
            )
        };
        if to == INVALID_PARTITION {
            return;
        }
        self.target[v as usize] = to;
        self.pq.adjust_key(phg.part_id(v), v, gain);
    }

    /// One localized search from a claimed seed batch. Returns the objective
    /// delta of the kept (best-prefix) moves.
    fn run<H: HypergraphOps>(
        &mut self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: &GainCache,
        tracker: &NodeTracker,
        search_id: u32,
        seeds: &[NodeId],
        deadline: Instant,
    ) -> Gain {
        self.pq.clear();
        self.moves.clear();

        for &seed in seeds {
            if phg.is_border_node(seed) && tracker.claim(seed, search_id) {
                self.insert(phg, gain_cache, seed);
            }
        }

        let mut local_delta: Gain = 0;
        let mut best_delta: Gain = 0;
        let mut best_prefix = 0usize;
        let mut since_best = 0usize;

        loop {
            if Instant::now() > deadline {
                break;
            }
            self.pq.update_block_pq();
            let Some((from, v, stale_gain)) = self.pq.top() else {
                break;
            };
            // The queue key may be stale; accept only a confirmed gain.
            let (to, gain) = self.best_target(phg, gain_cache, v, None);
            if to == INVALID_PARTITION {
                self.pq.remove(from, v);
                continue;
            }
            if gain < stale_gain {
                self.target[v as usize] = to;
                self.pq.adjust_key(from, v, gain);
                continue;
            }
            self.pq.remove(from, v);

            let cap = if self.cfg.strategy == FmStrategy::Constrained {
                self.l_max[to as usize]
            } else {
                NodeWeight::MAX
            };
            let mut delta: Gain = 0;
            let moved = phg.change_node_part(v, from, to, cap, |su| {
                delta += objective_delta(self.objective, su);
                gain_cache.delta_gain_update(phg, su);
            });
            if !moved {
                continue;
            }
            gain_cache.recompute_penalty(phg, v);
            local_delta += delta;
            let mv = Move { v, from, to };
            self.moves.push(mv);

            if local_delta < best_delta {
                best_delta = local_delta;
                best_prefix = self.moves.len();
                since_best = 0;
            } else {
                since_best += 1;
                if since_best > self.cfg.max_moves_without_improvement {
                    break;
                }
            }

            // Activate and rescore the neighborhood.
            let hg = phg.hypergraph();
            for &e in hg.incident_edges(v) {
                if hg.edge_size(e) > self.cfg.high_degree_threshold {
                    continue;
                }
                for &p in hg.pins(e) {
                    if p == v {
                        continue;
                    }
                    if self.pq.contains(p) {
                        self.update_neighbor(phg, gain_cache, p, &mv);
                    } else if phg.is_border_node(p) && tracker.claim(p, search_id) {
                        self.insert(phg, gain_cache, p);
                    }
                }
            }
        }

        // Roll back everything after the best prefix, newest first.
        for mv in self.moves[best_prefix..].iter().rev() {
            let mut delta: Gain = 0;
            let undone = phg.change_node_part(mv.v, mv.to, mv.from, NodeWeight::MAX, |su| {
                delta += objective_delta(self.objective, su);
                gain_cache.delta_gain_update(phg, su);
            });
            debug_assert!(undone, "rollback move must succeed");
            if undone {
                gain_cache.recompute_penalty(phg, mv.v);
                local_delta += delta;
            }
        }
        self.moves.truncate(best_prefix);
        local_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::datastructures::hypergraph::{Hypergraph, HypergraphBuilder};
    use crate::metrics;

    /// Two dense groups connected by a bridge, with two vertices swapped
    /// across the groups. FM has to walk both out.
    fn swapped_instance() -> (PartitionedHypergraph<Hypergraph>, GainCache) {
        let mut builder = HypergraphBuilder::new(8);
        for group in [[0u32, 1, 2, 3], [4, 5, 6, 7]] {
            for i in 0..4 {
                for j in (i + 1)..4 {
                    builder = builder.add_edge(vec![group[i], group[j]], 2);
                }
            }
        }
        let hg = builder.add_edge(vec![3, 4], 1).build();
        let phg = PartitionedHypergraph::new(2, hg);
        // 3 and 4 start on the wrong sides.
        phg.apply_partition(&[0, 0, 0, 1, 0, 1, 1, 1]);
        let mut cache = GainCache::new(Objective::Km1, usize::MAX);
        cache.initialize(&phg);
        (phg, cache)
    }

    fn fm_config() -> FmConfig {
        Context::new().refinement.fm
    }

    #[test]
    fn recovers_the_natural_bisection() {
        let (phg, cache) = swapped_instance();
        // Loose enough for the constrained strategy to stage the swap as two
        // single moves (block weight 5 is admissible).
        let l_max = metrics::max_block_weights(8, 2, 0.3);
        let mut fm = FmRefiner::new(fm_config(), Objective::Km1, l_max);
        let before = metrics::km1(&phg);
        let mut m = Metrics {
            objective: before,
            imbalance: metrics::imbalance(&phg),
        };
        let rt = Runtime::new(21, false, Some(2));
        rt.install(|| {
            Refiner::<Hypergraph>::initialize(&mut fm, &phg, &cache);
            let improved = fm.refine(&phg, &cache, &[], &mut m, &rt, None);
            assert!(improved);
        });
        assert_eq!(m.objective, metrics::km1(&phg));
        assert!(m.objective < before);
        // The swap must be undone: 3 with the first group, 4 with the second.
        assert_eq!(phg.part_id(3), phg.part_id(0));
        assert_eq!(phg.part_id(4), phg.part_id(7));
        assert!(cache.is_consistent(&phg));
        use crate::error::DebugInvariants;
        phg.validate_invariants().unwrap();
    }

    #[test]
    fn constrained_strategy_never_violates_balance() {
        let (phg, cache) = swapped_instance();
        let l_max = metrics::max_block_weights(8, 2, 0.05);
        let mut fm = FmRefiner::new(fm_config(), Objective::Km1, l_max.clone());
        let mut m = Metrics {
            objective: metrics::km1(&phg),
            imbalance: 0.0,
        };
        let rt = Runtime::new(3, false, Some(4));
        rt.install(|| {
            Refiner::<Hypergraph>::initialize(&mut fm, &phg, &cache);
            fm.refine(&phg, &cache, &[], &mut m, &rt, None);
        });
        for b in 0..2u32 {
            assert!(phg.part_weight(b) <= l_max[b as usize]);
        }
    }

    #[test]
    fn unconstrained_strategy_ends_balanced_too() {
        let (phg, cache) = swapped_instance();
        let l_max = metrics::max_block_weights(8, 2, 0.05);
        let cfg = FmConfig {
            strategy: FmStrategy::Unconstrained,
            ..fm_config()
        };
        let mut fm = FmRefiner::new(cfg, Objective::Km1, l_max.clone());
        let mut m = Metrics {
            objective: metrics::km1(&phg),
            imbalance: 0.0,
        };
        let rt = Runtime::new(8, false, Some(2));
        rt.install(|| {
            Refiner::<Hypergraph>::initialize(&mut fm, &phg, &cache);
            fm.refine(&phg, &cache, &[], &mut m, &rt, None);
        });
        for b in 0..2u32 {
            assert!(phg.part_weight(b) <= l_max[b as usize]);
        }
        assert_eq!(m.objective, metrics::km1(&phg));
    }

    #[test]
    fn rollback_discards_worsening_tails() {
        // A single search on an already optimal partition must not change it.
        let hg = HypergraphBuilder::new(4)
            .add_edge(vec![0, 1], 5)
            .add_edge(vec![2, 3], 5)
            .add_edge(vec![1, 2], 1)
            .build();
        let phg = PartitionedHypergraph::new(2, hg);
        phg.apply_partition(&[0, 0, 1, 1]);
        let mut cache = GainCache::new(Objective::Km1, usize::MAX);
        cache.initialize(&phg);
        let l_max = metrics::max_block_weights(4, 2, 0.05);
        let mut fm = FmRefiner::new(fm_config(), Objective::Km1, l_max);
        let before_parts = phg.part_snapshot();
        let mut m = Metrics {
            objective: metrics::km1(&phg),
            imbalance: 0.0,
        };
        let rt = Runtime::new(17, false, Some(1));
        rt.install(|| {
            Refiner::<Hypergraph>::initialize(&mut fm, &phg, &cache);
            let improved = fm.refine(&phg, &cache, &[], &mut m, &rt, None);
            assert!(!improved);
        });
        assert_eq!(phg.part_snapshot(), before_parts);
        assert_eq!(metrics::km1(&phg), 1);
    }
}
