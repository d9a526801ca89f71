//! Cached move gains with incremental delta maintenance.
//!
//! For a vertex `v` in block `p(v)` the cache stores the *penalty term*
//! (objective gain of taking `v` out of its block) and one *benefit term* per
//! target block. The move gain is assembled per objective:
//!
//! - km1: `gain(v, b) = penalty(v) + benefit(v, b) − w(I(v))`, with
//!   `penalty(v) = Σ_{e ∋ v : pc(e, p(v)) = 1} w(e)` and
//!   `benefit(v, b) = Σ_{e ∋ v : pc(e, b) ≥ 1} w(e)`.
//! - cut: `gain(v, b) = benefit(v, b) − penalty(v)`, with
//!   `penalty(v) = Σ_{e ∋ v, |e| ≥ 2 : pc(e, p(v)) = |e|} w(e)` and
//!   `benefit(v, b) = Σ_{e ∋ v, |e| ≥ 2 : pc(e, b) = |e|−1} w(e)`.
//!
//! Every committed move emits one [`SynchronizedEdgeUpdate`] per incident
//! hyperedge; [`GainCache::delta_gain_update`] translates the pin-count
//! transitions into atomic per-(v, b) additions. The moved vertex's penalty
//! term refers to its new block and cannot be patched incrementally; callers
//! invoke [`GainCache::recompute_penalty`] for it after the move.

use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, Ordering};

use super::partitioned::PartitionedHypergraph;
use super::{EdgeWeight, Gain, HypergraphOps, NodeId, PartitionId, SynchronizedEdgeUpdate};
use crate::context::Objective;

#[derive(Debug)]
pub struct GainCache {
    objective: Objective,
    k: usize,
    num_nodes: usize,
    penalty: Vec<AtomicI64>,
    /// `num_nodes * k` benefit terms, row-major by vertex.
    benefit: Vec<AtomicI64>,
    /// Σ_{e ∋ v} w(e); updated on recompute (n-level incidence changes).
    incident_weight: Vec<AtomicI64>,
    /// Hyperedges with more pins than this skip per-pin delta updates.
    high_degree_threshold: usize,
    initialized: bool,
}

impl GainCache {
    pub fn new(objective: Objective, high_degree_threshold: usize) -> Self {
        Self {
            objective,
            k: 0,
            num_nodes: 0,
            penalty: Vec::new(),
            benefit: Vec::new(),
            incident_weight: Vec::new(),
            high_degree_threshold,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Drop the cached terms (between levels the cache is re-initialized
    /// rather than projected).
    pub fn reset(&mut self) {
        self.initialized = false;
    }

    /// Free the term storage entirely; the next `initialize` reallocates.
    pub fn delete(&mut self) {
        self.penalty = Vec::new();
        self.benefit = Vec::new();
        self.incident_weight = Vec::new();
        self.num_nodes = 0;
        self.k = 0;
        self.initialized = false;
    }

    /// Compute all terms for the current partition, resizing for this
    /// hypergraph and `k`.
    pub fn initialize<H: HypergraphOps>(&mut self, phg: &PartitionedHypergraph<H>) {
        let n = phg.hypergraph().num_nodes();
        let k = phg.k();
        if n != self.num_nodes || k != self.k {
            self.num_nodes = n;
            self.k = k;
            self.penalty = (0..n).map(|_| AtomicI64::new(0)).collect();
            self.benefit = (0..n * k).map(|_| AtomicI64::new(0)).collect();
            self.incident_weight = (0..n).map(|_| AtomicI64::new(0)).collect();
        }
        let hg = phg.hypergraph();
        hg.par_nodes().for_each(|v| self.recompute_node(phg, v));
        self.initialized = true;
    }

    pub fn penalty_term(&self, v: NodeId) -> Gain {
        self.penalty[v as usize].load(Ordering::Relaxed)
    }

    pub fn benefit_term(&self, v: NodeId, block: PartitionId) -> Gain {
        self.benefit[v as usize * self.k + block as usize].load(Ordering::Relaxed)
    }

    /// Objective decrease of moving `v` to `block`; positive is better.
    pub fn gain(&self, v: NodeId, block: PartitionId) -> Gain {
        match self.objective {
            Objective::Km1 => {
                self.penalty_term(v) + self.benefit_term(v, block)
                    - self.incident_weight[v as usize].load(Ordering::Relaxed)
            }
            Objective::Cut => self.benefit_term(v, block) - self.penalty_term(v),
        }
    }

    /// Apply the transition rules for one committed move and one hyperedge.
    pub fn delta_gain_update<H: HypergraphOps>(
        &self,
        phg: &PartitionedHypergraph<H>,
        su: &SynchronizedEdgeUpdate,
    ) {
        if su.edge_size > self.high_degree_threshold {
            return;
        }
        let w = su.edge_weight;
        match self.objective {
            Objective::Km1 => self.km1_update(phg, su, w),
            Objective::Cut => self.cut_update(phg, su, w),
        }
    }

    fn km1_update<H: HypergraphOps>(
        &self,
        phg: &PartitionedHypergraph<H>,
        su: &SynchronizedEdgeUpdate,
        w: EdgeWeight,
    ) {
        let to_became_present = su.pin_count_in_to_part_after == 1;
        let from_became_absent = su.pin_count_in_from_part_after == 0;
        let from_became_single = su.pin_count_in_from_part_after == 1;
        let to_became_double = su.pin_count_in_to_part_after == 2;
        if !(to_became_present || from_became_absent || from_became_single || to_became_double) {
            return;
        }
        for &p in phg.hypergraph().pins(su.edge) {
            if to_became_present {
                self.add_benefit(p, su.block_to, w);
            }
            if from_became_absent {
                self.add_benefit(p, su.block_from, -w);
            }
            let part_p = phg.part_id(p);
            if from_became_single && part_p == su.block_from {
                self.add_penalty(p, w);
            }
            if to_became_double && part_p == su.block_to {
                self.add_penalty(p, -w);
            }
        }
    }

    fn cut_update<H: HypergraphOps>(
        &self,
        phg: &PartitionedHypergraph<H>,
        su: &SynchronizedEdgeUpdate,
        w: EdgeWeight,
    ) {
        let size = su.edge_size as u32;
        if size < 2 {
            return;
        }
        let to_after = su.pin_count_in_to_part_after;
        let from_after = su.pin_count_in_from_part_after;
        for &p in phg.hypergraph().pins(su.edge) {
            let part_p = phg.part_id(p);
            if to_after == size - 1 {
                self.add_benefit(p, su.block_to, w);
            }
            if to_after == size {
                self.add_benefit(p, su.block_to, -w);
                if part_p == su.block_to {
                    self.add_penalty(p, w);
                }
            }
            if from_after == size - 1 {
                self.add_benefit(p, su.block_from, w);
                if part_p == su.block_from {
                    self.add_penalty(p, -w);
                }
            }
            if size >= 2 && from_after + 2 == size {
                self.add_benefit(p, su.block_from, -w);
            }
        }
    }

    #[inline]
    fn add_benefit(&self, v: NodeId, block: PartitionId, delta: Gain) {
        self.benefit[v as usize * self.k + block as usize].fetch_add(delta, Ordering::Relaxed);
    }

    #[inline]
    fn add_penalty(&self, v: NodeId, delta: Gain) {
        self.penalty[v as usize].fetch_add(delta, Ordering::Relaxed);
    }

    /// Recompute the penalty term of `v` against its current block. Called
    /// for every moved vertex after its move committed.
    pub fn recompute_penalty<H: HypergraphOps>(
        &self,
        phg: &PartitionedHypergraph<H>,
        v: NodeId,
    ) {
        let hg = phg.hypergraph();
        let block = phg.part_id(v);
        let mut penalty = 0;
        for &e in hg.incident_edges(v) {
            let w = hg.edge_weight(e);
            match self.objective {
                Objective::Km1 => {
                    if phg.pin_count_in_part(e, block) == 1 {
                        penalty += w;
                    }
                }
                Objective::Cut => {
                    let size = hg.edge_size(e) as u32;
                    if size >= 2 && phg.pin_count_in_part(e, block) == size {
                        penalty += w;
                    }
                }
            }
        }
        self.penalty[v as usize].store(penalty, Ordering::Relaxed);
    }

    /// Recompute every term of `v` from scratch (initialization, and after
    /// n-level uncontractions changed its incidence).
    pub fn recompute_node<H: HypergraphOps>(
        &self,
        phg: &PartitionedHypergraph<H>,
        v: NodeId,
    ) {
        let hg = phg.hypergraph();
        let row = v as usize * self.k;
        for b in 0..self.k {
            self.benefit[row + b].store(0, Ordering::Relaxed);
        }
        let mut incident_weight = 0;
        for &e in hg.incident_edges(v) {
            let w = hg.edge_weight(e);
            incident_weight += w;
            match self.objective {
                Objective::Km1 => {
                    for b in phg.connectivity_set(e) {
                        self.benefit[row + b as usize].fetch_add(w, Ordering::Relaxed);
                    }
                }
                Objective::Cut => {
                    let size = hg.edge_size(e) as u32;
                    if size < 2 {
                        continue;
                    }
                    for b in 0..self.k as PartitionId {
                        if phg.pin_count_in_part(e, b) == size - 1 {
                            self.benefit[row + b as usize].fetch_add(w, Ordering::Relaxed);
                        }
                    }
                }
            }
        }
        self.incident_weight[v as usize].store(incident_weight, Ordering::Relaxed);
        self.recompute_penalty(phg, v);
    }

    /// Verify all cached terms against a fresh recomputation.
    #[cfg(test)]
    pub fn is_consistent<H: HypergraphOps>(&self, phg: &PartitionedHypergraph<H>) -> bool {
        let mut fresh = GainCache::new(self.objective, self.high_degree_threshold);
        fresh.initialize(phg);
        phg.hypergraph().nodes().all(|v| {
            self.penalty_term(v) == fresh.penalty_term(v)
                && (0..self.k as PartitionId)
                    .all(|b| self.benefit_term(v, b) == fresh.benefit_term(v, b))
        })
    }
}
