//! Partitioned hypergraph: the mutable overlay tracking block assignment,
//! block weights, per-(edge, block) pin counts, connectivity sets and border
//! information.
//!
//! All tracked state is updated atomically inside [`change_node_part`], the
//! single move primitive of the partitioner. Concurrent moves preserve the
//! tracked invariants: `Σ_b pc(e,b) = |e|`, `W[b] = Σ_{part[v]=b} w(v)`, Λ(e)
//! consistent with pc, and border counters consistent with λ. The weight
//! reservation is conservative: a concurrent move may reserve capacity and
//! cause a spurious rejection, but no committed move ever violates its
//! `max_weight_to` bound.
//!
//! [`change_node_part`]: PartitionedHypergraph::change_node_part

use rayon::prelude::*;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use super::connectivity::ConnectivitySets;
use super::dynamic::{ContractionMemento, DynamicHypergraph};
use super::hypergraph::{Hypergraph, HypergraphBuilder};
use super::{
    EdgeId, HypergraphOps, NodeId, NodeWeight, PartitionId, SynchronizedEdgeUpdate,
    INVALID_NODE, INVALID_PARTITION,
};
use crate::error::{DebugInvariants, PartitionError};

/// How cut hyperedges are treated by [`PartitionedHypergraph::extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutPolicy {
    /// Keep the sub-edge induced by the in-block pins (if it has ≥ 2 pins).
    Split,
    /// Drop every cut hyperedge.
    Remove,
}

/// Partition overlay owning its hypergraph.
#[derive(Debug)]
pub struct PartitionedHypergraph<H: HypergraphOps> {
    hg: H,
    k: usize,
    part: Vec<AtomicU32>,
    block_weights: Vec<AtomicI64>,
    /// `num_edges * k` pin counters, row-major by edge.
    pin_counts: Vec<AtomicU32>,
    connectivity_sets: ConnectivitySets,
    /// Per vertex: number of incident hyperedges with λ(e) ≥ 2.
    num_incident_cut_edges: Vec<AtomicU32>,
}

impl<H: HypergraphOps> PartitionedHypergraph<H> {
    pub fn new(k: usize, hg: H) -> Self {
        let n = hg.num_nodes();
        let m = hg.num_edges();
        Self {
            connectivity_sets: ConnectivitySets::new(m, k),
            part: (0..n).map(|_| AtomicU32::new(INVALID_PARTITION)).collect(),
            block_weights: (0..k).map(|_| AtomicI64::new(0)).collect(),
            pin_counts: (0..m * k).map(|_| AtomicU32::new(0)).collect(),
            num_incident_cut_edges: (0..n).map(|_| AtomicU32::new(0)).collect(),
            hg,
            k,
        }
    }

    pub fn hypergraph(&self) -> &H {
        &self.hg
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Tear down into the underlying hypergraph and a partition snapshot.
    pub fn into_parts(self) -> (H, Vec<PartitionId>) {
        let part = self.part_snapshot();
        (self.hg, part)
    }

    /// Current `part[]` as a plain vector.
    pub fn part_snapshot(&self) -> Vec<PartitionId> {
        self.part
            .iter()
            .map(|p| p.load(Ordering::Relaxed))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Initial placement
    // -----------------------------------------------------------------------

    /// Unchecked initial placement; tracked state is computed afterwards by
    /// [`initialize_partition`](Self::initialize_partition).
    pub fn set_only_node_part(&self, v: NodeId, block: PartitionId) {
        debug_assert!((block as usize) < self.k);
        self.part[v as usize].store(block, Ordering::Relaxed);
    }

    /// Compute block weights, pin counts, connectivity sets and border
    /// counters from the current `part[]`, in parallel.
    pub fn initialize_partition(&self) {
        for w in &self.block_weights {
            w.store(0, Ordering::Relaxed);
        }
        self.pin_counts.par_iter().for_each(|c| {
            c.store(0, Ordering::Relaxed);
        });
        self.connectivity_sets.reset();

        self.hg.par_nodes().for_each(|v| {
            let b = self.part[v as usize].load(Ordering::Relaxed);
            debug_assert_ne!(b, INVALID_PARTITION, "node {v} has no block");
            self.block_weights[b as usize]
                .fetch_add(self.hg.node_weight(v), Ordering::Relaxed);
        });

        self.hg.par_edges().for_each(|e| {
            for &p in self.hg.pins(e) {
                let b = self.part[p as usize].load(Ordering::Relaxed);
                self.pin_counts[e as usize * self.k + b as usize]
                    .fetch_add(1, Ordering::Relaxed);
            }
            for b in 0..self.k as PartitionId {
                if self.pin_count_in_part(e, b) > 0 {
                    self.connectivity_sets.add(e, b);
                }
            }
        });

        self.hg.par_nodes().for_each(|v| {
            let cut = self
                .hg
                .incident_edges(v)
                .iter()
                .filter(|&&e| self.connectivity(e) >= 2)
                .count() as u32;
            self.num_incident_cut_edges[v as usize].store(cut, Ordering::Relaxed);
        });
    }

    /// Bulk placement + initialization from a snapshot.
    pub fn apply_partition(&self, parts: &[PartitionId]) {
        self.hg.par_nodes().for_each(|v| {
            self.set_only_node_part(v, parts[v as usize]);
        });
        self.initialize_partition();
    }

    // -----------------------------------------------------------------------
    // The move primitive
    // -----------------------------------------------------------------------

    /// Atomically move `v` from block `from` to block `to`, provided the
    /// target block weight stays within `max_weight_to`.
    ///
    /// On success, `delta_fn` is invoked exactly once per incident hyperedge
    /// with the pin counts after the move; callers use it to accumulate the
    /// exact objective delta and to keep the gain cache synchronized.
    /// Returns `false` only on a failed weight reservation or when another
    /// thread moved `v` concurrently.
    pub fn change_node_part<F>(
        &self,
        v: NodeId,
        from: PartitionId,
        to: PartitionId,
        max_weight_to: NodeWeight,
        mut delta_fn: F,
    ) -> bool
    where
        F: FnMut(&SynchronizedEdgeUpdate),
    {
        debug_assert_ne!(from, to);
        let wv = self.hg.node_weight(v);

        // Reserve capacity in the target block: add, then check.
        let new_weight = self.block_weights[to as usize].fetch_add(wv, Ordering::AcqRel) + wv;
        if new_weight > max_weight_to {
            self.block_weights[to as usize].fetch_sub(wv, Ordering::AcqRel);
            return false;
        }

        // Exactly one concurrent mover of `v` wins.
        if self.part[v as usize]
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.block_weights[to as usize].fetch_sub(wv, Ordering::AcqRel);
            return false;
        }
        self.block_weights[from as usize].fetch_sub(wv, Ordering::AcqRel);

        for &e in self.hg.incident_edges(v) {
            let size = self.hg.edge_size(e);
            let row = e as usize * self.k;
            let pin_count_in_from_part_after =
                self.pin_counts[row + from as usize].fetch_sub(1, Ordering::AcqRel) - 1;
            let pin_count_in_to_part_after =
                self.pin_counts[row + to as usize].fetch_add(1, Ordering::AcqRel) + 1;

            if pin_count_in_from_part_after == 0 {
                self.connectivity_sets.remove(e, from);
            }
            if pin_count_in_to_part_after == 1 {
                self.connectivity_sets.add(e, to);
            }

            if size >= 2 {
                // λ transitions 1 → 2 and 2 → 1 flip the border state of all
                // pins of e.
                if pin_count_in_from_part_after as usize == size - 1 {
                    for &p in self.hg.pins(e) {
                        self.num_incident_cut_edges[p as usize].fetch_add(1, Ordering::AcqRel);
                    }
                }
                if pin_count_in_to_part_after as usize == size {
                    for &p in self.hg.pins(e) {
                        self.num_incident_cut_edges[p as usize].fetch_sub(1, Ordering::AcqRel);
                    }
                }
            }

            delta_fn(&SynchronizedEdgeUpdate {
                edge: e,
                edge_weight: self.hg.edge_weight(e),
                edge_size: size,
                pin_count_in_from_part_after,
                pin_count_in_to_part_after,
                block_from: from,
                block_to: to,
            });
        }
        true
    }

    // -----------------------------------------------------------------------
    // Read-only queries
    // -----------------------------------------------------------------------

    pub fn part_id(&self, v: NodeId) -> PartitionId {
        self.part[v as usize].load(Ordering::Relaxed)
    }

    pub fn part_weight(&self, block: PartitionId) -> NodeWeight {
        self.block_weights[block as usize].load(Ordering::Relaxed)
    }

    pub fn pin_count_in_part(&self, e: EdgeId, block: PartitionId) -> u32 {
        self.pin_counts[e as usize * self.k + block as usize].load(Ordering::Relaxed)
    }

    /// λ(e).
    pub fn connectivity(&self, e: EdgeId) -> u32 {
        self.connectivity_sets.connectivity(e)
    }

    /// Λ(e) in ascending block order.
    pub fn connectivity_set(&self, e: EdgeId) -> impl Iterator<Item = PartitionId> + '_ {
        self.connectivity_sets.iter(e)
    }

    pub fn is_border_node(&self, v: NodeId) -> bool {
        self.num_incident_cut_edges(v) > 0
    }

    pub fn num_incident_cut_hyperedges(&self, v: NodeId) -> u32 {
        self.num_incident_cut_edges(v)
    }

    fn num_incident_cut_edges(&self, v: NodeId) -> u32 {
        self.num_incident_cut_edges[v as usize].load(Ordering::Relaxed)
    }

    /// Border nodes of the current partition, in ascending id order.
    pub fn border_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .hg
            .par_nodes()
            .filter(|&v| self.is_border_node(v))
            .collect();
        nodes.par_sort_unstable();
        nodes
    }

    // -----------------------------------------------------------------------
    // Extraction
    // -----------------------------------------------------------------------

    /// Extract the sub-hypergraph induced by `block`.
    ///
    /// Returns the extracted hypergraph and the mapping from its node ids to
    /// the original ids.
    pub fn extract(&self, block: PartitionId, policy: CutPolicy) -> (Hypergraph, Vec<NodeId>) {
        let mut to_original: Vec<NodeId> = self
            .hg
            .nodes()
            .filter(|&v| self.part_id(v) == block)
            .collect();
        to_original.sort_unstable();

        let mut to_sub = vec![INVALID_NODE; self.hg.num_nodes()];
        for (sub, &orig) in to_original.iter().enumerate() {
            to_sub[orig as usize] = sub as NodeId;
        }

        let mut builder = HypergraphBuilder::new(to_original.len())
            .node_weights(to_original.iter().map(|&v| self.hg.node_weight(v)).collect())
            .deterministic(true);
        for e in self.hg.edges() {
            let lambda = self.connectivity(e);
            if lambda >= 2 && policy == CutPolicy::Remove {
                continue;
            }
            if self.pin_count_in_part(e, block) < 2 {
                continue;
            }
            let pins: Vec<NodeId> = self
                .hg
                .pins(e)
                .iter()
                .filter(|&&p| self.part_id(p) == block)
                .map(|&p| to_sub[p as usize])
                .collect();
            builder = builder.add_edge(pins, self.hg.edge_weight(e));
        }
        (builder.build(), to_original)
    }
}

impl PartitionedHypergraph<DynamicHypergraph> {
    /// Undo the most recent contraction (n-level uncoarsening).
    ///
    /// The reactivated vertex inherits its representative's block; pin counts
    /// of hyperedges that regain the vertex grow by one in that block, which
    /// never changes λ. Border counters of the pair are recomputed.
    pub fn uncontract(&mut self, memento: &ContractionMemento) {
        self.hg.uncontract(memento);
        let block = self.part_id(memento.u);
        debug_assert_ne!(block, INVALID_PARTITION);
        self.part[memento.v as usize].store(block, Ordering::Relaxed);

        for &e in &memento.removed_pin_edges {
            self.pin_counts[e as usize * self.k + block as usize]
                .fetch_add(1, Ordering::Relaxed);
        }

        for x in [memento.u, memento.v] {
            let cut = self
                .hg
                .incident_edges(x)
                .iter()
                .filter(|&&e| self.connectivity(e) >= 2)
                .count() as u32;
            self.num_incident_cut_edges[x as usize].store(cut, Ordering::Relaxed);
        }
    }
}

impl<H: HypergraphOps> DebugInvariants for PartitionedHypergraph<H> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "partitioned hypergraph");
    }

    fn validate_invariants(&self) -> Result<(), PartitionError> {
        // Σ_b pc(e,b) = |e| and Λ(e) agreement.
        for e in self.hg.edges() {
            let mut total = 0u32;
            for b in 0..self.k as PartitionId {
                let pc = self.pin_count_in_part(e, b);
                total += pc;
                if (pc > 0) != self.connectivity_set(e).any(|cb| cb == b) {
                    return Err(PartitionError::InvariantViolated(format!(
                        "edge {e}: connectivity set disagrees with pin counts in block {b}"
                    )));
                }
            }
            if total as usize != self.hg.edge_size(e) {
                return Err(PartitionError::InvariantViolated(format!(
                    "edge {e}: pin counts sum to {total}, size is {}",
                    self.hg.edge_size(e)
                )));
            }
        }
        // W[b] = Σ_{part[v]=b} w(v).
        let mut weights = vec![0 as NodeWeight; self.k];
        for v in self.hg.nodes() {
            let b = self.part_id(v);
            if b == INVALID_PARTITION {
                return Err(PartitionError::InvariantViolated(format!(
                    "node {v} is unassigned"
                )));
            }
            weights[b as usize] += self.hg.node_weight(v);
        }
        for b in 0..self.k {
            if weights[b] != self.part_weight(b as PartitionId) {
                return Err(PartitionError::InvariantViolated(format!(
                    "block {b}: tracked weight {} differs from {}",
                    self.part_weight(b as PartitionId),
                    weights[b]
                )));
            }
        }
        // Border counters.
        for v in self.hg.nodes() {
            let cut = self
                .hg
                .incident_edges(v)
                .iter()
                .filter(|&&e| self.connectivity(e) >= 2)
                .count() as u32;
            if cut != self.num_incident_cut_hyperedges(v) {
                return Err(PartitionError::InvariantViolated(format!(
                    "node {v}: tracked {} incident cut edges, recount {cut}",
                    self.num_incident_cut_hyperedges(v)
                )));
            }
        }
        Ok(())
    }
}
