//! Flat k-way partitioners for the coarsest hypergraph.
//!
//! Each algorithm runs sequentially from a private seed (the pool provides
//! the parallelism across candidates) and returns a block per vertex.
//! Fixed vertices are pre-assigned, degree-zero vertices are left to the pool
//! (`INVALID_PARTITION`), and the weight limits are treated as soft: when no
//! block fits, the lightest one takes the vertex and the pool's rebalancer
//! repairs the winner if needed.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

use crate::context::Objective;
use crate::datastructures::partitioned::PartitionedHypergraph;
use crate::datastructures::{
    HypergraphOps, NodeId, NodeWeight, PartitionId, INVALID_PARTITION,
};
use crate::refinement::direct_move_gain;
use crate::refinement::fm::pq::IndexedMaxHeap;
use crate::runtime::seeded_permutation;

/// The flat heuristics of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlatAlgorithm {
    Random,
    Bfs,
    GreedyGrowing,
    RoundRobin,
    LabelPropagation,
}

pub const ALL_FLAT_ALGORITHMS: [FlatAlgorithm; 5] = [
    FlatAlgorithm::Random,
    FlatAlgorithm::Bfs,
    FlatAlgorithm::GreedyGrowing,
    FlatAlgorithm::RoundRobin,
    FlatAlgorithm::LabelPropagation,
];

/// State shared by the flat algorithms: assignment plus running weights.
struct Assignment<'a, H: HypergraphOps> {
    hg: &'a H,
    part: Vec<PartitionId>,
    weights: Vec<NodeWeight>,
    l_max: &'a [NodeWeight],
}

impl<'a, H: HypergraphOps> Assignment<'a, H> {
    fn new(hg: &'a H, k: usize, l_max: &'a [NodeWeight]) -> Self {
        let mut this = Self {
            hg,
            part: vec![INVALID_PARTITION; hg.num_nodes()],
            weights: vec![0; k],
            l_max,
        };
        // Fixed vertices are not up for grabs.
        for v in hg.nodes() {
            if let Some(b) = hg.fixed_block(v) {
                this.assign(v, b);
            }
        }
        this
    }

    fn assign(&mut self, v: NodeId, block: PartitionId) {
        debug_assert_eq!(self.part[v as usize], INVALID_PARTITION);
        self.part[v as usize] = block;
        self.weights[block as usize] += self.hg.node_weight(v);
    }

    fn is_assigned(&self, v: NodeId) -> bool {
        self.part[v as usize] != INVALID_PARTITION
    }

    fn fits(&self, v: NodeId, block: PartitionId) -> bool {
        self.weights[block as usize] + self.hg.node_weight(v) <= self.l_max[block as usize]
    }

    fn lightest_block(&self) -> PartitionId {
        (0..self.weights.len() as PartitionId)
            .min_by_key(|&b| (self.weights[b as usize], b))
            .unwrap()
    }

    /// Place on `preferred` when it fits, otherwise on the lightest block.
    fn assign_soft(&mut self, v: NodeId, preferred: PartitionId) {
        if self.fits(v, preferred) {
            self.assign(v, preferred);
        } else {
            let b = self.lightest_block();
            self.assign(v, b);
        }
    }

    /// Skip-list of partitionable vertices: enabled, free, with incident
    /// edges.
    fn candidates(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.hg.nodes().filter(move |&v| {
            !self.is_assigned(v) && !self.hg.incident_edges(v).is_empty()
        })
    }
}

/// Run one flat algorithm. Degree-zero vertices stay unassigned.
pub fn run_flat<H: HypergraphOps>(
    algorithm: FlatAlgorithm,
    hg: &H,
    k: usize,
    l_max: &[NodeWeight],
    objective: Objective,
    seed: u64,
    lp_iterations: usize,
) -> Vec<PartitionId> {
    let mut assignment = Assignment::new(hg, k, l_max);
    match algorithm {
        FlatAlgorithm::Random => random(&mut assignment, k, seed),
        FlatAlgorithm::Bfs => bfs(&mut assignment, k, seed),
        FlatAlgorithm::GreedyGrowing => greedy_growing(&mut assignment, k, seed),
        FlatAlgorithm::RoundRobin => round_robin(&mut assignment),
        FlatAlgorithm::LabelPropagation => {
            random(&mut assignment, k, seed);
            let part = assignment.part;
            return label_propagation(hg, k, l_max, objective, seed, lp_iterations, part);
        }
    }
    assignment.part
}

/// Shuffled round-robin with weight checks.
fn random<H: HypergraphOps>(assignment: &mut Assignment<'_, H>, k: usize, seed: u64) {
    let order = seeded_permutation(assignment.hg.num_nodes(), seed);
    let mut next = 0u32;
    for &v in &order {
        if !assignment.hg.is_node_enabled(v)
            || assignment.is_assigned(v)
            || assignment.hg.incident_edges(v).is_empty()
        {
            continue;
        }
        assignment.assign_soft(v, next % k as PartitionId);
        next += 1;
    }
}

/// Grow all blocks simultaneously from random start vertices, breadth-first
/// along shared hyperedges.
fn bfs<H: HypergraphOps>(assignment: &mut Assignment<'_, H>, k: usize, seed: u64) {
    let hg = assignment.hg;
    let order = seeded_permutation(hg.num_nodes(), seed);
    let mut queues: Vec<VecDeque<NodeId>> = vec![VecDeque::new(); k];
    let mut cursor = 0usize;

    let mut next_start = |assignment: &Assignment<'_, H>, cursor: &mut usize| -> Option<NodeId> {
        while *cursor < order.len() {
            let v = order[*cursor];
            *cursor += 1;
            if assignment.hg.is_node_enabled(v)
                && !assignment.is_assigned(v)
                && !assignment.hg.incident_edges(v).is_empty()
            {
                return Some(v);
            }
        }
        None
    };

    let mut remaining = assignment.candidates().count();
    while remaining > 0 {
        let mut stuck = true;
        for b in 0..k as PartitionId {
            let v = loop {
                match queues[b as usize].pop_front() {
                    Some(v) if assignment.is_assigned(v) => continue,
                    Some(v) => break Some(v),
                    None => break next_start(assignment, &mut cursor),
                }
            };
            let Some(v) = v else { continue };
            assignment.assign_soft(v, b);
            remaining -= 1;
            stuck = false;
            for &e in hg.incident_edges(v) {
                for &p in hg.pins(e) {
                    if !assignment.is_assigned(p) && hg.is_node_enabled(p) {
                        queues[b as usize].push_back(p);
                    }
                }
            }
        }
        if stuck {
            break;
        }
    }
}

/// Grow one block at a time to its target weight, always taking the vertex
/// with the strongest attachment to the growing block.
fn greedy_growing<H: HypergraphOps>(assignment: &mut Assignment<'_, H>, k: usize, seed: u64) {
    let hg = assignment.hg;
    let n = hg.num_nodes();
    let target = (hg.total_node_weight() + k as NodeWeight - 1) / k as NodeWeight;
    let mut rng = SmallRng::seed_from_u64(seed);
    let order = seeded_permutation(n, seed ^ 0x5ABD);

    for b in 0..(k - 1) as PartitionId {
        let mut pq = IndexedMaxHeap::new(n);
        while assignment.weights[b as usize] < target {
            let v = match pq.pop() {
                Some((v, _)) if !assignment.is_assigned(v) => v,
                Some(_) => continue,
                None => {
                    // Fresh random seed vertex for this block; give up on the
                    // block when nothing assignable fits.
                    let Some(v) = order
                        .iter()
                        .copied()
                        .skip(rng.gen_range(0..n))
                        .chain(order.iter().copied())
                        .find(|&v| {
                            hg.is_node_enabled(v)
                                && !assignment.is_assigned(v)
                                && !hg.incident_edges(v).is_empty()
                                && assignment.fits(v, b)
                        })
                    else {
                        break;
                    };
                    v
                }
            };
            if !assignment.fits(v, b) {
                continue;
            }
            assignment.assign(v, b);
            for &e in hg.incident_edges(v) {
                let w = hg.edge_weight(e);
                for &p in hg.pins(e) {
                    if assignment.is_assigned(p) || !hg.is_node_enabled(p) {
                        continue;
                    }
                    if pq.contains(p) {
                        pq.adjust_key(p, pq.key_of(p) + w);
                    } else {
                        pq.insert(p, w);
                    }
                }
            }
        }
    }
    // Remainder to the last block.
    let last = (k - 1) as PartitionId;
    let unassigned: Vec<NodeId> = assignment.candidates().collect();
    for v in unassigned {
        assignment.assign_soft(v, last);
    }
}

/// Balance-first: heaviest vertices first, each to the lightest block.
fn round_robin<H: HypergraphOps>(assignment: &mut Assignment<'_, H>) {
    let mut nodes: Vec<NodeId> = assignment.candidates().collect();
    nodes.sort_unstable_by_key(|&v| (std::cmp::Reverse(assignment.hg.node_weight(v)), v));
    for v in nodes {
        let b = assignment.lightest_block();
        assignment.assign(v, b);
    }
}

/// Greedy move rounds on top of a random assignment.
fn label_propagation<H: HypergraphOps>(
    hg: &H,
    k: usize,
    l_max: &[NodeWeight],
    objective: Objective,
    seed: u64,
    iterations: usize,
    part: Vec<PartitionId>,
) -> Vec<PartitionId> {
    let phg = PartitionedHypergraph::new(k, hg);
    for v in hg.nodes() {
        if part[v as usize] != INVALID_PARTITION {
            phg.set_only_node_part(v, part[v as usize]);
        } else if !hg.incident_edges(v).is_empty() {
            phg.set_only_node_part(v, 0);
        }
    }
    // Degree-zero vertices are excluded from the overlay pass entirely; park
    // them in block 0 so initialization has a block for every vertex, the
    // pool reassigns them later.
    for v in hg.nodes() {
        if phg.part_id(v) == INVALID_PARTITION {
            phg.set_only_node_part(v, 0);
        }
    }
    phg.initialize_partition();

    for round in 0..iterations {
        let order = seeded_permutation(hg.num_nodes(), seed ^ (round as u64) << 8);
        let mut moved = false;
        for &v in &order {
            if !hg.is_node_enabled(v)
                || hg.incident_edges(v).is_empty()
                || hg.fixed_block(v).is_some()
            {
                continue;
            }
            let from = phg.part_id(v);
            let wv = hg.node_weight(v);
            let mut best: Option<(PartitionId, i64)> = None;
            for to in 0..k as PartitionId {
                if to == from || phg.part_weight(to) + wv > l_max[to as usize] {
                    continue;
                }
                let gain = direct_move_gain(&phg, objective, v, to);
                if best.map_or(gain > 0, |(_, bg)| gain > bg) {
                    best = Some((to, gain));
                }
            }
            if let Some((to, _)) = best {
                if phg.change_node_part(v, from, to, l_max[to as usize], |_| {}) {
                    moved = true;
                }
            }
        }
        if !moved {
            break;
        }
    }

    let snapshot = phg.part_snapshot();
    // Restore the unassigned marker for degree-zero vertices; disabled slots
    // stay unassigned too.
    let mut result = vec![INVALID_PARTITION; hg.num_nodes()];
    for v in hg.nodes() {
        if !hg.incident_edges(v).is_empty() || hg.fixed_block(v).is_some() {
            result[v as usize] = snapshot[v as usize];
        }
    }
    result
}
