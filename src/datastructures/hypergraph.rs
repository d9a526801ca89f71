//! Static CSR hypergraph.
//!
//! Immutable, cache-friendly storage: pins live in one flat array indexed by
//! edge offsets, incidence lists in a second flat array indexed by node
//! offsets. Built in parallel from pin lists; a deterministic build variant
//! orders incidence lists canonically so the structure is identical for every
//! thread count. Single-pin hyperedges may be removed at build time; their
//! count is preserved as metadata.

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{CommunityId, EdgeId, EdgeWeight, HypergraphOps, NodeId, NodeWeight, PartitionId};
use crate::error::PartitionError;

/// Immutable hypergraph in compressed adjacency form.
#[derive(Debug, Clone, Default)]
pub struct Hypergraph {
    num_nodes: usize,
    num_edges: usize,
    num_pins: usize,

    node_weights: Vec<NodeWeight>,
    edge_weights: Vec<EdgeWeight>,

    /// Pin array offsets, length `num_edges + 1`.
    edge_offsets: Vec<u32>,
    pin_array: Vec<NodeId>,

    /// Incidence array offsets, length `num_nodes + 1`.
    node_offsets: Vec<u32>,
    incidence_array: Vec<EdgeId>,

    /// Community ids from preprocessing; empty when unset.
    communities: Vec<CommunityId>,
    /// Fixed block per vertex; empty when unset.
    fixed: Vec<PartitionId>,

    total_node_weight: NodeWeight,
    /// Single-pin hyperedges dropped during construction.
    num_removed_single_pin_edges: usize,
}

impl Hypergraph {
    pub fn num_removed_single_pin_edges(&self) -> usize {
        self.num_removed_single_pin_edges
    }

    pub fn node_degree(&self, v: NodeId) -> usize {
        self.incident_edges(v).len()
    }

    /// Install community ids (one per vertex).
    pub fn set_communities(&mut self, communities: Vec<CommunityId>) {
        debug_assert_eq!(communities.len(), self.num_nodes);
        self.communities = communities;
    }

    pub fn has_communities(&self) -> bool {
        !self.communities.is_empty()
    }

    pub fn clear_communities(&mut self) {
        self.communities.clear();
    }

    /// Install fixed-block assignments (one per vertex, `INVALID_PARTITION`
    /// for free vertices).
    pub fn set_fixed_blocks(&mut self, fixed: Vec<PartitionId>) {
        debug_assert_eq!(fixed.len(), self.num_nodes);
        self.fixed = fixed;
    }

    /// Check the structural invariants: mutual consistency of pin and
    /// incidence lists and absence of duplicate pins.
    pub fn validate(&self) -> Result<(), PartitionError> {
        for e in 0..self.num_edges as EdgeId {
            let pins = self.pins(e);
            let mut sorted = pins.to_vec();
            sorted.sort_unstable();
            for w in sorted.windows(2) {
                if w[0] == w[1] {
                    return Err(PartitionError::DuplicatePin { edge: e, pin: w[0] });
                }
            }
            for &p in pins {
                if !self.incident_edges(p).contains(&e) {
                    return Err(PartitionError::InvariantViolated(format!(
                        "pin {p} of edge {e} lacks the reverse incidence entry"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl HypergraphOps for Hypergraph {
    fn num_nodes(&self) -> usize {
        self.num_nodes
    }
    fn num_edges(&self) -> usize {
        self.num_edges
    }
    fn num_pins(&self) -> usize {
        self.num_pins
    }
    fn is_node_enabled(&self, _v: NodeId) -> bool {
        true
    }
    fn is_edge_enabled(&self, _e: EdgeId) -> bool {
        true
    }
    fn node_weight(&self, v: NodeId) -> NodeWeight {
        self.node_weights[v as usize]
    }
    fn edge_weight(&self, e: EdgeId) -> EdgeWeight {
        self.edge_weights[e as usize]
    }
    fn edge_size(&self, e: EdgeId) -> usize {
        (self.edge_offsets[e as usize + 1] - self.edge_offsets[e as usize]) as usize
    }
    fn pins(&self, e: EdgeId) -> &[NodeId] {
        let lo = self.edge_offsets[e as usize] as usize;
        let hi = self.edge_offsets[e as usize + 1] as usize;
        &self.pin_array[lo..hi]
    }
    fn incident_edges(&self, v: NodeId) -> &[EdgeId] {
        let lo = self.node_offsets[v as usize] as usize;
        let hi = self.node_offsets[v as usize + 1] as usize;
        &self.incidence_array[lo..hi]
    }
    fn total_node_weight(&self) -> NodeWeight {
        self.total_node_weight
    }
    fn community(&self, v: NodeId) -> Option<CommunityId> {
        if self.communities.is_empty() {
            None
        } else {
            Some(self.communities[v as usize])
        }
    }
    fn fixed_block(&self, v: NodeId) -> Option<PartitionId> {
        if self.fixed.is_empty() {
            return None;
        }
        let b = self.fixed[v as usize];
        (b != super::INVALID_PARTITION).then_some(b)
    }
}

/// Builder assembling a [`Hypergraph`] from pin lists with parallel passes.
pub struct HypergraphBuilder {
    num_nodes: usize,
    edges: Vec<Vec<NodeId>>,
    edge_weights: Vec<EdgeWeight>,
    node_weights: Vec<NodeWeight>,
    remove_single_pin_edges: bool,
    deterministic: bool,
}

impl HypergraphBuilder {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            edges: Vec::new(),
            edge_weights: Vec::new(),
            node_weights: vec![1; num_nodes],
            remove_single_pin_edges: true,
            deterministic: false,
        }
    }

    /// Keep single-pin hyperedges instead of dropping them.
    pub fn keep_single_pin_edges(mut self) -> Self {
        self.remove_single_pin_edges = false;
        self
    }

    /// Canonical ordering of incidence lists, independent of thread count.
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn node_weights(mut self, weights: Vec<NodeWeight>) -> Self {
        debug_assert_eq!(weights.len(), self.num_nodes);
        self.node_weights = weights;
        self
    }

    pub fn add_edge(mut self, pins: Vec<NodeId>, weight: EdgeWeight) -> Self {
        self.edges.push(pins);
        self.edge_weights.push(weight);
        self
    }

    pub fn add_edges(mut self, edges: Vec<(Vec<NodeId>, EdgeWeight)>) -> Self {
        for (pins, w) in edges {
            self.edges.push(pins);
            self.edge_weights.push(w);
        }
        self
    }

    /// Build from an offset/pin array pair (the wire format of the public
    /// API), validating the input.
    pub fn from_offset_format(
        num_nodes: usize,
        num_edges: usize,
        edge_offsets: &[usize],
        edge_pins: &[NodeId],
        edge_weights: Option<&[EdgeWeight]>,
        node_weights: Option<&[NodeWeight]>,
    ) -> Result<Self, PartitionError> {
        if edge_offsets.len() != num_edges + 1 {
            return Err(PartitionError::MalformedOffsets {
                expected: num_edges + 1,
                found: edge_offsets.len(),
            });
        }
        for i in 0..num_edges {
            if edge_offsets[i] > edge_offsets[i + 1] || edge_offsets[i + 1] > edge_pins.len() {
                return Err(PartitionError::InconsistentOffsets(i));
            }
        }
        if let Some(w) = edge_weights {
            if w.len() != num_edges {
                return Err(PartitionError::WeightLengthMismatch {
                    what: "hyperedge",
                    expected: num_edges,
                    found: w.len(),
                });
            }
            if let Some(e) = w.iter().position(|&x| x <= 0) {
                return Err(PartitionError::NonPositiveEdgeWeight(e as u32));
            }
        }
        if let Some(w) = node_weights {
            if w.len() != num_nodes {
                return Err(PartitionError::WeightLengthMismatch {
                    what: "vertex",
                    expected: num_nodes,
                    found: w.len(),
                });
            }
        }

        let mut builder = Self::new(num_nodes);
        if let Some(w) = node_weights {
            builder.node_weights = w.to_vec();
        }
        for e in 0..num_edges {
            let pins = &edge_pins[edge_offsets[e]..edge_offsets[e + 1]];
            let mut seen = pins.to_vec();
            seen.sort_unstable();
            for w in seen.windows(2) {
                if w[0] == w[1] {
                    return Err(PartitionError::DuplicatePin {
                        edge: e as u32,
                        pin: w[0],
                    });
                }
            }
            if let Some(&p) = pins.iter().find(|&&p| p as usize >= num_nodes) {
                return Err(PartitionError::PinOutOfRange {
                    edge: e as u32,
                    pin: p,
                    num_nodes,
                });
            }
            builder.edges.push(pins.to_vec());
            builder
                .edge_weights
                .push(edge_weights.map_or(1, |w| w[e]));
        }
        Ok(builder)
    }

    pub fn build(self) -> Hypergraph {
        let HypergraphBuilder {
            num_nodes,
            mut edges,
            mut edge_weights,
            node_weights,
            remove_single_pin_edges,
            deterministic,
        } = self;

        // Drop single-pin hyperedges, preserving their count.
        let mut num_removed_single_pin_edges = 0;
        if remove_single_pin_edges {
            let mut kept_edges = Vec::with_capacity(edges.len());
            let mut kept_weights = Vec::with_capacity(edges.len());
            for (pins, w) in edges.into_iter().zip(edge_weights) {
                if pins.len() <= 1 {
                    num_removed_single_pin_edges += 1;
                } else {
                    kept_edges.push(pins);
                    kept_weights.push(w);
                }
            }
            edges = kept_edges;
            edge_weights = kept_weights;
        }

        let num_edges = edges.len();

        // Pin array offsets by prefix sum.
        let mut edge_offsets = vec![0u32; num_edges + 1];
        for (e, pins) in edges.iter().enumerate() {
            edge_offsets[e + 1] = edge_offsets[e] + pins.len() as u32;
        }
        let num_pins = edge_offsets[num_edges] as usize;

        // Parallel pin fill; order is preserved by the indexed collect.
        let pin_array: Vec<NodeId> = edges
            .par_iter()
            .flat_map_iter(|pins| pins.iter().copied())
            .collect();
        debug_assert_eq!(pin_array.len(), num_pins);

        // Incidence degrees, then offsets, then a parallel scatter.
        let degrees: Vec<AtomicU32> = (0..num_nodes).map(|_| AtomicU32::new(0)).collect();
        pin_array.par_iter().for_each(|&p| {
            degrees[p as usize].fetch_add(1, Ordering::Relaxed);
        });
        let mut node_offsets = vec![0u32; num_nodes + 1];
        for v in 0..num_nodes {
            node_offsets[v + 1] = node_offsets[v] + degrees[v].load(Ordering::Relaxed);
        }

        let cursors: Vec<AtomicU32> = node_offsets[..num_nodes]
            .iter()
            .map(|&o| AtomicU32::new(o))
            .collect();
        let incidence_slots: Vec<AtomicU32> = (0..num_pins).map(|_| AtomicU32::new(0)).collect();
        (0..num_edges).into_par_iter().for_each(|e| {
            let lo = edge_offsets[e] as usize;
            let hi = edge_offsets[e + 1] as usize;
            for &p in &pin_array[lo..hi] {
                // Every pin claims a distinct slot of its node's range.
                let slot = cursors[p as usize].fetch_add(1, Ordering::Relaxed);
                incidence_slots[slot as usize].store(e as EdgeId, Ordering::Relaxed);
            }
        });
        let incidence_array: Vec<EdgeId> = incidence_slots
            .into_iter()
            .map(AtomicU32::into_inner)
            .collect();

        let mut hg = Hypergraph {
            num_nodes,
            num_edges,
            num_pins,
            total_node_weight: node_weights.iter().sum(),
            node_weights,
            edge_weights,
            edge_offsets,
            pin_array,
            node_offsets,
            incidence_array,
            communities: Vec::new(),
            fixed: Vec::new(),
            num_removed_single_pin_edges,
        };

        if deterministic {
            // Canonical incidence order; the scatter above races on slots.
            let mut rest: &mut [EdgeId] = &mut hg.incidence_array;
            for v in 0..num_nodes {
                let deg = (hg.node_offsets[v + 1] - hg.node_offsets[v]) as usize;
                let (head, tail) = rest.split_at_mut(deg);
                head.sort_unstable();
                rest = tail;
            }
        }
        hg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The 7-vertex, 4-hyperedge instance used throughout the test suite:
    /// E0 = {0,2}, E1 = {0,1,3,4}, E2 = {3,4,6}, E3 = {2,5,6}.
    pub(crate) fn seven_node_hypergraph() -> Hypergraph {
        HypergraphBuilder::new(7)
            .add_edge(vec![0, 2], 1)
            .add_edge(vec![0, 1, 3, 4], 1)
            .add_edge(vec![3, 4, 6], 1)
            .add_edge(vec![2, 5, 6], 1)
            .deterministic(true)
            .build()
    }

    #[test]
    fn basic_sizes() {
        let hg = seven_node_hypergraph();
        assert_eq!(hg.num_nodes(), 7);
        assert_eq!(hg.num_edges(), 4);
        assert_eq!(hg.num_pins(), 12);
        assert_eq!(hg.total_node_weight(), 7);
        assert_eq!(hg.edge_size(1), 4);
        assert_eq!(hg.pins(0), &[0, 2]);
    }

    #[test]
    fn incidence_is_consistent() {
        let hg = seven_node_hypergraph();
        hg.validate().unwrap();
        assert_eq!(hg.incident_edges(0), &[0, 1]);
        assert_eq!(hg.incident_edges(6), &[2, 3]);
        assert_eq!(hg.node_degree(3), 2);
    }

    #[test]
    fn single_pin_edges_removed_and_counted() {
        let hg = HypergraphBuilder::new(3)
            .add_edge(vec![0], 5)
            .add_edge(vec![0, 1], 1)
            .add_edge(vec![2], 2)
            .build();
        assert_eq!(hg.num_edges(), 1);
        assert_eq!(hg.num_removed_single_pin_edges(), 2);
        assert_eq!(hg.pins(0), &[0, 1]);
    }

    #[test]
    fn keep_single_pin_edges_when_asked() {
        let hg = HypergraphBuilder::new(2)
            .add_edge(vec![0], 1)
            .add_edge(vec![0, 1], 1)
            .keep_single_pin_edges()
            .build();
        assert_eq!(hg.num_edges(), 2);
        assert_eq!(hg.num_removed_single_pin_edges(), 0);
    }

    #[test]
    fn offset_format_validation() {
        let err = HypergraphBuilder::from_offset_format(3, 2, &[0, 2], &[0, 1, 2], None, None);
        assert!(matches!(err, Err(PartitionError::MalformedOffsets { .. })));

        let err =
            HypergraphBuilder::from_offset_format(3, 1, &[0, 2], &[0, 7], None, None);
        assert!(matches!(err, Err(PartitionError::PinOutOfRange { .. })));

        let err =
            HypergraphBuilder::from_offset_format(3, 1, &[0, 2], &[1, 1], None, None);
        assert!(matches!(err, Err(PartitionError::DuplicatePin { .. })));

        let ok = HypergraphBuilder::from_offset_format(
            3,
            2,
            &[0, 2, 4],
            &[0, 1, 1, 2],
            Some(&[3, 4]),
            Some(&[1, 2, 3]),
        )
        .unwrap()
        .build();
        assert_eq!(ok.edge_weight(1), 4);
        assert_eq!(ok.total_node_weight(), 6);
    }

    #[test]
    fn deterministic_build_sorts_incidence() {
        let hg = HypergraphBuilder::new(4)
            .add_edge(vec![3, 0], 1)
            .add_edge(vec![0, 1], 1)
            .add_edge(vec![0, 2], 1)
            .deterministic(true)
            .build();
        assert_eq!(hg.incident_edges(0), &[0, 1, 2]);
    }
}

#[cfg(test)]
pub(crate) use tests::seven_node_hypergraph;
