//! Dynamic hypergraph supporting interleaved contraction and uncontraction,
//! the storage backing n-level coarsening.
//!
//! Vertex ids are stable: contracting `v` into `u` disables `v` in place and
//! edits pin lists, recording a [`ContractionMemento`] that reverses the edit
//! exactly. Mementos must be undone in reverse contraction order.

use super::{
    CommunityId, EdgeId, EdgeWeight, HypergraphOps, NodeId, NodeWeight, PartitionId,
    INVALID_PARTITION,
};
use super::hypergraph::Hypergraph;

/// Reversal record of one contraction.
#[derive(Debug, Clone)]
pub struct ContractionMemento {
    /// Representative (stays enabled).
    pub u: NodeId,
    /// Contracted vertex (disabled until uncontraction).
    pub v: NodeId,
    /// Hyperedges that contained both `u` and `v`; `v`'s pin was removed.
    pub removed_pin_edges: Vec<EdgeId>,
    /// Hyperedges that contained only `v`; the pin was relabeled to `u`.
    pub replaced_pin_edges: Vec<EdgeId>,
}

#[derive(Debug, Clone)]
pub struct DynamicHypergraph {
    node_weights: Vec<NodeWeight>,
    node_enabled: Vec<bool>,
    edge_weights: Vec<EdgeWeight>,
    pins: Vec<Vec<NodeId>>,
    incidence: Vec<Vec<EdgeId>>,
    communities: Vec<CommunityId>,
    fixed: Vec<PartitionId>,
    total_node_weight: NodeWeight,
    num_pins: usize,
    num_enabled_nodes: usize,
}

impl DynamicHypergraph {
    pub fn from_hypergraph(hg: &Hypergraph) -> Self {
        let n = hg.num_nodes();
        let m = hg.num_edges();
        Self {
            node_weights: (0..n as NodeId).map(|v| hg.node_weight(v)).collect(),
            node_enabled: vec![true; n],
            edge_weights: (0..m as EdgeId).map(|e| hg.edge_weight(e)).collect(),
            pins: (0..m as EdgeId).map(|e| hg.pins(e).to_vec()).collect(),
            incidence: (0..n as NodeId)
                .map(|v| hg.incident_edges(v).to_vec())
                .collect(),
            communities: if hg.has_communities() {
                (0..n as NodeId).map(|v| hg.community(v).unwrap_or(0)).collect()
            } else {
                Vec::new()
            },
            fixed: (0..n as NodeId)
                .map(|v| hg.fixed_block(v).unwrap_or(INVALID_PARTITION))
                .collect(),
            total_node_weight: hg.total_node_weight(),
            num_pins: hg.num_pins(),
            num_enabled_nodes: n,
        }
    }

    pub fn num_enabled_nodes(&self) -> usize {
        self.num_enabled_nodes
    }

    /// Contract `v` into `u`. Both must be enabled and distinct; the caller
    /// enforces weight, community and fixed-vertex admissibility.
    pub fn contract(&mut self, u: NodeId, v: NodeId) -> ContractionMemento {
        debug_assert_ne!(u, v);
        debug_assert!(self.node_enabled[u as usize] && self.node_enabled[v as usize]);

        let mut removed_pin_edges = Vec::new();
        let mut replaced_pin_edges = Vec::new();
        let v_edges = self.incidence[v as usize].clone();
        for e in v_edges {
            let pins = &mut self.pins[e as usize];
            if pins.contains(&u) {
                let pos = pins.iter().position(|&p| p == v).expect("pin must exist");
                pins.remove(pos);
                self.num_pins -= 1;
                removed_pin_edges.push(e);
            } else {
                let pos = pins.iter().position(|&p| p == v).expect("pin must exist");
                pins[pos] = u;
                self.incidence[u as usize].push(e);
                replaced_pin_edges.push(e);
            }
        }

        self.node_weights[u as usize] += self.node_weights[v as usize];
        self.node_enabled[v as usize] = false;
        self.num_enabled_nodes -= 1;

        ContractionMemento {
            u,
            v,
            removed_pin_edges,
            replaced_pin_edges,
        }
    }

    /// Reverse a contraction. Must be applied in reverse contraction order.
    pub fn uncontract(&mut self, m: &ContractionMemento) {
        debug_assert!(!self.node_enabled[m.v as usize]);
        self.node_enabled[m.v as usize] = true;
        self.num_enabled_nodes += 1;
        self.node_weights[m.u as usize] -= self.node_weights[m.v as usize];

        for &e in &m.replaced_pin_edges {
            let pins = &mut self.pins[e as usize];
            let pos = pins.iter().position(|&p| p == m.u).expect("pin must exist");
            pins[pos] = m.v;
            let inc = &mut self.incidence[m.u as usize];
            let pos = inc
                .iter()
                .rposition(|&ie| ie == e)
                .expect("incidence entry must exist");
            inc.swap_remove(pos);
        }
        for &e in &m.removed_pin_edges {
            self.pins[e as usize].push(m.v);
            self.num_pins += 1;
        }
    }
}

impl HypergraphOps for DynamicHypergraph {
    fn num_nodes(&self) -> usize {
        self.node_weights.len()
    }
    fn num_edges(&self) -> usize {
        self.edge_weights.len()
    }
    fn num_pins(&self) -> usize {
        self.num_pins
    }
    fn is_node_enabled(&self, v: NodeId) -> bool {
        self.node_enabled[v as usize]
    }
    fn is_edge_enabled(&self, e: EdgeId) -> bool {
        !self.pins[e as usize].is_empty()
    }
    fn node_weight(&self, v: NodeId) -> NodeWeight {
        self.node_weights[v as usize]
    }
    fn edge_weight(&self, e: EdgeId) -> EdgeWeight {
        self.edge_weights[e as usize]
    }
    fn edge_size(&self, e: EdgeId) -> usize {
        self.pins[e as usize].len()
    }
    fn pins(&self, e: EdgeId) -> &[NodeId] {
        &self.pins[e as usize]
    }
    fn incident_edges(&self, v: NodeId) -> &[EdgeId] {
        &self.incidence[v as usize]
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
        (b != INVALID_PARTITION).then_some(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::hypergraph::seven_node_hypergraph;

    fn incident_set(dhg: &DynamicHypergraph, v: NodeId) -> Vec<EdgeId> {
        let mut edges = dhg.incident_edges(v).to_vec();
        edges.sort_unstable();
        edges
    }

    #[test]
    fn contract_merges_and_uncontract_restores() {
        let mut dhg = DynamicHypergraph::from_hypergraph(&seven_node_hypergraph());
        let u_edges_before = incident_set(&dhg, 0);
        let pins_e1_before = dhg.pins(1).to_vec();

        // 0 and 2 share E0; 2 additionally brings E3.
        let m = dhg.contract(0, 2);
        assert_eq!(m.removed_pin_edges, vec![0]);
        assert_eq!(m.replaced_pin_edges, vec![3]);
        assert!(!dhg.is_node_enabled(2));
        assert_eq!(dhg.node_weight(0), 2);
        assert_eq!(dhg.num_enabled_nodes(), 6);
        assert_eq!(dhg.pins(0), &[0]);
        assert!(dhg.pins(3).contains(&0));
        assert_eq!(incident_set(&dhg, 0), vec![0, 1, 3]);

        dhg.uncontract(&m);
        assert!(dhg.is_node_enabled(2));
        assert_eq!(dhg.node_weight(0), 1);
        assert_eq!(incident_set(&dhg, 0), u_edges_before);
        assert_eq!(dhg.pins(1), pins_e1_before.as_slice());
        let mut e0 = dhg.pins(0).to_vec();
        e0.sort_unstable();
        assert_eq!(e0, vec![0, 2]);
        let mut e3 = dhg.pins(3).to_vec();
        e3.sort_unstable();
        assert_eq!(e3, vec![2, 5, 6]);
    }

    #[test]
    fn nested_contractions_roundtrip_in_reverse_order() {
        let mut dhg = DynamicHypergraph::from_hypergraph(&seven_node_hypergraph());
        let before: Vec<Vec<NodeId>> = (0..4)
            .map(|e| {
                let mut pins = dhg.pins(e).to_vec();
                pins.sort_unstable();
                pins
            })
            .collect();

        let m1 = dhg.contract(3, 4);
        let m2 = dhg.contract(3, 6);
        let m3 = dhg.contract(0, 3);
        assert_eq!(dhg.num_enabled_nodes(), 4);
        assert_eq!(dhg.node_weight(0), 4);

        dhg.uncontract(&m3);
        dhg.uncontract(&m2);
        dhg.uncontract(&m1);

        assert_eq!(dhg.num_enabled_nodes(), 7);
        for v in 0..7 {
            assert!(dhg.is_node_enabled(v));
            assert_eq!(dhg.node_weight(v), 1);
        }
        for e in 0..4 {
            let mut pins = dhg.pins(e).to_vec();
            pins.sort_unstable();
            assert_eq!(pins, before[e as usize]);
        }
    }

    #[test]
    fn pin_totals_track_contractions() {
        let mut dhg = DynamicHypergraph::from_hypergraph(&seven_node_hypergraph());
        assert_eq!(dhg.num_pins(), 12);
        let m = dhg.contract(3, 4);
        // E1 and E2 each lose one pin.
        assert_eq!(dhg.num_pins(), 10);
        dhg.uncontract(&m);
        assert_eq!(dhg.num_pins(), 12);
    }
}
