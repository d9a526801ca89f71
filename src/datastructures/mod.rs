//! Hypergraph data structures: static CSR storage, the dynamic n-level
//! variant, the partition overlay and the gain cache.

pub mod connectivity;
pub mod dynamic;
pub mod gain_cache;
pub mod hypergraph;
pub mod partitioned;
pub mod sparse_map;

use rayon::prelude::*;

/// Vertex identifier, dense in `[0, n)`.
pub type NodeId = u32;
/// Hyperedge identifier, dense in `[0, m)`.
pub type EdgeId = u32;
/// Block identifier in `[0, k)`.
pub type PartitionId = u32;
/// Community identifier assigned by preprocessing.
pub type CommunityId = u32;
/// Vertex weight (non-negative).
pub type NodeWeight = i64;
/// Hyperedge weight (positive).
pub type EdgeWeight = i64;
/// Objective delta of a move; negative values are improvements.
pub type Gain = i64;

/// Sentinel for "not assigned to any block".
pub const INVALID_PARTITION: PartitionId = PartitionId::MAX;
/// Sentinel node id.
pub const INVALID_NODE: NodeId = NodeId::MAX;

/// Capability set shared by the static and the dynamic hypergraph.
///
/// All methods are read-only and thread-safe; the partition overlay, the
/// refiners and the initial partitioners are written against this trait so
/// the algorithms exist only once.
pub trait HypergraphOps: Sync {
    /// Number of vertex slots, including disabled (contracted) ones.
    fn num_nodes(&self) -> usize;
    /// Number of hyperedge slots, including disabled ones.
    fn num_edges(&self) -> usize;
    /// Total number of pins over enabled hyperedges.
    fn num_pins(&self) -> usize;

    /// A contracted vertex is disabled; static hypergraphs have none.
    fn is_node_enabled(&self, v: NodeId) -> bool;
    /// A hyperedge shrunk below two pins is disabled.
    fn is_edge_enabled(&self, e: EdgeId) -> bool;

    fn node_weight(&self, v: NodeId) -> NodeWeight;
    fn edge_weight(&self, e: EdgeId) -> EdgeWeight;
    /// Number of pins of `e`.
    fn edge_size(&self, e: EdgeId) -> usize;
    /// Pins of `e` in storage order.
    fn pins(&self, e: EdgeId) -> &[NodeId];
    /// Hyperedges incident to `v` (unordered).
    fn incident_edges(&self, v: NodeId) -> &[EdgeId];

    /// Sum of all enabled vertex weights.
    fn total_node_weight(&self) -> NodeWeight;

    /// Community id of `v`, if community detection ran.
    fn community(&self, _v: NodeId) -> Option<CommunityId> {
        None
    }
    /// Fixed block of `v`, if any.
    fn fixed_block(&self, _v: NodeId) -> Option<PartitionId> {
        None
    }

    /// Parallel iterator over all enabled vertices.
    fn par_nodes(&self) -> impl ParallelIterator<Item = NodeId> + '_ {
        (0..self.num_nodes() as NodeId)
            .into_par_iter()
            .filter(move |&v| self.is_node_enabled(v))
    }

    /// Parallel iterator over all enabled hyperedges.
    fn par_edges(&self) -> impl ParallelIterator<Item = EdgeId> + '_ {
        (0..self.num_edges() as EdgeId)
            .into_par_iter()
            .filter(move |&e| self.is_edge_enabled(e))
    }

    /// Sequential iterator over all enabled vertices.
    fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.num_nodes() as NodeId).filter(move |&v| self.is_node_enabled(v))
    }

    /// Sequential iterator over all enabled hyperedges.
    fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.num_edges() as EdgeId).filter(move |&e| self.is_edge_enabled(e))
    }
}

impl<H: HypergraphOps> HypergraphOps for &H {
    fn num_nodes(&self) -> usize {
        (**self).num_nodes()
    }
    fn num_edges(&self) -> usize {
        (**self).num_edges()
    }
    fn num_pins(&self) -> usize {
        (**self).num_pins()
    }
    fn is_node_enabled(&self, v: NodeId) -> bool {
        (**self).is_node_enabled(v)
    }
    fn is_edge_enabled(&self, e: EdgeId) -> bool {
        (**self).is_edge_enabled(e)
    }
    fn node_weight(&self, v: NodeId) -> NodeWeight {
        (**self).node_weight(v)
    }
    fn edge_weight(&self, e: EdgeId) -> EdgeWeight {
        (**self).edge_weight(e)
    }
    fn edge_size(&self, e: EdgeId) -> usize {
        (**self).edge_size(e)
    }
    fn pins(&self, e: EdgeId) -> &[NodeId] {
        (**self).pins(e)
    }
    fn incident_edges(&self, v: NodeId) -> &[EdgeId] {
        (**self).incident_edges(v)
    }
    fn total_node_weight(&self) -> NodeWeight {
        (**self).total_node_weight()
    }
    fn community(&self, v: NodeId) -> Option<CommunityId> {
        (**self).community(v)
    }
    fn fixed_block(&self, v: NodeId) -> Option<PartitionId> {
        (**self).fixed_block(v)
    }
}

/// Per-edge record emitted by the partition overlay for every committed move,
/// consumed by the gain cache and the objective accumulators.
#[derive(Debug, Clone, Copy)]
pub struct SynchronizedEdgeUpdate {
    pub edge: EdgeId,
    pub edge_weight: EdgeWeight,
    pub edge_size: usize,
    /// Pin count of the source block after the move.
    pub pin_count_in_from_part_after: u32,
    /// Pin count of the target block after the move.
    pub pin_count_in_to_part_after: u32,
    pub block_from: PartitionId,
    pub block_to: PartitionId,
}
