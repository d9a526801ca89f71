//! Coarsening: produce a hierarchy of progressively smaller hypergraphs.
//!
//! Two algorithms selected by configuration: multilevel clustering (one level
//! per matching round) and n-level (one contraction at a time into a dynamic
//! hypergraph). Both stop at the contraction floor
//! `k · contraction_limit_multiplier` or when a round stops shrinking the
//! vertex count.

pub mod clustering;
pub mod contraction;
pub mod nlevel;
pub mod rating;

use crate::datastructures::hypergraph::Hypergraph;
use crate::datastructures::{NodeId, NodeWeight};

/// One level of the multilevel hierarchy. `mapping` sends each vertex of the
/// next finer hypergraph to its coarse representative in `hg`.
#[derive(Debug)]
pub struct Level {
    pub hg: Hypergraph,
    pub mapping: Vec<NodeId>,
}

/// Maximum admissible weight of a coarse vertex: vertices above it never
/// participate in contractions.
pub fn max_allowed_node_weight(
    total_weight: NodeWeight,
    contraction_limit: usize,
    multiplier: f64,
) -> NodeWeight {
    let target = (total_weight as f64 / contraction_limit.max(1) as f64).ceil();
    (multiplier * target).ceil() as NodeWeight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_weight_scales_with_floor() {
        assert_eq!(max_allowed_node_weight(1000, 100, 1.5), 15);
        assert_eq!(max_allowed_node_weight(7, 320, 1.5), 2);
    }
}
