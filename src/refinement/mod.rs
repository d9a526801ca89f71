//! Refinement: improve a partition by single-vertex moves.
//!
//! All refiners implement [`Refiner`] and are selected by the configuration
//! enums; the uncoarsener invokes each phase only when its algorithm is
//! non-identity. Flow refinement exists as an interface slot only.

pub mod fm;
pub mod label_propagation;
pub mod rebalancer;

use std::time::Duration;

use crate::context::{FlowConfig, Objective};
use crate::datastructures::gain_cache::GainCache;
use crate::datastructures::partitioned::PartitionedHypergraph;
use crate::datastructures::{Gain, HypergraphOps, NodeId, PartitionId};
use crate::metrics::Metrics;
use crate::runtime::Runtime;

/// A partition refiner. `refine` returns whether it improved the objective;
/// every committed move is reflected in `metrics` through the per-move delta
/// callbacks, so `metrics.objective` stays exact.
pub trait Refiner<H: HypergraphOps> {
    /// Per-level setup (sizing scratch state).
    fn initialize(&mut self, phg: &PartitionedHypergraph<H>, gain_cache: &GainCache);

    /// Refine the partition, starting from `refinement_nodes` (all border
    /// nodes when empty). `time_budget` bounds cooperative cancellation.
    fn refine(
        &mut self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: &GainCache,
        refinement_nodes: &[NodeId],
        metrics: &mut Metrics,
        rt: &Runtime,
        time_budget: Option<Duration>,
    ) -> bool;
}

/// Flow refinement factory: interface-only, so the `None` algorithm yields no
/// refiner. External implementations plug in here.
pub fn create_flow_refiner<H: HypergraphOps>(
    cfg: &FlowConfig,
) -> Option<Box<dyn Refiner<H> + Send>> {
    match cfg.algorithm {
        crate::context::FlowAlgorithm::None => None,
    }
}

/// Move gain computed directly from pin counts, without the gain cache.
/// Positive values decrease the objective.
pub fn direct_move_gain<H: HypergraphOps>(
    phg: &PartitionedHypergraph<H>,
    objective: Objective,
    v: NodeId,
    to: PartitionId,
) -> Gain {
    let hg = phg.hypergraph();
    let from = phg.part_id(v);
    debug_assert_ne!(from, to);
    let mut gain = 0;
    for &e in hg.incident_edges(v) {
        let w = hg.edge_weight(e);
        match objective {
            Objective::Km1 => {
                if phg.pin_count_in_part(e, from) == 1 {
                    gain += w;
                }
                if phg.pin_count_in_part(e, to) == 0 {
                    gain -= w;
                }
            }
            Objective::Cut => {
                let size = hg.edge_size(e) as u32;
                if size < 2 {
                    continue;
                }
                if phg.pin_count_in_part(e, from) == size {
                    gain -= w;
                }
                if phg.pin_count_in_part(e, to) == size - 1 {
                    gain += w;
                }
            }
        }
    }
    gain
}
