//! Programmatic API consumed by front-ends.
//!
//! The entry point validates its preconditions before any work starts
//! (bad k, bad ε, empty or malformed hypergraph) and otherwise returns a
//! partition satisfying the tracked invariants. The process-wide thread pool
//! is optional; without it every call runs on the caller's ambient Rayon
//! pool.

use log::warn;
use once_cell::sync::OnceCell;
use rayon::ThreadPool;

use crate::context::Context;
use crate::datastructures::hypergraph::HypergraphBuilder;
use crate::datastructures::{EdgeWeight, NodeId, NodeWeight, PartitionId};
use crate::error::PartitionError;
use crate::multilevel;
use crate::runtime::{build_worker_pool, Runtime};

static GLOBAL_POOL: OnceCell<ThreadPool> = OnceCell::new();

/// Install the process-wide thread pool. Requests beyond the available cpus
/// are capped with a warning; later calls are ignored. The
/// `interleaved_numa_allocations` flag is accepted for interface
/// compatibility (memory placement is the allocator's business here).
pub fn initialize_thread_pool(num_threads: usize, interleaved_numa_allocations: bool) {
    let _ = interleaved_numa_allocations;
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let threads = if num_threads > available {
        warn!(
            "only {available} cpus available, reducing thread count from {num_threads} to {available}"
        );
        available
    } else {
        num_threads.max(1)
    };
    let _ = GLOBAL_POOL.set(build_worker_pool(Some(threads)));
}

/// Hypergraph in offset/pin wire format: pins of hyperedge `e` are
/// `edge_pins[edge_offsets[e]..edge_offsets[e + 1]]`.
#[derive(Debug, Clone, Copy)]
pub struct HypergraphInput<'a> {
    pub num_nodes: usize,
    pub num_edges: usize,
    /// `num_edges + 1` offsets into `edge_pins`.
    pub edge_offsets: &'a [usize],
    pub edge_pins: &'a [NodeId],
    /// Unit weights when `None`.
    pub node_weights: Option<&'a [NodeWeight]>,
    pub edge_weights: Option<&'a [EdgeWeight]>,
}

/// Result of a partitioning call.
#[derive(Debug, Clone)]
pub struct PartitionOutput {
    /// Block id per vertex.
    pub partition: Vec<PartitionId>,
    /// Achieved objective value.
    pub objective: EdgeWeight,
}

/// Build the hypergraph and run the multilevel core. `k`, `epsilon` and
/// `seed` override the corresponding context parameters, mirroring the
/// front-end convention.
pub fn partition(
    ctx: &Context,
    input: &HypergraphInput<'_>,
    k: u32,
    epsilon: f64,
    seed: u64,
) -> Result<PartitionOutput, PartitionError> {
    if k < 2 {
        return Err(PartitionError::InvalidNumberOfBlocks(k));
    }
    if !(epsilon > 0.0) {
        return Err(PartitionError::InvalidEpsilon);
    }
    if input.num_nodes == 0 {
        return Err(PartitionError::EmptyHypergraph);
    }

    let mut ctx = ctx.clone();
    ctx.partition.k = k;
    ctx.partition.epsilon = epsilon;
    ctx.partition.seed = seed;

    let hg = HypergraphBuilder::from_offset_format(
        input.num_nodes,
        input.num_edges,
        input.edge_offsets,
        input.edge_pins,
        input.edge_weights,
        input.node_weights,
    )?
    .deterministic(ctx.partition.deterministic)
    .build();

    let deterministic = ctx.partition.deterministic;
    let run = move |rt: &Runtime| {
        let (_, partition, objective) = multilevel::partition(hg, &ctx, rt);
        PartitionOutput {
            partition,
            objective,
        }
    };

    let output = match GLOBAL_POOL.get() {
        Some(pool) => {
            let rt = Runtime::on_current_pool(seed, deterministic);
            pool.install(|| run(&rt))
        }
        None => {
            // No process-wide pool installed: run on the caller's ambient
            // pool (seeded mode is available through initialize_thread_pool).
            let rt = Runtime::on_current_pool(seed, deterministic);
            run(&rt)
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_triangles() -> (Vec<usize>, Vec<NodeId>) {
        // Two triangles joined by one bridge edge.
        let offsets = vec![0, 3, 6, 8];
        let pins = vec![0, 1, 2, 3, 4, 5, 2, 3];
        (offsets, pins)
    }

    #[test]
    fn rejects_bad_preconditions() {
        let (offsets, pins) = two_triangles();
        let input = HypergraphInput {
            num_nodes: 6,
            num_edges: 3,
            edge_offsets: &offsets,
            edge_pins: &pins,
            node_weights: None,
            edge_weights: None,
        };
        let ctx = Context::new();
        assert!(matches!(
            partition(&ctx, &input, 1, 0.03, 0),
            Err(PartitionError::InvalidNumberOfBlocks(1))
        ));
        assert!(matches!(
            partition(&ctx, &input, 2, 0.0, 0),
            Err(PartitionError::InvalidEpsilon)
        ));
        let empty = HypergraphInput {
            num_nodes: 0,
            num_edges: 0,
            edge_offsets: &[0],
            edge_pins: &[],
            node_weights: None,
            edge_weights: None,
        };
        assert!(matches!(
            partition(&ctx, &empty, 2, 0.03, 0),
            Err(PartitionError::EmptyHypergraph)
        ));
    }

    #[test]
    fn partitions_two_triangles_across_the_bridge() {
        let (offsets, pins) = two_triangles();
        let input = HypergraphInput {
            num_nodes: 6,
            num_edges: 3,
            edge_offsets: &offsets,
            edge_pins: &pins,
            node_weights: None,
            edge_weights: None,
        };
        let ctx = Context::new();
        let out = partition(&ctx, &input, 2, 0.34, 42).unwrap();
        assert_eq!(out.partition.len(), 6);
        assert_eq!(out.objective, 1, "only the bridge should be cut");
        assert_eq!(out.partition[0], out.partition[1]);
        assert_eq!(out.partition[0], out.partition[2]);
        assert_eq!(out.partition[3], out.partition[4]);
        assert_eq!(out.partition[3], out.partition[5]);
    }

    #[test]
    fn malformed_input_is_reported() {
        let ctx = Context::new();
        let input = HypergraphInput {
            num_nodes: 3,
            num_edges: 2,
            edge_offsets: &[0, 2],
            edge_pins: &[0, 1],
            node_weights: None,
            edge_weights: None,
        };
        assert!(matches!(
            partition(&ctx, &input, 2, 0.03, 0),
            Err(PartitionError::MalformedOffsets { .. })
        ));
    }
}
