//! # hypermill
//!
//! hypermill is a parallel multilevel hypergraph partitioner. Given a
//! hypergraph H=(V,E) with vertex and hyperedge weights, a number of blocks
//! `k ≥ 2` and an imbalance tolerance `ε > 0`, it computes a partition
//! π: V → {0,…,k−1} minimizing either the *connectivity* metric
//! (km1, Σ_e w(e)·(λ(e)−1)) or the *cut* metric (Σ_{λ(e)≥2} w(e)) subject to
//! the balance constraint `max_b W[b] ≤ (1+ε)·⌈w(V)/k⌉`.
//!
//! ## Pipeline
//! - Optional **community detection** (parallel Louvain local moving on a
//!   star/clique expansion of the hypergraph) restricts coarsening
//!   contractions to stay within communities.
//! - **Coarsening** contracts matched vertex pairs round by round (or one
//!   vertex at a time in n-level mode) down to a configured floor.
//! - **Initial partitioning** runs a pool of flat heuristics on the coarsest
//!   hypergraph and keeps the best candidate.
//! - **Uncoarsening** projects the partition back level by level, refining at
//!   each level with parallel label propagation and localized FM.
//!
//! ## Usage
//! ```no_run
//! use hypermill::api::{self, HypergraphInput};
//! use hypermill::context::{Context, Preset};
//!
//! let mut ctx = Context::new();
//! ctx.load_preset(Preset::Speed);
//! let input = HypergraphInput {
//!     num_nodes: 4,
//!     num_edges: 2,
//!     edge_offsets: &[0, 2, 4],
//!     edge_pins: &[0, 1, 2, 3],
//!     node_weights: None,
//!     edge_weights: None,
//! };
//! let out = api::partition(&ctx, &input, 2, 0.03, 42).unwrap();
//! println!("objective = {}", out.objective);
//! ```
//!
//! All phases receive an explicit [`runtime::Runtime`] value; the library
//! holds no process-wide mutable state apart from the optional thread pool
//! installed via [`api::initialize_thread_pool`].

pub mod api;
pub mod coarsening;
pub mod context;
pub mod datastructures;
pub mod error;
pub mod initial;
pub mod metrics;
pub mod multilevel;
pub mod preprocessing;
pub mod refinement;
pub mod runtime;

/// A convenient prelude to import the most-used types:
pub mod prelude {
    pub use crate::api::{initialize_thread_pool, partition, HypergraphInput, PartitionOutput};
    pub use crate::context::{Context, Objective, Preset};
    pub use crate::datastructures::hypergraph::{Hypergraph, HypergraphBuilder};
    pub use crate::datastructures::partitioned::PartitionedHypergraph;
    pub use crate::datastructures::{
        EdgeId, EdgeWeight, Gain, NodeId, NodeWeight, PartitionId, INVALID_PARTITION,
    };
    pub use crate::error::PartitionError;
    pub use crate::runtime::Runtime;
}

/// Evaluate a `Result`-returning invariant check and panic with the given
/// context when it fails. The check is compiled in for debug builds and for
/// the `check-invariants` / `strict-invariants` features; plain release
/// builds skip it entirely, so it may sit on hot paths.
#[macro_export]
macro_rules! debug_invariants {
    ($expr:expr, $($ctx:tt)*) => {
        #[cfg(any(
            debug_assertions,
            feature = "check-invariants",
            feature = "strict-invariants"
        ))]
        if let Err(e) = $expr {
            panic!(concat!("[invariants] ", $($ctx)*, ": {}"), e);
        }
    };
}
