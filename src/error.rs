//! Unified error type for hypermill public APIs.
//!
//! All entry points validate their preconditions before doing any work and
//! report violations through [`PartitionError`]; internal contract violations
//! are checked with `debug_invariants!` instead and are fatal in debug builds.

use thiserror::Error;

/// Unified error type for partitioning operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// Number of blocks must be at least two.
    #[error("invalid number of blocks k = {0} (must be >= 2)")]
    InvalidNumberOfBlocks(u32),
    /// Imbalance tolerance must be positive.
    #[error("invalid imbalance tolerance epsilon (must be > 0)")]
    InvalidEpsilon,
    /// The input hypergraph has no vertices.
    #[error("empty hypergraph: no vertices")]
    EmptyHypergraph,
    /// Offset array does not describe `num_edges` hyperedges.
    #[error("edge offset array has length {found}, expected {expected}")]
    MalformedOffsets { expected: usize, found: usize },
    /// Offsets must be non-decreasing and end at the pin array length.
    #[error("edge offsets are inconsistent with the pin array (offset entry {0})")]
    InconsistentOffsets(usize),
    /// A pin references a vertex outside `[0, num_nodes)`.
    #[error("pin {pin} of hyperedge {edge} is out of range (num_nodes = {num_nodes})")]
    PinOutOfRange { edge: u32, pin: u32, num_nodes: usize },
    /// A hyperedge contains the same vertex twice.
    #[error("duplicate pin {pin} in hyperedge {edge}")]
    DuplicatePin { edge: u32, pin: u32 },
    /// Weight slice length does not match the entity count.
    #[error("{what} weight slice has length {found}, expected {expected}")]
    WeightLengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// Hyperedge weights must be positive.
    #[error("hyperedge {0} has non-positive weight")]
    NonPositiveEdgeWeight(u32),
    /// Internal invariant violated (reported by validation helpers).
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

/// Status codes returned by [`crate::context::Context::set_parameter`].
///
/// The discriminants are part of the public contract consumed by front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SetParameterStatus {
    /// Parameter accepted.
    Ok = 0,
    /// The parameter key is not recognized.
    UnknownKey = 1,
    /// The value could not be parsed as a number.
    ParseError = 2,
    /// The value parsed but is not admissible for this parameter.
    InvalidValue = 3,
}

impl SetParameterStatus {
    /// Integer code of this status.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Consistency checks for structures that track derived state (the partition
/// overlay's pin counts, connectivity sets and border counters).
pub trait DebugInvariants {
    /// Panic on the first broken invariant when checking is compiled in;
    /// a no-op otherwise.
    fn debug_assert_invariants(&self);
    /// Recompute the tracked state from scratch and report the first
    /// disagreement found.
    fn validate_invariants(&self) -> Result<(), PartitionError>;
}
