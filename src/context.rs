//! Partitioning context: objective, presets and per-phase configuration.
//!
//! A [`Context`] value carries every knob of the pipeline. Front-ends either
//! fill it directly, load a [`Preset`], or drive it through
//! [`Context::set_parameter`] with string values (status codes are fixed by
//! [`SetParameterStatus`]).

use crate::error::SetParameterStatus;

/// Optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    /// Connectivity metric: Σ_e w(e)·(λ(e)−1).
    Km1,
    /// Cut metric: Σ_{e: λ(e)≥2} w(e).
    Cut,
}

/// Configuration presets mirroring common use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Reproducible partitions: seeded permutations, synchronous rounds,
    /// sequential label propagation, FM disabled.
    Deterministic,
    /// Default speed-oriented configuration.
    Speed,
    /// Additional FM effort (unconstrained strategy) and the flow slot armed.
    HighQuality,
}

/// Parameters settable through the string-typed front-end interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextParameter {
    NumBlocks,
    Epsilon,
    Objective,
    Seed,
    NumVCycles,
    Verbose,
}

/// Top-level partition parameters.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Number of blocks k.
    pub k: u32,
    /// Imbalance tolerance ε.
    pub epsilon: f64,
    pub objective: Objective,
    pub seed: u64,
    /// Number of V-cycles executed after the first multilevel run.
    pub num_vcycles: usize,
    pub verbose: bool,
    /// Reproducible mode: fixed seed implies identical output across runs and
    /// thread counts.
    pub deterministic: bool,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            k: 2,
            epsilon: 0.03,
            objective: Objective::Km1,
            seed: 0,
            num_vcycles: 0,
            verbose: false,
            deterministic: false,
        }
    }
}

/// Community detection (Louvain preprocessing) configuration.
#[derive(Debug, Clone)]
pub struct CommunityDetectionConfig {
    pub enabled: bool,
    /// Stop a level once fewer than this fraction of nodes moved in a round.
    pub min_vertex_move_fraction: f64,
    /// Maximum local-moving rounds per level.
    pub max_pass_iterations: usize,
    /// Maximum number of contraction levels of the Louvain hierarchy.
    pub max_levels: usize,
    /// Resolution parameter γ of the modularity gain.
    pub resolution: f64,
    /// Hyperedges with at most this many pins are clique-expanded; larger
    /// ones are star-expanded.
    pub clique_expansion_threshold: usize,
}

impl Default for CommunityDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_vertex_move_fraction: 0.01,
            max_pass_iterations: 5,
            max_levels: 16,
            resolution: 1.0,
            clique_expansion_threshold: 4,
        }
    }
}

/// Coarsening algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarseningAlgorithm {
    /// Parallel heavy-edge clustering, one level per round.
    MultilevelClustering,
    /// One contraction at a time into a dynamic hypergraph.
    NLevel,
}

/// Coarsening configuration.
#[derive(Debug, Clone)]
pub struct CoarseningConfig {
    pub algorithm: CoarseningAlgorithm,
    /// Coarsening stops once |V| ≤ k · contraction_limit_multiplier.
    pub contraction_limit_multiplier: usize,
    /// A round must shrink the vertex count at least by this factor to
    /// continue.
    pub minimum_shrink_factor: f64,
    /// Upper bound on rounds as a safety stop.
    pub max_rounds: usize,
    /// Maximum combined vertex weight admissible for a contraction, as a
    /// multiple of ⌈w(V)/contraction limit⌉.
    pub max_allowed_weight_multiplier: f64,
    /// Divide the heavy-edge score by w(u)·w(v).
    pub normalize_by_weight: bool,
    /// Hyperedges with more pins than this are skipped while rating.
    pub rating_max_edge_size: usize,
    /// Number of uncontractions per refinement batch in n-level mode.
    pub uncontraction_batch_size: usize,
}

impl Default for CoarseningConfig {
    fn default() -> Self {
        Self {
            algorithm: CoarseningAlgorithm::MultilevelClustering,
            contraction_limit_multiplier: 160,
            minimum_shrink_factor: 1.01,
            max_rounds: 60,
            max_allowed_weight_multiplier: 1.5,
            normalize_by_weight: true,
            rating_max_edge_size: 1000,
            uncontraction_batch_size: 1000,
        }
    }
}

/// Label propagation refinement configuration.
#[derive(Debug, Clone)]
pub struct LabelPropagationConfig {
    pub enabled: bool,
    pub maximum_iterations: usize,
    /// Also activate non-border nodes (used when repairing balance).
    pub rebalancing: bool,
    /// Process the active set sequentially (deterministic mode).
    pub execute_sequential: bool,
}

impl Default for LabelPropagationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            maximum_iterations: 5,
            rebalancing: false,
            execute_sequential: false,
        }
    }
}

/// FM strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmStrategy {
    /// Refuse moves violating the balance constraint.
    Constrained,
    /// Allow temporarily overweight targets, rebalance afterwards.
    Unconstrained,
}

/// Localized FM refinement configuration.
#[derive(Debug, Clone)]
pub struct FmConfig {
    pub enabled: bool,
    pub strategy: FmStrategy,
    /// Seeds handed to each local search.
    pub num_seed_nodes: usize,
    /// A local search stops after this many moves without a new best prefix.
    pub max_moves_without_improvement: usize,
    /// Maximum number of FM rounds per level.
    pub max_rounds: usize,
    /// A round must improve the objective by this relative amount to continue.
    pub min_relative_improvement: f64,
    /// Overall budget = max(5 s, time_limit_factor · k · previous round time).
    pub time_limit_factor: f64,
    /// Hyperedges with more pins than this skip per-pin gain updates.
    pub high_degree_threshold: usize,
}

impl Default for FmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: FmStrategy::Constrained,
            num_seed_nodes: 25,
            max_moves_without_improvement: 100,
            max_rounds: 10,
            min_relative_improvement: 0.0025,
            time_limit_factor: 0.25,
            high_degree_threshold: 100_000,
        }
    }
}

/// Flow refinement is interface-only: the slot exists but no algorithm ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAlgorithm {
    None,
}

/// Refinement configuration shared by the uncoarsener.
#[derive(Debug, Clone, Default)]
pub struct RefinementConfig {
    pub label_propagation: LabelPropagationConfig,
    pub fm: FmConfig,
    pub flow: FlowConfig,
}

#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub algorithm: FlowAlgorithm,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            algorithm: FlowAlgorithm::None,
        }
    }
}

/// Initial partitioning pool configuration.
#[derive(Debug, Clone)]
pub struct InitialPartitioningConfig {
    /// Runs per flat algorithm, each with a derived seed.
    pub runs_per_algorithm: usize,
    /// Rounds of the flat label-propagation partitioner.
    pub lp_maximum_iterations: usize,
}

impl Default for InitialPartitioningConfig {
    fn default() -> Self {
        Self {
            runs_per_algorithm: 2,
            lp_maximum_iterations: 3,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub partition: PartitionConfig,
    pub preprocessing: CommunityDetectionConfig,
    pub coarsening: CoarseningConfig,
    pub initial_partitioning: InitialPartitioningConfig,
    pub refinement: RefinementConfig,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the configuration with one of the shipped presets.
    pub fn load_preset(&mut self, preset: Preset) {
        *self = Context {
            partition: PartitionConfig {
                // Presets keep the externally set partition parameters.
                ..self.partition.clone()
            },
            ..Context::default()
        };
        match preset {
            Preset::Deterministic => {
                self.partition.deterministic = true;
                self.refinement.label_propagation.execute_sequential = true;
                self.refinement.fm.enabled = false;
            }
            Preset::Speed => {}
            Preset::HighQuality => {
                self.refinement.fm.strategy = FmStrategy::Unconstrained;
                self.refinement.fm.max_rounds = 15;
                self.refinement.label_propagation.maximum_iterations = 10;
                self.initial_partitioning.runs_per_algorithm = 3;
            }
        }
    }

    /// Set a parameter from its string representation.
    ///
    /// Returns [`SetParameterStatus::Ok`] on success, `ParseError` when the
    /// value does not parse as the expected number, and `InvalidValue` when
    /// it parses but is not admissible.
    pub fn set_parameter(&mut self, param: ContextParameter, value: &str) -> SetParameterStatus {
        match param {
            ContextParameter::NumBlocks => match value.parse::<u32>() {
                Ok(k) if k > 0 => {
                    self.partition.k = k;
                    SetParameterStatus::Ok
                }
                Ok(_) => SetParameterStatus::InvalidValue,
                Err(_) => SetParameterStatus::ParseError,
            },
            ContextParameter::Epsilon => match value.parse::<f64>() {
                Ok(eps) if eps > 0.0 => {
                    self.partition.epsilon = eps;
                    SetParameterStatus::Ok
                }
                Ok(_) => SetParameterStatus::InvalidValue,
                Err(_) => SetParameterStatus::ParseError,
            },
            ContextParameter::Objective => match value {
                "km1" => {
                    self.partition.objective = Objective::Km1;
                    SetParameterStatus::Ok
                }
                "cut" => {
                    self.partition.objective = Objective::Cut;
                    SetParameterStatus::Ok
                }
                _ => SetParameterStatus::InvalidValue,
            },
            ContextParameter::Seed => match value.parse::<u64>() {
                Ok(seed) => {
                    self.partition.seed = seed;
                    SetParameterStatus::Ok
                }
                Err(_) => SetParameterStatus::ParseError,
            },
            ContextParameter::NumVCycles => match value.parse::<usize>() {
                Ok(n) => {
                    self.partition.num_vcycles = n;
                    SetParameterStatus::Ok
                }
                Err(_) => SetParameterStatus::ParseError,
            },
            ContextParameter::Verbose => match value.parse::<i32>() {
                Ok(v) => {
                    self.partition.verbose = v != 0;
                    SetParameterStatus::Ok
                }
                Err(_) => SetParameterStatus::ParseError,
            },
        }
    }

    /// String-keyed variant of [`set_parameter`](Self::set_parameter) for
    /// front-ends that read key/value pairs; unknown keys yield
    /// [`SetParameterStatus::UnknownKey`].
    pub fn set_parameter_by_name(&mut self, key: &str, value: &str) -> SetParameterStatus {
        let param = match key {
            "k" | "num-blocks" => ContextParameter::NumBlocks,
            "epsilon" => ContextParameter::Epsilon,
            "objective" => ContextParameter::Objective,
            "seed" => ContextParameter::Seed,
            "num-vcycles" => ContextParameter::NumVCycles,
            "verbose" => ContextParameter::Verbose,
            _ => return SetParameterStatus::UnknownKey,
        };
        self.set_parameter(param, value)
    }

    /// The contraction floor: coarsening stops at or below this vertex count.
    pub fn contraction_limit(&self) -> usize {
        (self.partition.k as usize).saturating_mul(self.coarsening.contraction_limit_multiplier)
    }
}
