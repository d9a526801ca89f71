//! The multilevel engine: community detection → coarsening → initial
//! partitioning → uncoarsening with refinement, plus optional V-cycles.
//!
//! Phases are explicit sequential steps with parallel loops inside (no task
//! continuations); every phase receives the same [`Runtime`]. The gain cache
//! is owned here and re-initialized per level. V-cycles feed the current
//! partition back as community ids, which restricts the next coarsening to
//! block-internal contractions, and seed the coarsest partition directly from
//! them.

use log::debug;
use rayon::prelude::*;

use crate::coarsening::nlevel::{self, NLevelHierarchy};
use crate::coarsening::{clustering, Level};
use crate::context::{CoarseningAlgorithm, Context};
use crate::datastructures::dynamic::{ContractionMemento, DynamicHypergraph};
use crate::datastructures::gain_cache::GainCache;
use crate::datastructures::hypergraph::Hypergraph;
use crate::datastructures::partitioned::PartitionedHypergraph;
use crate::datastructures::{EdgeWeight, HypergraphOps, NodeId, PartitionId};
use crate::initial::pool_initial_partition;
use crate::metrics::{self, Metrics};
use crate::preprocessing::detect_communities;
use crate::refinement::fm::FmRefiner;
use crate::refinement::label_propagation::LabelPropagationRefiner;
use crate::refinement::{create_flow_refiner, rebalancer, Refiner};
use crate::runtime::Runtime;

/// Partition `hg` into `ctx.partition.k` blocks. Returns the hypergraph, the
/// partition and the achieved objective value.
pub fn partition(
    mut hg: Hypergraph,
    ctx: &Context,
    rt: &Runtime,
) -> (Hypergraph, Vec<PartitionId>, EdgeWeight) {
    if ctx.preprocessing.enabled {
        debug!("community detection on {} nodes", hg.num_nodes());
        let communities = detect_communities(&hg, &ctx.preprocessing, rt);
        hg.set_communities(communities);
    }

    let (mut hg, mut part) = run_pipeline(hg, ctx, rt, false);

    for cycle in 0..ctx.partition.num_vcycles {
        debug!("v-cycle {}", cycle + 1);
        // The current partition becomes the community structure constraining
        // the next multilevel run.
        hg.set_communities(part.clone());
        let (next_hg, next_part) = run_pipeline(hg, ctx, rt, true);
        hg = next_hg;
        part = next_part;
    }

    let objective = {
        let phg = PartitionedHypergraph::new(ctx.partition.k as usize, &hg);
        phg.apply_partition(&part);
        metrics::objective(&phg, ctx.partition.objective)
    };
    (hg, part, objective)
}

fn run_pipeline(
    hg: Hypergraph,
    ctx: &Context,
    rt: &Runtime,
    vcycle: bool,
) -> (Hypergraph, Vec<PartitionId>) {
    match ctx.coarsening.algorithm {
        CoarseningAlgorithm::MultilevelClustering => multilevel_pipeline(hg, ctx, rt, vcycle),
        CoarseningAlgorithm::NLevel => nlevel_pipeline(hg, ctx, rt, vcycle),
    }
}

/// Refiners of one uncoarsening pass; constructed per pipeline run.
struct RefinerSet<H: HypergraphOps> {
    label_propagation: Option<LabelPropagationRefiner>,
    fm: Option<FmRefiner>,
    flow: Option<Box<dyn Refiner<H> + Send>>,
    objective: crate::context::Objective,
    epsilon: f64,
    l_max: Vec<i64>,
}

impl<H: HypergraphOps> RefinerSet<H> {
    fn build(ctx: &Context, total_weight: i64) -> Self {
        let k = ctx.partition.k as usize;
        let l_max = metrics::max_block_weights(total_weight, k, ctx.partition.epsilon);
        Self {
            label_propagation: ctx.refinement.label_propagation.enabled.then(|| {
                LabelPropagationRefiner::new(
                    ctx.refinement.label_propagation.clone(),
                    ctx.partition.objective,
                    l_max.clone(),
                )
            }),
            fm: ctx.refinement.fm.enabled.then(|| {
                FmRefiner::new(
                    ctx.refinement.fm.clone(),
                    ctx.partition.objective,
                    l_max.clone(),
                )
            }),
            flow: create_flow_refiner(&ctx.refinement.flow),
            objective: ctx.partition.objective,
            epsilon: ctx.partition.epsilon,
            l_max,
        }
    }

    /// Run every non-identity refiner once on the current level, then repair
    /// balance if the level is infeasible (coarse granularity can make the
    /// projected partition unavoidably overweight).
    fn refine(
        &mut self,
        phg: &PartitionedHypergraph<H>,
        gain_cache: &GainCache,
        nodes: &[NodeId],
        m: &mut Metrics,
        rt: &Runtime,
    ) {
        if let Some(lp) = &mut self.label_propagation {
            lp.initialize(phg, gain_cache);
            lp.refine(phg, gain_cache, nodes, m, rt, None);
        }
        if let Some(fm) = &mut self.fm {
            fm.initialize(phg, gain_cache);
            fm.refine(phg, gain_cache, nodes, m, rt, None);
        }
        if let Some(flow) = &mut self.flow {
            flow.initialize(phg, gain_cache);
            flow.refine(phg, gain_cache, nodes, m, rt, None);
        }
        if metrics::imbalance(phg) > self.epsilon {
            m.objective +=
                rebalancer::rebalance(phg, gain_cache, self.objective, &self.l_max);
            m.imbalance = metrics::imbalance(phg);
        }
    }
}

/// Seed the coarsest partition: from community ids in a V-cycle, from the
/// flat pool otherwise.
fn initial_partition<H: HypergraphOps>(
    phg: &PartitionedHypergraph<H>,
    ctx: &Context,
    rt: &Runtime,
    vcycle: bool,
) {
    if vcycle {
        let hg = phg.hypergraph();
        hg.par_nodes().for_each(|v| {
            let block = hg.community(v).expect("v-cycle requires community ids");
            debug_assert!((block as usize) < phg.k());
            phg.set_only_node_part(v, block);
        });
        phg.initialize_partition();
    } else {
        pool_initial_partition(phg, ctx, rt);
    }
}

fn multilevel_pipeline(
    hg: Hypergraph,
    ctx: &Context,
    rt: &Runtime,
    vcycle: bool,
) -> (Hypergraph, Vec<PartitionId>) {
    let k = ctx.partition.k as usize;
    let mut stack: Vec<Level> = clustering::coarsen(&hg, ctx, rt);
    debug!(
        "coarsening: {} levels, coarsest has {} nodes",
        stack.len(),
        stack.last().map_or(hg.num_nodes(), |l| l.hg.num_nodes())
    );

    let mut gain_cache = GainCache::new(
        ctx.partition.objective,
        ctx.refinement.fm.high_degree_threshold,
    );
    let mut refiners: RefinerSet<Hypergraph> = RefinerSet::build(ctx, hg.total_node_weight());

    let mut original = Some(hg);
    let (coarsest, mut pending_mapping) = match stack.pop() {
        Some(Level { hg, mapping }) => (hg, Some(mapping)),
        None => (original.take().expect("original present"), None),
    };

    let mut phg = PartitionedHypergraph::new(k, coarsest);
    initial_partition(&phg, ctx, rt, vcycle);
    gain_cache.initialize(&phg);
    let mut m = Metrics {
        objective: metrics::objective(&phg, ctx.partition.objective),
        imbalance: metrics::imbalance(&phg),
    };
    debug!("initial partition: objective {}", m.objective);
    refiners.refine(&phg, &gain_cache, &[], &mut m, rt);

    // Project level by level down to the original hypergraph.
    while let Some(mapping) = pending_mapping.take() {
        let (finer, next_mapping) = match stack.pop() {
            Some(level) => (level.hg, Some(level.mapping)),
            None => (original.take().expect("original present"), None),
        };
        let finer_phg = PartitionedHypergraph::new(k, finer);
        finer_phg.hypergraph().par_nodes().for_each(|v| {
            finer_phg.set_only_node_part(v, phg.part_id(mapping[v as usize]));
        });
        finer_phg.initialize_partition();
        phg = finer_phg;
        pending_mapping = next_mapping;

        gain_cache.initialize(&phg);
        refiners.refine(&phg, &gain_cache, &[], &mut m, rt);
        debug!(
            "level with {} nodes refined: objective {}",
            phg.hypergraph().num_nodes(),
            m.objective
        );
    }

    gain_cache.delete();
    let (hg, part) = phg.into_parts();
    (hg, part)
}

fn nlevel_pipeline(
    hg: Hypergraph,
    ctx: &Context,
    rt: &Runtime,
    vcycle: bool,
) -> (Hypergraph, Vec<PartitionId>) {
    let k = ctx.partition.k as usize;
    let NLevelHierarchy { dhg, mementos } = nlevel::coarsen_nlevel(&hg, ctx, rt);
    debug!(
        "n-level coarsening: {} contractions, {} nodes left",
        mementos.len(),
        dhg.num_enabled_nodes()
    );

    let mut gain_cache = GainCache::new(
        ctx.partition.objective,
        ctx.refinement.fm.high_degree_threshold,
    );
    let mut refiners: RefinerSet<DynamicHypergraph> = RefinerSet::build(ctx, hg.total_node_weight());
    // Localized batch refinement runs one FM round per batch.
    let mut batch_fm = ctx.refinement.fm.enabled.then(|| {
        let mut cfg = ctx.refinement.fm.clone();
        cfg.max_rounds = 1;
        FmRefiner::new(
            cfg,
            ctx.partition.objective,
            metrics::max_block_weights(hg.total_node_weight(), k, ctx.partition.epsilon),
        )
    });

    let mut phg = PartitionedHypergraph::new(k, dhg);
    initial_partition(&phg, ctx, rt, vcycle);
    gain_cache.initialize(&phg);
    let mut m = Metrics {
        objective: metrics::objective(&phg, ctx.partition.objective),
        imbalance: metrics::imbalance(&phg),
    };
    refiners.refine(&phg, &gain_cache, &[], &mut m, rt);

    for batch in nlevel::uncontraction_batches(&mementos, ctx.coarsening.uncontraction_batch_size)
    {
        // Newest contraction first within the batch.
        for memento in batch.iter().rev() {
            phg.uncontract(memento);
        }
        for v in touched_nodes(&phg, batch) {
            gain_cache.recompute_node(&phg, v);
        }
        let seeds = nlevel::batch_nodes(batch);
        if let Some(fm) = &mut batch_fm {
            fm.initialize(&phg, &gain_cache);
            fm.refine(&phg, &gain_cache, &seeds, &mut m, rt, None);
        }
    }

    // A final full pass on the uncontracted hypergraph.
    gain_cache.initialize(&phg);
    refiners.refine(&phg, &gain_cache, &[], &mut m, rt);
    gain_cache.delete();

    let part = phg.part_snapshot();
    (hg, part)
}

/// Vertices whose cached gain terms a batch of uncontractions invalidates:
/// the contraction pairs plus, for the cut objective's size thresholds, all
/// pins of hyperedges whose size changed.
fn touched_nodes(
    phg: &PartitionedHypergraph<DynamicHypergraph>,
    batch: &[ContractionMemento],
) -> Vec<NodeId> {
    let mut nodes: Vec<NodeId> = Vec::new();
    for m in batch {
        nodes.push(m.u);
        nodes.push(m.v);
        for &e in &m.removed_pin_edges {
            nodes.extend_from_slice(phg.hypergraph().pins(e));
        }
    }
    nodes.sort_unstable();
    nodes.dedup();
    nodes
}
