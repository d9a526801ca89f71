//! End-to-end partitioning scenarios through the public API.

use hypermill::api::{partition, HypergraphInput};
use hypermill::context::{Context, ContextParameter, Objective, Preset};
use hypermill::datastructures::partitioned::PartitionedHypergraph;
use hypermill::datastructures::NodeId;
use hypermill::error::DebugInvariants;
use hypermill::metrics;

/// Cycle of `n` unit-weight vertices as 2-pin hyperedges.
fn cycle_input(n: usize) -> (Vec<usize>, Vec<NodeId>) {
    let offsets = (0..=n).map(|i| 2 * i).collect();
    let pins = (0..n)
        .flat_map(|i| [i as NodeId, ((i + 1) % n) as NodeId])
        .collect();
    (offsets, pins)
}

fn input<'a>(n: usize, offsets: &'a [usize], pins: &'a [NodeId]) -> HypergraphInput<'a> {
    HypergraphInput {
        num_nodes: n,
        num_edges: offsets.len() - 1,
        edge_offsets: offsets,
        edge_pins: pins,
        node_weights: None,
        edge_weights: None,
    }
}

#[test]
fn hundred_vertex_cycle_bisection_is_optimal() {
    let (offsets, pins) = cycle_input(100);
    let ctx = Context::new();
    let out = partition(&ctx, &input(100, &offsets, &pins), 2, 0.03, 7).unwrap();
    assert_eq!(out.objective, 2, "every minimum bisection of a cycle cuts 2");

    // Rebuild the overlay and re-check feasibility and invariants.
    let hg = hypermill::datastructures::hypergraph::HypergraphBuilder::from_offset_format(
        100, 100, &offsets, &pins, None, None,
    )
    .unwrap()
    .build();
    let phg = PartitionedHypergraph::new(2, hg);
    phg.apply_partition(&out.partition);
    phg.validate_invariants().unwrap();
    assert!(metrics::imbalance(&phg) <= 0.03 + 1e-9);
    assert_eq!(metrics::cut(&phg), 2);
}

#[test]
fn deterministic_preset_is_reproducible_across_thread_counts() {
    // The 7-vertex instance of the datastructure tests, partitioned with the
    // deterministic preset: identical output for every thread count.
    let offsets = vec![0, 2, 6, 9, 12];
    let pins: Vec<NodeId> = vec![0, 2, 0, 1, 3, 4, 3, 4, 6, 2, 5, 6];

    let run = |threads: usize| {
        hypermill::runtime::build_worker_pool(Some(threads)).install(|| {
            let mut ctx = Context::new();
            ctx.load_preset(Preset::Deterministic);
            partition(&ctx, &input(7, &offsets, &pins), 3, 0.34, 42).unwrap()
        })
    };

    let baseline = run(1);
    for threads in [2, 4, 8] {
        let out = run(threads);
        assert_eq!(
            out.partition, baseline.partition,
            "deterministic partition differs on {threads} threads"
        );
        assert_eq!(out.objective, baseline.objective);
    }
}

#[test]
fn deterministic_preset_is_reproducible_across_runs() {
    let (offsets, pins) = cycle_input(64);
    let mut ctx = Context::new();
    ctx.load_preset(Preset::Deterministic);
    let a = partition(&ctx, &input(64, &offsets, &pins), 4, 0.05, 123).unwrap();
    let b = partition(&ctx, &input(64, &offsets, &pins), 4, 0.05, 123).unwrap();
    assert_eq!(a.partition, b.partition);
    assert_eq!(a.objective, b.objective);
}

#[test]
fn presets_and_parameters_cover_the_codes() {
    let mut ctx = Context::new();
    assert_eq!(ctx.set_parameter(ContextParameter::NumBlocks, "4").code(), 0);
    assert_eq!(ctx.set_parameter(ContextParameter::NumBlocks, "x").code(), 2);
    assert_eq!(ctx.set_parameter(ContextParameter::Objective, "cut").code(), 0);
    assert_eq!(ctx.set_parameter(ContextParameter::Objective, "bad").code(), 3);
    assert_eq!(ctx.set_parameter_by_name("unknown", "1").code(), 1);
    assert_eq!(ctx.partition.objective, Objective::Cut);

    for preset in [Preset::Deterministic, Preset::Speed, Preset::HighQuality] {
        let mut c = Context::new();
        c.load_preset(preset);
        let (offsets, pins) = cycle_input(40);
        let out = partition(&c, &input(40, &offsets, &pins), 2, 0.05, 5).unwrap();
        assert_eq!(out.partition.len(), 40);
        assert!(out.objective >= 2);
    }
}

#[test]
fn cut_and_km1_objectives_both_work_on_hypergraphs() {
    // Three 4-pin hyperedges overlapping pairwise.
    let offsets = vec![0, 4, 8, 12];
    let pins: Vec<NodeId> = vec![0, 1, 2, 3, 2, 3, 4, 5, 4, 5, 6, 7];
    for objective in ["km1", "cut"] {
        let mut ctx = Context::new();
        assert_eq!(
            ctx.set_parameter(ContextParameter::Objective, objective).code(),
            0
        );
        // ε = 0.3 leaves the refiners room to stage swaps as single moves.
        let out = partition(&ctx, &input(8, &offsets, &pins), 2, 0.3, 9).unwrap();
        // Splitting between the overlapping 4-pin edges cuts exactly one.
        assert_eq!(out.objective, 1, "{objective}");
    }
}

#[test]
fn vcycles_keep_feasibility() {
    let (offsets, pins) = cycle_input(80);
    let mut ctx = Context::new();
    assert_eq!(ctx.set_parameter(ContextParameter::NumVCycles, "2").code(), 0);
    let out = partition(&ctx, &input(80, &offsets, &pins), 2, 0.03, 31).unwrap();
    assert_eq!(out.objective, 2);

    let hg = hypermill::datastructures::hypergraph::HypergraphBuilder::from_offset_format(
        80, 80, &offsets, &pins, None, None,
    )
    .unwrap()
    .build();
    let phg = PartitionedHypergraph::new(2, hg);
    phg.apply_partition(&out.partition);
    assert!(metrics::imbalance(&phg) <= 0.03 + 1e-9);
}

#[test]
fn weighted_vertices_respect_the_balance_limit() {
    // A clique-ish hypergraph with one heavy vertex.
    let offsets = vec![0, 3, 6, 9];
    let pins: Vec<NodeId> = vec![0, 1, 2, 2, 3, 4, 4, 5, 0];
    let node_weights: Vec<i64> = vec![4, 1, 1, 1, 1, 1];
    let inp = HypergraphInput {
        num_nodes: 6,
        num_edges: 3,
        edge_offsets: &offsets,
        edge_pins: &pins,
        node_weights: Some(&node_weights),
        edge_weights: None,
    };
    let ctx = Context::new();
    let out = partition(&ctx, &inp, 2, 0.25, 3).unwrap();
    let l_max = metrics::max_block_weights(9, 2, 0.25);
    let mut weights = [0i64; 2];
    for (v, &b) in out.partition.iter().enumerate() {
        weights[b as usize] += node_weights[v];
    }
    assert!(weights[0] <= l_max[0] && weights[1] <= l_max[1]);
}
