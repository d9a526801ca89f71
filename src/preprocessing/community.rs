//! Parallel Louvain local moving for community detection.
//!
//! ## Objective (modularity with resolution γ)
//!
//! For a vertex `u` with volume `vol(u)` in cluster `a`, moving to cluster
//! `c` changes modularity proportionally to
//!
//!     Δ(u→c) = (w_{uc} − w_{u,a\{u}}) − γ·vol(u)·(V_c − [c=a]·vol(u)) / totalVolume
//!
//! where `w_{uc}` is the weighted adjacency between `u` and cluster `c` and
//! `V_c` the cluster volume. A move is applied when the best target beats
//! staying.
//!
//! Two round modes:
//! - **Nondeterministic**: vertices are shuffled and moved concurrently with
//!   atomic cluster-volume updates (floating-point non-associativity is the
//!   accepted source of nondeterminism).
//! - **Deterministic**: a round is split into sub-rounds over hashed buckets;
//!   vertices first *propose* against a volume snapshot, then all proposals
//!   are applied and the volumes are recomputed, never incremented.
//!
//! Levels repeat on the contracted clustering until it stabilizes, as in the
//! classic Louvain scheme.

use log::debug;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use super::graph::Graph;
use crate::context::CommunityDetectionConfig;
use crate::datastructures::sparse_map::SparseMap;
use crate::datastructures::{CommunityId, HypergraphOps, NodeId};
use crate::runtime::{seeded_permutation, AtomicF64, Runtime};

/// Detect communities of the hypergraph vertices. The returned ids are dense.
pub fn detect_communities<H: HypergraphOps>(
    hg: &H,
    cfg: &CommunityDetectionConfig,
    rt: &Runtime,
) -> Vec<CommunityId> {
    let mut graph = Graph::from_hypergraph(hg, cfg.clique_expansion_threshold);
    let n_hg = hg.num_nodes();

    // communities[v] is the coarse node currently representing v.
    let mut representative: Vec<u32> = (0..graph.num_nodes() as u32).collect();

    for level in 0..cfg.max_levels {
        let clustering = local_moving(&graph, cfg, rt, level as u64);
        let num_clusters = {
            let mut ids = clustering.clone();
            ids.sort_unstable();
            ids.dedup();
            ids.len()
        };
        debug!(
            "louvain level {level}: {} nodes -> {} clusters",
            graph.num_nodes(),
            num_clusters
        );
        if num_clusters == graph.num_nodes() {
            break;
        }
        let (coarse, remap) = graph.contract(&clustering);
        for r in representative.iter_mut() {
            *r = remap[clustering[*r as usize] as usize];
        }
        graph = coarse;
    }

    // Compact ids over the hypergraph vertices only.
    let mut dense = vec![u32::MAX; graph.num_nodes()];
    let mut next = 0u32;
    let mut communities = Vec::with_capacity(n_hg);
    for v in 0..n_hg {
        let c = representative[v] as usize;
        if dense[c] == u32::MAX {
            dense[c] = next;
            next += 1;
        }
        communities.push(dense[c]);
    }
    communities
}

/// One Louvain level: repeated local-moving rounds on `graph`. Returns the
/// clustering (cluster id per graph node).
pub fn local_moving(
    graph: &Graph,
    cfg: &CommunityDetectionConfig,
    rt: &Runtime,
    level_salt: u64,
) -> Vec<u32> {
    let n = graph.num_nodes();
    let clusters: Vec<AtomicU32> = (0..n as u32).map(AtomicU32::new).collect();
    if graph.num_arcs() == 0 {
        return clusters.into_iter().map(AtomicU32::into_inner).collect();
    }

    let volumes: Vec<AtomicF64> = (0..n)
        .map(|v| AtomicF64::new(graph.node_volume(v as NodeId)))
        .collect();

    let mut round = 0;
    loop {
        let salt = rt.salt("louvain-round", level_salt << 32 | round as u64);
        let moved = if rt.deterministic() {
            synchronous_round(graph, cfg, &clusters, salt)
        } else {
            nondeterministic_round(graph, cfg, &clusters, &volumes, salt)
        };
        round += 1;
        debug!("louvain round {round}: {moved} moves");
        if moved < (cfg.min_vertex_move_fraction * n as f64) as usize
            || round >= cfg.max_pass_iterations
        {
            break;
        }
    }
    clusters.into_iter().map(AtomicU32::into_inner).collect()
}

/// Best cluster for `u` under the modularity gain, evaluated against the
/// provided cluster volumes. Ties prefer the smaller cluster id so proposal
/// rounds stay deterministic.
fn best_cluster(
    graph: &Graph,
    u: NodeId,
    clusters: &[AtomicU32],
    volume_of: impl Fn(u32) -> f64,
    resolution: f64,
    scratch: &mut SparseMap<f64>,
) -> u32 {
    let from = clusters[u as usize].load(Ordering::Relaxed);
    scratch.clear();
    for arc in graph.arcs_of(u) {
        let c = clusters[arc.head as usize].load(Ordering::Relaxed);
        *scratch.get_mut(c) += arc.weight;
    }
    let vol_u = graph.node_volume(u);
    let norm = resolution * vol_u / graph.total_volume();

    let score = |c: u32| -> f64 {
        let vol_c = volume_of(c) - if c == from { vol_u } else { 0.0 };
        *scratch.get(c) - norm * vol_c
    };

    let mut best = from;
    let mut best_score = score(from);
    for &c in scratch.keys() {
        if c == from {
            continue;
        }
        let s = score(c);
        if s > best_score + 1e-12 || (s > best_score - 1e-12 && c < best) {
            best = c;
            best_score = s;
        }
    }
    best
}

fn nondeterministic_round(
    graph: &Graph,
    cfg: &CommunityDetectionConfig,
    clusters: &[AtomicU32],
    volumes: &[AtomicF64],
    salt: u64,
) -> usize {
    let n = graph.num_nodes();
    let order = seeded_permutation(n, salt);
    let moved = AtomicUsize::new(0);
    order
        .par_iter()
        .for_each_init(
            || SparseMap::<f64>::new(n),
            |scratch, &u| {
                let from = clusters[u as usize].load(Ordering::Relaxed);
                let best = best_cluster(
                    graph,
                    u,
                    clusters,
                    |c| volumes[c as usize].load(),
                    cfg.resolution,
                    scratch,
                );
                if best != from {
                    let vol_u = graph.node_volume(u);
                    volumes[best as usize].fetch_add(vol_u);
                    volumes[from as usize].fetch_add(-vol_u);
                    clusters[u as usize].store(best, Ordering::Relaxed);
                    moved.fetch_add(1, Ordering::Relaxed);
                }
            },
        );
    moved.load(Ordering::Relaxed)
}

/// Propose-then-apply sub-rounds; volumes are recomputed per sub-round so no
/// non-associative accumulation is on the hot path.
fn synchronous_round(
    graph: &Graph,
    cfg: &CommunityDetectionConfig,
    clusters: &[AtomicU32],
    salt: u64,
) -> usize {
    const NUM_SUB_ROUNDS: usize = 16;
    let n = graph.num_nodes();
    let order = seeded_permutation(n, salt);
    let mut moved = 0;

    for sub_round in 0..NUM_SUB_ROUNDS {
        let lo = sub_round * n / NUM_SUB_ROUNDS;
        let hi = (sub_round + 1) * n / NUM_SUB_ROUNDS;
        if lo == hi {
            continue;
        }
        let snapshot = sequential_cluster_volumes(graph, clusters);

        let proposals: Vec<(u32, u32)> = order[lo..hi]
            .par_iter()
            .map_init(
                || SparseMap::<f64>::new(n),
                |scratch, &u| {
                    let best = best_cluster(
                        graph,
                        u,
                        clusters,
                        |c| snapshot[c as usize],
                        cfg.resolution,
                        scratch,
                    );
                    (u, best)
                },
            )
            .collect();

        for (u, best) in proposals {
            if clusters[u as usize].load(Ordering::Relaxed) != best {
                clusters[u as usize].store(best, Ordering::Relaxed);
                moved += 1;
            }
        }
    }
    moved
}

fn sequential_cluster_volumes(graph: &Graph, clusters: &[AtomicU32]) -> Vec<f64> {
    let mut volumes = vec![0.0; graph.num_nodes()];
    for u in 0..graph.num_nodes() {
        let c = clusters[u].load(Ordering::Relaxed);
        volumes[c as usize] += graph.node_volume(u as NodeId);
    }
    volumes
}

/// Modularity of a clustering, for tests and debug output.
pub fn modularity(graph: &Graph, clustering: &[u32]) -> f64 {
    let n = graph.num_nodes();
    let mut internal = vec![0.0f64; n];
    let mut volume = vec![0.0f64; n];
    for u in 0..n {
        let cu = clustering[u] as usize;
        volume[cu] += graph.node_volume(u as NodeId);
        let mut external = 0.0;
        let mut arc_volume = 0.0;
        for arc in graph.arcs_of(u as NodeId) {
            arc_volume += arc.weight;
            if clustering[arc.head as usize] as usize != cu {
                external += arc.weight;
            }
        }
        // Self-loop weight folded into the volume by contraction.
        internal[cu] += graph.node_volume(u as NodeId) - arc_volume + (arc_volume - external);
    }
    let total = graph.total_volume();
    (0..n)
        .map(|c| {
            if volume[c] > 0.0 {
                internal[c] / total - (volume[c] / total).powi(2)
            } else {
                0.0
            }
        })
        .sum()
}
