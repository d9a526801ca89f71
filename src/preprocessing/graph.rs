//! Weighted graph derived from a hypergraph by star/clique expansion.
//!
//! Hyperedges with at most `clique_threshold` pins become cliques over their
//! pins; larger hyperedges become stars around an auxiliary center vertex.
//! Both use arc weight `w(e)/(|e|−1)`. Single-pin hyperedges contribute
//! nothing. The result is the undirected multigraph Louvain operates on;
//! node *volumes* are weighted degrees and stay fixed per graph.

use rayon::prelude::*;

use crate::datastructures::{HypergraphOps, NodeId};

/// One directed arc of the expansion graph.
#[derive(Debug, Clone, Copy)]
pub struct Arc {
    pub head: NodeId,
    pub weight: f64,
}

/// CSR graph with f64 arc weights and per-node volumes.
#[derive(Debug, Clone)]
pub struct Graph {
    offsets: Vec<u32>,
    arcs: Vec<Arc>,
    volumes: Vec<f64>,
    total_volume: f64,
    /// Leading nodes correspond to hypergraph vertices; the rest are star
    /// centers.
    num_hypergraph_nodes: usize,
}

impl Graph {
    /// Star/clique expansion of `hg`.
    pub fn from_hypergraph<H: HypergraphOps>(hg: &H, clique_threshold: usize) -> Self {
        let n = hg.num_nodes();
        // Star centers for hyperedges above the clique threshold.
        let star_edges: Vec<_> = hg
            .edges()
            .filter(|&e| hg.edge_size(e) > clique_threshold.max(1))
            .collect();
        let num_nodes = n + star_edges.len();
        let mut star_center = vec![u32::MAX; hg.num_edges()];
        for (i, &e) in star_edges.iter().enumerate() {
            star_center[e as usize] = (n + i) as u32;
        }

        // Degree counting pass.
        let mut degrees = vec![0u32; num_nodes];
        for e in hg.edges() {
            let size = hg.edge_size(e);
            if size < 2 {
                continue;
            }
            if star_center[e as usize] == u32::MAX {
                for &p in hg.pins(e) {
                    degrees[p as usize] += (size - 1) as u32;
                }
            } else {
                for &p in hg.pins(e) {
                    degrees[p as usize] += 1;
                }
                degrees[star_center[e as usize] as usize] = size as u32;
            }
        }
        let mut offsets = vec![0u32; num_nodes + 1];
        for v in 0..num_nodes {
            offsets[v + 1] = offsets[v] + degrees[v];
        }

        // Fill pass.
        let mut cursor = offsets.clone();
        let mut arcs = vec![
            Arc {
                head: 0,
                weight: 0.0
            };
            offsets[num_nodes] as usize
        ];
        let mut push = |cursor: &mut [u32], arcs: &mut [Arc], tail: usize, arc: Arc| {
            arcs[cursor[tail] as usize] = arc;
            cursor[tail] += 1;
        };
        for e in hg.edges() {
            let size = hg.edge_size(e);
            if size < 2 {
                continue;
            }
            let w = hg.edge_weight(e) as f64 / (size - 1) as f64;
            let pins = hg.pins(e);
            if star_center[e as usize] == u32::MAX {
                for &p in pins {
                    for &q in pins {
                        if p != q {
                            push(&mut cursor, &mut arcs, p as usize, Arc { head: q, weight: w });
                        }
                    }
                }
            } else {
                let c = star_center[e as usize];
                for &p in pins {
                    push(&mut cursor, &mut arcs, p as usize, Arc { head: c, weight: w });
                    push(&mut cursor, &mut arcs, c as usize, Arc { head: p, weight: w });
                }
            }
        }

        let volumes: Vec<f64> = (0..num_nodes)
            .into_par_iter()
            .map(|v| {
                arcs[offsets[v] as usize..offsets[v + 1] as usize]
                    .iter()
                    .map(|a| a.weight)
                    .sum()
            })
            .collect();
        let total_volume = volumes.iter().sum();

        Self {
            offsets,
            arcs,
            volumes,
            total_volume,
            num_hypergraph_nodes: n,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.volumes.len()
    }

    pub fn num_hypergraph_nodes(&self) -> usize {
        self.num_hypergraph_nodes
    }

    pub fn num_arcs(&self) -> usize {
        self.arcs.len()
    }

    pub fn arcs_of(&self, v: NodeId) -> &[Arc] {
        &self.arcs[self.offsets[v as usize] as usize..self.offsets[v as usize + 1] as usize]
    }

    pub fn degree(&self, v: NodeId) -> usize {
        self.arcs_of(v).len()
    }

    /// Weighted degree (plus any self-loop weight accumulated by
    /// contraction).
    pub fn node_volume(&self, v: NodeId) -> f64 {
        self.volumes[v as usize]
    }

    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    /// Contract the graph according to `clustering` (one cluster id per
    /// node). Returns the coarse graph and the dense remap of cluster ids;
    /// `remap[old_cluster]` is the coarse node. Intra-cluster arc weight is
    /// kept in the coarse node's volume.
    pub fn contract(&self, clustering: &[u32]) -> (Graph, Vec<u32>) {
        let n = self.num_nodes();
        debug_assert_eq!(clustering.len(), n);
        let max_cluster = clustering.iter().copied().max().unwrap_or(0) as usize;
        let mut remap = vec![u32::MAX; max_cluster + 1];
        let mut next = 0u32;
        for v in 0..n {
            let c = clustering[v] as usize;
            if remap[c] == u32::MAX {
                remap[c] = next;
                next += 1;
            }
        }
        let coarse_n = next as usize;

        // Aggregate inter-cluster arcs.
        let mut adjacency: Vec<hashbrown::HashMap<u32, f64>> =
            vec![hashbrown::HashMap::new(); coarse_n];
        let mut volumes = vec![0.0f64; coarse_n];
        for v in 0..n {
            let cv = remap[clustering[v] as usize];
            volumes[cv as usize] += self.node_volume(v as NodeId);
            for arc in self.arcs_of(v as NodeId) {
                let ch = remap[clustering[arc.head as usize] as usize];
                if ch != cv {
                    *adjacency[cv as usize].entry(ch).or_insert(0.0) += arc.weight;
                }
            }
        }

        let mut offsets = vec![0u32; coarse_n + 1];
        for c in 0..coarse_n {
            offsets[c + 1] = offsets[c] + adjacency[c].len() as u32;
        }
        let mut arcs = Vec::with_capacity(offsets[coarse_n] as usize);
        for adj in &adjacency {
            let mut entries: Vec<(u32, f64)> = adj.iter().map(|(&h, &w)| (h, w)).collect();
            entries.sort_unstable_by_key(|&(h, _)| h);
            for (head, weight) in entries {
                arcs.push(Arc { head, weight });
            }
        }

        (
            Graph {
                offsets,
                arcs,
                total_volume: self.total_volume,
                volumes,
                num_hypergraph_nodes: coarse_n,
            },
            remap,
        )
    }
}
