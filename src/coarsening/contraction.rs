//! Build the next-level hypergraph from a clustering.
//!
//! Pins are remapped to cluster representatives, deduplicated within each
//! hyperedge, single-pin results are dropped and identical hyperedges are
//! merged with summed weights. Output ordering is canonical (first occurrence
//! in edge-id order), so the coarse hypergraph is identical for every thread
//! count.

use hashbrown::HashMap;
use rayon::prelude::*;

use crate::datastructures::hypergraph::{Hypergraph, HypergraphBuilder};
use crate::datastructures::{
    CommunityId, HypergraphOps, NodeId, NodeWeight, PartitionId, INVALID_NODE, INVALID_PARTITION,
};

/// Contract `hg` along `cluster`, where `cluster[v]` is the representative
/// vertex of `v`'s cluster (a fixed point: `cluster[r] = r`). Returns the
/// coarse hypergraph and the fine-to-coarse mapping.
pub fn contract(hg: &Hypergraph, cluster: &[NodeId]) -> (Hypergraph, Vec<NodeId>) {
    let n = hg.num_nodes();
    debug_assert_eq!(cluster.len(), n);

    // Dense coarse ids in ascending representative order.
    let mut coarse_id = vec![INVALID_NODE; n];
    let mut num_coarse = 0u32;
    for v in 0..n {
        let r = cluster[v] as usize;
        debug_assert_eq!(cluster[r], r as NodeId, "representatives are fixed points");
        if v == r {
            coarse_id[v] = num_coarse;
            num_coarse += 1;
        }
    }
    let mapping: Vec<NodeId> = (0..n).map(|v| coarse_id[cluster[v] as usize]).collect();

    // Aggregate vertex attributes.
    let mut weights = vec![0 as NodeWeight; num_coarse as usize];
    let mut communities = vec![0 as CommunityId; num_coarse as usize];
    let mut fixed = vec![INVALID_PARTITION as PartitionId; num_coarse as usize];
    let mut has_fixed = false;
    for v in 0..n {
        let c = mapping[v] as usize;
        weights[c] += hg.node_weight(v as NodeId);
        if let Some(community) = hg.community(v as NodeId) {
            communities[c] = community;
        }
        if let Some(block) = hg.fixed_block(v as NodeId) {
            debug_assert!(fixed[c] == INVALID_PARTITION || fixed[c] == block);
            fixed[c] = block;
            has_fixed = true;
        }
    }

    // Remap pins per edge; dedup within the edge; drop shrunken singletons.
    let remapped: Vec<Option<Vec<NodeId>>> = (0..hg.num_edges() as u32)
        .into_par_iter()
        .map(|e| {
            let mut pins: Vec<NodeId> =
                hg.pins(e).iter().map(|&p| mapping[p as usize]).collect();
            pins.sort_unstable();
            pins.dedup();
            (pins.len() >= 2).then_some(pins)
        })
        .collect();

    // Merge identical hyperedges, first occurrence wins the slot.
    let mut merged: HashMap<Vec<NodeId>, usize> = HashMap::new();
    let mut edges: Vec<(Vec<NodeId>, i64)> = Vec::new();
    for (e, pins) in remapped.into_iter().enumerate() {
        let Some(pins) = pins else { continue };
        let w = hg.edge_weight(e as u32);
        match merged.get(&pins) {
            Some(&slot) => edges[slot].1 += w,
            None => {
                merged.insert(pins.clone(), edges.len());
                edges.push((pins, w));
            }
        }
    }

    let mut builder = HypergraphBuilder::new(num_coarse as usize)
        .node_weights(weights)
        .deterministic(true);
    for (pins, w) in edges {
        builder = builder.add_edge(pins, w);
    }
    let mut coarse = builder.build();
    if hg.has_communities() {
        coarse.set_communities(communities);
    }
    if has_fixed {
        coarse.set_fixed_blocks(fixed);
    }
    (coarse, mapping)
}
