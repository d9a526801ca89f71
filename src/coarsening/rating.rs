//! Heavy-edge rating of contraction partners.
//!
//! `score(u) = Σ_{e ∋ v,u} w(e) / (|e| − 1)`, optionally divided by
//! `w(u)·w(v)` for weight normalization. Ties are broken by a seeded
//! permutation rank in deterministic mode and by the worker's RNG otherwise.

use rand::Rng;

use crate::context::CoarseningConfig;
use crate::datastructures::sparse_map::SparseMap;
use crate::datastructures::{HypergraphOps, NodeId, NodeWeight};
use crate::runtime::with_worker_rng;

/// Tie-breaking policy for equal ratings.
pub enum TieBreak<'a> {
    /// Prefer the smaller seeded permutation rank.
    PermutationRank(&'a [u32]),
    /// Random coin from the worker's RNG.
    Random,
}

/// Find the best admissible contraction partner of `v`, or `None` if no
/// neighbor passes `admissible`.
pub fn best_partner<H: HypergraphOps>(
    hg: &H,
    v: NodeId,
    cfg: &CoarseningConfig,
    max_node_weight: NodeWeight,
    tie_break: &TieBreak<'_>,
    scratch: &mut SparseMap<f64>,
) -> Option<NodeId> {
    scratch.clear();
    for &e in hg.incident_edges(v) {
        let size = hg.edge_size(e);
        if size < 2 || size > cfg.rating_max_edge_size {
            continue;
        }
        let score = hg.edge_weight(e) as f64 / (size - 1) as f64;
        for &u in hg.pins(e) {
            if u != v && hg.is_node_enabled(u) {
                *scratch.get_mut(u) += score;
            }
        }
    }

    let wv = hg.node_weight(v);
    let mut best: Option<NodeId> = None;
    let mut best_score = 0.0f64;
    for &u in scratch.keys() {
        if !admissible(hg, v, u, wv, max_node_weight) {
            continue;
        }
        let mut score = *scratch.get(u);
        if cfg.normalize_by_weight {
            score /= (wv.max(1) * hg.node_weight(u).max(1)) as f64;
        }
        let better = match best {
            None => true,
            Some(b) => {
                if (score - best_score).abs() <= f64::EPSILON * best_score.abs() {
                    match tie_break {
                        TieBreak::PermutationRank(ranks) => {
                            ranks[u as usize] < ranks[b as usize]
                        }
                        TieBreak::Random => with_worker_rng(|rng| rng.gen_bool(0.5)),
                    }
                } else {
                    score > best_score
                }
            }
        };
        if better {
            best = Some(u);
            best_score = score;
        }
    }
    best
}

/// Contraction admissibility: combined weight within bounds, equal
/// communities, and fixed vertices only merge with free vertices or the same
/// block.
fn admissible<H: HypergraphOps>(
    hg: &H,
    v: NodeId,
    u: NodeId,
    wv: NodeWeight,
    max_node_weight: NodeWeight,
) -> bool {
    if wv + hg.node_weight(u) > max_node_weight {
        return false;
    }
    if let (Some(cv), Some(cu)) = (hg.community(v), hg.community(u)) {
        if cv != cu {
            return false;
        }
    }
    if let (Some(fv), Some(fu)) = (hg.fixed_block(v), hg.fixed_block(u)) {
        if fv != fu {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::hypergraph::HypergraphBuilder;
    use crate::datastructures::INVALID_PARTITION;

    fn config() -> CoarseningConfig {
        CoarseningConfig {
            normalize_by_weight: false,
            ..CoarseningConfig::default()
        }
    }

    #[test]
    fn prefers_heavier_shared_edges() {
        // v=0 shares a weight-5 pair edge with 1 and a weight-1 pair edge
        // with 2.
        let hg = HypergraphBuilder::new(3)
            .add_edge(vec![0, 1], 5)
            .add_edge(vec![0, 2], 1)
            .build();
        let ranks = vec![0, 1, 2];
        let mut scratch = SparseMap::new(3);
        let best = best_partner(
            &hg,
            0,
            &config(),
            NodeWeight::MAX,
            &TieBreak::PermutationRank(&ranks),
            &mut scratch,
        );
        assert_eq!(best, Some(1));
    }

    #[test]
    fn large_edges_score_less_per_pin() {
        // A pair edge beats an equally weighted triple edge: w/(2−1) > w/(3−1).
        let hg = HypergraphBuilder::new(4)
            .add_edge(vec![0, 1], 2)
            .add_edge(vec![0, 2, 3], 2)
            .build();
        let ranks = vec![0, 1, 2, 3];
        let mut scratch = SparseMap::new(4);
        let best = best_partner(
            &hg,
            0,
            &config(),
            NodeWeight::MAX,
            &TieBreak::PermutationRank(&ranks),
            &mut scratch,
        );
        assert_eq!(best, Some(1));
    }

    #[test]
    fn weight_bound_excludes_partners() {
        let hg = HypergraphBuilder::new(2)
            .node_weights(vec![3, 4])
            .add_edge(vec![0, 1], 1)
            .build();
        let ranks = vec![0, 1];
        let mut scratch = SparseMap::new(2);
        let best = best_partner(
            &hg,
            0,
            &config(),
            6,
            &TieBreak::PermutationRank(&ranks),
            &mut scratch,
        );
        assert_eq!(best, None);
    }

    #[test]
    fn communities_restrict_partners() {
        let mut hg = HypergraphBuilder::new(3)
            .add_edge(vec![0, 1], 10)
            .add_edge(vec![0, 2], 1)
            .build();
        hg.set_communities(vec![0, 1, 0]);
        let ranks = vec![0, 1, 2];
        let mut scratch = SparseMap::new(3);
        let best = best_partner(
            &hg,
            0,
            &config(),
            NodeWeight::MAX,
            &TieBreak::PermutationRank(&ranks),
            &mut scratch,
        );
        // 1 scores higher but sits in another community.
        assert_eq!(best, Some(2));
    }

    #[test]
    fn fixed_blocks_must_agree() {
        let mut hg = HypergraphBuilder::new(3)
            .add_edge(vec![0, 1], 10)
            .add_edge(vec![0, 2], 1)
            .build();
        hg.set_fixed_blocks(vec![0, 1, INVALID_PARTITION]);
        let ranks = vec![0, 1, 2];
        let mut scratch = SparseMap::new(3);
        let best = best_partner(
            &hg,
            0,
            &config(),
            NodeWeight::MAX,
            &TieBreak::PermutationRank(&ranks),
            &mut scratch,
        );
        // A free vertex may merge with a fixed one; two differently fixed may
        // not.
        assert_eq!(best, Some(2));
    }
}
