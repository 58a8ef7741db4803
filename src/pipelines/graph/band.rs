//! The band function: which vertices the next block computes.
//!
//! Seeds with every vertex of the previous block whose minimum is within
//! `bandwidth` of the block minimum, then expands forward over out-edges by
//! uniform-cost search. A neighbor's priority is the previous end score's
//! distance from the minimum plus the cumulative node lengths walked;
//! anything within `bandwidth + 64` gets included. Deterministic, and
//! monotone in `bandwidth`.
//!
//! Expansion bails out once the included base count reaches the alternate
//! method cutoff: a band that large is computed bit-parallel anyway, and the
//! bit-parallel method confirms cells outside the seed set on its own.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::core::word_slice::{Score, WORD_SIZE};
use crate::graph::AlignmentGraph;
use crate::pipelines::graph::dp_table::SqrtSlice;

pub fn project_forward_from_min_score(
    graph: &AlignmentGraph,
    min_score: Score,
    previous_slice: &SqrtSlice,
    bandwidth: usize,
    alternate_method_cutoff: usize,
) -> Vec<usize> {
    let expand_width = (bandwidth + WORD_SIZE) as Score;
    let mut distances: HashMap<usize, Score> = HashMap::new();
    let mut result: Vec<usize> = Vec::new();
    let mut queue: BinaryHeap<Reverse<(Score, usize)>> = BinaryHeap::new();
    let mut current_width = 0usize;

    for &node in previous_slice.scores.order() {
        if previous_slice.scores.min_score(node) <= min_score + bandwidth as Score {
            distances.insert(node, 0);
            result.push(node);
            current_width += graph.node_length(node);
            if current_width >= alternate_method_cutoff {
                return result;
            }
            let end_score = previous_slice
                .scores
                .node(node)
                .last()
                .expect("empty node slice")
                .score_end;
            debug_assert!(end_score >= min_score);
            if end_score > min_score + expand_width {
                continue;
            }
            for &neighbor in graph.out_neighbors(node) {
                queue.push(Reverse((end_score - min_score + 1, neighbor)));
            }
        }
    }
    debug_assert!(!distances.is_empty());

    while let Some(&Reverse((priority, _))) = queue.peek() {
        if priority > expand_width {
            break;
        }
        let Reverse((priority, node)) = queue.pop().unwrap();
        if let Some(&known) = distances.get(&node) {
            if known <= priority {
                continue;
            }
        }
        current_width += graph.node_length(node);
        distances.insert(node, priority);
        result.push(node);
        if current_width >= alternate_method_cutoff {
            return result;
        }
        let size = graph.node_length(node) as Score;
        for &neighbor in graph.out_neighbors(node) {
            queue.push(Reverse((priority + size, neighbor)));
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::correctness::AlignmentCorrectnessEstimationState;
    use crate::core::node_slice::{SqrtScores, TinySlice};
    use crate::core::word_slice::WORD_SIZE;

    fn slice_with(nodes: &[(usize, usize, Score)]) -> SqrtSlice {
        // (node, length, end score); per-node min = end score - 63
        let mut scores = SqrtScores::new();
        for &(node, len, end) in nodes {
            scores.add_node(
                node,
                end - WORD_SIZE as Score + 1,
                (0..len).map(|_| TinySlice {
                    score_end: end,
                    last_vp: false,
                    last_vn: false,
                    score_end_exists: true,
                }),
            );
        }
        SqrtSlice {
            j: 0,
            min_score: nodes
                .iter()
                .map(|&(_, _, end)| end - WORD_SIZE as Score + 1)
                .min()
                .unwrap(),
            min_score_index: Vec::new(),
            scores,
            correctness: AlignmentCorrectnessEstimationState::new(),
            cells_processed: 0,
            num_cells: nodes.iter().map(|&(_, len, _)| len).sum(),
        }
    }

    fn chain_graph(lengths: &[usize]) -> (AlignmentGraph, Vec<usize>) {
        let mut g = AlignmentGraph::new();
        for (i, &len) in lengths.iter().enumerate() {
            g.add_node(i as u64 + 1, &vec![b'A'; len]).unwrap();
        }
        for i in 0..lengths.len() - 1 {
            g.add_edge(i as u64 + 1, false, i as u64 + 2, false).unwrap();
        }
        g.finalize();
        let vertices = (0..lengths.len())
            .map(|i| g.lookup((i as u64 + 1) * 2).unwrap())
            .collect();
        (g, vertices)
    }

    #[test]
    fn test_projection_reaches_within_priority() {
        let (g, v) = chain_graph(&[10, 10, 10, 200]);
        let previous = slice_with(&[(v[0], 10, 63)]);
        let band = project_forward_from_min_score(&g, previous.min_score, &previous, 4, 100_000);
        // seed plus the neighbor whose priority fits inside bandwidth + 64
        assert!(band.contains(&v[0]));
        assert!(band.contains(&v[1]));
        assert!(!band.contains(&v[3]));
    }

    #[test]
    fn test_larger_bandwidth_never_shrinks_band() {
        let (g, v) = chain_graph(&[5, 30, 30, 30, 30, 30]);
        let previous = slice_with(&[(v[0], 5, 63)]);
        let narrow = project_forward_from_min_score(&g, previous.min_score, &previous, 2, 100_000);
        let wide = project_forward_from_min_score(&g, previous.min_score, &previous, 40, 100_000);
        for node in &narrow {
            assert!(wide.contains(node));
        }
        assert!(wide.len() >= narrow.len());
    }

    #[test]
    fn test_bails_out_at_cutoff() {
        let (g, v) = chain_graph(&[50, 50, 50, 50]);
        let previous = slice_with(&[(v[0], 50, 63)]);
        let band = project_forward_from_min_score(&g, previous.min_score, &previous, 100, 120);
        let total: usize = band.iter().map(|&n| g.node_length(n)).sum();
        assert!(total >= 120);
        assert!(band.len() < 4);
    }
}
