//! Cell-by-cell scoring for narrow bands.
//!
//! When the in-band subgraph is small, the component analysis and word
//! arithmetic of the bit-parallel path cost more than they save. This method
//! sweeps the block row by row in score order instead: `calculables[s]`
//! holds the (vertex, base) pairs reachable at `min + s`, each processed
//! cell relaxes its right/down successors, and the block minimum advances by
//! one whenever the zero bucket runs dry at a row boundary.

use crate::core::node_slice::WorkSlice;
use crate::core::word_slice::{Score, WordSlice, WORD_SIZE};
use crate::graph::AlignmentGraph;
use crate::pipelines::graph::dp_table::SqrtSlice;
use crate::pipelines::graph::slice_calc::NodeCalculationResult;
use crate::utils::character_match;

fn set_cell_value(
    graph: &AlignmentGraph,
    slice: &mut WorkSlice,
    node: usize,
    index: usize,
    row: usize,
    value: Score,
    uninitialized_value: Score,
) {
    if !slice.has_node(node) {
        let template = WordSlice {
            score_end: uninitialized_value,
            score_before_start: uninitialized_value,
            ..WordSlice::default()
        };
        slice.add_node(node, graph.node_length(node), template);
    }
    slice.node_mut(node)[index].set_value(row, value);
}

/// Fill one block cell by cell. `processed` is caller scratch sized to the
/// graph's total base count, all false on entry and exit.
pub fn calculate_slice_alternate(
    graph: &AlignmentGraph,
    sequence: &[u8],
    startj: usize,
    current_slice: &mut WorkSlice,
    previous_slice: &SqrtSlice,
    processed: &mut [bool],
    bandwidth: usize,
) -> NodeCalculationResult {
    let uninitialized = sequence.len() as Score;
    let mut calculables: Vec<Vec<(usize, usize)>> = vec![Vec::new(); bandwidth + 1];
    let mut next_calculables: Vec<Vec<(usize, usize)>> = vec![Vec::new(); bandwidth + 1];

    let prev_min = previous_slice.min_score;
    for &node in previous_slice.scores.order() {
        let cells = previous_slice.scores.node(node);
        let start = graph.node_start(node);
        if startj == 0 {
            for (i, cell) in cells.iter().enumerate() {
                if cell.score_end < prev_min + bandwidth as Score && cell.score_end_exists {
                    let bucket = (cell.score_end - prev_min) as usize;
                    if character_match(sequence[startj], graph.seq_at(start + i)) {
                        calculables[bucket].push((node, start + i));
                    } else {
                        calculables[bucket + 1].push((node, start + i));
                    }
                }
            }
        } else {
            for i in 0..cells.len() - 1 {
                let cell = cells[i];
                if cell.score_end < prev_min + bandwidth as Score && cell.score_end_exists {
                    debug_assert!(cell.score_end >= prev_min);
                    let bucket = (cell.score_end - prev_min) as usize;
                    calculables[bucket + 1].push((node, start + i));
                    if character_match(sequence[startj], graph.seq_at(start + i + 1)) {
                        calculables[bucket].push((node, start + i + 1));
                    } else {
                        calculables[bucket + 1].push((node, start + i + 1));
                    }
                }
            }
            let last = cells[cells.len() - 1];
            if last.score_end < prev_min + bandwidth as Score && last.score_end_exists {
                let bucket = (last.score_end - prev_min) as usize;
                calculables[bucket + 1].push((node, start + cells.len() - 1));
                for &neighbor in graph.out_neighbors(node) {
                    let u = graph.node_start(neighbor);
                    if character_match(sequence[startj], graph.seq_at(u)) {
                        calculables[bucket].push((neighbor, u));
                    } else {
                        calculables[bucket + 1].push((neighbor, u));
                    }
                }
            }
        }
    }
    debug_assert!(!calculables[0].is_empty() || !calculables[1].is_empty());

    let mut processed_list: Vec<usize> = Vec::new();
    let mut cells_processed = 0usize;
    let mut min_score = prev_min;
    for row in 0..WORD_SIZE {
        let score_index_plus: i64 = if calculables[0].is_empty() { -1 } else { 0 };
        for score_plus in 0..bandwidth {
            let mut k = 0;
            while k < calculables[score_plus].len() {
                let (node, pos) = calculables[score_plus][k];
                k += 1;
                if processed[pos] {
                    continue;
                }
                cells_processed += 1;
                processed[pos] = true;
                processed_list.push(pos);
                let node_start = graph.node_start(node);
                let node_end = graph.node_end(node);
                debug_assert!(pos >= node_start && pos < node_end);
                set_cell_value(
                    graph,
                    current_slice,
                    node,
                    pos - node_start,
                    row,
                    min_score + score_plus as Score,
                    uninitialized,
                );
                debug_assert_eq!(
                    current_slice.cell(node, pos - node_start).get_value(row),
                    min_score + score_plus as Score
                );
                next_calculables[(score_plus as i64 + 1 + score_index_plus) as usize]
                    .push((node, pos));
                if pos + 1 == node_end {
                    for &neighbor in graph.out_neighbors(node) {
                        let u = graph.node_start(neighbor);
                        if !processed[u] {
                            calculables[score_plus + 1].push((neighbor, u));
                        }
                        if row < WORD_SIZE - 1 {
                            if character_match(sequence[startj + row + 1], graph.seq_at(u)) {
                                next_calculables[(score_plus as i64 + score_index_plus) as usize]
                                    .push((neighbor, u));
                            } else {
                                next_calculables
                                    [(score_plus as i64 + score_index_plus + 1) as usize]
                                    .push((neighbor, u));
                            }
                        }
                    }
                } else {
                    let u = pos + 1;
                    debug_assert!(u < node_end);
                    if !processed[u] {
                        calculables[score_plus + 1].push((node, u));
                    }
                    if row < WORD_SIZE - 1 {
                        if character_match(sequence[startj + row + 1], graph.seq_at(u)) {
                            next_calculables[(score_plus as i64 + score_index_plus) as usize]
                                .push((node, u));
                        } else {
                            next_calculables[(score_plus as i64 + score_index_plus + 1) as usize]
                                .push((node, u));
                        }
                    }
                }
            }
        }
        if calculables[0].is_empty() {
            min_score += 1;
        }
        for &pos in &processed_list {
            debug_assert!(processed[pos]);
            processed[pos] = false;
        }
        processed_list.clear();
        if row < WORD_SIZE - 1 {
            std::mem::swap(&mut calculables, &mut next_calculables);
            for bucket in next_calculables.iter_mut() {
                bucket.clear();
            }
        }
    }
    if calculables[0].is_empty() {
        calculables.swap(0, 1);
    }
    debug_assert!(!calculables[0].is_empty());
    NodeCalculationResult {
        min_score,
        min_score_index: calculables[0].iter().map(|&(_, pos)| pos).collect(),
        cells_processed,
    }
}

/// After the sweep, stamp the slice into the shape the rest of the engine
/// expects: mark reached last rows, fully confirm every column, and give
/// untouched columns a large-but-finite sentinel score.
pub fn finalize_alternate_slice(
    graph: &AlignmentGraph,
    slice: &mut WorkSlice,
    current_band: &mut [bool],
    uninitialized_value: Score,
    bandwidth: usize,
) -> usize {
    let mut num_cells = 0usize;
    let nodes: Vec<usize> = slice.nodes().to_vec();
    for node in nodes {
        debug_assert!(!current_band[node]);
        current_band[node] = true;
        let len = graph.node_length(node);
        let mut min_score = slice.cell(node, 0).score_end;
        for word in slice.node_mut(node).iter_mut() {
            debug_assert!((word.confirmed_rows.rows as usize) < WORD_SIZE);
            word.score_end_exists = word.confirmed_rows.rows as usize == WORD_SIZE - 1;
            word.confirmed_rows.rows = WORD_SIZE as u8;
            word.confirmed_rows.partial = false;
            min_score = min_score.min(word.score_end);
        }
        for word in slice.node_mut(node).iter_mut() {
            if word.score_end == uninitialized_value {
                let sentinel = min_score + len as Score + bandwidth as Score + 1;
                word.score_end = sentinel;
                word.score_before_start = sentinel;
            }
        }
        num_cells += len;
        slice.set_min_score(node, min_score);
    }
    num_cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::correctness::AlignmentCorrectnessEstimationState;
    use crate::core::node_slice::{SqrtScores, TinySlice};

    fn initial_slice(graph: &AlignmentGraph, nodes: &[usize]) -> SqrtSlice {
        let mut scores = SqrtScores::new();
        for &node in nodes {
            scores.add_node(
                node,
                0,
                (0..graph.node_length(node)).map(|_| TinySlice {
                    score_end: 0,
                    last_vp: false,
                    last_vn: false,
                    score_end_exists: true,
                }),
            );
        }
        SqrtSlice {
            j: -(WORD_SIZE as i64),
            min_score: 0,
            min_score_index: Vec::new(),
            scores,
            correctness: AlignmentCorrectnessEstimationState::new(),
            cells_processed: 0,
            num_cells: nodes.iter().map(|&n| graph.node_length(n)).sum(),
        }
    }

    fn padded(read: &[u8]) -> Vec<u8> {
        let mut seq = read.to_vec();
        while seq.len() % WORD_SIZE != 0 {
            seq.push(b'N');
        }
        seq
    }

    #[test]
    fn test_exact_match_reaches_zero() {
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"ACGTACGT").unwrap();
        g.finalize();
        let v = g.lookup(2).unwrap();
        let seq = padded(b"ACGTACGT");
        let previous = initial_slice(&g, &[v]);
        let mut current = WorkSlice::new(g.node_size());
        let mut processed = vec![false; g.size_in_bp()];
        let result =
            calculate_slice_alternate(&g, &seq, 0, &mut current, &previous, &mut processed, 8);
        assert_eq!(current.node(v)[7].get_value(7), 0);
        // every flag was reset behind the sweep
        assert!(processed.iter().all(|&p| !p));
        assert!(result.cells_processed > 0);
    }

    #[test]
    fn test_finalize_marks_band_and_min_scores() {
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"ACGT").unwrap();
        g.finalize();
        let v = g.lookup(2).unwrap();
        let seq = padded(b"ACGT");
        let previous = initial_slice(&g, &[v]);
        let mut current = WorkSlice::new(g.node_size());
        let mut processed = vec![false; g.size_in_bp()];
        calculate_slice_alternate(&g, &seq, 0, &mut current, &previous, &mut processed, 6);
        let mut band = vec![false; g.node_size()];
        let cells = finalize_alternate_slice(&g, &mut current, &mut band, seq.len() as Score, 6);
        assert_eq!(cells, 4);
        assert!(band[v]);
        for word in current.node(v) {
            assert!(word.confirmed_rows.fully_confirmed());
        }
        assert!(current.min_score(v) <= seq.len() as Score);
    }
}
