//! Bit-parallel fill of one 64-row block over the in-band subgraph.
//!
//! Per block: decompose the band into strongly connected components, walk
//! them in topological order, force each component's zero row by
//! priority-queue relaxation, then iterate the member vertices through the
//! word-slice recurrence until no column confirms any further rows. Within a
//! vertex the columns chain left to right; at a vertex's first column the
//! contributions of all in-band predecessors are merged.

use crate::core::node_slice::SqrtScores;
use crate::core::unique_queue::UniqueQueue;
use crate::core::word_slice::{Score, WordSlice, WORD_SIZE};
use crate::graph::AlignmentGraph;
use crate::pipelines::graph::scc::strongly_connected_components;
use crate::utils::character_match;

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::core::node_slice::WorkSlice;

/// Match masks of one 64-character read block against each graph base.
pub struct EqVector {
    ba: u64,
    bc: u64,
    bt: u64,
    bg: u64,
}

impl EqVector {
    /// Build from the read rows `j .. j + 63`. The read must be padded so
    /// the block is complete; `N` padding matches everything.
    pub fn from_sequence_block(sequence: &[u8], j: usize) -> Self {
        let mut ba = 0u64;
        let mut bc = 0u64;
        let mut bt = 0u64;
        let mut bg = 0u64;
        for i in 0..WORD_SIZE {
            debug_assert!(j + i < sequence.len());
            let mask = 1u64 << i;
            let c = sequence[j + i];
            if character_match(c, b'A') {
                ba |= mask;
            }
            if character_match(c, b'C') {
                bc |= mask;
            }
            if character_match(c, b'T') {
                bt |= mask;
            }
            if character_match(c, b'G') {
                bg |= mask;
            }
        }
        debug_assert_eq!(ba | bc | bt | bg, u64::MAX);
        EqVector { ba, bc, bt, bg }
    }

    pub fn get_eq(&self, graph_char: u8) -> u64 {
        match graph_char {
            b'A' | b'a' => self.ba,
            b'T' | b't' => self.bt,
            b'C' | b'c' => self.bc,
            b'G' | b'g' => self.bg,
            other => panic!("graph character {:?} outside ACGT", other as char),
        }
    }
}

/// Result of filling one vertex, or one whole block.
pub struct NodeCalculationResult {
    pub min_score: Score,
    pub min_score_index: Vec<usize>,
    pub cells_processed: usize,
}

impl NodeCalculationResult {
    fn empty() -> Self {
        NodeCalculationResult {
            min_score: Score::MAX,
            min_score_index: Vec::new(),
            cells_processed: 0,
        }
    }
}

fn is_source(
    graph: &AlignmentGraph,
    node: usize,
    current_band: &[bool],
    previous_band: &[bool],
) -> bool {
    for &neighbor in graph.in_neighbors(node) {
        if current_band[neighbor] || previous_band[neighbor] {
            return false;
        }
    }
    true
}

/// First-column slice of a vertex with in-band predecessors: advance each
/// predecessor's last column into this one and take the per-row minimum.
#[allow(clippy::too_many_arguments)]
fn get_node_start_slice(
    graph: &AlignmentGraph,
    eq: u64,
    node: usize,
    previous_slice: &SqrtScores,
    current_slice: &WorkSlice,
    current_band: &[bool],
    previous_band: &[bool],
    previous_eq: bool,
) -> WordSlice {
    let current = current_slice.cell(node, 0);
    let mut result: Option<WordSlice> = None;
    for &neighbor in graph.in_neighbors(node) {
        if !current_band[neighbor] && !previous_band[neighbor] {
            continue;
        }
        let mut eq_here = eq;
        let last = graph.node_length(neighbor) - 1;
        let mut previous_up = WordSlice::default();
        let mut found_one_up = false;
        let mut has_real_neighbor = false;
        if previous_band[neighbor] {
            previous_up = previous_slice.cell(neighbor, last).expand();
            found_one_up = true;
        }
        let previous = if current_band[neighbor] {
            has_real_neighbor = true;
            current_slice.cell(neighbor, last)
        } else {
            debug_assert!(previous_band[neighbor]);
            let mut source =
                WordSlice::source_from_score(previous_slice.cell(neighbor, last).score_end);
            source.score_before_exists = true;
            source
        };
        if !has_real_neighbor {
            eq_here &= 1;
        }
        let result_here = previous.advance(
            eq_here,
            current.score_before_exists,
            current.score_before_exists && found_one_up,
            found_one_up,
            previous_eq,
            &previous_up,
        );
        result = Some(match result {
            None => result_here,
            Some(prior) => prior.merge_with(&result_here),
        });
    }
    result.expect("node start slice computed with no in-band neighbor")
}

/// Fill all columns of one vertex, chaining the recurrence down its length.
/// Returns early as soon as a column stops confirming new rows; the caller
/// re-enqueues successors only when the last column improved.
#[allow(clippy::too_many_arguments)]
fn calculate_node(
    graph: &AlignmentGraph,
    node: usize,
    j: i64,
    sequence: &[u8],
    eqv: &EqVector,
    current_slice: &mut WorkSlice,
    previous_slice: &SqrtScores,
    current_band: &[bool],
    previous_band: &[bool],
) -> NodeCalculationResult {
    let mut result = NodeCalculationResult::empty();
    let node_start = graph.node_start(node);
    let len = graph.node_length(node);

    let old_confirmation = current_slice.cell(node, 0).confirmed_rows;
    if old_confirmation.fully_confirmed() {
        return result;
    }

    let new_first = if is_source(graph, node, current_band, previous_band) {
        if j == 0 && previous_band[node] {
            WordSlice::source_from_start_match(
                character_match(sequence[0], graph.seq_at(node_start)),
                previous_slice.cell(node, 0).score_end,
            )
        } else if previous_band[node] {
            let old = previous_slice.cell(node, 0);
            let mut source = WordSlice::source_from_score(old.score_end);
            source.score_before_exists = old.score_end_exists;
            source
        } else {
            WordSlice::source_without_before(sequence.len())
        }
    } else {
        let eq = eqv.get_eq(graph.seq_at(node_start));
        let previous_eq = (j == 0 && previous_band[node])
            || (j > 0 && graph.seq_at(node_start) == sequence[(j - 1) as usize]);
        let mut start_slice = get_node_start_slice(
            graph,
            eq,
            node,
            previous_slice,
            current_slice,
            current_band,
            previous_band,
            previous_eq,
        );
        if previous_band[node] {
            let old = previous_slice.cell(node, 0);
            if start_slice.score_before_start > old.score_end {
                let mut mergable = WordSlice::source_from_score(old.score_end);
                mergable.score_before_exists = old.score_end_exists;
                start_slice = start_slice.merge_with(&mergable);
            }
        }
        start_slice
    };
    current_slice.node_mut(node)[0] = new_first;
    if new_first.confirmed_rows.fully_confirmed() && new_first.score_end < result.min_score {
        result.min_score = new_first.score_end;
        result.min_score_index.clear();
    }
    if new_first.confirmed_rows.fully_confirmed() && new_first.score_end == result.min_score {
        result.min_score_index.push(node_start);
    }

    if new_first.confirmed_rows == old_confirmation {
        return result;
    }

    for w in 1..len {
        let eq = eqv.get_eq(graph.seq_at(node_start + w));
        let old_confirmation = current_slice.cell(node, w).confirmed_rows;
        if old_confirmation.fully_confirmed() {
            return result;
        }
        let left = current_slice.cell(node, w - 1);
        let up = current_slice.cell(node, w);
        let previous_eq = (j == 0 && previous_band[node])
            || (j > 0 && graph.seq_at(node_start + w) == sequence[(j - 1) as usize]);
        let old_left = if previous_band[node] {
            previous_slice.cell(node, w - 1).expand()
        } else {
            // value is never consulted: a cell without a previous-block
            // column has no upper-left boundary either
            left
        };
        let mut advanced = left.advance(
            eq,
            up.score_before_exists,
            up.score_before_exists,
            left.score_before_exists,
            previous_eq,
            &old_left,
        );
        if previous_band[node] {
            let old = previous_slice.cell(node, w);
            if advanced.score_before_start > old.score_end {
                let mut mergable = WordSlice::source_from_score(old.score_end);
                mergable.score_before_exists = old.score_end_exists;
                advanced = advanced.merge_with(&mergable);
            }
        }
        current_slice.node_mut(node)[w] = advanced;

        if advanced.confirmed_rows.fully_confirmed() && advanced.score_end < result.min_score {
            result.min_score = advanced.score_end;
            result.min_score_index.clear();
        }
        if advanced.confirmed_rows.fully_confirmed() && advanced.score_end == result.min_score {
            result.min_score_index.push(node_start + w);
        }

        if advanced.confirmed_rows == old_confirmation {
            return result;
        }
    }
    result.cells_processed = len * WORD_SIZE;
    result
}

/// Seed a component's zero row: take the best boundary from the previous
/// block and from already-finalized out-of-component predecessors, then
/// relax through intra-component edges until no column improves.
#[allow(clippy::too_many_arguments)]
pub fn force_component_zero_row(
    graph: &AlignmentGraph,
    current_slice: &mut WorkSlice,
    previous_slice: &SqrtScores,
    current_band: &[bool],
    previous_band: &[bool],
    component: &[usize],
    component_index: usize,
    part_of_component: &[usize],
) {
    let mut queue: BinaryHeap<Reverse<(Score, usize)>> = BinaryHeap::new();
    for &node in component {
        debug_assert!(current_band[node]);
        debug_assert_eq!(part_of_component[node], component_index);
        let len = graph.node_length(node);
        for i in 0..len {
            current_slice.node_mut(node)[i].score_before_start = Score::MAX;
        }
        let mut first = if previous_band[node] {
            previous_slice.cell(node, 0).score_end
        } else {
            Score::MAX
        };
        for &neighbor in graph.in_neighbors(node) {
            if !current_band[neighbor] && !previous_band[neighbor] {
                continue;
            }
            if part_of_component[neighbor] == component_index {
                continue;
            }
            let last = graph.node_length(neighbor) - 1;
            if current_band[neighbor] {
                debug_assert!(current_slice.has_node(neighbor));
                first = first.min(current_slice.cell(neighbor, last).score_before_start + 1);
            }
            if previous_band[neighbor] {
                first = first.min(previous_slice.cell(neighbor, last).score_end + 1);
            }
        }
        current_slice.node_mut(node)[0].score_before_start = first;
        if first == Score::MAX {
            continue;
        }
        for i in 1..len {
            let mut score = current_slice.cell(node, i - 1).score_before_start + 1;
            if previous_band[node] {
                score = score.min(previous_slice.cell(node, i).score_end);
            }
            current_slice.node_mut(node)[i].score_before_start = score;
        }
        let last_score = current_slice.cell(node, len - 1).score_before_start;
        for &neighbor in graph.out_neighbors(node) {
            if part_of_component[neighbor] != component_index {
                continue;
            }
            queue.push(Reverse((last_score + 1, neighbor)));
        }
    }
    while let Some(Reverse((score, node))) = queue.pop() {
        debug_assert_eq!(part_of_component[node], component_index);
        let len = graph.node_length(node);
        let mut score = score;
        let mut end_updated = true;
        for i in 0..len {
            if current_slice.cell(node, i).score_before_start <= score {
                end_updated = false;
                break;
            }
            current_slice.node_mut(node)[i].score_before_start = score;
            score += 1;
        }
        if end_updated {
            for &neighbor in graph.out_neighbors(node) {
                if part_of_component[neighbor] != component_index {
                    continue;
                }
                queue.push(Reverse((score, neighbor)));
            }
        }
    }
    for &node in component {
        let len = graph.node_length(node);
        for i in 0..len {
            let score_before_start = current_slice.cell(node, i).score_before_start;
            debug_assert!(score_before_start != Score::MAX);
            let score_before_exists = previous_band[node] && {
                let old = previous_slice.cell(node, i);
                old.score_end == score_before_start && old.score_end_exists
            };
            current_slice.node_mut(node)[i] = WordSlice::new(
                u64::MAX,
                0,
                score_before_start + WORD_SIZE as Score,
                score_before_start,
                0,
                score_before_exists,
            );
        }
    }
}

/// Fill one whole block bit-parallel. `band_order` is the in-band vertex
/// set; `part_of_component` is caller scratch sized to the graph, all
/// `usize::MAX` on entry and exit.
#[allow(clippy::too_many_arguments)]
pub fn calculate_slice(
    graph: &AlignmentGraph,
    sequence: &[u8],
    j: i64,
    current_slice: &mut WorkSlice,
    previous_slice: &SqrtScores,
    band_order: &[usize],
    current_band: &[bool],
    previous_band: &[bool],
    part_of_component: &mut [usize],
    calculables: &mut UniqueQueue,
) -> NodeCalculationResult {
    let mut minimum_score = Score::MAX;
    let mut minimum_index: Vec<usize> = Vec::new();
    let mut cells_processed = 0usize;

    debug_assert!(j >= 0);
    let eqv = EqVector::from_sequence_block(sequence, j as usize);
    let components = strongly_connected_components(band_order, current_band, graph);
    for (ci, component) in components.iter().enumerate() {
        for &node in component {
            part_of_component[node] = ci;
        }
    }
    for ci in (0..components.len()).rev() {
        force_component_zero_row(
            graph,
            current_slice,
            previous_slice,
            current_band,
            previous_band,
            &components[ci],
            ci,
            part_of_component,
        );
        debug_assert!(calculables.is_empty());
        calculables.insert_all(components[ci].iter().copied());
        while let Some(node) = calculables.pop() {
            debug_assert!(current_band[node]);
            let last = graph.node_length(node) - 1;
            let old_end = current_slice.cell(node, last);
            let node_calc = calculate_node(
                graph,
                node,
                j,
                sequence,
                &eqv,
                current_slice,
                previous_slice,
                current_band,
                previous_band,
            );
            current_slice.set_min_score(node, node_calc.min_score);
            let new_end = current_slice.cell(node, last);
            debug_assert_eq!(new_end.score_before_start, old_end.score_before_start);
            debug_assert!(new_end.confirmed_rows >= old_end.confirmed_rows);
            if new_end.score_before_start < sequence.len() as Score
                && new_end.confirmed_rows > old_end.confirmed_rows
            {
                for &neighbor in graph.out_neighbors(node) {
                    if part_of_component[neighbor] != ci {
                        continue;
                    }
                    if !current_slice.cell(neighbor, 0).confirmed_rows.fully_confirmed() {
                        calculables.insert(neighbor);
                    }
                }
            }
            if node_calc.min_score < minimum_score {
                minimum_score = node_calc.min_score;
                minimum_index.clear();
            }
            if node_calc.min_score == minimum_score {
                minimum_index.extend_from_slice(&node_calc.min_score_index);
            }
            cells_processed += node_calc.cells_processed;
        }
        #[cfg(debug_assertions)]
        for &node in &components[ci] {
            debug_assert!(current_slice.cell(node, 0).confirmed_rows.fully_confirmed());
        }
    }
    for component in &components {
        for &node in component {
            part_of_component[node] = usize::MAX;
        }
    }

    NodeCalculationResult {
        min_score: minimum_score,
        min_score_index: minimum_index,
        cells_processed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node_slice::TinySlice;

    fn initial_scores(graph: &AlignmentGraph, nodes: &[usize]) -> SqrtScores {
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
        scores
    }

    fn fill_first_block(
        graph: &AlignmentGraph,
        sequence: &[u8],
        band_nodes: &[usize],
    ) -> (NodeCalculationResult, WorkSlice) {
        let mut current = WorkSlice::new(graph.node_size());
        let mut current_band = vec![false; graph.node_size()];
        let mut previous_band = vec![false; graph.node_size()];
        for &n in band_nodes {
            current.add_node(n, graph.node_length(n), WordSlice::default());
            current_band[n] = true;
            previous_band[n] = true;
        }
        let previous = initial_scores(graph, band_nodes);
        let mut part_of_component = vec![usize::MAX; graph.node_size()];
        let mut calculables = UniqueQueue::new(graph.node_size());
        let result = calculate_slice(
            graph,
            sequence,
            0,
            &mut current,
            &previous,
            band_nodes,
            &current_band,
            &previous_band,
            &mut part_of_component,
            &mut calculables,
        );
        (result, current)
    }

    fn padded(read: &[u8]) -> Vec<u8> {
        let mut seq = read.to_vec();
        while seq.len() % WORD_SIZE != 0 {
            seq.push(b'N');
        }
        seq
    }

    #[test]
    fn test_single_node_matches_myers_edit_distance() {
        // one chain vertex: the block minimum equals the plain
        // edit distance between read prefix rows and the vertex string
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"ACGTACGT").unwrap();
        g.finalize();
        let v = g.lookup(2).unwrap();
        let seq = padded(b"ACGTACGT");
        let (result, slice) = fill_first_block(&g, &seq, &[v]);
        // row 7 in the last column is an exact match: score 0
        let last_column = slice.node(v)[7];
        assert_eq!(last_column.get_value(7), 0);
        // the padded tail can only insert: 56 N rows past the last base
        assert_eq!(result.min_score, 56);
    }

    #[test]
    fn test_single_mismatch_costs_one() {
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"ACGTACGT").unwrap();
        g.finalize();
        let v = g.lookup(2).unwrap();
        let seq = padded(b"ACGAACGT");
        let (_, slice) = fill_first_block(&g, &seq, &[v]);
        let last_column = slice.node(v)[7];
        assert_eq!(last_column.get_value(7), 1);
    }

    #[test]
    fn test_cycle_propagates_through_component() {
        // self-loop vertex: the read walks the loop twice at cost 0
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"ACA").unwrap();
        g.add_edge(1, false, 1, false).unwrap();
        g.finalize();
        let v = g.lookup(2).unwrap();
        let seq = padded(b"ACAACA");
        let (_, slice) = fill_first_block(&g, &seq, &[v]);
        let last_column = slice.node(v)[2];
        assert_eq!(last_column.get_value(5), 0);
        assert!(last_column.confirmed_rows.fully_confirmed());
    }

    #[test]
    fn test_branch_chooses_matching_arm() {
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"AAA").unwrap();
        g.add_node(2, b"CC").unwrap();
        g.add_node(3, b"GG").unwrap();
        g.add_edge(1, false, 2, false).unwrap();
        g.add_edge(1, false, 3, false).unwrap();
        g.finalize();
        let v1 = g.lookup(2).unwrap();
        let v2 = g.lookup(4).unwrap();
        let v3 = g.lookup(6).unwrap();
        let seq = padded(b"AAAGG");
        let (_, slice) = fill_first_block(&g, &seq, &[v1, v2, v3]);
        // the GG arm ends at score 0 on row 4, the CC arm does not
        assert_eq!(slice.node(v3)[1].get_value(4), 0);
        assert!(slice.node(v2)[1].get_value(4) > 0);
    }

    #[test]
    fn test_all_columns_fully_confirm() {
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"ACT").unwrap();
        g.add_node(2, b"GGT").unwrap();
        g.add_edge(1, false, 2, false).unwrap();
        g.add_edge(2, false, 1, false).unwrap();
        g.finalize();
        let v1 = g.lookup(2).unwrap();
        let v2 = g.lookup(4).unwrap();
        let seq = padded(b"ACTGGTACTGGT");
        let (_, slice) = fill_first_block(&g, &seq, &[v1, v2]);
        for &v in &[v1, v2] {
            for w in 0..g.node_length(v) {
                assert!(slice.node(v)[w].confirmed_rows.fully_confirmed());
            }
        }
    }
}
