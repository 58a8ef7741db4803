//! Walking the sampled table backwards to recover the alignment path.
//!
//! Segments between checkpoints are recomputed with full bit vectors, then
//! walked upward cell by cell with the predecessor rule (horizontal, then
//! diagonal, then vertical, first match wins). Runs of blocks recorded as
//! backtrace overrides are spliced in from their per-cell predecessor maps
//! instead of being recomputed.

use std::collections::HashMap;

use crate::core::word_slice::{Score, WORD_SIZE};
use crate::graph::AlignmentGraph;
use crate::pipelines::graph::dp_table::{DPTable, FullSlice, MatrixPosition, SqrtSlice};
use crate::pipelines::graph::driver::get_slices_from_table;
use crate::pipelines::graph::{AlignerParams, AlignerScratch};
use crate::utils::character_match;

/// Read access to the bottom row of the block above the one being walked.
/// Checkpoints only answer for row 63; recomputed slices answer everywhere.
pub trait BlockBoundary {
    fn contains_node(&self, node: usize) -> bool;
    fn last_row_value(&self, graph: &AlignmentGraph, w: usize) -> Option<Score>;
    fn start_row(&self) -> i64;
}

impl BlockBoundary for SqrtSlice {
    fn contains_node(&self, node: usize) -> bool {
        self.scores.has_node(node)
    }

    fn last_row_value(&self, graph: &AlignmentGraph, w: usize) -> Option<Score> {
        let node = graph.index_to_node(w);
        if !self.scores.has_node(node) {
            return None;
        }
        Some(self.scores.cell(node, w - graph.node_start(node)).score_end)
    }

    fn start_row(&self) -> i64 {
        self.j
    }
}

impl BlockBoundary for FullSlice {
    fn contains_node(&self, node: usize) -> bool {
        self.scores.has_node(node)
    }

    fn last_row_value(&self, graph: &AlignmentGraph, w: usize) -> Option<Score> {
        let node = graph.index_to_node(w);
        if !self.scores.has_node(node) {
            return None;
        }
        Some(
            self.scores
                .cell(node, w - graph.node_start(node))
                .get_value(WORD_SIZE - 1),
        )
    }

    fn start_row(&self) -> i64 {
        self.j
    }
}

fn value_at(graph: &AlignmentGraph, slice: &FullSlice, row: usize, w: usize) -> Score {
    let node = graph.index_to_node(w);
    slice
        .scores
        .cell(node, w - graph.node_start(node))
        .get_value(row)
}

fn value_or_max(
    graph: &AlignmentGraph,
    slice: &FullSlice,
    row: usize,
    w: usize,
    max: Score,
) -> Score {
    let node = graph.index_to_node(w);
    if !slice.scores.has_node(node) {
        return max;
    }
    slice
        .scores
        .cell(node, w - graph.node_start(node))
        .get_value(row)
}

/// The predecessor of one cell: horizontal into the previous column (or an
/// in-neighbor's last column), diagonal, then vertical, in that order. A
/// cell with no candidate is an internal invariant violation.
pub fn pick_backtrace_predecessor<P: BlockBoundary>(
    graph: &AlignmentGraph,
    sequence: &[u8],
    slice: &FullSlice,
    pos: MatrixPosition,
    previous: &P,
) -> MatrixPosition {
    debug_assert!(pos.read_pos >= slice.j);
    debug_assert!(pos.read_pos < slice.j + WORD_SIZE as i64);
    let node = graph.index_to_node(pos.index);
    debug_assert!(slice.scores.has_node(node));
    let row = (pos.read_pos - slice.j) as usize;
    let score_here = value_at(graph, slice, row, pos.index);
    if pos.read_pos == 0 && previous.contains_node(node) && (score_here == 0 || score_here == 1) {
        return MatrixPosition::new(pos.index, -1);
    }
    let max = sequence.len() as Score;
    let row_char = sequence[pos.read_pos as usize];
    let matched = character_match(row_char, graph.seq_at(pos.index));

    let vertical = |previous: &P| -> Option<MatrixPosition> {
        let score_up = if pos.read_pos == slice.j {
            debug_assert_eq!(previous.start_row() + WORD_SIZE as i64, slice.j);
            previous.last_row_value(graph, pos.index).unwrap_or(max)
        } else {
            value_or_max(graph, slice, row - 1, pos.index, max)
        };
        debug_assert!(score_up >= score_here - 1);
        if score_up == score_here - 1 {
            return Some(MatrixPosition::new(pos.index, pos.read_pos - 1));
        }
        None
    };

    // On an N row every candidate is value-consistent, so any choice keeps
    // the total cost; preferring the vertical step stops the walk from
    // drifting sideways through free N matches across the padded tail,
    // which would push the expensive steps into the stripped prefix.
    if row_char.to_ascii_uppercase() == b'N' {
        if let Some(found) = vertical(previous) {
            return found;
        }
    }

    let try_candidate = |u: usize| -> Option<MatrixPosition> {
        let horizontal = value_or_max(graph, slice, row, u, max);
        debug_assert!(horizontal >= score_here - 1);
        if horizontal == score_here - 1 {
            return Some(MatrixPosition::new(u, pos.read_pos));
        }
        let diagonal = if pos.read_pos == slice.j {
            previous.last_row_value(graph, u).unwrap_or(max)
        } else {
            value_or_max(graph, slice, row - 1, u, max)
        };
        if matched {
            debug_assert!(diagonal >= score_here);
            if diagonal == score_here {
                return Some(MatrixPosition::new(u, pos.read_pos - 1));
            }
        } else {
            debug_assert!(diagonal >= score_here - 1);
            if diagonal == score_here - 1 {
                return Some(MatrixPosition::new(u, pos.read_pos - 1));
            }
        }
        None
    };

    if pos.index == graph.node_start(node) {
        for &neighbor in graph.in_neighbors(node) {
            if let Some(found) = try_candidate(graph.node_end(neighbor) - 1) {
                return found;
            }
        }
    } else if let Some(found) = try_candidate(pos.index - 1) {
        return found;
    }

    if let Some(found) = vertical(previous) {
        return found;
    }
    panic!(
        "no backtrace predecessor at base {} read position {}",
        pos.index, pos.read_pos
    );
}

/// Walk upward inside one block until its top row. Backwards: first output
/// entry is the lowest row.
fn get_trace_from_slice(
    graph: &AlignmentGraph,
    sequence: &[u8],
    slice: &FullSlice,
    start: MatrixPosition,
) -> Vec<MatrixPosition> {
    debug_assert!(start.read_pos >= slice.j);
    debug_assert!(start.read_pos < slice.j + WORD_SIZE as i64);
    let mut pos = start;
    let mut result = Vec::new();
    while pos.read_pos != slice.j {
        debug_assert!(slice.scores.has_node(graph.index_to_node(pos.index)));
        pos = pick_backtrace_predecessor(graph, sequence, slice, pos, slice);
        result.push(pos);
    }
    result
}

/// Cross from the top row of `after` into the bottom row of `before`,
/// consuming any horizontal steps on the boundary row.
fn get_slice_boundary_trace<P: BlockBoundary>(
    graph: &AlignmentGraph,
    sequence: &[u8],
    after: &FullSlice,
    before: &P,
    after_column: usize,
) -> Vec<MatrixPosition> {
    let mut pos = MatrixPosition::new(after_column, after.j);
    debug_assert_eq!(after.j, before.start_row() + WORD_SIZE as i64);
    let mut result = Vec::new();
    while pos.read_pos == after.j {
        debug_assert!(after.scores.has_node(graph.index_to_node(pos.index)));
        pos = pick_backtrace_predecessor(graph, sequence, after, pos, before);
        result.push(pos);
    }
    result
}

/// Walk a run of recomputed blocks from `start` to the run's top row.
fn get_trace_from_table_inner(
    graph: &AlignmentGraph,
    sequence: &[u8],
    table: &[FullSlice],
    start: MatrixPosition,
) -> Vec<MatrixPosition> {
    debug_assert!(!table.is_empty());
    debug_assert!(start.read_pos >= table.last().unwrap().j);
    debug_assert!(start.read_pos < table.last().unwrap().j + WORD_SIZE as i64);
    let mut result = vec![start];
    for slice_index in (0..table.len()).rev() {
        let slice = &table[slice_index];
        debug_assert!(slice.j <= result.last().unwrap().read_pos);
        debug_assert!(slice.j + WORD_SIZE as i64 > result.last().unwrap().read_pos);
        let partial = get_trace_from_slice(graph, sequence, slice, *result.last().unwrap());
        result.extend(partial);
        debug_assert_eq!(result.last().unwrap().read_pos, slice.j);
        if slice_index > 0 {
            let boundary = get_slice_boundary_trace(
                graph,
                sequence,
                slice,
                &table[slice_index - 1],
                result.last().unwrap().index,
            );
            result.extend(boundary);
        }
    }
    result
}

/// Full backtrace over a sampled table: recompute segment by segment from
/// right to left, splicing in override chains where they were recorded.
/// Returns the score and the forward-ordered trace.
pub fn get_trace_from_table(
    graph: &AlignmentGraph,
    params: &AlignerParams,
    sequence: &[u8],
    table: &DPTable,
    scratch: &mut AlignerScratch,
) -> (Score, Vec<MatrixPosition>) {
    debug_assert_eq!(table.bandwidth_per_slice.len(), table.correctness.len());
    debug_assert_eq!(sequence.len() % WORD_SIZE, 0);
    if table.slices.is_empty() || table.bandwidth_per_slice.is_empty() {
        return (Score::MAX, Vec::new());
    }
    let mut score = 0;
    let mut positions: Vec<MatrixPosition> = Vec::new();
    let mut override_index: i64 = table.backtrace_overrides.len() as i64 - 1;
    let mut last_override_startj: i64 = i64::MAX;
    let mut next_override_endj: i64 = i64::MIN;
    if let Some(last) = table.backtrace_overrides.last() {
        next_override_endj = last.endj;
    }
    for i in (0..table.slices.len()).rev() {
        if (table.slices[i].j + WORD_SIZE as i64) / WORD_SIZE as i64
            == table.bandwidth_per_slice.len() as i64
        {
            // the stored slice is the final block itself
            debug_assert_eq!(i, table.slices.len() - 1);
            let last = table.slices.last().unwrap();
            score = last.min_score;
            positions.push(MatrixPosition::new(
                *last.min_score_index.last().expect("final block with no minimum"),
                last.j + WORD_SIZE as i64 - 1,
            ));
            continue;
        }
        let part_table = get_slices_from_table(
            graph,
            params,
            sequence,
            last_override_startj,
            table,
            i,
            scratch,
        );
        debug_assert!(!part_table.is_empty());
        if i == table.slices.len() - 1 {
            let last = part_table.last().unwrap();
            score = last.min_score;
            positions.push(MatrixPosition::new(
                *last.min_score_index.last().expect("final block with no minimum"),
                last.j + WORD_SIZE as i64 - 1,
            ));
        }
        let part_trace =
            get_trace_from_table_inner(graph, sequence, &part_table, *positions.last().unwrap());
        debug_assert!(part_trace.len() > 1);
        // the starting position is already in the result
        positions.extend_from_slice(&part_trace[1..]);
        let boundary = get_slice_boundary_trace(
            graph,
            sequence,
            &part_table[0],
            &table.slices[i],
            positions.last().unwrap().index,
        );
        debug_assert!(!boundary.is_empty());
        positions.extend_from_slice(&boundary);
        if table.slices[i].j == next_override_endj {
            let splice = table.backtrace_overrides[override_index as usize]
                .get_backtrace(*positions.last().unwrap());
            positions.extend_from_slice(&splice[1..]);
            last_override_startj = table.backtrace_overrides[override_index as usize].startj;
            override_index -= 1;
            next_override_endj = if override_index >= 0 {
                table.backtrace_overrides[override_index as usize].endj
            } else {
                i64::MIN
            };
        }
    }
    debug_assert_eq!(positions.last().unwrap().read_pos, -1);
    positions.pop();
    debug_assert_eq!(positions.last().unwrap().read_pos, 0);
    positions.reverse();
    (score, positions)
}

#[derive(Clone, Copy)]
struct BacktraceItem {
    end: bool,
    previous_in_same_row: bool,
    previous_index: usize,
    pos: MatrixPosition,
}

impl Default for BacktraceItem {
    fn default() -> Self {
        BacktraceItem {
            end: false,
            previous_in_same_row: false,
            previous_index: 0,
            pos: MatrixPosition::new(0, 0),
        }
    }
}

/// Dense per-cell predecessor map over a contiguous run of blocks whose
/// bands were too large to re-expand affordably during backtrace. Only
/// cells reachable backwards from an end-exists cell of the final row are
/// recorded.
pub struct BacktraceOverride {
    pub startj: i64,
    pub endj: i64,
    items: Vec<Vec<BacktraceItem>>,
}

impl BacktraceOverride {
    pub fn new(
        graph: &AlignmentGraph,
        sequence: &[u8],
        previous: &SqrtSlice,
        slices: &[FullSlice],
    ) -> Self {
        debug_assert!(!slices.is_empty());
        let startj = slices[0].j;
        let endj = slices.last().unwrap().j;
        debug_assert_eq!(
            endj,
            startj + ((slices.len() - 1) * WORD_SIZE) as i64
        );
        let rows = WORD_SIZE * slices.len();
        let mut index_of_pos: Vec<HashMap<usize, usize>> = vec![HashMap::new(); rows];

        // reachability: walk back from every end-exists cell of the last row
        let mut stack: Vec<MatrixPosition> = Vec::new();
        let last_slice = slices.last().unwrap();
        let end_row_j = last_slice.j + WORD_SIZE as i64 - 1;
        for &node in last_slice.nodes() {
            let node_start = graph.node_start(node);
            for (i, cell) in last_slice.scores.node(node).iter().enumerate() {
                if cell.score_end_exists {
                    stack.push(MatrixPosition::new(node_start + i, end_row_j));
                }
            }
        }
        while let Some(pos) = stack.pop() {
            let row = (pos.read_pos - startj) as usize;
            if index_of_pos[row].contains_key(&pos.index) {
                continue;
            }
            let new_index = index_of_pos[row].len();
            index_of_pos[row].insert(pos.index, new_index);
            let slice_index = row / WORD_SIZE;
            if row > 0 && row % WORD_SIZE == WORD_SIZE - 1 {
                let node = graph.index_to_node(pos.index);
                let offset = pos.index - graph.node_start(node);
                debug_assert!(slices[slice_index].scores.has_node(node));
                if !slices[slice_index].scores.cell(node, offset).score_end_exists {
                    continue;
                }
            }
            let predecessor = if slice_index > 0 {
                pick_backtrace_predecessor(
                    graph,
                    sequence,
                    &slices[slice_index],
                    pos,
                    &slices[slice_index - 1],
                )
            } else {
                pick_backtrace_predecessor(graph, sequence, &slices[0], pos, previous)
            };
            debug_assert!(
                predecessor.read_pos == pos.read_pos || predecessor.read_pos == pos.read_pos - 1
            );
            if predecessor.read_pos >= startj {
                stack.push(predecessor);
            }
        }

        // second pass: record every reachable cell's predecessor by index
        let mut items: Vec<Vec<BacktraceItem>> = vec![Vec::new(); rows];
        for row in (0..rows).rev() {
            let mut row_items = vec![BacktraceItem::default(); index_of_pos[row].len()];
            for (&w, &item_index) in &index_of_pos[row] {
                let pos = MatrixPosition::new(w, startj + row as i64);
                row_items[item_index].pos = pos;
                let slice_index = row / WORD_SIZE;
                if row % WORD_SIZE == WORD_SIZE - 1 {
                    let node = graph.index_to_node(w);
                    let offset = w - graph.node_start(node);
                    debug_assert!(slices[slice_index].scores.has_node(node));
                    if !slices[slice_index].scores.cell(node, offset).score_end_exists {
                        row_items[item_index].end = true;
                        continue;
                    }
                }
                let predecessor = if slice_index > 0 {
                    pick_backtrace_predecessor(
                        graph,
                        sequence,
                        &slices[slice_index],
                        pos,
                        &slices[slice_index - 1],
                    )
                } else {
                    pick_backtrace_predecessor(graph, sequence, &slices[0], pos, previous)
                };
                if predecessor.read_pos == pos.read_pos {
                    row_items[item_index].previous_in_same_row = true;
                    row_items[item_index].previous_index = index_of_pos[row][&predecessor.index];
                } else {
                    row_items[item_index].previous_in_same_row = false;
                    row_items[item_index].previous_index = if row != 0 {
                        index_of_pos[row - 1][&predecessor.index]
                    } else {
                        predecessor.index
                    };
                }
            }
            items[row] = row_items;
        }

        BacktraceOverride {
            startj,
            endj,
            items,
        }
    }

    /// Backwards trace from an end-row position down to the row above
    /// `startj`. First output entry is the given start.
    pub fn get_backtrace(&self, start: MatrixPosition) -> Vec<MatrixPosition> {
        debug_assert!(!self.items.is_empty());
        debug_assert_eq!(self.items.len() % WORD_SIZE, 0);
        let last_row = self.items.last().unwrap();
        debug_assert!(!last_row.is_empty());
        debug_assert_eq!(last_row[0].pos.read_pos, start.read_pos);
        let mut current_index = last_row
            .iter()
            .position(|item| item.pos == start)
            .expect("override backtrace start is not a recorded cell");
        let mut current_row = self.items.len() - 1;
        let mut result = Vec::new();
        loop {
            let current = self.items[current_row][current_index];
            debug_assert!(!current.end);
            result.push(current.pos);
            if current.previous_in_same_row {
                current_index = current.previous_index;
            } else if current_row == 0 {
                result.push(MatrixPosition::new(
                    current.previous_index,
                    current.pos.read_pos - 1,
                ));
                break;
            } else {
                current_row -= 1;
                current_index = current.previous_index;
            }
        }
        result
    }
}
