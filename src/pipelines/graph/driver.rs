//! The adaptive block driver.
//!
//! Walks the read 64 rows at a time: projects the next band, picks the
//! bit-parallel or the cell-by-cell method by band size, feeds the block
//! minimum into the correctness tracker, retries a region once at ramp
//! bandwidth when correctness slips, records dense runs as backtrace
//! overrides, and keeps sparse sqrt-spaced checkpoints of boundary scores.
//! The same machinery re-expands checkpointed segments on demand during
//! backtrace.

use crate::core::correctness::AlignmentCorrectnessEstimationState;
use crate::core::node_slice::{TinySlice, WorkSlice};
use crate::core::word_slice::{Score, WordSlice, WORD_SIZE};
use crate::graph::AlignmentGraph;
use crate::pipelines::graph::alternate::{calculate_slice_alternate, finalize_alternate_slice};
use crate::pipelines::graph::backtrace::BacktraceOverride;
use crate::pipelines::graph::band::project_forward_from_min_score;
use crate::pipelines::graph::dp_table::{DPTable, FullSlice, SqrtSlice};
use crate::pipelines::graph::slice_calc::calculate_slice;
use crate::pipelines::graph::{AlignerParams, AlignerScratch};

/// Metadata of a freshly filled block; the cells live in the scratch
/// work slice until frozen.
pub(crate) struct BlockResult {
    pub j: i64,
    pub min_score: Score,
    pub min_score_index: Vec<usize>,
    pub correctness: AlignmentCorrectnessEstimationState,
    pub cells_processed: usize,
    pub num_cells: usize,
    pub node_count: usize,
}

fn freeze_sqrt(work: &WorkSlice, block: &BlockResult) -> SqrtSlice {
    SqrtSlice {
        j: block.j,
        min_score: block.min_score,
        min_score_index: block.min_score_index.clone(),
        scores: work.freeze_sqrt_end_scores(),
        correctness: block.correctness,
        cells_processed: block.cells_processed,
        num_cells: block.num_cells,
    }
}

fn freeze_full(work: &WorkSlice, block: &BlockResult) -> FullSlice {
    FullSlice {
        j: block.j,
        min_score: block.min_score,
        min_score_index: block.min_score_index.clone(),
        scores: work.freeze_scores(),
        num_cells: block.num_cells,
        cells_processed: block.cells_processed,
    }
}

/// What the block would cost as a checkpoint, same formula as the frozen
/// form reports about itself.
fn estimated_block_memory(block: &BlockResult) -> usize {
    block.num_cells * std::mem::size_of::<TinySlice>()
        + block.node_count * (3 * std::mem::size_of::<usize>() + std::mem::size_of::<Score>())
}

/// Checkpoint spacing: one stored slice per sqrt(blocks), at least one.
pub fn sampling_frequency(sequence_len: usize) -> usize {
    (((sequence_len / WORD_SIZE) as f64).sqrt() as usize).max(1)
}

/// Initial slice for seeded alignment: one vertex, everything at score 0.
pub fn initial_slice_one_node(graph: &AlignmentGraph, node: usize) -> SqrtSlice {
    let mut slice = SqrtSlice {
        j: -(WORD_SIZE as i64),
        min_score: 0,
        min_score_index: vec![graph.node_end(node) - 1],
        scores: Default::default(),
        correctness: AlignmentCorrectnessEstimationState::new(),
        cells_processed: 0,
        num_cells: graph.node_length(node),
    };
    slice.scores.add_node(
        node,
        0,
        (0..graph.node_length(node)).map(|_| TinySlice {
            score_end: 0,
            last_vp: false,
            last_vn: false,
            score_end_exists: true,
        }),
    );
    slice
}

/// Initial slice for seed-free alignment: every real vertex at score 0, so
/// the alignment may start anywhere in the graph.
pub fn initial_full_start_slice(graph: &AlignmentGraph) -> SqrtSlice {
    let mut slice = SqrtSlice {
        j: -(WORD_SIZE as i64),
        min_score: 0,
        min_score_index: Vec::new(),
        scores: Default::default(),
        correctness: AlignmentCorrectnessEstimationState::new(),
        cells_processed: 0,
        num_cells: 0,
    };
    for node in graph.real_nodes() {
        slice.scores.add_node(
            node,
            0,
            (0..graph.node_length(node)).map(|_| TinySlice {
                score_end: 0,
                last_vp: false,
                last_vn: false,
                score_end_exists: true,
            }),
        );
        slice.num_cells += graph.node_length(node);
    }
    slice
}

/// Project the band, pick a method by its size, and fill one block into the
/// scratch work slice.
#[allow(clippy::too_many_arguments)]
pub(crate) fn pick_method_and_extend_fill(
    graph: &AlignmentGraph,
    params: &AlignerParams,
    sequence: &[u8],
    previous: &SqrtSlice,
    previous_band: &[bool],
    current_band: &mut [bool],
    part_of_component: &mut [usize],
    calculables: &mut crate::core::unique_queue::UniqueQueue,
    processed: &mut [bool],
    work: &mut WorkSlice,
    bandwidth: usize,
) -> BlockResult {
    let j = previous.j + WORD_SIZE as i64;
    debug_assert!(sequence.len() as i64 >= j + WORD_SIZE as i64);
    let band_nodes = project_forward_from_min_score(
        graph,
        previous.min_score,
        previous,
        bandwidth,
        params.alternate_method_cutoff,
    );
    debug_assert!(!band_nodes.is_empty());
    let cells: usize = band_nodes.iter().map(|&n| graph.node_length(n)).sum();
    if cells < params.alternate_method_cutoff {
        work.reserve(cells);
        for &node in &band_nodes {
            work.add_node(node, graph.node_length(node), WordSlice::default());
            current_band[node] = true;
        }
        let slice_result = calculate_slice(
            graph,
            sequence,
            j,
            work,
            &previous.scores,
            &band_nodes,
            current_band,
            previous_band,
            part_of_component,
            calculables,
        );
        debug_assert!(slice_result.min_score >= previous.min_score);
        let correctness = previous
            .correctness
            .next_state(slice_result.min_score - previous.min_score, WORD_SIZE);
        BlockResult {
            j,
            min_score: slice_result.min_score,
            min_score_index: slice_result.min_score_index,
            correctness,
            cells_processed: slice_result.cells_processed,
            num_cells: cells,
            node_count: band_nodes.len(),
        }
    } else {
        let slice_result = calculate_slice_alternate(
            graph,
            sequence,
            j as usize,
            work,
            previous,
            processed,
            bandwidth,
        );
        let num_cells =
            finalize_alternate_slice(graph, work, current_band, sequence.len() as Score, bandwidth);
        debug_assert!(slice_result.min_score >= previous.min_score);
        let correctness = previous
            .correctness
            .next_state(slice_result.min_score - previous.min_score, WORD_SIZE);
        BlockResult {
            j,
            min_score: slice_result.min_score,
            min_score_index: slice_result.min_score_index,
            correctness,
            cells_processed: slice_result.cells_processed,
            num_cells,
            node_count: work.nodes().len(),
        }
    }
}

/// Drive all blocks of one directional alignment, producing the sampled
/// table. Stops early when the correctness tracker says the alignment is
/// unrecoverably lost.
pub fn get_sqrt_slices(
    graph: &AlignmentGraph,
    params: &AlignerParams,
    sequence: &[u8],
    initial_slice: SqrtSlice,
    num_slices: usize,
    sampling_frequency: usize,
    scratch: &mut AlignerScratch,
) -> DPTable {
    debug_assert_eq!(initial_slice.j, -(WORD_SIZE as i64));
    debug_assert!((num_slices * WORD_SIZE) as i64 + initial_slice.j <= sequence.len() as i64);
    let mut result = DPTable {
        sampling_frequency,
        ..Default::default()
    };
    scratch.reset();
    for &node in initial_slice.nodes() {
        scratch.previous_band[node] = true;
    }
    // an unset ramp bandwidth still has to give the first block a band
    let ramp_bandwidth = if params.ramp_bandwidth == 0 {
        params.initial_bandwidth
    } else {
        params.ramp_bandwidth
    };
    let mut last_slice = initial_slice;
    debug_assert!(last_slice.correctness.currently_correct());
    let mut store_slice = last_slice.clone();
    let mut ramp_slice = last_slice.clone();
    let mut ramp_redo_index: i64 = -1;
    let mut ramp_until: i64 = 0;
    let mut override_preslice = last_slice.clone();
    let mut override_temps: Vec<FullSlice> = Vec::new();
    let mut overriding = false;
    let mut slice_index: i64 = 0;

    while slice_index < num_slices as i64 {
        let bandwidth = if ramp_until >= slice_index {
            ramp_bandwidth
        } else {
            params.initial_bandwidth
        };
        let block = pick_method_and_extend_fill(
            graph,
            params,
            sequence,
            &last_slice,
            &scratch.previous_band,
            &mut scratch.current_band,
            &mut scratch.part_of_component,
            &mut scratch.calculables,
            &mut scratch.processed,
            &mut scratch.slice,
            bandwidth,
        );
        log::trace!(
            "block {} bandwidth {} cells {} min {}",
            slice_index,
            bandwidth,
            block.num_cells,
            block.min_score
        );

        if ramp_until == slice_index && block.num_cells >= params.backtrace_override_cutoff {
            ramp_until += 1;
        }
        if (ramp_until == slice_index - 1
            || (ramp_until < slice_index
                && block.correctness.currently_correct()
                && block.correctness.false_from_correct()))
            && last_slice.num_cells < params.backtrace_override_cutoff
        {
            ramp_slice = last_slice.clone();
            ramp_redo_index = slice_index - 1;
        }
        debug_assert_eq!(block.j, last_slice.j + WORD_SIZE as i64);
        result.cells_processed += block.cells_processed;

        if !block.correctness.correct_from_correct() {
            scratch.slice.clear();
            break;
        }
        if !block.correctness.currently_correct()
            && ramp_until < slice_index
            && params.ramp_bandwidth > params.initial_bandwidth
        {
            // rewind to the ramp checkpoint and replay at the wider band
            for &node in scratch.slice.nodes() {
                scratch.current_band[node] = false;
            }
            for &node in last_slice.nodes() {
                scratch.previous_band[node] = false;
            }
            scratch.slice.clear();
            ramp_until = slice_index;
            std::mem::swap(&mut slice_index, &mut ramp_redo_index);
            std::mem::swap(&mut last_slice, &mut ramp_slice);
            for &node in last_slice.nodes() {
                scratch.previous_band[node] = true;
            }
            while result.bandwidth_per_slice.len() as i64 > slice_index + 1 {
                result.bandwidth_per_slice.pop();
            }
            while result.correctness.len() as i64 > slice_index + 1 {
                result.correctness.pop();
            }
            while result.slices.len() > 1
                && result.slices.last().unwrap().j > slice_index * WORD_SIZE as i64
            {
                result.slices.pop();
            }
            log::debug!("correctness lost, ramping back to block {}", slice_index);
            if overriding {
                if override_preslice.j > last_slice.j {
                    overriding = false;
                    override_temps = Vec::new();
                } else {
                    while override_temps
                        .last()
                        .map_or(false, |t| t.j > last_slice.j)
                    {
                        override_temps.pop();
                    }
                }
            }
            while result
                .backtrace_overrides
                .last()
                .map_or(false, |o| o.endj > last_slice.j)
            {
                result.backtrace_overrides.pop();
            }
            slice_index += 1;
            continue;
        }

        if !overriding
            && block.num_cells >= params.backtrace_override_cutoff
            && last_slice.num_cells < params.backtrace_override_cutoff
        {
            override_preslice = last_slice.clone();
            overriding = true;
            override_temps.push(freeze_full(&scratch.slice, &block));
        } else if overriding {
            if block.num_cells < params.backtrace_override_cutoff {
                debug_assert_eq!(last_slice.j, override_temps.last().unwrap().j);
                result.backtrace_overrides.push(BacktraceOverride::new(
                    graph,
                    sequence,
                    &override_preslice,
                    &override_temps,
                ));
                overriding = false;
                let (startj, endj) = {
                    let last = result.backtrace_overrides.last().unwrap();
                    (last.startj, last.endj)
                };
                while result
                    .slices
                    .last()
                    .map_or(false, |s| s.j >= startj && s.j <= endj)
                {
                    result.slices.pop();
                }
                result.slices.push(last_slice.clone());
                store_slice = freeze_sqrt(&scratch.slice, &block);
                override_temps = Vec::new();
            } else {
                override_temps.push(freeze_full(&scratch.slice, &block));
            }
        }

        result.bandwidth_per_slice.push(bandwidth);
        result.correctness.push(block.correctness);
        if slice_index as usize % sampling_frequency == 0
            && (result.slices.is_empty() || store_slice.j != result.slices.last().unwrap().j)
        {
            let new_store = freeze_sqrt(&scratch.slice, &block);
            result.slices.push(std::mem::replace(&mut store_slice, new_store));
        }
        if estimated_block_memory(&block) < store_slice.estimated_memory_usage() {
            store_slice = freeze_sqrt(&scratch.slice, &block);
        }
        for &node in last_slice.nodes() {
            scratch.previous_band[node] = false;
        }
        debug_assert!(block.min_score != Score::MAX);
        debug_assert!(block.min_score >= last_slice.min_score);
        last_slice = freeze_sqrt(&scratch.slice, &block);
        scratch.slice.clear();
        std::mem::swap(&mut scratch.previous_band, &mut scratch.current_band);
        slice_index += 1;
    }

    if overriding {
        debug_assert_eq!(last_slice.j, override_temps.last().unwrap().j);
        result.backtrace_overrides.push(BacktraceOverride::new(
            graph,
            sequence,
            &override_preslice,
            &override_temps,
        ));
        let (startj, endj) = {
            let last = result.backtrace_overrides.last().unwrap();
            (last.startj, last.endj)
        };
        while result
            .slices
            .last()
            .map_or(false, |s| s.j >= startj && s.j <= endj)
        {
            result.slices.pop();
        }
    }

    #[cfg(debug_assertions)]
    {
        for i in 1..result.slices.len() {
            debug_assert!(i <= 1 || result.slices[i].j > result.slices[i - 1].j);
            debug_assert!(result.slices[i].min_score >= result.slices[i - 1].min_score);
        }
        for i in 1..result.backtrace_overrides.len() {
            debug_assert!(
                result.backtrace_overrides[i].startj > result.backtrace_overrides[i - 1].endj
            );
        }
    }
    result
}

/// Re-expand the blocks between a checkpoint and the next one (or
/// `override_last_j`, whichever comes first) with full bit vectors.
pub fn get_slices_from_table(
    graph: &AlignmentGraph,
    params: &AlignerParams,
    sequence: &[u8],
    override_last_j: i64,
    table: &DPTable,
    start_index: usize,
    scratch: &mut AlignerScratch,
) -> Vec<FullSlice> {
    debug_assert!(start_index < table.slices.len());
    let start_slice =
        ((table.slices[start_index].j + WORD_SIZE as i64) / WORD_SIZE as i64) as usize;
    debug_assert!(override_last_j > (start_slice * WORD_SIZE) as i64);
    let mut end_slice = if start_index == table.slices.len() - 1 {
        table.bandwidth_per_slice.len()
    } else {
        ((table.slices[start_index + 1].j + WORD_SIZE as i64) / WORD_SIZE as i64) as usize
    };
    if (end_slice * WORD_SIZE) as i64 >= override_last_j {
        end_slice = (override_last_j / WORD_SIZE as i64) as usize;
    }
    debug_assert!(end_slice > start_slice);
    debug_assert!(end_slice <= table.bandwidth_per_slice.len());

    let mut result: Vec<FullSlice> = Vec::new();
    scratch.reset();
    for &node in table.slices[start_index].nodes() {
        scratch.previous_band[node] = true;
    }
    let mut last_slice = table.slices[start_index].clone();
    for slice_index in start_slice..end_slice {
        let bandwidth = table.bandwidth_per_slice[slice_index];
        let block = pick_method_and_extend_fill(
            graph,
            params,
            sequence,
            &last_slice,
            &scratch.previous_band,
            &mut scratch.current_band,
            &mut scratch.part_of_component,
            &mut scratch.calculables,
            &mut scratch.processed,
            &mut scratch.slice,
            bandwidth,
        );
        debug_assert!(result
            .last()
            .map_or(true, |r| block.j == r.j + WORD_SIZE as i64));
        debug_assert!(block.min_score >= last_slice.min_score);
        result.push(freeze_full(&scratch.slice, &block));
        for &node in last_slice.nodes() {
            scratch.previous_band[node] = false;
        }
        last_slice = freeze_sqrt(&scratch.slice, &block);
        scratch.slice.clear();
        std::mem::swap(&mut scratch.previous_band, &mut scratch.current_band);
    }
    result
}

/// Drop trailing blocks computed after the correctness estimate went bad,
/// along with any checkpoints past the new end.
pub fn remove_wrongly_aligned_end(table: &mut DPTable) {
    let mut currently_correct = table
        .correctness
        .last()
        .map_or(false, |c| c.currently_correct());
    while !currently_correct {
        if table.correctness.pop().is_none() {
            break;
        }
        table.bandwidth_per_slice.pop();
        match table.correctness.last() {
            Some(c) => currently_correct = c.false_from_correct(),
            None => break,
        }
    }
    if table.correctness.is_empty() {
        table.slices.clear();
    }
    while table.slices.len() > 1
        && table.slices.last().unwrap().j >= (table.correctness.len() * WORD_SIZE) as i64
    {
        table.slices.pop();
    }
}
