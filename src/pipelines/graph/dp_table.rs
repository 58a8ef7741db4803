//! Data model of a directional alignment: per-block snapshots, the sampled
//! table, and the two-directional split produced by seeded alignment.

use crate::core::correctness::AlignmentCorrectnessEstimationState;
use crate::core::node_slice::{FullScores, SqrtScores};
use crate::core::word_slice::{Score, WORD_SIZE};
use crate::pipelines::graph::backtrace::BacktraceOverride;

/// One cell of the conceptual |read| x |graph bases| matrix: a concatenated
/// graph base index and a read position. The read position is -1 on the
/// sentinel row above the matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatrixPosition {
    pub index: usize,
    pub read_pos: i64,
}

impl MatrixPosition {
    pub fn new(index: usize, read_pos: i64) -> Self {
        MatrixPosition { index, read_pos }
    }
}

/// A 64-row block frozen down to its boundary scores. This is what the
/// driver keeps as checkpoints and carries forward between blocks.
#[derive(Clone)]
pub struct SqrtSlice {
    /// top read row of the block; -64 on the initial slice
    pub j: i64,
    pub min_score: Score,
    /// every base position achieving the block minimum
    pub min_score_index: Vec<usize>,
    pub scores: SqrtScores,
    pub correctness: AlignmentCorrectnessEstimationState,
    pub cells_processed: usize,
    pub num_cells: usize,
}

impl SqrtSlice {
    pub fn nodes(&self) -> &[usize] {
        self.scores.order()
    }

    pub fn estimated_memory_usage(&self) -> usize {
        self.scores.estimated_memory_usage()
    }
}

/// A 64-row block with complete bit vectors, used for override runs and for
/// segments recomputed during backtrace.
pub struct FullSlice {
    pub j: i64,
    pub min_score: Score,
    pub min_score_index: Vec<usize>,
    pub scores: FullScores,
    pub num_cells: usize,
    pub cells_processed: usize,
}

impl FullSlice {
    pub fn nodes(&self) -> &[usize] {
        self.scores.order()
    }
}

/// The sampled record of one directional alignment.
#[derive(Default)]
pub struct DPTable {
    /// sparse checkpoints, spaced `sampling_frequency` blocks apart
    pub slices: Vec<SqrtSlice>,
    pub sampling_frequency: usize,
    /// per block, not per checkpoint
    pub bandwidth_per_slice: Vec<usize>,
    pub correctness: Vec<AlignmentCorrectnessEstimationState>,
    pub backtrace_overrides: Vec<BacktraceOverride>,
    /// total DP cells touched while building the table
    pub cells_processed: usize,
}

/// Seeded alignment splits the read at the seed: the backward table covers
/// the reverse complement of the prefix, the forward table the suffix.
#[derive(Default)]
pub struct TwoDirectionalSplitAlignment {
    pub sequence_split_index: usize,
    pub forward: DPTable,
    pub backward: DPTable,
}

impl TwoDirectionalSplitAlignment {
    /// Read bases estimated to be aligned before correctness was lost, used
    /// to rank alignments from different seeds.
    pub fn estimated_correctly_aligned(&self) -> usize {
        (self.forward.bandwidth_per_slice.len() + self.backward.bandwidth_per_slice.len())
            * WORD_SIZE
    }
}
