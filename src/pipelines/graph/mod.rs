//! Sequence-graph alignment pipeline: the bit-parallel banded DP engine and
//! its per-read orchestration.

pub mod alternate;
pub mod backtrace;
pub mod band;
pub mod dp_table;
pub mod driver;
pub mod orchestrator;
pub mod pipeline;
pub mod scc;
pub mod slice_calc;

use crate::core::node_slice::WorkSlice;
use crate::core::unique_queue::UniqueQueue;
use crate::graph::AlignmentGraph;

/// Engine tuning knobs. The cutoffs choose between the two scoring methods
/// and decide when dense runs get dedicated backtrace bookkeeping.
#[derive(Clone, Debug)]
pub struct AlignerParams {
    pub initial_bandwidth: usize,
    /// wider retry bandwidth; 0 disables ramping
    pub ramp_bandwidth: usize,
    /// bands below this many base pairs use the cell-by-cell method
    pub alternate_method_cutoff: usize,
    /// blocks with at least this many cells are recorded as overrides
    pub backtrace_override_cutoff: usize,
}

impl Default for AlignerParams {
    fn default() -> Self {
        AlignerParams {
            initial_bandwidth: 35,
            ramp_bandwidth: 0,
            alternate_method_cutoff: 10_000,
            backtrace_override_cutoff: 50_000,
        }
    }
}

/// Per-thread mutable state: the dense slice map, band bitsets, component
/// labels, the processed-cell bitset for the alternate method, and the
/// propagation queue. Owned by one worker, reused across blocks and reads;
/// nothing here is shared.
pub struct AlignerScratch {
    pub(crate) slice: WorkSlice,
    pub(crate) current_band: Vec<bool>,
    pub(crate) previous_band: Vec<bool>,
    pub(crate) part_of_component: Vec<usize>,
    pub(crate) processed: Vec<bool>,
    pub(crate) calculables: UniqueQueue,
}

impl AlignerScratch {
    pub fn new(graph: &AlignmentGraph) -> Self {
        AlignerScratch {
            slice: WorkSlice::new(graph.node_size()),
            current_band: vec![false; graph.node_size()],
            previous_band: vec![false; graph.node_size()],
            part_of_component: vec![usize::MAX; graph.node_size()],
            processed: vec![false; graph.size_in_bp()],
            calculables: UniqueQueue::new(graph.node_size()),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.slice.clear();
        for flag in &mut self.current_band {
            *flag = false;
        }
        for flag in &mut self.previous_band {
            *flag = false;
        }
        for label in &mut self.part_of_component {
            *label = usize::MAX;
        }
        for flag in &mut self.processed {
            *flag = false;
        }
        self.calculables.clear();
    }
}
