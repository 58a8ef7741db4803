//! Sparse vertex -> column-array maps for one DP block.
//!
//! Three representations share one logical interface:
//!
//! * [`WorkSlice`]: the block currently being filled. Lookup goes through a
//!   dense per-vertex table sized to the whole graph, owned by the per-thread
//!   scratch and reused across blocks and reads, so a block fill allocates
//!   nothing. Clearing walks the active vertex list, not the whole table.
//! * [`SqrtScores`]: a frozen checkpoint keeping only the boundary scores of
//!   each cell (the last row's score, its two delta bits, and whether the
//!   last row was reached). This is all any later computation reads from a
//!   previous block.
//! * [`FullScores`]: a frozen copy keeping complete bit vectors, used for
//!   recomputed segments during backtrace and for override runs.

use std::collections::HashMap;
use std::mem;

use crate::core::word_slice::{Score, WordSlice, WORD_SIZE};

#[derive(Clone, Copy)]
struct MapEntry {
    start: usize,
    len: usize,
    min_score: Score,
}

const ABSENT: MapEntry = MapEntry {
    start: usize::MAX,
    len: 0,
    min_score: Score::MAX,
};

/// The block under construction, backed by a dense reusable lookup table.
pub struct WorkSlice {
    map: Vec<MapEntry>,
    nodes: Vec<usize>,
    cells: Vec<WordSlice>,
}

impl WorkSlice {
    pub fn new(node_count: usize) -> Self {
        WorkSlice {
            map: vec![ABSENT; node_count],
            nodes: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Drop all vertices. O(active vertices), the dense table is retained.
    pub fn clear(&mut self) {
        for &node in &self.nodes {
            self.map[node] = ABSENT;
        }
        self.nodes.clear();
        self.cells.clear();
    }

    pub fn reserve(&mut self, cells: usize) {
        self.cells.reserve(cells);
    }

    /// Register a vertex with `len` columns initialized to `template_cell`.
    pub fn add_node(&mut self, node: usize, len: usize, template_cell: WordSlice) {
        debug_assert!(!self.has_node(node));
        debug_assert!(len > 0);
        self.map[node] = MapEntry {
            start: self.cells.len(),
            len,
            min_score: Score::MAX,
        };
        self.nodes.push(node);
        self.cells.resize(self.cells.len() + len, template_cell);
    }

    pub fn has_node(&self, node: usize) -> bool {
        self.map[node].start != usize::MAX
    }

    pub fn node(&self, node: usize) -> &[WordSlice] {
        let entry = self.map[node];
        debug_assert!(entry.start != usize::MAX);
        &self.cells[entry.start..entry.start + entry.len]
    }

    pub fn node_mut(&mut self, node: usize) -> &mut [WordSlice] {
        let entry = self.map[node];
        debug_assert!(entry.start != usize::MAX);
        &mut self.cells[entry.start..entry.start + entry.len]
    }

    /// Copy of a single cell.
    pub fn cell(&self, node: usize, offset: usize) -> WordSlice {
        self.node(node)[offset]
    }

    pub fn set_min_score(&mut self, node: usize, score: Score) {
        debug_assert!(self.has_node(node));
        self.map[node].min_score = score;
    }

    pub fn min_score(&self, node: usize) -> Score {
        debug_assert!(self.has_node(node));
        self.map[node].min_score
    }

    /// Active vertices in insertion order.
    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Checkpoint copy: boundary scores only.
    pub fn freeze_sqrt_end_scores(&self) -> SqrtScores {
        let mut result = SqrtScores::new();
        for &node in &self.nodes {
            let entry = self.map[node];
            let cells = self.node(node).iter().map(TinySlice::from_word_slice);
            result.add_node(node, entry.min_score, cells);
        }
        result
    }

    /// Full copy with complete bit vectors.
    pub fn freeze_scores(&self) -> FullScores {
        let mut result = FullScores::new();
        for &node in &self.nodes {
            let entry = self.map[node];
            result.add_node(node, entry.min_score, self.node(node).iter().copied());
        }
        result
    }
}

/// Boundary scores of one cell: enough to seed the next block and to answer
/// row-62/63 queries, nothing more.
#[derive(Clone, Copy, Debug)]
pub struct TinySlice {
    pub score_end: Score,
    pub last_vp: bool,
    pub last_vn: bool,
    pub score_end_exists: bool,
}

impl TinySlice {
    pub fn from_word_slice(slice: &WordSlice) -> Self {
        let last_bit = 1u64 << (WORD_SIZE - 1);
        TinySlice {
            score_end: slice.score_end,
            last_vp: slice.vp & last_bit != 0,
            last_vn: slice.vn & last_bit != 0,
            score_end_exists: slice.score_end_exists,
        }
    }

    /// Reconstitute a column whose rows 62 and 63 are exact. No other row of
    /// a frozen slice is ever consulted.
    pub fn expand(&self) -> WordSlice {
        let last_bit = 1u64 << (WORD_SIZE - 1);
        let vp = if self.last_vp { last_bit } else { 0 };
        let vn = if self.last_vn { last_bit } else { 0 };
        let score_before_start =
            self.score_end - self.last_vp as Score + self.last_vn as Score;
        let mut slice = WordSlice::new(
            vp,
            vn,
            self.score_end,
            score_before_start,
            WORD_SIZE as u8,
            false,
        );
        slice.score_end_exists = self.score_end_exists;
        slice
    }
}

#[derive(Clone, Copy)]
pub(crate) struct FrozenEntry {
    start: usize,
    len: usize,
    min_score: Score,
}

/// Frozen checkpoint map with compact cells.
#[derive(Default, Clone)]
pub struct SqrtScores {
    nodes: HashMap<usize, FrozenEntry>,
    order: Vec<usize>,
    cells: Vec<TinySlice>,
}

impl SqrtScores {
    pub fn new() -> Self {
        SqrtScores::default()
    }

    pub fn add_node(
        &mut self,
        node: usize,
        min_score: Score,
        cells: impl Iterator<Item = TinySlice>,
    ) {
        debug_assert!(!self.nodes.contains_key(&node));
        let start = self.cells.len();
        self.cells.extend(cells);
        let len = self.cells.len() - start;
        debug_assert!(len > 0);
        self.nodes.insert(
            node,
            FrozenEntry {
                start,
                len,
                min_score,
            },
        );
        self.order.push(node);
    }

    pub fn has_node(&self, node: usize) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node(&self, node: usize) -> &[TinySlice] {
        let entry = &self.nodes[&node];
        &self.cells[entry.start..entry.start + entry.len]
    }

    pub fn node_len(&self, node: usize) -> usize {
        self.nodes[&node].len
    }

    pub fn cell(&self, node: usize, offset: usize) -> TinySlice {
        self.node(node)[offset]
    }

    pub fn min_score(&self, node: usize) -> Score {
        self.nodes[&node].min_score
    }

    /// Vertices in insertion order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn estimated_memory_usage(&self) -> usize {
        self.cells.len() * mem::size_of::<TinySlice>()
            + self.order.len() * (3 * mem::size_of::<usize>() + mem::size_of::<Score>())
    }
}

/// Frozen full-bit-vector map.
#[derive(Default)]
pub struct FullScores {
    nodes: HashMap<usize, FrozenEntry>,
    order: Vec<usize>,
    cells: Vec<WordSlice>,
}

impl FullScores {
    pub fn new() -> Self {
        FullScores::default()
    }

    pub fn add_node(
        &mut self,
        node: usize,
        min_score: Score,
        cells: impl Iterator<Item = WordSlice>,
    ) {
        debug_assert!(!self.nodes.contains_key(&node));
        let start = self.cells.len();
        self.cells.extend(cells);
        let len = self.cells.len() - start;
        debug_assert!(len > 0);
        self.nodes.insert(
            node,
            FrozenEntry {
                start,
                len,
                min_score,
            },
        );
        self.order.push(node);
    }

    pub fn has_node(&self, node: usize) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node(&self, node: usize) -> &[WordSlice] {
        let entry = &self.nodes[&node];
        &self.cells[entry.start..entry.start + entry.len]
    }

    pub fn cell(&self, node: usize, offset: usize) -> WordSlice {
        self.node(node)[offset]
    }

    pub fn min_score(&self, node: usize) -> Score {
        self.nodes[&node].min_score
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }
}
