//! Alignment record types: what one aligned read reports back.
//!
//! The record mirrors the conventional variation-graph alignment shape (a
//! named path of node mappings, each with positioned edits) and serializes
//! with serde; the trace items give the per-base edit script the graph
//! record cannot express.

use serde::Serialize;

use crate::core::word_slice::Score;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Position {
    pub node_id: u64,
    pub is_reverse: bool,
    pub offset: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct Edit {
    pub from_length: usize,
    pub to_length: usize,
    pub sequence: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Mapping {
    pub position: Position,
    pub rank: usize,
    pub edits: Vec<Edit>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AlignmentRecord {
    pub name: String,
    pub score: Score,
    pub sequence: String,
    pub query_position: i64,
    pub path: Vec<Mapping>,
}

impl AlignmentRecord {
    pub fn empty(name: &str) -> Self {
        AlignmentRecord {
            name: name.to_string(),
            score: Score::MAX,
            sequence: String::new(),
            query_position: 0,
            path: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceMatchType {
    Match,
    Mismatch,
    Insertion,
    Deletion,
    ForwardBackwardSplit,
}

/// One edit-script entry: where in the graph and the read it happened, what
/// the characters were, and what kind of step it was.
#[derive(Clone, Debug)]
pub struct TraceItem {
    pub node_id: u64,
    pub reverse: bool,
    pub offset: usize,
    pub read_pos: i64,
    pub graph_char: char,
    pub read_char: char,
    pub item_type: TraceMatchType,
}

/// Outcome of aligning one read in one or two directions.
#[derive(Clone, Debug)]
pub struct AlignmentResult {
    pub alignment: AlignmentRecord,
    pub alignment_failed: bool,
    pub cells_processed: usize,
    pub elapsed_ms: u64,
    pub trace: Vec<TraceItem>,
    pub alignment_start: i64,
    pub alignment_end: i64,
}

impl AlignmentResult {
    pub fn failed(name: &str, elapsed_ms: u64, cells_processed: usize) -> Self {
        AlignmentResult {
            alignment: AlignmentRecord::empty(name),
            alignment_failed: true,
            cells_processed,
            elapsed_ms,
            trace: Vec::new(),
            alignment_start: 0,
            alignment_end: 0,
        }
    }

    /// Edit cost recomputed from the trace; matches the reported score on
    /// any successful alignment.
    pub fn trace_cost(&self) -> Score {
        self.trace
            .iter()
            .map(|item| match item.item_type {
                TraceMatchType::Match => 0,
                TraceMatchType::ForwardBackwardSplit => 0,
                _ => 1,
            })
            .sum()
    }
}
