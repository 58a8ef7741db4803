//! Per-read orchestration: the seed-free and the seeded alignment entry
//! points, the forward/backward split around a seed, and the conversion of
//! matrix traces into alignment records.

use std::time::Instant;

use crate::alignment::{
    AlignmentRecord, AlignmentResult, Edit, Mapping, Position, TraceItem, TraceMatchType,
};
use crate::core::word_slice::{Score, WORD_SIZE};
use crate::graph::AlignmentGraph;
use crate::pipelines::graph::backtrace::get_trace_from_table;
use crate::pipelines::graph::dp_table::{MatrixPosition, TwoDirectionalSplitAlignment};
use crate::pipelines::graph::driver::{
    get_sqrt_slices, initial_full_start_slice, initial_slice_one_node, remove_wrongly_aligned_end,
    sampling_frequency,
};
use crate::pipelines::graph::{AlignerParams, AlignerScratch};
use crate::utils::{character_match, reverse_complement};

/// One seed hit: a biological node, a read offset, and the strand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedHit {
    pub node_id: u64,
    pub read_offset: usize,
    pub reverse: bool,
}

type ScoredTrace = (Score, Vec<MatrixPosition>);

struct BestSeedAlignment {
    forward: ScoredTrace,
    backward: ScoredTrace,
    estimated: usize,
    seed: SeedHit,
}

/// The aligner: an immutable graph plus tuning parameters. All mutable
/// state lives in the caller's [`AlignerScratch`].
pub struct Aligner<'a> {
    graph: &'a AlignmentGraph,
    params: AlignerParams,
}

impl<'a> Aligner<'a> {
    pub fn new(graph: &'a AlignmentGraph, params: AlignerParams) -> Self {
        assert!(graph.finalized());
        Aligner { graph, params }
    }

    /// Seed-free alignment: the read may start anywhere in the graph.
    pub fn align_one_way(
        &self,
        seq_id: &str,
        sequence: &[u8],
        scratch: &mut AlignerScratch,
    ) -> AlignmentResult {
        let start_time = Instant::now();
        let sequence: Vec<u8> = sequence.iter().map(|c| c.to_ascii_uppercase()).collect();
        let (score, positions, cells_processed) = self.backtrace_full_start(&sequence, scratch);
        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        if score == Score::MAX || positions.is_empty() {
            return AlignmentResult::failed(seq_id, elapsed_ms, cells_processed);
        }
        let trace_items = self.full_trace_info(&sequence, &positions);
        let mut result =
            self.trace_to_alignment(seq_id, &sequence, score, &positions, cells_processed);
        if result.alignment_failed {
            result.elapsed_ms = elapsed_ms;
            return result;
        }
        result.trace = trace_items;
        // the table minimum includes whatever the padded tail rows cost;
        // the read's own score is the cost of the stripped trace
        result.alignment.score = result.trace_cost();
        result.alignment_start = positions[0].read_pos;
        result.alignment_end = positions.last().unwrap().read_pos;
        result.elapsed_ms = elapsed_ms;
        result
    }

    /// Seeded alignment: try every seed hit, skipping ones inside regions an
    /// earlier seed already aligned, and keep the alignment estimated to
    /// cover the most read bases.
    pub fn align_one_way_seeded(
        &self,
        seq_id: &str,
        sequence: &[u8],
        seed_hits: &[SeedHit],
        scratch: &mut AlignerScratch,
    ) -> AlignmentResult {
        let start_time = Instant::now();
        assert!(!seed_hits.is_empty());
        let sequence: Vec<u8> = sequence.iter().map(|c| c.to_ascii_uppercase()).collect();
        let mut best: Option<BestSeedAlignment> = None;
        let mut tried_regions: Vec<(usize, usize, usize)> = Vec::new();
        let mut cells_processed = 0usize;
        for (i, seed) in seed_hits.iter().enumerate() {
            log::debug!(
                "seed {}/{}: node {}{} at read offset {}",
                i + 1,
                seed_hits.len(),
                seed.node_id,
                if seed.reverse { '-' } else { '+' },
                seed.read_offset
            );
            let node_index = match self.graph.lookup(seed.node_id * 2) {
                Some(node) => node,
                None => {
                    log::warn!("seed references unknown node {}, skipping", seed.node_id);
                    continue;
                }
            };
            if tried_regions
                .iter()
                .any(|&(start, end, node)| {
                    start <= seed.read_offset && end >= seed.read_offset && node == node_index
                })
            {
                log::debug!("seed {} already covered by an earlier alignment", i + 1);
                continue;
            }
            let split = self.split_alignment(&sequence, seed, scratch);
            cells_processed += split.forward.cells_processed + split.backward.cells_processed;
            let (forward, backward) = self.piecewise_traces_from_split(&split, &sequence, scratch);
            self.add_alignment_nodes(&mut tried_regions, &forward.1, &backward.1);
            let estimated = split.estimated_correctly_aligned();
            if best.as_ref().map_or(true, |b| estimated > b.estimated) {
                best = Some(BestSeedAlignment {
                    forward,
                    backward,
                    estimated,
                    seed: seed.clone(),
                });
            }
        }
        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        let best = match best {
            Some(best) => best,
            None => return AlignmentResult::failed(seq_id, elapsed_ms, cells_processed),
        };
        if best.forward.0 == Score::MAX && best.backward.0 == Score::MAX {
            return AlignmentResult::failed(seq_id, elapsed_ms, cells_processed);
        }
        let trace_items = self.trace_info(&sequence, &best.backward.1, &best.forward.1);
        let forward_result =
            self.trace_to_alignment(seq_id, &sequence, best.forward.0, &best.forward.1, 0);
        let backward_result =
            self.trace_to_alignment(seq_id, &sequence, best.backward.0, &best.backward.1, 0);
        if forward_result.alignment_failed && backward_result.alignment_failed {
            return AlignmentResult::failed(seq_id, elapsed_ms, cells_processed);
        }
        let mut result = self.merge_alignments(backward_result, forward_result);
        result.trace = trace_items;
        result.alignment.score = result.trace_cost();
        let last_aligned = if !best.backward.1.is_empty() {
            best.backward.1[0].read_pos
        } else {
            debug_assert!(!best.forward.1.is_empty());
            best.seed.read_offset as i64
        };
        result.alignment.query_position = last_aligned;
        result.alignment_start = last_aligned;
        result.alignment_end = last_aligned + best.estimated as i64;
        result.cells_processed = cells_processed;
        result.elapsed_ms = elapsed_ms;
        result
    }

    fn backtrace_full_start(
        &self,
        sequence: &[u8],
        scratch: &mut AlignerScratch,
    ) -> (Score, Vec<MatrixPosition>, usize) {
        let mut padded = sequence.to_vec();
        while padded.len() % WORD_SIZE != 0 {
            padded.push(b'N');
        }
        let initial = initial_full_start_slice(self.graph);
        let frequency = sampling_frequency(padded.len());
        let mut table = get_sqrt_slices(
            self.graph,
            &self.params,
            &padded,
            initial,
            padded.len() / WORD_SIZE,
            frequency,
            scratch,
        );
        remove_wrongly_aligned_end(&mut table);
        let cells_processed = table.cells_processed;
        let (score, mut positions) =
            get_trace_from_table(self.graph, &self.params, &padded, &table, scratch);
        if score == Score::MAX || positions.is_empty() {
            return (Score::MAX, Vec::new(), cells_processed);
        }
        while positions
            .last()
            .map_or(false, |p| p.read_pos >= sequence.len() as i64)
        {
            positions.pop();
        }
        debug_assert_eq!(positions[0].read_pos, 0);
        debug_assert_eq!(
            positions.last().unwrap().read_pos,
            sequence.len() as i64 - 1
        );
        (score, positions, cells_processed)
    }

    fn split_alignment(
        &self,
        sequence: &[u8],
        seed: &SeedHit,
        scratch: &mut AlignerScratch,
    ) -> TwoDirectionalSplitAlignment {
        debug_assert!(seed.read_offset < sequence.len());
        let (forward_node, backward_node) = if seed.reverse {
            (
                self.graph.lookup(seed.node_id * 2 + 1).unwrap(),
                self.graph.lookup(seed.node_id * 2).unwrap(),
            )
        } else {
            (
                self.graph.lookup(seed.node_id * 2).unwrap(),
                self.graph.lookup(seed.node_id * 2 + 1).unwrap(),
            )
        };
        debug_assert_eq!(
            self.graph.node_length(forward_node),
            self.graph.node_length(backward_node)
        );
        let overlap = self.graph.dbg_overlap();
        let mut result = TwoDirectionalSplitAlignment {
            sequence_split_index: seed.read_offset,
            ..Default::default()
        };
        if seed.read_offset > 0 {
            debug_assert!(sequence.len() >= seed.read_offset + overlap);
            let prefix_end = (seed.read_offset + overlap).min(sequence.len());
            let mut part = reverse_complement(&sequence[..prefix_end]);
            while part.len() % WORD_SIZE != 0 {
                part.push(b'N');
            }
            let initial = initial_slice_one_node(self.graph, backward_node);
            let frequency = sampling_frequency(part.len());
            let mut table = get_sqrt_slices(
                self.graph,
                &self.params,
                &part,
                initial,
                part.len() / WORD_SIZE,
                frequency,
                scratch,
            );
            remove_wrongly_aligned_end(&mut table);
            result.backward = table;
        }
        if seed.read_offset < sequence.len() - 1 {
            let mut part = sequence[seed.read_offset..].to_vec();
            while part.len() % WORD_SIZE != 0 {
                part.push(b'N');
            }
            let initial = initial_slice_one_node(self.graph, forward_node);
            let frequency = sampling_frequency(part.len());
            let mut table = get_sqrt_slices(
                self.graph,
                &self.params,
                &part,
                initial,
                part.len() / WORD_SIZE,
                frequency,
                scratch,
            );
            remove_wrongly_aligned_end(&mut table);
            result.forward = table;
        }
        result
    }

    /// Backtrace both directional tables and put the traces into whole-read
    /// coordinates: the backward trace is reflected onto the forward strand
    /// and the forward trace shifted past the split point.
    fn piecewise_traces_from_split(
        &self,
        split: &TwoDirectionalSplitAlignment,
        sequence: &[u8],
        scratch: &mut AlignerScratch,
    ) -> (ScoredTrace, ScoredTrace) {
        let overlap = self.graph.dbg_overlap();
        let split_index = split.sequence_split_index;
        let mut forward: ScoredTrace = (0, Vec::new());
        let mut backward: ScoredTrace = (0, Vec::new());
        if split_index < sequence.len() - 1 && !split.forward.slices.is_empty() {
            let mut part = sequence[split_index..].to_vec();
            while part.len() % WORD_SIZE != 0 {
                part.push(b'N');
            }
            debug_assert!(sequence.len() >= split_index + overlap);
            let backtraceable = (sequence.len() - split_index).saturating_sub(overlap);
            forward = get_trace_from_table(self.graph, &self.params, &part, &split.forward, scratch);
            while forward
                .1
                .last()
                .map_or(false, |p| p.read_pos >= backtraceable as i64)
            {
                forward.1.pop();
            }
        }
        if split_index > 0 && !split.backward.slices.is_empty() {
            let prefix_end = (split_index + overlap).min(sequence.len());
            let mut part = reverse_complement(&sequence[..prefix_end]);
            while part.len() % WORD_SIZE != 0 {
                part.push(b'N');
            }
            backward =
                get_trace_from_table(self.graph, &self.params, &part, &split.backward, scratch);
            while backward
                .1
                .last()
                .map_or(false, |p| p.read_pos >= split_index as i64)
            {
                backward.1.pop();
            }
            backward.1 = self.reverse_trace(backward.1, split_index as i64 - 1);
            for position in &mut forward.1 {
                position.read_pos += split_index as i64;
            }
        }
        (forward, backward)
    }

    /// Reflect a reverse-complement trace back onto the forward strand.
    fn reverse_trace(&self, mut trace: Vec<MatrixPosition>, end: i64) -> Vec<MatrixPosition> {
        if trace.is_empty() {
            return trace;
        }
        trace.reverse();
        for position in &mut trace {
            position.index = self.graph.reverse_position(position.index);
            debug_assert!(position.read_pos <= end);
            position.read_pos = end - position.read_pos;
        }
        trace
    }

    fn add_alignment_nodes(
        &self,
        tried: &mut Vec<(usize, usize, usize)>,
        forward_trace: &[MatrixPosition],
        backward_trace: &[MatrixPosition],
    ) {
        for trace in [forward_trace, backward_trace] {
            if trace.is_empty() {
                continue;
            }
            let mut old_node = self.graph.index_to_node(trace[0].index);
            let mut start_index = trace[0].read_pos as usize;
            let mut end_index = start_index;
            for position in &trace[1..] {
                let node = self.graph.index_to_node(position.index);
                let read_index = position.read_pos as usize;
                if node != old_node {
                    tried.push((start_index, end_index, old_node));
                    start_index = read_index;
                    old_node = node;
                }
                end_index = read_index;
            }
            tried.push((start_index, end_index, old_node));
        }
    }

    fn first_trace_item(&self, sequence: &[u8], position: MatrixPosition) -> TraceItem {
        let node = self.graph.index_to_node(position.index);
        let graph_char = self.graph.seq_at(position.index);
        let read_char = sequence[position.read_pos as usize];
        TraceItem {
            node_id: self.graph.bio_id(node),
            reverse: self.graph.is_reverse(node),
            offset: position.index - self.graph.node_start(node),
            read_pos: position.read_pos,
            graph_char: graph_char as char,
            read_char: read_char as char,
            item_type: if character_match(read_char, graph_char) {
                TraceMatchType::Match
            } else {
                TraceMatchType::Mismatch
            },
        }
    }

    fn full_trace_info(&self, sequence: &[u8], trace: &[MatrixPosition]) -> Vec<TraceItem> {
        let mut result = Vec::new();
        if let Some(&first) = trace.first() {
            result.push(self.first_trace_item(sequence, first));
        }
        result.extend(self.trace_info_inner(sequence, trace));
        result
    }

    fn trace_info(
        &self,
        sequence: &[u8],
        backward_trace: &[MatrixPosition],
        forward_trace: &[MatrixPosition],
    ) -> Vec<TraceItem> {
        let mut result = Vec::new();
        if !backward_trace.is_empty() {
            result.push(self.first_trace_item(sequence, backward_trace[0]));
            result.extend(self.trace_info_inner(sequence, backward_trace));
        }
        if !backward_trace.is_empty() && !forward_trace.is_empty() {
            let first = forward_trace[0];
            let node = self.graph.index_to_node(first.index);
            result.push(TraceItem {
                node_id: self.graph.bio_id(node),
                reverse: self.graph.is_reverse(node),
                offset: first.index - self.graph.node_start(node),
                read_pos: first.read_pos,
                graph_char: self.graph.seq_at(first.index) as char,
                read_char: sequence[first.read_pos as usize] as char,
                item_type: TraceMatchType::ForwardBackwardSplit,
            });
        }
        if !forward_trace.is_empty() {
            if backward_trace.is_empty() {
                result.push(self.first_trace_item(sequence, forward_trace[0]));
            }
            result.extend(self.trace_info_inner(sequence, forward_trace));
        }
        result
    }

    fn trace_info_inner(&self, sequence: &[u8], trace: &[MatrixPosition]) -> Vec<TraceItem> {
        let mut result = Vec::new();
        for i in 1..trace.len() {
            let new_pos = trace[i];
            let old_pos = trace[i - 1];
            debug_assert!(
                new_pos.read_pos == old_pos.read_pos || new_pos.read_pos == old_pos.read_pos + 1
            );
            let new_node = self.graph.index_to_node(new_pos.index);
            let mut diagonal = new_pos.read_pos == old_pos.read_pos + 1;
            if new_pos.index == old_pos.index {
                // staying on the same base is only diagonal for a
                // single-base self-loop
                let self_loop = self.graph.node_length(new_node) == 1
                    && self.graph.out_neighbors(new_node).contains(&new_node);
                if !(diagonal && self_loop) {
                    diagonal = false;
                }
            }
            let graph_char = self.graph.seq_at(new_pos.index);
            let read_char = sequence[new_pos.read_pos as usize];
            let item_type = if new_pos.read_pos == old_pos.read_pos {
                TraceMatchType::Deletion
            } else if new_pos.index == old_pos.index && !diagonal {
                TraceMatchType::Insertion
            } else {
                debug_assert!(diagonal);
                if character_match(read_char, graph_char) {
                    TraceMatchType::Match
                } else {
                    TraceMatchType::Mismatch
                }
            };
            result.push(TraceItem {
                node_id: self.graph.bio_id(new_node),
                reverse: self.graph.is_reverse(new_node),
                offset: new_pos.index - self.graph.node_start(new_node),
                read_pos: new_pos.read_pos,
                graph_char: graph_char as char,
                read_char: read_char as char,
                item_type,
            });
        }
        result
    }

    /// Convert a matrix trace into the mapping/edit record, skipping any
    /// leading dummy positions.
    fn trace_to_alignment(
        &self,
        seq_id: &str,
        sequence: &[u8],
        score: Score,
        trace: &[MatrixPosition],
        cells_processed: usize,
    ) -> AlignmentResult {
        let graph = self.graph;
        let mut record = AlignmentRecord {
            name: seq_id.to_string(),
            score,
            sequence: String::from_utf8_lossy(sequence).into_owned(),
            query_position: 0,
            path: Vec::new(),
        };
        if trace.is_empty() {
            let mut failed = AlignmentResult::failed(seq_id, 0, cells_processed);
            failed.alignment = record;
            return failed;
        }
        let mut pos = 0usize;
        let mut old_node = graph.index_to_node(trace[0].index);
        while old_node == graph.dummy_node_start() {
            pos += 1;
            if pos == trace.len() {
                return AlignmentResult::failed(seq_id, 0, cells_processed);
            }
            old_node = graph.index_to_node(trace[pos].index);
        }
        if old_node == graph.dummy_node_end() {
            return AlignmentResult::failed(seq_id, 0, cells_processed);
        }
        let mut rank = 0usize;
        let mut mapping = Mapping {
            position: Position {
                node_id: graph.bio_id(old_node),
                is_reverse: graph.is_reverse(old_node),
                offset: trace[pos].index - graph.node_start(old_node),
            },
            rank,
            edits: Vec::new(),
        };
        let mut bt_node_start = trace[pos];
        let mut bt_node_end = trace[pos];
        let mut bt_before_node = trace[pos];
        while pos < trace.len() {
            let position = trace[pos];
            let node = graph.index_to_node(position.index);
            if node == graph.dummy_node_end() {
                break;
            }
            if node == old_node {
                bt_node_end = position;
                pos += 1;
                continue;
            }
            let to_length = (bt_node_end.read_pos - bt_before_node.read_pos) as usize;
            mapping.edits.push(self.make_edit(
                sequence,
                bt_node_end.index - bt_node_start.index + 1,
                to_length,
                bt_node_start.read_pos,
            ));
            record.path.push(mapping);
            old_node = node;
            bt_before_node = bt_node_end;
            bt_node_start = position;
            bt_node_end = position;
            rank += 1;
            mapping = Mapping {
                position: Position {
                    node_id: graph.bio_id(old_node),
                    is_reverse: graph.is_reverse(old_node),
                    offset: position.index - graph.node_start(old_node),
                },
                rank,
                edits: Vec::new(),
            };
            pos += 1;
        }
        let to_length = (bt_node_end.read_pos - bt_before_node.read_pos) as usize;
        mapping.edits.push(self.make_edit(
            sequence,
            bt_node_end.index - bt_node_start.index,
            to_length,
            bt_node_start.read_pos,
        ));
        record.path.push(mapping);
        AlignmentResult {
            alignment: record,
            alignment_failed: false,
            cells_processed,
            elapsed_ms: 0,
            trace: Vec::new(),
            alignment_start: 0,
            alignment_end: 0,
        }
    }

    fn make_edit(
        &self,
        sequence: &[u8],
        from_length: usize,
        to_length: usize,
        read_start: i64,
    ) -> Edit {
        let start = (read_start.max(0) as usize).min(sequence.len());
        let end = (start + to_length).min(sequence.len());
        Edit {
            from_length,
            to_length,
            sequence: String::from_utf8_lossy(&sequence[start..end]).into_owned(),
        }
    }

    /// Join the backward and the forward piece into one record. The pieces
    /// must meet on the same vertex or across an existing edge; if they do
    /// not, the forward piece is appended anyway with a warning.
    fn merge_alignments(
        &self,
        first: AlignmentResult,
        second: AlignmentResult,
    ) -> AlignmentResult {
        debug_assert!(!first.alignment_failed || !second.alignment_failed);
        if first.alignment_failed {
            return second;
        }
        if second.alignment_failed {
            return first;
        }
        if first.alignment.path.is_empty() {
            return second;
        }
        if second.alignment.path.is_empty() {
            return first;
        }
        let mut result = first;
        result.cells_processed += second.cells_processed;
        result.elapsed_ms += second.elapsed_ms;
        result.alignment.score += second.alignment.score;
        let first_end = result.alignment.path.last().unwrap().position.clone();
        let second_start = second.alignment.path[0].position.clone();
        let skip = if first_end.node_id == second_start.node_id
            && first_end.is_reverse == second_start.is_reverse
        {
            1
        } else {
            let first_end_node = self
                .graph
                .lookup(first_end.node_id * 2 + first_end.is_reverse as u64);
            let second_start_node = self
                .graph
                .lookup(second_start.node_id * 2 + second_start.is_reverse as u64);
            let joined = match (first_end_node, second_start_node) {
                (Some(from), Some(to)) => self.graph.out_neighbors(from).contains(&to),
                _ => false,
            };
            if !joined {
                log::warn!(
                    "piecewise alignments cannot be merged: first ends at {}{}, second starts at {}{}",
                    first_end.node_id,
                    if first_end.is_reverse { '-' } else { '+' },
                    second_start.node_id,
                    if second_start.is_reverse { '-' } else { '+' },
                );
            }
            0
        };
        for mapping in second.alignment.path.into_iter().skip(skip) {
            result.alignment.path.push(mapping);
        }
        result
    }
}
