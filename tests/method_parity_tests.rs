//! The two scoring methods must agree, wider bands can only help, and
//! ramping must be a no-op on reads the narrow band already handles.

use braid_align::alignment::{AlignmentResult, TraceMatchType};
use braid_align::graph::AlignmentGraph;
use braid_align::pipelines::graph::orchestrator::Aligner;
use braid_align::pipelines::graph::{AlignerParams, AlignerScratch};
use braid_align::utils::character_match;

/// A chain with a branch bubble and a back edge, long enough for several
/// blocks.
fn bubble_graph() -> (AlignmentGraph, Vec<u8>) {
    let mut graph = AlignmentGraph::new();
    graph.add_node(1, b"ACGTACGTAC").unwrap();
    graph.add_node(2, b"GGATCC").unwrap();
    graph.add_node(3, b"GGTTCC").unwrap();
    graph.add_node(4, b"TTGACATGCA").unwrap();
    graph.add_node(5, b"CATG").unwrap();
    graph.add_edge(1, false, 2, false).unwrap();
    graph.add_edge(1, false, 3, false).unwrap();
    graph.add_edge(2, false, 4, false).unwrap();
    graph.add_edge(3, false, 4, false).unwrap();
    graph.add_edge(4, false, 5, false).unwrap();
    // back edge makes the bubble region cyclic
    graph.add_edge(5, false, 1, false).unwrap();
    graph.finalize();
    // a read walking 1 -> 2 -> 4 -> 5 -> 1 -> 3 -> 4
    let mut read = Vec::new();
    for seq in [
        b"ACGTACGTAC".as_slice(),
        b"GGATCC",
        b"TTGACATGCA",
        b"CATG",
        b"ACGTACGTAC",
        b"GGTTCC",
        b"TTGACATGCA",
    ] {
        read.extend_from_slice(seq);
    }
    (graph, read)
}

fn align_with(params: AlignerParams, graph: &AlignmentGraph, read: &[u8]) -> AlignmentResult {
    let aligner = Aligner::new(graph, params);
    let mut scratch = AlignerScratch::new(graph);
    aligner.align_one_way("read", read, &mut scratch)
}

fn trace_shape(result: &AlignmentResult) -> Vec<(u64, usize, TraceMatchType)> {
    result
        .trace
        .iter()
        .map(|item| (item.node_id, item.offset, item.item_type))
        .collect()
}

#[test]
fn test_bit_parallel_and_alternate_methods_agree() {
    let (graph, read) = bubble_graph();
    let bit_parallel = align_with(
        AlignerParams {
            initial_bandwidth: 12,
            alternate_method_cutoff: 1_000_000,
            ..AlignerParams::default()
        },
        &graph,
        &read,
    );
    let alternate = align_with(
        AlignerParams {
            initial_bandwidth: 12,
            alternate_method_cutoff: 0,
            ..AlignerParams::default()
        },
        &graph,
        &read,
    );
    assert!(!bit_parallel.alignment_failed);
    assert!(!alternate.alignment_failed);
    assert_eq!(bit_parallel.alignment.score, alternate.alignment.score);
    assert_eq!(trace_shape(&bit_parallel), trace_shape(&alternate));
}

#[test]
fn test_methods_agree_on_noisy_read() {
    let (graph, mut read) = bubble_graph();
    // sprinkle substitutions
    for &pos in &[3usize, 17, 29, 41] {
        read[pos] = match read[pos] {
            b'A' => b'C',
            b'C' => b'G',
            b'G' => b'T',
            _ => b'A',
        };
    }
    let bit_parallel = align_with(
        AlignerParams {
            initial_bandwidth: 12,
            alternate_method_cutoff: 1_000_000,
            ..AlignerParams::default()
        },
        &graph,
        &read,
    );
    let alternate = align_with(
        AlignerParams {
            initial_bandwidth: 12,
            alternate_method_cutoff: 0,
            ..AlignerParams::default()
        },
        &graph,
        &read,
    );
    assert!(!bit_parallel.alignment_failed);
    assert!(!alternate.alignment_failed);
    assert_eq!(bit_parallel.alignment.score, alternate.alignment.score);
    assert_eq!(bit_parallel.alignment.score, 4);
}

#[test]
fn test_wider_bands_never_score_worse() {
    let (graph, mut read) = bubble_graph();
    for &pos in &[5usize, 6, 21, 22, 23, 40, 44] {
        read[pos] = match read[pos] {
            b'A' => b'G',
            b'G' => b'C',
            b'C' => b'T',
            _ => b'A',
        };
    }
    let narrow = align_with(
        AlignerParams {
            initial_bandwidth: 2,
            ..AlignerParams::default()
        },
        &graph,
        &read,
    );
    let wide = align_with(
        AlignerParams {
            initial_bandwidth: 16,
            ..AlignerParams::default()
        },
        &graph,
        &read,
    );
    assert!(!wide.alignment_failed);
    let narrow_score = if narrow.alignment_failed {
        i64::MAX
    } else {
        narrow.alignment.score
    };
    assert!(narrow_score >= wide.alignment.score);
}

#[test]
fn test_ramp_changes_nothing_when_narrow_band_succeeds() {
    let (graph, read) = bubble_graph();
    let plain = align_with(
        AlignerParams {
            initial_bandwidth: 8,
            ramp_bandwidth: 0,
            ..AlignerParams::default()
        },
        &graph,
        &read,
    );
    let ramped = align_with(
        AlignerParams {
            initial_bandwidth: 8,
            ramp_bandwidth: 24,
            ..AlignerParams::default()
        },
        &graph,
        &read,
    );
    assert!(!plain.alignment_failed);
    assert!(!ramped.alignment_failed);
    assert_eq!(plain.alignment.score, ramped.alignment.score);
    assert_eq!(trace_shape(&plain), trace_shape(&ramped));
}

#[test]
fn test_trace_cost_round_trip() {
    let (graph, mut read) = bubble_graph();
    read[10] = b'A';
    read.insert(30, b'T');
    let result = align_with(
        AlignerParams {
            initial_bandwidth: 12,
            ..AlignerParams::default()
        },
        &graph,
        &read,
    );
    assert!(!result.alignment_failed);
    // recount the edit cost by walking the trace
    let mut cost = 0;
    for item in &result.trace {
        match item.item_type {
            TraceMatchType::Match => {
                assert!(character_match(item.read_char as u8, item.graph_char as u8));
            }
            TraceMatchType::Mismatch => {
                assert!(!character_match(item.read_char as u8, item.graph_char as u8));
                cost += 1;
            }
            TraceMatchType::Insertion | TraceMatchType::Deletion => cost += 1,
            TraceMatchType::ForwardBackwardSplit => {}
        }
    }
    assert_eq!(cost, result.alignment.score);
}
