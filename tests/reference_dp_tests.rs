//! Property test: on random small cyclic graphs, the engine's score must
//! equal a plain Bellman-Ford edit distance over the product of the graph
//! and the read, for both scoring methods.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use braid_align::graph::AlignmentGraph;
use braid_align::pipelines::graph::orchestrator::Aligner;
use braid_align::pipelines::graph::{AlignerParams, AlignerScratch};
use braid_align::utils::character_match;

const BASES: &[u8] = b"ACGT";

/// Random graph: 2..=10 vertices of 1..=4 bp, random forward edges, every
/// vertex given an out-edge so walks never get stuck (which also makes
/// cycles common).
fn random_graph(rng: &mut StdRng) -> (AlignmentGraph, Vec<u64>) {
    let node_count = rng.gen_range(2..=10u64);
    let mut graph = AlignmentGraph::new();
    for id in 1..=node_count {
        let len = rng.gen_range(1..=4);
        let seq: Vec<u8> = (0..len).map(|_| BASES[rng.gen_range(0..4)]).collect();
        graph.add_node(id, &seq).unwrap();
    }
    for from in 1..=node_count {
        let edges = rng.gen_range(1..=2);
        for _ in 0..edges {
            let to = rng.gen_range(1..=node_count);
            graph.add_edge(from, false, to, false).unwrap();
        }
    }
    graph.finalize();
    (graph, (1..=node_count).collect())
}

/// A read made by walking the graph and sprinkling substitutions, so the
/// alignment stays plausibly correct for the estimator.
fn random_read(rng: &mut StdRng, graph: &AlignmentGraph, length: usize, errors: usize) -> Vec<u8> {
    let forward: Vec<usize> = graph
        .real_nodes()
        .filter(|&v| !graph.is_reverse(v))
        .collect();
    let mut node = forward[rng.gen_range(0..forward.len())];
    let mut read = Vec::with_capacity(length + 4);
    while read.len() < length {
        read.extend_from_slice(graph.node_sequence(node));
        let next = graph.out_neighbors(node);
        node = next[rng.gen_range(0..next.len())];
    }
    read.truncate(length);
    for _ in 0..errors {
        let pos = rng.gen_range(0..read.len());
        read[pos] = BASES[rng.gen_range(0..4)];
    }
    read
}

/// O(|V| * |bp| * |read|) reference: relax vertical and diagonal moves once
/// per row, then horizontal deletions to fixpoint (cycles!).
fn reference_edit_distance(graph: &AlignmentGraph, read: &[u8]) -> i64 {
    let inf = i64::MAX / 4;
    let positions: Vec<usize> = graph
        .real_nodes()
        .flat_map(|v| graph.node_start(v)..graph.node_end(v))
        .collect();
    let graph_predecessors = |p: usize| -> Vec<usize> {
        let v = graph.index_to_node(p);
        if p > graph.node_start(v) {
            vec![p - 1]
        } else {
            graph
                .in_neighbors(v)
                .iter()
                .map(|&u| graph.node_end(u) - 1)
                .collect()
        }
    };
    // row above the matrix: alignment may start anywhere for free
    let mut previous = vec![0i64; graph.size_in_bp()];
    for &row_char in read {
        let mut current = vec![inf; graph.size_in_bp()];
        for &p in &positions {
            let cost = if character_match(row_char, graph.seq_at(p)) {
                0
            } else {
                1
            };
            let mut best = previous[p] + 1;
            for q in graph_predecessors(p) {
                best = best.min(previous[q] + cost);
            }
            current[p] = best;
        }
        let mut changed = true;
        while changed {
            changed = false;
            for &p in &positions {
                for q in graph_predecessors(p) {
                    if current[q] + 1 < current[p] {
                        current[p] = current[q] + 1;
                        changed = true;
                    }
                }
            }
        }
        previous = current;
    }
    positions.iter().map(|&p| previous[p]).min().unwrap()
}

fn engine_score(graph: &AlignmentGraph, read: &[u8], alternate_method_cutoff: usize) -> i64 {
    let params = AlignerParams {
        // wide enough that banding can never cut off the optimum on these
        // tiny graphs
        initial_bandwidth: 70,
        alternate_method_cutoff,
        ..AlignerParams::default()
    };
    let aligner = Aligner::new(graph, params);
    let mut scratch = AlignerScratch::new(graph);
    let result = aligner.align_one_way("read", read, &mut scratch);
    assert!(!result.alignment_failed, "alignment unexpectedly failed");
    assert_eq!(result.alignment.score, result.trace_cost());
    result.alignment.score
}

#[test]
fn test_engine_matches_reference_on_random_graphs() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for case in 0..30 {
        let (graph, _) = random_graph(&mut rng);
        // block-aligned lengths so no padding rows blur the comparison
        let length = if case % 3 == 0 { 128 } else { 64 };
        let errors = rng.gen_range(0..=6);
        let read = random_read(&mut rng, &graph, length, errors);
        let expected = reference_edit_distance(&graph, &read);
        let bit_parallel = engine_score(&graph, &read, 1_000_000);
        assert_eq!(
            bit_parallel, expected,
            "case {}: bit-parallel score differs from reference",
            case
        );
        let alternate = engine_score(&graph, &read, 0);
        assert_eq!(
            alternate, expected,
            "case {}: alternate-method score differs from reference",
            case
        );
    }
}

#[test]
fn test_reference_sanity_on_known_graph() {
    let mut graph = AlignmentGraph::new();
    graph.add_node(1, b"ACA").unwrap();
    graph.add_edge(1, false, 1, false).unwrap();
    graph.finalize();
    assert_eq!(reference_edit_distance(&graph, b"ACAACA"), 0);
    assert_eq!(reference_edit_distance(&graph, b"ACAATA"), 1);
    assert_eq!(reference_edit_distance(&graph, b"AA"), 0);
}
