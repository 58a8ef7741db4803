//! Strongly connected components of the in-band induced subgraph.
//!
//! Tarjan with an explicit frame stack; band subgraphs routinely hold tens
//! of thousands of vertices and a recursive formulation would blow the
//! stack. Components come out in reverse topological order (every component
//! is emitted after all components it has edges into), so the slice
//! calculator walks the result backwards to process sources first.

use std::collections::{HashMap, HashSet};

use crate::graph::AlignmentGraph;

struct Frame {
    node: usize,
    neighbor_index: usize,
}

pub fn strongly_connected_components(
    nodes: &[usize],
    current_band: &[bool],
    graph: &AlignmentGraph,
) -> Vec<Vec<usize>> {
    let mut result: Vec<Vec<usize>> = Vec::new();
    let mut index: HashMap<usize, usize> = HashMap::with_capacity(nodes.len());
    let mut low_link: HashMap<usize, usize> = HashMap::with_capacity(nodes.len());
    let mut on_stack: HashSet<usize> = HashSet::with_capacity(nodes.len());
    let mut stack: Vec<usize> = Vec::with_capacity(nodes.len());
    let mut counter = 0usize;
    let mut frames: Vec<Frame> = Vec::new();

    for &start in nodes {
        debug_assert!(current_band[start]);
        if index.contains_key(&start) {
            continue;
        }
        index.insert(start, counter);
        low_link.insert(start, counter);
        counter += 1;
        stack.push(start);
        on_stack.insert(start);
        frames.push(Frame {
            node: start,
            neighbor_index: 0,
        });
        while !frames.is_empty() {
            let top = frames.len() - 1;
            let node = frames[top].node;
            let neighbors = graph.out_neighbors(node);
            let mut descended = false;
            while frames[top].neighbor_index < neighbors.len() {
                let neighbor = neighbors[frames[top].neighbor_index];
                frames[top].neighbor_index += 1;
                if !current_band[neighbor] {
                    continue;
                }
                if !index.contains_key(&neighbor) {
                    index.insert(neighbor, counter);
                    low_link.insert(neighbor, counter);
                    counter += 1;
                    stack.push(neighbor);
                    on_stack.insert(neighbor);
                    frames.push(Frame {
                        node: neighbor,
                        neighbor_index: 0,
                    });
                    descended = true;
                    break;
                } else if on_stack.contains(&neighbor) {
                    let neighbor_index = index[&neighbor];
                    let link = low_link[&node].min(neighbor_index);
                    low_link.insert(node, link);
                }
            }
            if descended {
                continue;
            }
            frames.pop();
            if let Some(parent) = frames.last() {
                let link = low_link[&parent.node].min(low_link[&node]);
                low_link.insert(parent.node, link);
            }
            if low_link[&node] == index[&node] {
                let mut component = Vec::new();
                loop {
                    let member = stack.pop().expect("tarjan stack underflow");
                    on_stack.remove(&member);
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                result.push(component);
            }
        }
    }

    debug_assert!(stack.is_empty());
    debug_assert!(on_stack.is_empty());
    debug_assert_eq!(index.len(), nodes.len());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AlignmentGraph;

    fn band_of(graph: &AlignmentGraph, nodes: &[usize]) -> Vec<bool> {
        let mut band = vec![false; graph.node_size()];
        for &n in nodes {
            band[n] = true;
        }
        band
    }

    #[test]
    fn test_chain_is_singletons_in_reverse_topological_order() {
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"A").unwrap();
        g.add_node(2, b"C").unwrap();
        g.add_node(3, b"G").unwrap();
        g.add_edge(1, false, 2, false).unwrap();
        g.add_edge(2, false, 3, false).unwrap();
        g.finalize();
        let v1 = g.lookup(2).unwrap();
        let v2 = g.lookup(4).unwrap();
        let v3 = g.lookup(6).unwrap();
        let nodes = vec![v1, v2, v3];
        let band = band_of(&g, &nodes);
        let components = strongly_connected_components(&nodes, &band, &g);
        assert_eq!(components.len(), 3);
        // sinks first: walking the result backwards gives topological order
        assert_eq!(components[0], vec![v3]);
        assert_eq!(components[2], vec![v1]);
    }

    #[test]
    fn test_cycle_is_one_component() {
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"AC").unwrap();
        g.add_node(2, b"GT").unwrap();
        g.add_node(3, b"TT").unwrap();
        g.add_edge(1, false, 2, false).unwrap();
        g.add_edge(2, false, 1, false).unwrap();
        g.add_edge(2, false, 3, false).unwrap();
        g.finalize();
        let v1 = g.lookup(2).unwrap();
        let v2 = g.lookup(4).unwrap();
        let v3 = g.lookup(6).unwrap();
        let nodes = vec![v1, v2, v3];
        let band = band_of(&g, &nodes);
        let components = strongly_connected_components(&nodes, &band, &g);
        assert_eq!(components.len(), 2);
        let cycle = components.iter().find(|c| c.len() == 2).unwrap();
        assert!(cycle.contains(&v1) && cycle.contains(&v2));
        // the cycle points at v3, so v3 is emitted first
        assert_eq!(components[0], vec![v3]);
    }

    #[test]
    fn test_band_restriction_cuts_edges() {
        let mut g = AlignmentGraph::new();
        g.add_node(1, b"A").unwrap();
        g.add_node(2, b"C").unwrap();
        g.add_edge(1, false, 2, false).unwrap();
        g.add_edge(2, false, 1, false).unwrap();
        g.finalize();
        let v1 = g.lookup(2).unwrap();
        // v2 outside the band: the 2-cycle degenerates to a singleton
        let nodes = vec![v1];
        let band = band_of(&g, &nodes);
        let components = strongly_connected_components(&nodes, &band, &g);
        assert_eq!(components, vec![vec![v1]]);
    }
}
