//! Graph input: GFA-style text with `S` segment and `L` link lines.
//!
//! Each segment becomes a biological node (both strands); links are
//! mirrored automatically by the graph builder. Link overlaps must agree
//! across the file and become the graph's de-Bruijn overlap constant.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::graph::{AlignmentGraph, GraphError};

fn parse_orientation(field: &str, line_number: usize) -> Result<bool, GraphError> {
    match field {
        "+" => Ok(false),
        "-" => Ok(true),
        other => Err(GraphError::Parse(format!(
            "line {}: invalid orientation {:?}",
            line_number, other
        ))),
    }
}

fn parse_overlap(field: &str, line_number: usize) -> Result<usize, GraphError> {
    if field == "*" {
        return Ok(0);
    }
    let digits = field.strip_suffix('M').unwrap_or(field);
    digits.parse().map_err(|_| {
        GraphError::Parse(format!(
            "line {}: invalid overlap {:?}",
            line_number, field
        ))
    })
}

/// Load a graph from a GFA-style file and finalize it.
pub fn load_graph(path: &Path) -> Result<AlignmentGraph, GraphError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut graph = AlignmentGraph::new();
    // links may reference segments defined later; apply them after parsing
    let mut links: Vec<(u64, bool, u64, bool)> = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        match fields[0] {
            "S" => {
                if fields.len() < 3 {
                    return Err(GraphError::Parse(format!(
                        "line {}: segment line needs an id and a sequence",
                        line_number
                    )));
                }
                let id: u64 = fields[1].parse().map_err(|_| {
                    GraphError::Parse(format!(
                        "line {}: segment id {:?} is not numeric",
                        line_number, fields[1]
                    ))
                })?;
                graph.add_node(id, fields[2].to_ascii_uppercase().as_bytes())?;
            }
            "L" => {
                if fields.len() < 5 {
                    return Err(GraphError::Parse(format!(
                        "line {}: link line needs from/to ids and orientations",
                        line_number
                    )));
                }
                let from: u64 = fields[1].parse().map_err(|_| {
                    GraphError::Parse(format!(
                        "line {}: link id {:?} is not numeric",
                        line_number, fields[1]
                    ))
                })?;
                let from_reverse = parse_orientation(fields[2], line_number)?;
                let to: u64 = fields[3].parse().map_err(|_| {
                    GraphError::Parse(format!(
                        "line {}: link id {:?} is not numeric",
                        line_number, fields[3]
                    ))
                })?;
                let to_reverse = parse_orientation(fields[4], line_number)?;
                if fields.len() > 5 {
                    graph.set_dbg_overlap(parse_overlap(fields[5], line_number)?)?;
                }
                links.push((from, from_reverse, to, to_reverse));
            }
            // headers, paths and annotation lines are not part of the
            // alignment graph
            _ => {}
        }
    }

    for (from, from_reverse, to, to_reverse) in links {
        graph.add_edge(from, from_reverse, to, to_reverse)?;
    }
    graph.finalize();
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_simple_graph() {
        let file = write_temp("H\tVN:Z:1.0\nS\t1\tACGT\nS\t2\tGG\nL\t1\t+\t2\t+\t0M\n");
        let graph = load_graph(file.path()).unwrap();
        assert!(graph.finalized());
        let v1 = graph.lookup(2).unwrap();
        let v2 = graph.lookup(4).unwrap();
        assert_eq!(graph.node_sequence(v1), b"ACGT");
        assert_eq!(graph.out_neighbors(v1), &[v2]);
        assert_eq!(graph.dbg_overlap(), 0);
    }

    #[test]
    fn test_link_before_segment() {
        let file = write_temp("L\t1\t+\t2\t+\t*\nS\t1\tA\nS\t2\tC\n");
        let graph = load_graph(file.path()).unwrap();
        let v1 = graph.lookup(2).unwrap();
        assert_eq!(graph.out_neighbors(v1).len(), 1);
    }

    #[test]
    fn test_overlap_consistency() {
        let file = write_temp("S\t1\tACGT\nS\t2\tCGTA\nL\t1\t+\t2\t+\t3M\nL\t2\t+\t1\t+\t4M\n");
        assert!(matches!(
            load_graph(file.path()),
            Err(GraphError::InconsistentOverlap { .. })
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        let file = write_temp("S\tone\tACGT\n");
        assert!(matches!(load_graph(file.path()), Err(GraphError::Parse(_))));
    }
}
