//! Seed hit input: tab-separated `read_name  node_id  read_offset  strand`
//! lines, grouped by read name. Order within a read is preserved; the
//! aligner tries seeds in file order.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::pipelines::graph::orchestrator::SeedHit;

pub fn load_seeds(path: &Path) -> io::Result<HashMap<String, Vec<SeedHit>>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut result: HashMap<String, Vec<SeedHit>> = HashMap::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("seed file line {}: expected 4 tab-separated fields", line_number),
            ));
        }
        let node_id: u64 = fields[1].parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("seed file line {}: invalid node id {:?}", line_number, fields[1]),
            )
        })?;
        let read_offset: usize = fields[2].parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "seed file line {}: invalid read offset {:?}",
                    line_number, fields[2]
                ),
            )
        })?;
        let reverse = match fields[3] {
            "+" => false,
            "-" => true,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("seed file line {}: invalid strand {:?}", line_number, other),
                ))
            }
        };
        result.entry(fields[0].to_string()).or_default().push(SeedHit {
            node_id,
            read_offset,
            reverse,
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_grouped_seeds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"read1\t10\t75\t+\nread2\t3\t0\t-\nread1\t11\t120\t+\n")
            .unwrap();
        let seeds = load_seeds(file.path()).unwrap();
        assert_eq!(seeds["read1"].len(), 2);
        assert_eq!(
            seeds["read1"][0],
            SeedHit {
                node_id: 10,
                read_offset: 75,
                reverse: false
            }
        );
        assert_eq!(seeds["read2"][0].reverse, true);
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"read1\t10\n").unwrap();
        assert!(load_seeds(file.path()).is_err());
    }
}
