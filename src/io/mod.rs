//! Input and output: FASTQ reads, graph files, seed hits, and alignment
//! records.

pub mod alignment_writer;
pub mod fastq_reader;
pub mod gfa;
pub mod seed_reader;
