//! End-to-end run: load the graph and seeds, batch the reads through the
//! worker pool, write records, and report throughput.
//!
//! Per-read alignment is strictly sequential inside one worker; the pool
//! shares nothing but the read-only graph. A panic inside the engine is
//! contained to the read that triggered it and reported as a failed
//! alignment.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::time::Instant;

use crossbeam_channel::bounded;
use rayon::prelude::*;

use crate::alignment::AlignmentResult;
use crate::graph::{AlignmentGraph, GraphError};
use crate::io::alignment_writer::{write_augmented_graph, AlignmentWriter};
use crate::io::fastq_reader::{FastqReader, ReadBatch};
use crate::io::gfa::load_graph;
use crate::io::seed_reader::load_seeds;
use crate::pipelines::graph::orchestrator::{Aligner, SeedHit};
use crate::pipelines::graph::{AlignerParams, AlignerScratch};

const BATCH_SIZE: usize = 512;
/// read-ahead depth of the reader thread
const BATCH_QUEUE: usize = 4;

/// What to run: file paths, alignment mode, and engine parameters.
pub struct PipelineConfig {
    pub graph_file: PathBuf,
    pub fastq_file: String,
    pub alignment_file: PathBuf,
    pub augmented_graph_file: Option<PathBuf>,
    pub seed_file: Option<PathBuf>,
    pub full_start: bool,
    pub params: AlignerParams,
}

#[derive(Debug)]
pub enum PipelineError {
    Io(io::Error),
    Graph(GraphError),
    InvalidInput(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Io(e) => write!(f, "I/O error: {}", e),
            PipelineError::Graph(e) => write!(f, "Graph error: {}", e),
            PipelineError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Io(e) => Some(e),
            PipelineError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(e: io::Error) -> Self {
        PipelineError::Io(e)
    }
}

impl From<GraphError> for PipelineError {
    fn from(e: GraphError) -> Self {
        PipelineError::Graph(e)
    }
}

/// Aggregate statistics from one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStatistics {
    pub total_reads: usize,
    pub total_bases: usize,
    pub total_alignments: usize,
    pub failed_reads: usize,
    pub batches_processed: usize,
    pub wall_time_secs: f64,
}

impl PipelineStatistics {
    pub fn reads_per_second(&self) -> f64 {
        if self.wall_time_secs > 0.0 {
            self.total_reads as f64 / self.wall_time_secs
        } else {
            0.0
        }
    }

    pub fn throughput_mbases_per_sec(&self) -> f64 {
        if self.wall_time_secs > 0.0 {
            (self.total_bases as f64 / 1_000_000.0) / self.wall_time_secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for PipelineStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} reads ({:.2} Mbases) in {:.2}s ({:.2} reads/sec, {:.2} Mbases/sec), {} aligned, {} failed",
            self.total_reads,
            self.total_bases as f64 / 1_000_000.0,
            self.wall_time_secs,
            self.reads_per_second(),
            self.throughput_mbases_per_sec(),
            self.total_alignments,
            self.failed_reads
        )
    }
}

fn align_read(
    aligner: &Aligner,
    name: &str,
    sequence: &[u8],
    seeds: Option<&Vec<SeedHit>>,
    full_start: bool,
    scratch: &mut AlignerScratch,
) -> AlignmentResult {
    if sequence.is_empty() {
        return AlignmentResult::failed(name, 0, 0);
    }
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match seeds {
        Some(seeds) if !seeds.is_empty() => {
            aligner.align_one_way_seeded(name, sequence, seeds, scratch)
        }
        _ if full_start => aligner.align_one_way(name, sequence, scratch),
        _ => {
            log::debug!("read {} has no seeds and full start is disabled", name);
            AlignmentResult::failed(name, 0, 0)
        }
    }));
    match outcome {
        Ok(result) => result,
        Err(_) => {
            log::error!("alignment of read {} hit an internal error", name);
            AlignmentResult::failed(name, 0, 0)
        }
    }
}

/// Run the whole pipeline. Returns aggregate statistics on success.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineStatistics, PipelineError> {
    let start_time = Instant::now();

    log::info!("Loading graph from {}", config.graph_file.display());
    let graph: AlignmentGraph = load_graph(&config.graph_file)?;
    log::info!(
        "Graph loaded: {} nodes, {} bp (both strands)",
        graph.node_size(),
        graph.size_in_bp()
    );

    let seeds = match &config.seed_file {
        Some(path) => {
            let seeds = load_seeds(path)?;
            log::info!("Loaded seeds for {} reads", seeds.len());
            Some(seeds)
        }
        None => None,
    };
    if seeds.is_none() && !config.full_start {
        return Err(PipelineError::InvalidInput(
            "either a seed file or full-start alignment must be enabled".to_string(),
        ));
    }

    let reader = FastqReader::new(&config.fastq_file)?;
    let mut writer = AlignmentWriter::create(&config.alignment_file)?;
    let aligner = Aligner::new(&graph, config.params.clone());

    let mut stats = PipelineStatistics::default();
    let mut read_paths: Vec<(String, Vec<(u64, bool)>)> = Vec::new();

    // the reader runs ahead on its own thread; workers drain batches from a
    // bounded channel
    let outcome: Result<(), PipelineError> = std::thread::scope(|scope| {
        let (batch_sender, batch_receiver) = bounded::<io::Result<ReadBatch>>(BATCH_QUEUE);
        scope.spawn(move || {
            let mut reader = reader;
            loop {
                let batch = reader.read_batch(BATCH_SIZE);
                let done = match &batch {
                    Ok(batch) => batch.is_empty(),
                    Err(_) => true,
                };
                if batch_sender.send(batch).is_err() {
                    break;
                }
                if done {
                    break;
                }
            }
        });
        for batch in batch_receiver {
            let batch = batch?;
            if batch.is_empty() {
                break;
            }
            stats.total_reads += batch.len();
            stats.total_bases += batch.bases();
            stats.batches_processed += 1;

            let results: Vec<AlignmentResult> = (0..batch.len())
                .into_par_iter()
                .map_init(
                    || AlignerScratch::new(&graph),
                    |scratch, i| {
                        align_read(
                            &aligner,
                            &batch.names[i],
                            &batch.seqs[i],
                            seeds.as_ref().and_then(|s| s.get(&batch.names[i])),
                            config.full_start,
                            scratch,
                        )
                    },
                )
                .collect();

            for result in results {
                if result.alignment_failed {
                    stats.failed_reads += 1;
                    continue;
                }
                log::debug!(
                    "read {}: score {}, {} cells, {} ms",
                    result.alignment.name,
                    result.alignment.score,
                    result.cells_processed,
                    result.elapsed_ms
                );
                stats.total_alignments += 1;
                if config.augmented_graph_file.is_some() {
                    let steps: Vec<(u64, bool)> = result
                        .alignment
                        .path
                        .iter()
                        .map(|m| (m.position.node_id, m.position.is_reverse))
                        .collect();
                    read_paths.push((result.alignment.name.clone(), steps));
                }
                writer.write(&result.alignment)?;
            }
        }
        Ok(())
    });
    outcome?;
    writer.finish()?;

    if let Some(path) = &config.augmented_graph_file {
        log::info!("Writing augmented graph to {}", path.display());
        write_augmented_graph(path, &graph, &read_paths)?;
    }

    stats.wall_time_secs = start_time.elapsed().as_secs_f64();
    Ok(stats)
}
