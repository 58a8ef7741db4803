use clap::Parser;
use std::path::PathBuf;

use braid_align::pipelines::graph::pipeline::{run_pipeline, PipelineConfig};
use braid_align::pipelines::graph::AlignerParams;

#[derive(Parser)]
#[command(name = "braid-align")]
#[command(about = "Aligns long DNA reads to cyclic sequence graphs", long_about = None)]
#[command(version)]
struct Cli {
    /// Graph file (GFA-style segments and links)
    #[arg(short = 'g', long, value_name = "FILE")]
    graph: PathBuf,

    /// Reads file (FASTQ, optionally gzipped)
    #[arg(short = 'f', long, value_name = "FILE")]
    reads: PathBuf,

    /// Alignment output file (JSON lines)
    #[arg(short = 'a', long, value_name = "FILE")]
    alignments_out: PathBuf,

    /// Augmented graph output file (optional)
    #[arg(short = 'A', long, value_name = "FILE")]
    auggraph_out: Option<PathBuf>,

    /// Seed hits file (optional; without it -i must be set)
    #[arg(short = 's', long, value_name = "FILE")]
    seeds: Option<PathBuf>,

    /// Enable seed-free full-start alignment
    #[arg(short = 'i', long)]
    initial_full_band: bool,

    /// Worker thread count
    #[arg(short = 't', long, value_name = "INT", default_value = "0")]
    threads: usize,

    /// Initial bandwidth
    #[arg(short = 'b', long, value_name = "INT", default_value = "0")]
    bandwidth: usize,

    /// Ramp bandwidth; if nonzero must exceed the initial bandwidth
    #[arg(short = 'B', long, value_name = "INT", default_value = "0")]
    ramp_bandwidth: usize,

    /// Dynamic row start; must be a multiple of 64
    #[arg(short = 'd', long, value_name = "INT", default_value = "64")]
    dynamic_row_start: usize,

    /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
    #[arg(short = 'v', long, value_name = "INT", default_value = "3")]
    verbosity: i32,
}

// Argument validation failures report one line and leave the exit status at
// zero, matching the long-standing behavior scripts depend on.
fn fail_validation(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(0);
}

fn main() {
    let cli = Cli::parse();

    if cli.dynamic_row_start % 64 != 0 {
        fail_validation("dynamic row start has to be a multiple of 64");
    }
    if cli.threads < 1 {
        fail_validation("number of threads must be >= 1");
    }
    if cli.bandwidth < 2 {
        fail_validation("bandwidth must be >= 2");
    }
    if cli.ramp_bandwidth != 0 && cli.ramp_bandwidth <= cli.bandwidth {
        fail_validation("backup bandwidth must be higher than initial bandwidth");
    }
    if !cli.initial_full_band && cli.seeds.is_none() {
        fail_validation("either initial full band or seed file must be set");
    }

    let log_level = match cli.verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let mut num_threads = cli.threads;
    let max_threads = num_cpus::get() * 2;
    if num_threads > max_threads {
        log::warn!(
            "Thread count {} exceeds recommended maximum {}, capping at {}",
            num_threads,
            max_threads,
            max_threads
        );
        num_threads = max_threads;
    }
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        log::warn!(
            "Failed to configure thread pool: {} (may already be initialized)",
            e
        );
    }
    log::info!(
        "Using {} {}",
        num_threads,
        if num_threads == 1 { "thread" } else { "threads" }
    );
    // accepted and validated but consumed by no alignment entry point
    log::debug!("dynamic row start: {}", cli.dynamic_row_start);

    let config = PipelineConfig {
        graph_file: cli.graph,
        fastq_file: cli.reads.to_string_lossy().into_owned(),
        alignment_file: cli.alignments_out,
        augmented_graph_file: cli.auggraph_out,
        seed_file: cli.seeds,
        full_start: cli.initial_full_band,
        params: AlignerParams {
            initial_bandwidth: cli.bandwidth,
            ramp_bandwidth: cli.ramp_bandwidth,
            ..AlignerParams::default()
        },
    };

    match run_pipeline(&config) {
        Ok(stats) => {
            log::info!("{}", stats);
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
