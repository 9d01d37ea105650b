use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use citespan::discovery::{self, DiscoveryConfig};
use citespan::parallel_processing::{process_files_parallel, write_run_stats, ProcessingOptions};
use citespan::{CitationEngine, EngineConfig, MultiCitationStrategy, NormalizeMode};

#[derive(Parser, Debug)]
#[command(name = "citespan")]
#[command(about = "Mark citations in plain-text papers and extract the claim each one supports")]
#[command(version)]
struct Args {
    /// Root directory to scan for *.txt documents
    root_dir: PathBuf,

    /// TOML engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the span normalization mode
    #[arg(long, value_enum)]
    normalize_mode: Option<NormalizeMode>,

    /// Override the multi-citation strategy
    #[arg(long, value_enum)]
    strategy: Option<MultiCitationStrategy>,

    /// Reprocess documents that already have a result file
    #[arg(long)]
    overwrite_all: bool,

    /// Abort on first error
    #[arg(long)]
    fail_fast: bool,

    /// Worker count (defaults to number of CPUs)
    #[arg(long)]
    workers: Option<usize>,

    /// Suppress console progress bars
    #[arg(long)]
    no_progress: bool,

    /// Stats output file path
    #[arg(long, default_value = "run_stats.json")]
    stats_out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // WHY: structured JSON logging on stderr keeps stdout free for the run summary
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();

    info!("Starting citespan");
    info!(?args, "Parsed CLI arguments");

    if !args.root_dir.exists() {
        anyhow::bail!("Root directory does not exist: {}", args.root_dir.display());
    }
    if !args.root_dir.is_dir() {
        anyhow::bail!("Root path is not a directory: {}", args.root_dir.display());
    }

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(mode) = args.normalize_mode {
        config.normalize_mode = mode;
    }
    if let Some(strategy) = args.strategy {
        config.multi_citation_strategy = strategy;
    }
    let engine = Arc::new(CitationEngine::new(config)?);

    info!("Starting document discovery in: {}", args.root_dir.display());
    let discovered = discovery::collect_discovered_files(
        &args.root_dir,
        DiscoveryConfig {
            fail_fast: args.fail_fast,
        },
    )
    .await?;

    let mut paths = Vec::with_capacity(discovered.len());
    for file in discovered {
        match file.error {
            Some(error) => info!("Issue with {}: {}", file.path.display(), error),
            None => paths.push(file.path),
        }
    }
    paths.sort();

    let options = ProcessingOptions {
        overwrite_all: args.overwrite_all,
        fail_fast: args.fail_fast,
        show_progress: !args.no_progress,
        max_concurrency: args.workers.unwrap_or_else(num_cpus::get),
    };
    let run_stats = process_files_parallel(engine, paths, &options).await?;
    write_run_stats(&run_stats, &args.stats_out).await?;

    println!("citespan v{} - run complete", env!("CARGO_PKG_VERSION"));
    println!("  Processed: {}", run_stats.files_processed);
    println!("  Skipped:   {}", run_stats.files_skipped);
    if run_stats.files_failed > 0 {
        println!("  Failed:    {}", run_stats.files_failed);
    }
    println!("  Citations: {}", run_stats.total_citations);
    println!("  Stats written to {}", args.stats_out.display());

    Ok(())
}
