// WHY: Parallel batch driver shared by the CLI, benches and integration tests
// Extraction is CPU-bound, so each document runs on the blocking pool behind a semaphore

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::incremental::{result_file_exists, write_result_file_async};
use crate::pipeline::CitationEngine;
use crate::reader::{AsyncFileReader, ReaderConfig};

/// Per-file processing statistics
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileStats {
    /// Source document path
    pub path: String,
    /// Number of characters processed
    pub chars_processed: u64,
    /// Markers present in the marked text
    pub citations_detected: u64,
    /// Span records written
    pub spans_emitted: u64,
    /// Processing time in milliseconds, read to write
    pub processing_time_ms: u64,
    /// Extraction time in milliseconds (subset of processing_time_ms)
    pub extraction_time_ms: u64,
    /// Throughput in characters per second
    pub chars_per_sec: f64,
    /// Processing status (success, skipped, failed)
    pub status: String,
    /// Error message if processing failed
    pub error: Option<String>,
}

impl FileStats {
    fn empty(path: &Path, status: &str, error: Option<String>) -> Self {
        Self {
            path: path.display().to_string(),
            chars_processed: 0,
            citations_detected: 0,
            spans_emitted: 0,
            processing_time_ms: 0,
            extraction_time_ms: 0,
            chars_per_sec: 0.0,
            status: status.to_string(),
            error,
        }
    }
}

/// Aggregate statistics for one run
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunStats {
    pub total_processing_time_ms: u64,
    pub files_processed: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub total_chars_processed: u64,
    pub total_citations: u64,
    pub overall_chars_per_sec: f64,
    pub file_stats: Vec<FileStats>,
}

#[derive(Debug, Clone)]
pub struct ProcessingOptions {
    /// Reprocess documents that already have a result file
    pub overwrite_all: bool,
    /// Abort the run on the first failed document
    pub fail_fast: bool,
    pub show_progress: bool,
    /// Worker limit; defaults to the number of CPUs
    pub max_concurrency: usize,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            overwrite_all: false,
            fail_fast: false,
            show_progress: false,
            max_concurrency: num_cpus::get(),
        }
    }
}

/// Check if a document still needs processing
/// WHY: Core incremental logic - skip documents whose result file already exists
pub fn should_process_file(path: &Path, overwrite_all: bool) -> bool {
    overwrite_all || !result_file_exists(path)
}

/// Read, extract and write one document
pub async fn process_single_file(
    engine: Arc<CitationEngine>,
    path: PathBuf,
    options: &ProcessingOptions,
) -> Result<FileStats> {
    if !should_process_file(&path, options.overwrite_all) {
        return Ok(FileStats::empty(&path, "skipped", None));
    }

    let started = Instant::now();
    let reader = AsyncFileReader::new(ReaderConfig {
        fail_fast: options.fail_fast,
        ..ReaderConfig::default()
    });
    let (content, read_stats) = reader.read_document(&path).await?;
    let Some(text) = content else {
        return Ok(FileStats::empty(&path, "failed", read_stats.read_error));
    };

    let extraction_started = Instant::now();
    let result = tokio::task::spawn_blocking(move || engine.extract(&text)).await?;
    let extraction_time_ms = extraction_started.elapsed().as_millis() as u64;

    write_result_file_async(&path, &result).await?;

    let processing_time_ms = started.elapsed().as_millis() as u64;
    let chars_processed = read_stats.chars_read;
    Ok(FileStats {
        path: path.display().to_string(),
        chars_processed,
        citations_detected: result.markers.len() as u64,
        spans_emitted: result.citation_spans.len() as u64,
        processing_time_ms,
        extraction_time_ms,
        chars_per_sec: if processing_time_ms > 0 {
            chars_processed as f64 / (processing_time_ms as f64 / 1000.0)
        } else {
            0.0
        },
        status: "success".to_string(),
        error: None,
    })
}

/// Process documents concurrently, bounded by `options.max_concurrency`
pub async fn process_files_parallel(
    engine: Arc<CitationEngine>,
    paths: Vec<PathBuf>,
    options: &ProcessingOptions,
) -> Result<RunStats> {
    let run_started = Instant::now();
    let workers = options.max_concurrency.max(1);
    info!("Processing {} documents with {} workers", paths.len(), workers);

    let progress = if options.show_progress {
        let bar = ProgressBar::new(paths.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar
    } else {
        ProgressBar::hidden()
    };

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut join_set = JoinSet::new();
    for path in paths {
        let engine = Arc::clone(&engine);
        let semaphore = Arc::clone(&semaphore);
        let options = options.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let outcome = process_single_file(engine, path.clone(), &options).await;
            Ok::<_, anyhow::Error>((path, outcome))
        });
    }

    let mut file_stats = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        let (path, outcome) = joined??;
        progress.inc(1);

        let stats = match outcome {
            Ok(stats) => stats,
            Err(e) if options.fail_fast => {
                join_set.abort_all();
                progress.abandon_with_message("aborted");
                return Err(e.context(format!("Failed to process {}", path.display())));
            }
            Err(e) => {
                warn!("Failed to process {}: {}", path.display(), e);
                FileStats::empty(&path, "failed", Some(e.to_string()))
            }
        };
        if stats.status == "failed" && options.fail_fast {
            join_set.abort_all();
            progress.abandon_with_message("aborted");
            anyhow::bail!(
                "Failed to process {}: {}",
                stats.path,
                stats.error.unwrap_or_default()
            );
        }
        progress.set_message(stats.path.clone());
        file_stats.push(stats);
    }
    progress.finish_with_message("done");

    file_stats.sort_by(|a, b| a.path.cmp(&b.path));
    let run_stats = summarize(file_stats, run_started.elapsed().as_millis() as u64);
    info!(
        "Run complete: {} processed, {} skipped, {} failed in {}ms",
        run_stats.files_processed,
        run_stats.files_skipped,
        run_stats.files_failed,
        run_stats.total_processing_time_ms
    );
    Ok(run_stats)
}

fn summarize(file_stats: Vec<FileStats>, total_processing_time_ms: u64) -> RunStats {
    let count = |status: &str| file_stats.iter().filter(|s| s.status == status).count() as u64;
    let total_chars_processed = file_stats.iter().map(|s| s.chars_processed).sum::<u64>();
    RunStats {
        total_processing_time_ms,
        files_processed: count("success"),
        files_skipped: count("skipped"),
        files_failed: count("failed"),
        total_chars_processed,
        total_citations: file_stats.iter().map(|s| s.citations_detected).sum(),
        overall_chars_per_sec: if total_processing_time_ms > 0 {
            total_chars_processed as f64 / (total_processing_time_ms as f64 / 1000.0)
        } else {
            0.0
        },
        file_stats,
    }
}

/// Write run statistics as pretty JSON
pub async fn write_run_stats(stats: &RunStats, stats_path: &Path) -> Result<()> {
    let file = tokio::fs::File::create(stats_path).await?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(serde_json::to_string_pretty(stats)?.as_bytes())
        .await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
